//! farm-agent - reference agent client
//!
//! Registers under a role, waits for the barrel, prints the activation
//! directive, optionally yields onward, and exits. Reconnects with a fixed
//! delay while waiting; once activated its job here is done.

use std::time::Duration;

use clap::Parser;
use eyre::{Result, eyre};
use tracing::warn;

use agentfarm::client::{FarmClient, FarmConnection};
use agentfarm::config::DEFAULT_PORT;
use agentfarm::protocol::{AckStatus, Inbound, Outbound};

/// Reference agent client for the AgentFarm coordinator
#[derive(Debug, Parser)]
#[command(name = "farm-agent", about = "Reference agent client for the AgentFarm coordinator", version)]
struct Cli {
    /// Role to register under
    #[arg(long)]
    role: String,

    /// Coordinator address
    #[arg(long, default_value_t = default_server())]
    server: String,

    /// Role to yield the barrel to after activation
    #[arg(long)]
    yield_to: Option<String>,

    /// Message to send with the yield
    #[arg(long, default_value = "")]
    yield_msg: String,

    /// Delay between reconnect attempts, in seconds
    #[arg(long, default_value_t = 5)]
    reconnect_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if cli.role.is_empty() {
        return Err(eyre!("--role must not be empty"));
    }

    let client = FarmClient::new(&cli.server);
    let reconnect_delay = Duration::from_secs(cli.reconnect_secs);

    loop {
        match run_session(&client, &cli).await {
            Ok(SessionEnd::Completed) => return Ok(()),
            // The server said no; retrying the same role will not help.
            Ok(SessionEnd::Refused(message)) => return Err(eyre!("registration failed: {message}")),
            Err(e) => {
                warn!(error = %e, "connection lost, reconnecting in {}s", cli.reconnect_secs);
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }
}

/// How a session finished, when it finished without an I/O failure.
enum SessionEnd {
    /// Activated (and optionally yielded onward).
    Completed,
    /// The coordinator rejected the registration.
    Refused(String),
}

/// One connected session: register, wait for activation, optionally yield.
///
/// An `Err` means the connection failed and the caller should reconnect.
async fn run_session(client: &FarmClient, cli: &Cli) -> Result<SessionEnd> {
    let mut conn = client.connect().await?;
    println!("agent '{}' connected to {}", cli.role, cli.server);

    conn.send(&Inbound::Register {
        role: cli.role.clone(),
        capabilities: vec![],
    })
    .await?;

    match conn.recv().await? {
        Outbound::AckRegister {
            status: AckStatus::Success,
            message,
        } => {
            println!("{message}");
            println!("waiting for barrel assignment...");
        }
        Outbound::AckRegister { message, .. } | Outbound::Error { message } => {
            return Ok(SessionEnd::Refused(message));
        }
        other => return Err(eyre!("unexpected reply to REGISTER: {other:?}")),
    }

    loop {
        match conn.recv_wait().await? {
            Outbound::Activate { from_role, payload } => {
                println!("barrel received from '{from_role}'");
                if !payload.is_empty() {
                    println!("directive: {payload}");
                }

                if let Some(yield_to) = &cli.yield_to {
                    yield_onward(&mut conn, cli, yield_to).await?;
                }

                println!("agent '{}' done", cli.role);
                return Ok(SessionEnd::Completed);
            }
            Outbound::Error { message } => {
                eprintln!("server error: {message}");
            }
            other => {
                eprintln!("ignoring unexpected message: {other:?}");
            }
        }
    }
}

async fn yield_onward(conn: &mut FarmConnection, cli: &Cli, yield_to: &str) -> Result<()> {
    println!("yielding barrel to '{yield_to}'");
    conn.send(&Inbound::Yield {
        from_role: cli.role.clone(),
        to_role: yield_to.to_string(),
        payload: cli.yield_msg.clone(),
    })
    .await?;

    // The server is silent on success; give it a moment to object.
    if let Some(Outbound::Error { message }) =
        conn.recv_within(Duration::from_millis(500)).await?
    {
        return Err(eyre!("yield failed: {message}"));
    }
    Ok(())
}

fn default_server() -> String {
    format!("localhost:{DEFAULT_PORT}")
}
