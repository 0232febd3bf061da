//! farm - operator CLI for the AgentFarm coordinator
//!
//! Speaks for the reserved `people` role: transfer the barrel, inspect
//! status, list agents. Each command opens a fresh connection and
//! disconnects when done. Exit code 0 on success, 1 on any connection,
//! protocol, or server-reported error.

use std::time::Duration;

use clap::{Parser, Subcommand};
use eyre::{Result, eyre};

use agentfarm::client::FarmClient;
use agentfarm::config::DEFAULT_PORT;
use agentfarm::domain::PEOPLE_ROLE;
use agentfarm::protocol::{Inbound, Outbound};

/// How long to wait for the server to complain about a yield before
/// declaring it accepted. A rejection is generated synchronously, so this
/// only has to cover the round trip.
const YIELD_ERROR_GRACE: Duration = Duration::from_millis(500);

/// Operator CLI for the AgentFarm coordinator
#[derive(Debug, Parser)]
#[command(name = "farm", about = "Operator CLI for the AgentFarm coordinator", version)]
struct Cli {
    /// Coordinator address
    #[arg(long, global = true, default_value_t = default_server())]
    server: String,

    #[command(subcommand)]
    command: Command,
}

fn default_server() -> String {
    format!("localhost:{DEFAULT_PORT}")
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Transfer the barrel to an agent
    Yield {
        /// Role to hand the barrel to
        to_role: String,

        /// Directive delivered with the barrel
        message: String,
    },

    /// Show the full collective status
    Status,

    /// List registered agents with their details
    QueryAgents,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = FarmClient::new(&cli.server);

    match cli.command {
        Command::Yield { to_role, message } => cmd_yield(&client, &to_role, &message).await,
        Command::Status => cmd_status(&client).await,
        Command::QueryAgents => cmd_query_agents(&client).await,
    }
}

async fn cmd_yield(client: &FarmClient, to_role: &str, message: &str) -> Result<()> {
    let mut conn = client.connect().await?;
    conn.send(&Inbound::Yield {
        from_role: PEOPLE_ROLE.to_string(),
        to_role: to_role.to_string(),
        payload: message.to_string(),
    })
    .await?;

    // The server only answers a yield when it rejects it.
    if let Some(Outbound::Error { message }) = conn.recv_within(YIELD_ERROR_GRACE).await? {
        return Err(eyre!("server error: {message}"));
    }

    println!("Barrel yielded to '{to_role}'");
    if !message.is_empty() {
        println!("Message: {message}");
    }
    Ok(())
}

async fn cmd_status(client: &FarmClient) -> Result<()> {
    let mut conn = client.connect().await?;
    conn.send(&Inbound::QueryStatus).await?;

    match conn.recv().await? {
        Outbound::Status {
            barrel_holder,
            registered_agents,
            agent_states,
            connected_agents,
        } => {
            println!("AgentFarm status");
            println!("----------------");
            println!("Barrel holder: {barrel_holder}");
            println!("Registered agents: {}", registered_agents.len());

            if !registered_agents.is_empty() {
                println!();
                for role in &registered_agents {
                    let state = agent_states
                        .get(role)
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    let connected = if connected_agents.get(role).copied().unwrap_or(false) {
                        "online"
                    } else {
                        "offline"
                    };
                    let marker = if *role == barrel_holder { "*" } else { " " };
                    println!("  {marker} {role} - {state} ({connected})");
                }
            }
            Ok(())
        }
        Outbound::Error { message } => Err(eyre!("server error: {message}")),
        other => Err(eyre!("unexpected reply: {other:?}")),
    }
}

async fn cmd_query_agents(client: &FarmClient) -> Result<()> {
    let mut conn = client.connect().await?;
    conn.send(&Inbound::QueryAgents).await?;

    match conn.recv().await? {
        Outbound::AgentDetails { agent_details } => {
            println!("Registered agents");
            println!("-----------------");

            if agent_details.is_empty() {
                println!("No agents registered");
                return Ok(());
            }

            for (i, agent) in agent_details.iter().enumerate() {
                let connected = if agent.connected { "online" } else { "offline" };
                println!("{}. {} - {} ({connected})", i + 1, agent.role, agent.state);
                if agent.capabilities.is_empty() {
                    println!("   capabilities: none specified");
                } else {
                    println!("   capabilities: {}", agent.capabilities.join(", "));
                }
            }
            println!();
            println!("Total: {} agents", agent_details.len());
            Ok(())
        }
        Outbound::Error { message } => Err(eyre!("server error: {message}")),
        other => Err(eyre!("unexpected reply: {other:?}")),
    }
}
