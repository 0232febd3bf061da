//! Per-peer connection handler
//!
//! One task per stream. The task reads newline-delimited JSON commands,
//! dispatches them into the coordinator, and writes back replies plus any
//! notifications the coordinator routes to this peer. Parse and domain
//! errors go back as `ERROR` lines and the stream stays open; only EOF,
//! an I/O failure, or displacement by a newer registration end the task.

use std::net::SocketAddr;
use std::time::Duration;

use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::coordinator::{CoordinatorConfig, CoordinatorHandle};
use crate::protocol::{self, AckStatus, AgentDetailInfo, Inbound, Outbound};

/// Why the read loop ended; decides whether the role gets deregistered.
enum Exit {
    /// Peer closed or the stream failed: run the EOF path.
    Eof,
    /// A newer REGISTER for the same role took over this stream.
    Displaced,
    /// Server shutdown.
    Shutdown,
}

pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    conn_id: u64,
    handle: CoordinatorHandle,
    config: CoordinatorConfig,
    shutdown: watch::Receiver<bool>,
) {
    debug!(%peer, conn_id, "peer connected");
    if let Err(e) = serve(stream, conn_id, &handle, &config, shutdown).await {
        debug!(%peer, conn_id, error = %e, "connection ended with error");
    }
    debug!(%peer, conn_id, "peer disconnected");
}

async fn serve(
    stream: TcpStream,
    conn_id: u64,
    handle: &CoordinatorHandle,
    config: &CoordinatorConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    // Bound role and notification channel, set by the first successful
    // REGISTER on this stream.
    let mut bound_role: Option<String> = None;
    let mut notifications: Option<mpsc::Receiver<Outbound>> = None;
    let write_timeout = config.write_timeout();

    // Errors in here must not return early: a failed write or dispatch has
    // to fall through to the EOF path below so the role gets deregistered.
    let exit = 'peer: loop {
        tokio::select! {
            _ = shutdown.changed() => break 'peer Exit::Shutdown,

            maybe = next_notification(&mut notifications) => {
                match maybe {
                    Some(msg) => {
                        if let Err(e) = write_line(&mut write_half, &msg, write_timeout).await {
                            debug!(conn_id, error = %e, "notification write failed");
                            break 'peer Exit::Eof;
                        }
                    }
                    None => {
                        // The coordinator dropped our binding: a newer
                        // registration owns this role now. Close up.
                        break 'peer Exit::Displaced;
                    }
                }
            }

            maybe_line = lines.next_line() => {
                match maybe_line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let replies = match dispatch(
                            line,
                            conn_id,
                            handle,
                            config,
                            &mut bound_role,
                            &mut notifications,
                        )
                        .await
                        {
                            Ok(replies) => replies,
                            Err(e) => {
                                debug!(conn_id, error = %e, "dispatch failed");
                                break 'peer Exit::Eof;
                            }
                        };
                        for reply in replies {
                            if let Err(e) = write_line(&mut write_half, &reply, write_timeout).await {
                                debug!(conn_id, error = %e, "reply write failed");
                                break 'peer Exit::Eof;
                            }
                        }
                    }
                    Ok(None) => break 'peer Exit::Eof,
                    Err(e) => {
                        debug!(conn_id, error = %e, "read failed");
                        break 'peer Exit::Eof;
                    }
                }
            }
        }
    };

    if let (Exit::Eof, Some(role)) = (&exit, &bound_role) {
        // Tell the coordinator this stream is gone. It deregisters the role
        // only if we are still the current binding.
        handle.connection_closed(role, conn_id).await?;
    }

    Ok(())
}

/// Wait on the peer's notification channel, or forever before registration.
async fn next_notification(rx: &mut Option<mpsc::Receiver<Outbound>>) -> Option<Outbound> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Handle one inbound frame, returning the replies to write on this stream.
async fn dispatch(
    line: &str,
    conn_id: u64,
    handle: &CoordinatorHandle,
    config: &CoordinatorConfig,
    bound_role: &mut Option<String>,
    notifications: &mut Option<mpsc::Receiver<Outbound>>,
) -> Result<Vec<Outbound>> {
    let msg = match protocol::parse_inbound(line) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(conn_id, error = %e, "rejecting frame");
            return Ok(vec![Outbound::error(e)]);
        }
    };

    match msg {
        Inbound::Register { role, capabilities } => {
            // A stream speaks for at most one role.
            if let Some(bound) = bound_role
                && *bound != role
            {
                return Ok(vec![Outbound::error(format!(
                    "stream is already bound to role '{bound}'"
                ))]);
            }

            let (tx, rx) = mpsc::channel(config.peer_channel_buffer);
            match handle.register(&role, capabilities, conn_id, tx).await? {
                Ok(outcome) => {
                    *bound_role = Some(role.clone());
                    *notifications = Some(rx);

                    let mut replies = vec![Outbound::AckRegister {
                        status: AckStatus::Success,
                        message: format!("agent '{role}' registered"),
                    }];
                    if outcome.resumed {
                        replies.push(Outbound::Activate {
                            from_role: outcome.resume_from,
                            payload: outcome.resume_payload,
                        });
                    }
                    Ok(replies)
                }
                Err(e) => Ok(vec![Outbound::error(e)]),
            }
        }

        Inbound::Yield {
            from_role,
            to_role,
            payload,
        } => match handle.yield_barrel(&from_role, &to_role, &payload).await? {
            // A successful yield is silent on the sending stream; the
            // target hears the ACTIVATE.
            Ok(()) => Ok(vec![]),
            Err(e) => Ok(vec![Outbound::error(e)]),
        },

        Inbound::QueryAgents => {
            let details = handle.agent_details().await?;
            let agent_details = details
                .into_iter()
                .map(|d| AgentDetailInfo {
                    role: d.role,
                    capabilities: d.capabilities,
                    state: d.state,
                    connected: d.connected,
                })
                .collect();
            Ok(vec![Outbound::AgentDetails { agent_details }])
        }

        Inbound::QueryStatus => {
            let status = handle.status().await?;
            Ok(vec![Outbound::Status {
                barrel_holder: status.barrel_holder,
                registered_agents: status.registered_agents,
                agent_states: status.agent_states,
                connected_agents: status.connected_agents,
            }])
        }
    }
}

/// Write one message with the configured deadline.
///
/// A timeout or I/O error is returned to the caller, which breaks out of the
/// read loop so the role goes through the normal EOF path.
async fn write_line(
    write_half: &mut OwnedWriteHalf,
    msg: &Outbound,
    timeout: Duration,
) -> Result<()> {
    let line = protocol::encode_line(msg).context("Failed to encode outbound message")?;
    tokio::time::timeout(timeout, async {
        write_half
            .write_all(line.as_bytes())
            .await
            .context("Failed to write message")?;
        write_half.flush().await.context("Failed to flush stream")?;
        Ok::<_, eyre::Report>(())
    })
    .await
    .map_err(|_| {
        warn!("write deadline exceeded, dropping peer");
        eyre::eyre!("write timed out")
    })??;
    Ok(())
}
