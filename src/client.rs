//! Line-oriented client for the coordinator
//!
//! Thin wrapper over a TCP stream speaking the newline-delimited JSON
//! protocol. Used by the operator CLI and the reference agent client; the
//! server does not depend on this module.

use std::time::Duration;

use eyre::{Context, Result, eyre};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::protocol::{self, Inbound, Outbound};

/// Default timeout for connects, writes, and expected replies.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for one coordinator address.
#[derive(Debug, Clone)]
pub struct FarmClient {
    addr: String,
    timeout: Duration,
}

impl FarmClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Open a connection to the coordinator.
    pub async fn connect(&self) -> Result<FarmConnection> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| eyre!("connection to {} timed out", self.addr))?
            .context(format!("Failed to connect to coordinator at {}", self.addr))?;

        let (read_half, write_half) = stream.into_split();
        Ok(FarmConnection {
            reader: BufReader::new(read_half),
            writer: write_half,
            timeout: self.timeout,
        })
    }
}

/// An open stream to the coordinator.
pub struct FarmConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeout: Duration,
}

impl FarmConnection {
    /// Send one command line.
    pub async fn send(&mut self, msg: &Inbound) -> Result<()> {
        let line = protocol::encode_line(msg).context("Failed to encode message")?;
        tokio::time::timeout(self.timeout, async {
            self.writer
                .write_all(line.as_bytes())
                .await
                .context("Failed to write message")?;
            self.writer.flush().await.context("Failed to flush stream")?;
            Ok::<_, eyre::Report>(())
        })
        .await
        .map_err(|_| eyre!("write timed out"))??;
        Ok(())
    }

    /// Read the next message, waiting up to the configured timeout.
    pub async fn recv(&mut self) -> Result<Outbound> {
        tokio::time::timeout(self.timeout, self.read_message())
            .await
            .map_err(|_| eyre!("timed out waiting for a reply"))?
    }

    /// Read the next message with an explicit deadline. `Ok(None)` means the
    /// deadline passed without the server saying anything.
    pub async fn recv_within(&mut self, deadline: Duration) -> Result<Option<Outbound>> {
        match tokio::time::timeout(deadline, self.read_message()).await {
            Ok(msg) => msg.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Block until the next message arrives, with no deadline.
    ///
    /// Agents waiting for an `ACTIVATE` sit here indefinitely.
    pub async fn recv_wait(&mut self) -> Result<Outbound> {
        self.read_message().await
    }

    async fn read_message(&mut self) -> Result<Outbound> {
        loop {
            let mut line = String::new();
            let bytes_read = self
                .reader
                .read_line(&mut line)
                .await
                .context("Failed to read from coordinator")?;
            if bytes_read == 0 {
                return Err(eyre!("coordinator closed the connection"));
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return serde_json::from_str(line)
                .context(format!("Failed to parse server message: {line}"));
        }
    }
}
