//! CLI definitions for the coordinator server

use clap::Parser;
use std::path::PathBuf;

/// AgentFarm coordinator server
#[derive(Debug, Parser)]
#[command(
    name = "farmd",
    about = "Serialized-execution coordinator for fleets of long-lived agents",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// TCP port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to listen on (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}
