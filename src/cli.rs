//! Invocation parameters
//!
//! A container runtime passes everything through the environment, so every
//! argument is backed by its CNI variable. Flags exist for manual runs.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// podlink - per-container IPv6 veth attachment plugin
#[derive(Parser, Debug)]
#[command(name = "podlink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Operation requested by the runtime
    #[arg(long, env = "CNI_COMMAND", value_enum)]
    pub command: CniCommand,

    /// Container ID
    #[arg(long, env = "CNI_CONTAINERID")]
    pub container_id: Option<String>,

    /// Path of the container's network namespace
    #[arg(long, env = "CNI_NETNS")]
    pub netns: Option<PathBuf>,

    /// Interface name to create inside the container
    #[arg(long, env = "CNI_IFNAME")]
    pub ifname: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "PODLINK_CONFIG", default_value = "/etc/podlink/podlink.toml")]
    pub config: PathBuf,

    /// Enable debug logging on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

/// CNI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CniCommand {
    #[value(name = "ADD")]
    Add,
    #[value(name = "DEL")]
    Del,
    #[value(name = "CHECK")]
    Check,
    #[value(name = "VERSION")]
    Version,
}
