//! Unified error types for podlink

use crate::network::attach::Step;
use ipnet::Ipv6Net;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for podlink operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Config errors
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to decode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Prefix length /{target} cannot be carved from {parent}")]
    InvalidPrefix { parent: Ipv6Net, target: u8 },

    // Allocation errors
    #[error("Failed to discover host addresses: {0}")]
    Discovery(String),

    #[error("Address pool {parent} has no free /{target} subnet left")]
    PoolExhausted { parent: Ipv6Net, target: u8 },

    // Attachment errors
    #[error("Could not {step}: {source}")]
    ControlOperation {
        step: Step,
        #[source]
        source: Box<Error>,
    },

    #[error("Attachment lifecycle error: {0}")]
    Lifecycle(String),

    // Command errors
    #[error("Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("Command '{command}' timed out after {seconds} seconds")]
    CommandTimeout { command: String, seconds: u64 },

    #[error("Interface '{0}' not found")]
    InterfaceNotFound(String),
}

impl Error {
    /// Wrap a control-interface failure with the step it happened at
    pub fn at(step: Step, source: Error) -> Self {
        Error::ControlOperation {
            step,
            source: Box::new(source),
        }
    }
}

/// Result type alias for podlink operations
pub type Result<T> = std::result::Result<T, Error>;
