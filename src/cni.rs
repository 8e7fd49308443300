//! CNI wire types
//!
//! Requests read from stdin and reports written to stdout, following the
//! 0.4.0 result format.

use crate::error::{Error, Result};
use crate::network::AttachmentState;
use ipnet::Ipv6Net;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// Supported CNI version
pub const VERSION: &str = "0.4.0";

/// Reply to a VERSION command
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResponse {
    pub cni_version: &'static str,
    pub supported_versions: Vec<&'static str>,
}

impl Default for VersionResponse {
    fn default() -> Self {
        Self {
            cni_version: VERSION,
            supported_versions: vec![VERSION],
        }
    }
}

/// Reported when any command fails
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub cni_version: &'static str,
    pub code: u32,
    pub msg: String,
}

impl ErrorResponse {
    pub fn new(code: u32, msg: impl Into<String>) -> Self {
        Self {
            cni_version: VERSION,
            code,
            msg: msg.into(),
        }
    }
}

impl From<&Error> for ErrorResponse {
    fn from(error: &Error) -> Self {
        Self::new(error_code(error), error.to_string())
    }
}

/// CNI error code for an error
///
/// Codes below 100 are the well-known CNI codes, 100 and up are specific to
/// this plugin.
pub fn error_code(error: &Error) -> u32 {
    match error {
        Error::InvalidRequest(_) => 4,
        Error::Io(_) | Error::ConfigRead { .. } => 5,
        Error::Json(_) => 6,
        Error::InvalidPrefix { .. } | Error::ConfigParse(_) | Error::ConfigValidation(_) => 7,
        Error::Discovery(_) => 100,
        Error::PoolExhausted { .. } => 101,
        Error::ControlOperation { .. }
        | Error::CommandFailed { .. }
        | Error::CommandTimeout { .. }
        | Error::InterfaceNotFound(_) => 102,
        Error::Lifecycle(_) => 103,
    }
}

/// Network configuration read from stdin for ADD and CHECK
///
/// Fields of the CNI network configuration other than these are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRequest {
    /// Parent block in CIDR notation
    pub subnet: String,
    /// Prefix length carved out per container
    pub target_net: u8,
}

impl AddRequest {
    /// Decode the network configuration document
    pub fn read<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Parent block parsed from `subnet`
    pub fn parent(&self) -> Result<Ipv6Net> {
        self.subnet.parse().map_err(|e| {
            Error::InvalidRequest(format!("could not parse subnet '{}': {}", self.subnet, e))
        })
    }
}

/// Interface entry of an ADD result
#[derive(Debug, Serialize)]
pub struct Interface {
    pub name: String,
    pub mac: String,
    pub sandbox: String,
}

/// IP entry of an ADD result
#[derive(Debug, Serialize)]
pub struct Ip {
    pub version: &'static str,
    pub address: String,
    pub gateway: String,
    /// Index into `interfaces`
    pub interface: usize,
}

/// Result of a successful ADD
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddResponse {
    pub cni_version: &'static str,
    pub interfaces: Vec<Interface>,
    pub ips: Vec<Ip>,
}

impl From<&AttachmentState> for AddResponse {
    fn from(state: &AttachmentState) -> Self {
        let identity = &state.identity;
        Self {
            cni_version: VERSION,
            interfaces: vec![Interface {
                name: identity.interface_name.clone(),
                mac: state.hardware_address.clone(),
                sandbox: sandbox(&identity.namespace_path),
            }],
            ips: vec![Ip {
                version: "6",
                address: state.pair.inner.to_string(),
                gateway: state.pair.outer.addr().to_string(),
                interface: 0,
            }],
        }
    }
}

fn sandbox(path: &Path) -> String {
    path.display().to_string()
}
