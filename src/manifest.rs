//! Configuration file parsing for podlink
//!
//! Parses the optional `podlink.toml` using serde. Every field has a default,
//! so a missing file is the same as an empty one.

use crate::error::{Error, Result};
use crate::network::veth::LinkNaming;
use crate::network::IpRoute2;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest allowed link name prefix, leaving room for the ID digest
const MAX_PREFIX_LEN: usize = 8;

/// Load configuration from a file, falling back to defaults if it is absent
pub fn load(path: &Path) -> Result<PodlinkConfig> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(PodlinkConfig::default());
        }
        Err(e) => {
            return Err(Error::ConfigRead {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    let config: PodlinkConfig = toml::from_str(&content)?;
    config.validate()?;

    Ok(config)
}

/// Load configuration, using defaults when the file cannot be read or is invalid
///
/// For DEL, which has to clean up even when the config is broken.
pub fn load_or_default(path: &Path) -> PodlinkConfig {
    load(path).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "using default configuration");
        PodlinkConfig::default()
    })
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PodlinkConfig {
    /// iproute2 binary
    pub ip_binary: PathBuf,

    /// Directory holding namespace handles
    pub netns_dir: PathBuf,

    /// Timeout for each network control command, in seconds
    pub command_timeout: u64,

    /// Prefix of host-side link names
    pub host_link_prefix: String,

    /// Prefix of the temporary container-side link names
    pub temp_link_prefix: String,
}

impl Default for PodlinkConfig {
    fn default() -> Self {
        Self {
            ip_binary: PathBuf::from("ip"),
            netns_dir: PathBuf::from("/var/run/netns"),
            command_timeout: 30,
            host_link_prefix: "pod".to_string(),
            temp_link_prefix: "tmp".to_string(),
        }
    }
}

impl PodlinkConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout == 0 {
            return Err(Error::ConfigValidation(
                "command_timeout must be greater than zero".to_string(),
            ));
        }

        for (field, prefix) in [
            ("host_link_prefix", &self.host_link_prefix),
            ("temp_link_prefix", &self.temp_link_prefix),
        ] {
            if prefix.is_empty()
                || prefix.len() > MAX_PREFIX_LEN
                || !prefix.chars().all(|c| c.is_ascii_alphanumeric())
            {
                return Err(Error::ConfigValidation(format!(
                    "{} '{}' must be 1 to {} ASCII letters or digits",
                    field, prefix, MAX_PREFIX_LEN
                )));
            }
        }

        if self.host_link_prefix == self.temp_link_prefix {
            return Err(Error::ConfigValidation(
                "host_link_prefix and temp_link_prefix must differ".to_string(),
            ));
        }

        Ok(())
    }

    pub fn naming(&self) -> LinkNaming {
        LinkNaming::new(&self.host_link_prefix, &self.temp_link_prefix)
    }

    pub fn control(&self) -> IpRoute2 {
        IpRoute2::new(
            &self.ip_binary,
            &self.netns_dir,
            Duration::from_secs(self.command_timeout),
        )
    }
}
