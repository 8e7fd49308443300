//! Veth naming for container attachments
//!
//! Every attachment uses one veth pair. The host end keeps its name for the
//! attachment's lifetime; the peer is created under a temporary name and
//! renamed to the requested interface name once it sits in the container's
//! namespace. Both host-side names derive from the container ID so that a
//! later DEL can find them without any stored state.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Longest interface name the kernel accepts (excluding the NUL)
pub const MAX_LINK_NAME: usize = libc::IF_NAMESIZE - 1;

/// Everything needed to attach or detach one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentIdentity {
    /// Container ID, also the namespace handle name
    pub container_id: String,
    /// Interface name inside the container
    pub interface_name: String,
    /// Path of the container's network namespace
    pub namespace_path: PathBuf,
    /// Host end of the veth pair
    pub host_link_name: String,
    /// Name of the container end before it is moved and renamed
    pub temp_link_name: String,
}

/// Prefixes used to derive host-side link names
#[derive(Debug, Clone)]
pub struct LinkNaming {
    host_prefix: String,
    temp_prefix: String,
}

impl LinkNaming {
    pub fn new(host_prefix: impl Into<String>, temp_prefix: impl Into<String>) -> Self {
        Self {
            host_prefix: host_prefix.into(),
            temp_prefix: temp_prefix.into(),
        }
    }

    /// Build the identity for a container
    ///
    /// `interface_name` must fit the kernel name limit.
    pub fn identity(
        &self,
        container_id: &str,
        interface_name: &str,
        namespace_path: impl Into<PathBuf>,
    ) -> Result<AttachmentIdentity> {
        if interface_name.is_empty() || interface_name.len() > MAX_LINK_NAME {
            return Err(Error::InvalidRequest(format!(
                "Interface name '{}' must be 1 to {} characters",
                interface_name, MAX_LINK_NAME
            )));
        }

        validate_container_id(container_id)?;

        Ok(AttachmentIdentity {
            container_id: container_id.to_string(),
            interface_name: interface_name.to_string(),
            namespace_path: namespace_path.into(),
            host_link_name: self.host_link_name(container_id)?,
            temp_link_name: Self::link_name(&self.temp_prefix, container_id),
        })
    }

    /// Host link name for a container, enough on its own for teardown
    pub fn host_link_name(&self, container_id: &str) -> Result<String> {
        validate_container_id(container_id)?;
        Ok(Self::link_name(&self.host_prefix, container_id))
    }

    /// `prefix` followed by as much of the container ID's SHA-256 as fits
    ///
    /// Hashing the whole ID keeps names distinct for IDs that only differ
    /// in punctuation or past the name budget.
    fn link_name(prefix: &str, container_id: &str) -> String {
        let budget = MAX_LINK_NAME.saturating_sub(prefix.len());
        let digest = hex::encode(Sha256::digest(container_id.as_bytes()));
        format!("{}{}", prefix, &digest[..budget.min(digest.len())])
    }
}

/// Container IDs follow the CNI rule: ASCII letters, digits, `_`, `.` and
/// `-`, not starting with `.`
///
/// The ID names the namespace handle file, so this also guarantees a single
/// plain path component.
pub fn validate_container_id(container_id: &str) -> Result<()> {
    let valid = !container_id.is_empty()
        && !container_id.starts_with('.')
        && container_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));

    if !valid {
        return Err(Error::InvalidRequest(format!(
            "Container ID '{}' must be letters, digits, '_', '.' or '-' and not start with '.'",
            container_id
        )));
    }
    Ok(())
}

impl Default for LinkNaming {
    fn default() -> Self {
        Self::new("pod", "tmp")
    }
}
