//! Network control interface
//!
//! The host primitives the allocator and the attachment manager drive.
//! Production code uses [`IpRoute2`](super::iproute::IpRoute2); tests plug in
//! a recording fake.

use crate::error::Result;
use ipnet::{IpNet, Ipv6Net};
use std::net::Ipv6Addr;
use std::path::Path;

/// An address configured on a host interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    /// Interface the address is configured on
    pub interface: String,
    /// Address with its prefix length (family is carried by the variant)
    pub address: IpNet,
}

impl InterfaceAddress {
    pub fn new(interface: impl Into<String>, address: IpNet) -> Self {
        Self {
            interface: interface.into(),
            address,
        }
    }
}

/// Host network primitives
///
/// Calls taking a `namespace` run inside the named network namespace when it
/// is `Some`, on the host otherwise. Namespaces are addressed by the handle
/// name created with [`bind_namespace_handle`](Self::bind_namespace_handle).
pub trait NetworkControl {
    /// Every address configured on any host interface
    fn list_interface_addresses(&self) -> Result<Vec<InterfaceAddress>>;

    /// Create a veth pair with both ends on the host
    fn create_veth_pair(&self, host: &str, peer: &str) -> Result<()>;

    /// Delete a host link (deleting one veth end removes both)
    fn delete_link(&self, name: &str) -> Result<()>;

    /// Hardware (MAC) address of a host link, colon separated
    fn hardware_address(&self, name: &str) -> Result<String>;

    /// Whether a link with this name exists on the host
    fn link_exists(&self, name: &str) -> Result<bool>;

    fn move_link_to_namespace(&self, link: &str, namespace: &str) -> Result<()>;

    fn rename_link(&self, old: &str, new: &str, namespace: Option<&str>) -> Result<()>;

    fn set_link_up(&self, name: &str, namespace: Option<&str>) -> Result<()>;

    fn assign_address(&self, name: &str, address: Ipv6Net, namespace: Option<&str>)
    -> Result<()>;

    fn add_default_route(&self, gateway: Ipv6Addr, via: &str, namespace: Option<&str>)
    -> Result<()>;

    /// Make the namespace at `path` reachable under `container_id`
    fn bind_namespace_handle(&self, container_id: &str, path: &Path) -> Result<()>;

    /// Remove the handle created by `bind_namespace_handle`
    fn unbind_namespace_handle(&self, container_id: &str) -> Result<()>;

    fn namespace_handle_exists(&self, container_id: &str) -> Result<bool>;
}
