//! In-memory network control for tests
//!
//! Models host links, veth peers, namespace handles, addresses and routes
//! closely enough to observe what a setup or teardown left behind. Any
//! operation can be made to fail, optionally on its n-th call
//! (`"set_link_up#2"`).

use crate::error::{Error, Result};
use crate::network::control::{InterfaceAddress, NetworkControl};
use ipnet::{IpNet, Ipv6Net};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
struct Link {
    peer: String,
    namespace: Option<String>,
    up: bool,
    mac: String,
    addresses: Vec<Ipv6Net>,
}

#[derive(Debug, Default)]
struct Host {
    links: BTreeMap<String, Link>,
    handles: BTreeMap<String, PathBuf>,
    routes: Vec<(String, Ipv6Addr, String)>,
    calls: Vec<String>,
    next_mac: u8,
}

#[derive(Debug, Default)]
pub struct FakeControl {
    host: RefCell<Host>,
    static_addresses: Vec<InterfaceAddress>,
    fail: Option<(String, usize)>,
}

impl FakeControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Addresses reported in addition to those on fake links
    pub fn with_addresses(mut self, addresses: Vec<InterfaceAddress>) -> Self {
        self.static_addresses = addresses;
        self
    }

    /// Fail the given operation (`"name"` or `"name#n"` for the n-th call)
    pub fn failing_at(mut self, operation: &str) -> Self {
        let (name, nth) = match operation.split_once('#') {
            Some((name, n)) => (name, n.parse().unwrap_or(1)),
            None => (operation, 1),
        };
        self.fail = Some((name.to_string(), nth));
        self
    }

    /// Operation names in call order, failed ones included
    pub fn calls(&self) -> Vec<String> {
        self.host.borrow().calls.clone()
    }

    pub fn has_handle(&self, container_id: &str) -> bool {
        self.host.borrow().handles.contains_key(container_id)
    }

    /// `None` if the link is gone, otherwise the namespace it lives in
    pub fn link_namespace(&self, name: &str) -> Option<Option<String>> {
        self.host.borrow().links.get(name).map(|l| l.namespace.clone())
    }

    pub fn is_up(&self, name: &str) -> bool {
        self.host.borrow().links.get(name).is_some_and(|l| l.up)
    }

    pub fn addresses_of(&self, name: &str) -> Vec<Ipv6Net> {
        self.host
            .borrow()
            .links
            .get(name)
            .map(|l| l.addresses.clone())
            .unwrap_or_default()
    }

    pub fn hardware_address_of(&self, name: &str) -> Option<String> {
        self.host.borrow().links.get(name).map(|l| l.mac.clone())
    }

    pub fn routes(&self) -> Vec<(String, Ipv6Addr, String)> {
        self.host.borrow().routes.clone()
    }

    /// Delete a link behind the manager's back
    pub fn remove_link(&self, name: &str) {
        Self::drop_link(&mut self.host.borrow_mut(), name);
    }

    /// No links, handles or routes remain
    pub fn is_clean(&self) -> bool {
        let host = self.host.borrow();
        host.links.is_empty() && host.handles.is_empty() && host.routes.is_empty()
    }

    /// Record a call and fail it if it is the configured one
    fn enter(&self, operation: &str) -> Result<()> {
        let mut host = self.host.borrow_mut();
        host.calls.push(operation.to_string());

        if let Some((name, nth)) = &self.fail {
            let seen = host.calls.iter().filter(|c| *c == name).count();
            if name == operation && seen == *nth {
                return Err(Error::CommandFailed {
                    command: operation.to_string(),
                    message: "injected failure".to_string(),
                });
            }
        }
        Ok(())
    }

    fn drop_link(host: &mut Host, name: &str) -> bool {
        let Some(link) = host.links.remove(name) else {
            return false;
        };
        host.links.remove(&link.peer);
        host.routes
            .retain(|(_, _, dev)| dev != name && *dev != link.peer);
        true
    }

    fn find<'h>(host: &'h mut Host, name: &str, namespace: Option<&str>) -> Result<&'h mut Link> {
        host.links
            .get_mut(name)
            .filter(|l| l.namespace.as_deref() == namespace)
            .ok_or_else(|| Error::InterfaceNotFound(name.to_string()))
    }
}

impl NetworkControl for FakeControl {
    fn list_interface_addresses(&self) -> Result<Vec<InterfaceAddress>> {
        self.enter("list_interface_addresses")?;
        let host = self.host.borrow();

        let mut addresses = self.static_addresses.clone();
        for (name, link) in host.links.iter().filter(|(_, l)| l.namespace.is_none()) {
            addresses.extend(
                link.addresses
                    .iter()
                    .map(|a| InterfaceAddress::new(name.clone(), IpNet::V6(*a))),
            );
        }
        Ok(addresses)
    }

    fn create_veth_pair(&self, host_name: &str, peer: &str) -> Result<()> {
        self.enter("create_veth_pair")?;
        let mut host = self.host.borrow_mut();
        if host.links.contains_key(host_name) || host.links.contains_key(peer) {
            return Err(Error::CommandFailed {
                command: "create_veth_pair".to_string(),
                message: "File exists".to_string(),
            });
        }

        host.next_mac = host.next_mac.wrapping_add(1);
        for (name, other) in [(host_name, peer), (peer, host_name)] {
            let mac = format!("02:00:00:00:00:{:02x}", host.next_mac);
            host.links.insert(
                name.to_string(),
                Link {
                    peer: other.to_string(),
                    namespace: None,
                    up: false,
                    mac,
                    addresses: Vec::new(),
                },
            );
        }
        Ok(())
    }

    fn delete_link(&self, name: &str) -> Result<()> {
        self.enter("delete_link")?;
        let mut host = self.host.borrow_mut();
        let on_host = host.links.get(name).is_some_and(|l| l.namespace.is_none());
        if !on_host || !Self::drop_link(&mut host, name) {
            return Err(Error::InterfaceNotFound(name.to_string()));
        }
        Ok(())
    }

    fn hardware_address(&self, name: &str) -> Result<String> {
        self.enter("hardware_address")?;
        let mut host = self.host.borrow_mut();
        Ok(Self::find(&mut host, name, None)?.mac.clone())
    }

    fn link_exists(&self, name: &str) -> Result<bool> {
        self.enter("link_exists")?;
        Ok(self
            .host
            .borrow()
            .links
            .get(name)
            .is_some_and(|l| l.namespace.is_none()))
    }

    fn move_link_to_namespace(&self, link: &str, namespace: &str) -> Result<()> {
        self.enter("move_link_to_namespace")?;
        let mut host = self.host.borrow_mut();
        if !host.handles.contains_key(namespace) {
            return Err(Error::InvalidRequest(format!("no namespace '{}'", namespace)));
        }
        Self::find(&mut host, link, None)?.namespace = Some(namespace.to_string());
        Ok(())
    }

    fn rename_link(&self, old: &str, new: &str, namespace: Option<&str>) -> Result<()> {
        self.enter("rename_link")?;
        let mut host = self.host.borrow_mut();
        let link = Self::find(&mut host, old, namespace)?.clone();
        host.links.remove(old);
        if let Some(peer) = host.links.get_mut(&link.peer) {
            peer.peer = new.to_string();
        }
        host.links.insert(new.to_string(), link);
        Ok(())
    }

    fn set_link_up(&self, name: &str, namespace: Option<&str>) -> Result<()> {
        self.enter("set_link_up")?;
        let mut host = self.host.borrow_mut();
        Self::find(&mut host, name, namespace)?.up = true;
        Ok(())
    }

    fn assign_address(&self, name: &str, address: Ipv6Net, namespace: Option<&str>) -> Result<()> {
        self.enter("assign_address")?;
        let mut host = self.host.borrow_mut();
        Self::find(&mut host, name, namespace)?.addresses.push(address);
        Ok(())
    }

    fn add_default_route(&self, gateway: Ipv6Addr, via: &str, namespace: Option<&str>) -> Result<()> {
        self.enter("add_default_route")?;
        let mut host = self.host.borrow_mut();
        Self::find(&mut host, via, namespace)?;
        let ns = namespace.unwrap_or_default().to_string();
        host.routes.push((ns, gateway, via.to_string()));
        Ok(())
    }

    fn bind_namespace_handle(&self, container_id: &str, path: &Path) -> Result<()> {
        self.enter("bind_namespace_handle")?;
        let mut host = self.host.borrow_mut();
        if host.handles.contains_key(container_id) {
            return Err(Error::CommandFailed {
                command: "bind_namespace_handle".to_string(),
                message: "File exists".to_string(),
            });
        }
        host.handles.insert(container_id.to_string(), path.to_path_buf());
        Ok(())
    }

    fn unbind_namespace_handle(&self, container_id: &str) -> Result<()> {
        self.enter("unbind_namespace_handle")?;
        let mut host = self.host.borrow_mut();
        host.handles
            .remove(container_id)
            .map(|_| ())
            .ok_or_else(|| Error::InvalidRequest(format!("no namespace '{}'", container_id)))
    }

    fn namespace_handle_exists(&self, container_id: &str) -> Result<bool> {
        self.enter("namespace_handle_exists")?;
        Ok(self.host.borrow().handles.contains_key(container_id))
    }
}
