//! IPv6 address pool allocation for container links
//!
//! Provides:
//! - Discovery of the blocks already configured on the host inside a pool
//! - Deterministic selection of a free (outer, inner) address pair
//!
//! The pool keeps no allocation table: occupancy is re-read from the host on
//! every call, so the host's interface configuration is the only record.

use crate::error::{Error, Result};
use crate::network::control::NetworkControl;
use ipnet::{IpNet, Ipv6Net};
use std::collections::BTreeSet;
use std::net::Ipv6Addr;

/// Width of an IPv6 address in bits
const ADDRESS_BITS: u8 = 128;

/// Address pair handed to one attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressPair {
    /// Host-side address, also the container's gateway
    pub outer: Ipv6Net,
    /// Container-side address
    pub inner: Ipv6Net,
}

/// A parent block carved into fixed-size subnets, one per container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressPool {
    parent: Ipv6Net,
    target: u8,
}

impl AddressPool {
    /// Create a pool handing out `/target` subnets of `parent`
    ///
    /// The target must be longer than the parent prefix, since the parent's
    /// first slot is never handed out, and leave room for two addresses.
    pub fn new(parent: Ipv6Net, target: u8) -> Result<Self> {
        if target == 0 || target <= parent.prefix_len() || target >= ADDRESS_BITS {
            return Err(Error::InvalidPrefix { parent, target });
        }

        Ok(Self { parent, target })
    }

    /// Blocks configured on the host that fall inside the parent block
    ///
    /// Only global unicast IPv6 addresses count; link-local, loopback and
    /// IPv4 addresses are ignored.
    pub fn discover_occupied(&self, control: &dyn NetworkControl) -> Result<BTreeSet<Ipv6Net>> {
        let addresses = control
            .list_interface_addresses()
            .map_err(|e| Error::Discovery(e.to_string()))?;

        let occupied: BTreeSet<Ipv6Net> = addresses
            .into_iter()
            .filter_map(|entry| match entry.address {
                IpNet::V6(net) => Some(net),
                IpNet::V4(_) => None,
            })
            .filter(|net| is_global_unicast(&net.addr()) && self.parent.contains(&net.addr()))
            .collect();

        tracing::debug!(parent = %self.parent, count = occupied.len(), "discovered occupied blocks");
        Ok(occupied)
    }

    /// Pick the lowest free address pair against live host state
    pub fn pick_pair(&self, control: &dyn NetworkControl) -> Result<AddressPair> {
        let occupied = self.discover_occupied(control)?;
        let pair = self.first_free(&occupied)?;

        tracing::info!(outer = %pair.outer, inner = %pair.inner, "picked address pair");
        Ok(pair)
    }

    /// Lowest candidate subnet that collides with none of `occupied`
    ///
    /// Candidates start one step above the parent base; the parent's first
    /// subnet is never handed out.
    pub fn first_free(&self, occupied: &BTreeSet<Ipv6Net>) -> Result<AddressPair> {
        let exhausted = || Error::PoolExhausted {
            parent: self.parent,
            target: self.target,
        };

        let step = self.step();
        let last = u128::from(self.parent.broadcast());
        let mut candidate = u128::from(self.parent.network());

        loop {
            candidate = candidate.checked_add(step).ok_or_else(exhausted)?;
            let candidate_last = candidate.checked_add(step - 1).ok_or_else(exhausted)?;
            if candidate_last > last {
                return Err(exhausted());
            }

            if !self.collides(candidate, occupied) {
                return Ok(AddressPair {
                    outer: self.block(candidate),
                    inner: self.block(candidate + 1),
                });
            }

            tracing::trace!(candidate = %Ipv6Addr::from(candidate), "candidate occupied");
        }
    }

    /// Number of addresses in one carved subnet
    fn step(&self) -> u128 {
        1u128 << (ADDRESS_BITS - self.target)
    }

    fn block(&self, addr: u128) -> Ipv6Net {
        // target < 128 is checked in new(), so the fallback is unreachable
        Ipv6Net::new(Ipv6Addr::from(addr), self.target)
            .unwrap_or_else(|_| Ipv6Net::from(Ipv6Addr::from(addr)))
    }

    /// Whether the carved subnet starting at `base` overlaps an occupied block
    ///
    /// A block wider than the target only occupies the carved subnet its
    /// address sits in.
    fn collides(&self, base: u128, occupied: &BTreeSet<Ipv6Net>) -> bool {
        let candidate = self.block(base).trunc();
        occupied.iter().any(|net| {
            let prefix = net.prefix_len().max(self.target);
            match Ipv6Net::new(net.addr(), prefix) {
                Ok(slot) => {
                    let slot = slot.trunc();
                    candidate.contains(&slot.network()) || slot.contains(&candidate.network())
                }
                Err(_) => candidate.contains(&net.addr()),
            }
        })
    }

    #[cfg(test)]
    pub fn parent(&self) -> Ipv6Net {
        self.parent
    }
}

/// Global unicast in the routing sense: not unspecified, loopback, multicast
/// or link-local
fn is_global_unicast(addr: &Ipv6Addr) -> bool {
    !(addr.is_unspecified()
        || addr.is_loopback()
        || addr.is_multicast()
        || addr.is_unicast_link_local())
}
