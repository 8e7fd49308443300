//! Network management for container attachments
//!
//! Provides:
//! - IPv6 address pair allocation from a parent block
//! - Veth naming derived from container IDs
//! - Attachment setup, rollback and teardown
//! - The network control interface and its iproute2 backend

pub mod attach;
pub mod control;
pub mod ip;
pub mod iproute;
pub mod state;
pub mod veth;

#[cfg(test)]
pub mod fake;

pub use attach::{AttachmentManager, AttachmentState};
pub use ip::{AddressPair, AddressPool};
pub use iproute::IpRoute2;
