//! Container network attachment
//!
//! Provides:
//! - Setup of a container's veth link, addresses and default route
//! - Rollback of partially applied setups
//! - Best-effort teardown on detachment
//! - Verification of an existing attachment

use crate::error::{Error, Result};
use crate::network::control::NetworkControl;
use crate::network::ip::AddressPair;
use crate::network::state::{Attachment, Progress};
use crate::network::veth::AttachmentIdentity;
use std::fmt;

/// Steps of an attachment setup, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    BindNamespace,
    CreateLink,
    ReadHardwareAddress,
    MoveLink,
    RenameLink,
    HostLinkUp,
    AssignOuterAddress,
    ContainerLinkUp,
    AssignInnerAddress,
    DefaultRoute,
    /// Only used by [`AttachmentManager::check`]
    Verify,
}

impl Step {
    /// Setup steps in the order they run
    pub const SETUP: [Step; 10] = [
        Step::BindNamespace,
        Step::CreateLink,
        Step::ReadHardwareAddress,
        Step::MoveLink,
        Step::RenameLink,
        Step::HostLinkUp,
        Step::AssignOuterAddress,
        Step::ContainerLinkUp,
        Step::AssignInnerAddress,
        Step::DefaultRoute,
    ];
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::BindNamespace => "bind network namespace",
            Step::CreateLink => "create veth pair",
            Step::ReadHardwareAddress => "read host link hardware address",
            Step::MoveLink => "move veth peer into namespace",
            Step::RenameLink => "rename container interface",
            Step::HostLinkUp => "bring host link up",
            Step::AssignOuterAddress => "assign address to host link",
            Step::ContainerLinkUp => "bring container interface up",
            Step::AssignInnerAddress => "assign address to container interface",
            Step::DefaultRoute => "add default route in container",
            Step::Verify => "verify attachment",
        };
        write!(f, "{}", s)
    }
}

/// Result of a successful setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentState {
    pub identity: AttachmentIdentity,
    pub pair: AddressPair,
    /// Hardware address of the host link
    pub hardware_address: String,
}

/// Drives a [`NetworkControl`] through attach and detach sequences
pub struct AttachmentManager<'a> {
    control: &'a dyn NetworkControl,
}

impl<'a> AttachmentManager<'a> {
    pub fn new(control: &'a dyn NetworkControl) -> Self {
        Self { control }
    }

    /// Attach a container
    ///
    /// On failure the namespace handle and veth pair created so far are
    /// removed before the error is returned.
    pub fn setup(&self, identity: &AttachmentIdentity, pair: AddressPair) -> Result<AttachmentState> {
        let mut attachment = Attachment::new();

        match self.apply(&mut attachment, identity, pair) {
            Ok(state) => {
                tracing::info!(
                    container = %identity.container_id,
                    host_link = %identity.host_link_name,
                    outer = %pair.outer,
                    inner = %pair.inner,
                    "container attached"
                );
                Ok(state)
            }
            Err(e) => {
                tracing::warn!(container = %identity.container_id, error = %e, "setup failed, rolling back");
                self.roll_back(&mut attachment, identity);
                Err(e)
            }
        }
    }

    fn apply(
        &self,
        attachment: &mut Attachment,
        identity: &AttachmentIdentity,
        pair: AddressPair,
    ) -> Result<AttachmentState> {
        let control = self.control;
        let ns = identity.container_id.as_str();
        let host = identity.host_link_name.as_str();
        let ifname = identity.interface_name.as_str();

        run(Step::BindNamespace, || {
            control.bind_namespace_handle(ns, &identity.namespace_path)
        })?;
        attachment.pinned()?;

        run(Step::CreateLink, || {
            control.create_veth_pair(host, &identity.temp_link_name)
        })?;
        attachment.linked()?;

        let hardware_address = run(Step::ReadHardwareAddress, || control.hardware_address(host))?;

        run(Step::MoveLink, || {
            control.move_link_to_namespace(&identity.temp_link_name, ns)
        })?;
        run(Step::RenameLink, || {
            control.rename_link(&identity.temp_link_name, ifname, Some(ns))
        })?;
        run(Step::HostLinkUp, || control.set_link_up(host, None))?;
        run(Step::AssignOuterAddress, || {
            control.assign_address(host, pair.outer, None)
        })?;
        run(Step::ContainerLinkUp, || control.set_link_up(ifname, Some(ns)))?;
        run(Step::AssignInnerAddress, || {
            control.assign_address(ifname, pair.inner, Some(ns))
        })?;
        run(Step::DefaultRoute, || {
            control.add_default_route(pair.outer.addr(), ifname, Some(ns))
        })?;

        attachment.committed()?;

        Ok(AttachmentState {
            identity: identity.clone(),
            pair,
            hardware_address,
        })
    }

    /// Undo whatever the failed setup left behind
    fn roll_back(&self, attachment: &mut Attachment, identity: &AttachmentIdentity) {
        let progress = attachment.progress();
        if progress == Progress::Absent {
            return;
        }

        if progress.has_link() {
            if let Err(e) = self.control.delete_link(&identity.host_link_name) {
                tracing::warn!(link = %identity.host_link_name, error = %e, "rollback could not delete link");
            }
        }
        if progress.has_handle() {
            if let Err(e) = self.control.unbind_namespace_handle(&identity.container_id) {
                tracing::warn!(container = %identity.container_id, error = %e, "rollback could not remove namespace handle");
            }
        }

        if let Err(e) = attachment.unwound() {
            tracing::debug!(error = %e, "attachment state not unwound");
        }
    }

    /// Detach a container
    ///
    /// Both removals are attempted regardless of the other's outcome and
    /// failures are only logged, so this is safe on absent or half-built
    /// attachments.
    pub fn teardown(&self, container_id: &str, host_link_name: &str) {
        match self.control.delete_link(host_link_name) {
            Ok(()) => tracing::debug!(link = host_link_name, "host link deleted"),
            Err(e) => tracing::warn!(link = host_link_name, error = %e, "could not delete host link"),
        }

        match self.control.unbind_namespace_handle(container_id) {
            Ok(()) => tracing::debug!(container = container_id, "namespace handle removed"),
            Err(e) => {
                tracing::warn!(container = container_id, error = %e, "could not remove namespace handle")
            }
        }

        tracing::info!(container = container_id, "container detached");
    }

    /// Check that an attachment's host-side resources still exist
    pub fn check(&self, identity: &AttachmentIdentity) -> Result<()> {
        let control = self.control;

        if !run(Step::Verify, || control.namespace_handle_exists(&identity.container_id))? {
            return Err(Error::at(
                Step::Verify,
                Error::Lifecycle(format!(
                    "namespace handle for '{}' is missing",
                    identity.container_id
                )),
            ));
        }

        if !run(Step::Verify, || control.link_exists(&identity.host_link_name))? {
            return Err(Error::at(
                Step::Verify,
                Error::InterfaceNotFound(identity.host_link_name.clone()),
            ));
        }

        Ok(())
    }
}

/// Run one control call, tagging failures with their step
fn run<T>(step: Step, op: impl FnOnce() -> Result<T>) -> Result<T> {
    tracing::debug!(%step, "running step");
    op().map_err(|e| Error::at(step, e))
}
