//! Attachment state machine
//!
//! Tracks how far a setup got so a failure unwinds exactly the resources
//! that exist. Uses the state-machines crate in dynamic dispatch mode.

use crate::error::{self, Error};
use state_machines::state_machine;

state_machine! {
    name: AttachmentMachine,
    dynamic: true,
    initial: Absent,
    states: [Absent, Pinned, Linked, Bound],
    events {
        pin {
            transition: { from: Absent, to: Pinned }
        }
        link {
            transition: { from: Pinned, to: Linked }
        }
        commit {
            transition: { from: Linked, to: Bound }
        }
        unwind {
            transition: { from: [Pinned, Linked], to: Absent }
        }
    }
}

/// Attachment progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Nothing exists on the host
    Absent,
    /// Namespace handle bound
    Pinned,
    /// Namespace handle bound and veth pair created
    Linked,
    /// Fully configured
    Bound,
}

impl Progress {
    fn from_state(s: &str) -> Self {
        match s {
            "Pinned" => Progress::Pinned,
            "Linked" => Progress::Linked,
            "Bound" => Progress::Bound,
            _ => Progress::Absent,
        }
    }

    /// Whether the namespace handle has to be removed on unwind
    pub fn has_handle(self) -> bool {
        matches!(self, Progress::Pinned | Progress::Linked)
    }

    /// Whether the veth pair has to be deleted on unwind
    pub fn has_link(self) -> bool {
        matches!(self, Progress::Linked)
    }
}

/// One setup run's lifecycle
pub struct Attachment {
    machine: DynamicAttachmentMachine<()>,
}

impl Attachment {
    pub fn new() -> Self {
        Self {
            machine: AttachmentMachine::new(()).into_dynamic(),
        }
    }

    pub fn progress(&self) -> Progress {
        Progress::from_state(self.machine.current_state())
    }

    pub fn pinned(&mut self) -> error::Result<()> {
        self.fire(AttachmentMachineEvent::Pin)
    }

    pub fn linked(&mut self) -> error::Result<()> {
        self.fire(AttachmentMachineEvent::Link)
    }

    pub fn committed(&mut self) -> error::Result<()> {
        self.fire(AttachmentMachineEvent::Commit)
    }

    pub fn unwound(&mut self) -> error::Result<()> {
        self.fire(AttachmentMachineEvent::Unwind)
    }

    fn fire(&mut self, event: AttachmentMachineEvent) -> error::Result<()> {
        let from = self.machine.current_state().to_string();
        self.machine
            .handle(event)
            .map_err(|e| Error::Lifecycle(format!("invalid transition from {}: {:?}", from, e)))
    }
}
