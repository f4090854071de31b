//! Read-only status snapshots for presentation collaborators.
//!
//! The arbiter assembles a [`StatusReport`] at the end of every cycle and
//! hands it to whatever [`StatusSink`] the application wired in (display
//! task on the target, JSON printer in the simulator). Reports carry no
//! control semantics.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::arbiter::ModeId;
use crate::bus::{BusDevice, BusHealth, CouplingId, NodeState, ROSTER_CAP};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub device: BusDevice,
    pub online: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStateStatus {
    pub device: BusDevice,
    pub current: NodeState,
    pub target: NodeState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouplingStatus {
    pub id: CouplingId,
    pub target_engaged: bool,
    /// `None` until the first write result arrives.
    pub confirmed_engaged: Option<bool>,
    pub write_pending: bool,
}

impl CouplingStatus {
    /// True while the actuator has not yet confirmed the demanded engagement.
    pub fn mismatch(&self) -> bool {
        self.confirmed_engaged != Some(self.target_engaged)
    }
}

/// Snapshot of the coordinator's device view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStatus {
    pub health: BusHealth,
    pub monitored: Vec<DeviceStatus, ROSTER_CAP>,
    pub nodes: Vec<NodeStateStatus, ROSTER_CAP>,
    pub couplings: [CouplingStatus; 2],
}

/// Per-cycle report fed to the presentation seam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// `None` before the first arbitration cycle completes.
    pub mode: Option<ModeId>,
    pub cycle_ms: u64,
    pub radio_timeout: bool,
    pub bus: BusStatus,
}

pub trait StatusSink {
    fn publish(&mut self, report: &StatusReport);
}

/// Sink that discards reports, for callers without a presentation layer.
#[derive(Debug, Default)]
pub struct NullStatusSink;

impl StatusSink for NullStatusSink {
    fn publish(&mut self, _report: &StatusReport) {}
}
