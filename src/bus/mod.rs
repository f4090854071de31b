//! Fieldbus data model shared by the coordinator, the arbiter and the port
//! seam: the device roster, node states, coupling identities, inbound events
//! and the aggregated health snapshot.

use serde::{Deserialize, Serialize};

pub mod coordinator;
pub mod port;

pub use coordinator::BusCoordinator;
pub use port::BusPort;

/// Upper bound on roster sizes, shared by coordinator tables and status
/// snapshots.
pub const ROSTER_CAP: usize = 8;

/// Devices on the vehicle bus, by node id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BusDevice {
    RemoteControlDevice = 0x01,
    RealTimeDevice = 0x02,
    DriveMotorController = 0x10,
    WheelSpeedSensor = 0x11,
    BrakeActuator = 0x20,
    BrakePressureSensor = 0x21,
    SteeringActuator = 0x30,
    SteeringAngleSensor = 0x31,
}

impl BusDevice {
    pub const fn node_id(self) -> u8 {
        self as u8
    }
}

/// Devices whose heartbeat liveness gates vehicle health. The real-time
/// device is supervised separately through its periodic state report.
pub const MONITORED_DEVICES: [BusDevice; 5] = [
    BusDevice::DriveMotorController,
    BusDevice::BrakeActuator,
    BusDevice::BrakePressureSensor,
    BusDevice::SteeringActuator,
    BusDevice::SteeringAngleSensor,
];

/// Devices whose NMT state the coordinator actively drives.
pub const STATE_CONTROLLED_DEVICES: [BusDevice; 4] = [
    BusDevice::DriveMotorController,
    BusDevice::BrakeActuator,
    BusDevice::SteeringActuator,
    BusDevice::BrakePressureSensor,
];

/// Application-level node state the coordinator reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Preoperational,
    Operational,
    /// Not yet reported, invalidated, or reported as something we do not
    /// drive nodes into.
    Unknown,
}

/// Node state as reported on the wire by the stack's heartbeat consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireNodeState {
    Initialisation,
    Disconnected,
    Stopped,
    Operational,
    Preoperational,
    Unknown,
}

impl From<WireNodeState> for NodeState {
    fn from(wire: WireNodeState) -> Self {
        match wire {
            WireNodeState::Operational => NodeState::Operational,
            WireNodeState::Preoperational => NodeState::Preoperational,
            _ => NodeState::Unknown,
        }
    }
}

/// Raw state values published by the real-time device.
pub const RTD_STATE_BOOTUP: u8 = 0;
pub const RTD_STATE_READY: u8 = 1;
pub const RTD_STATE_EMERGENCY: u8 = 6;

/// Outcome of an SDO-style coupling write reported by the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdoOutcome {
    Finished,
    /// The stack signals a timed-out transfer as an abort with code zero.
    Timeout,
    Aborted(u32),
}

/// The two lockable mechanical couplings between operator controls and
/// actuators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CouplingId {
    Brake,
    Steering,
}

/// Inbound notifications from the transport layer, applied through
/// [`BusCoordinator::handle_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    LivenessTimeout {
        device: BusDevice,
    },
    LivenessRecovered {
        device: BusDevice,
        reported: WireNodeState,
    },
    CouplingWriteResult {
        device: BusDevice,
        outcome: SdoOutcome,
    },
    /// Periodic state report from the real-time device.
    RtdState {
        raw: u8,
    },
    /// The real-time device's state report stopped arriving.
    RtdTimeout,
}

/// Aggregated bus health consumed by mode conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusHealth {
    pub any_device_offline: bool,
    pub rtd_emergency: bool,
    pub rtd_booted_up: bool,
}

impl BusHealth {
    /// Health snapshot to assume when the coordinator cannot be consulted:
    /// everything pessimistic.
    pub const fn unavailable() -> Self {
        Self {
            any_device_offline: true,
            rtd_emergency: false,
            rtd_booted_up: false,
        }
    }
}

impl Default for BusHealth {
    fn default() -> Self {
        Self::unavailable()
    }
}
