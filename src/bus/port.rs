//! Produced interface to the fieldbus stack.
//!
//! The coordinator never talks to the wire directly; everything it needs from
//! the stack is expressed through [`BusPort`]. The target implements it on
//! top of the CANopen driver; tests and the simulator use [`FixturePort`],
//! which records every call for inspection.

use serde::{Deserialize, Serialize};

use crate::bus::{BusDevice, NodeState};

/// Dictionary address of an SDO-style object write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectAddr {
    pub index: u16,
    pub sub_index: u8,
}

/// Periodic broadcast payloads the coordinator can gate on and off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastPayload {
    /// The interlock device's own operating mode.
    SelfState,
    MotorTorque,
    BrakeForce,
    SteeringAngle,
    /// Combined target-value payload consumed by the real-time device.
    TargetValues,
}

/// The broadcasts that carry actuator demand, gated together per mode.
pub const ACTUATOR_PAYLOADS: [BroadcastPayload; 4] = [
    BroadcastPayload::MotorTorque,
    BroadcastPayload::BrakeForce,
    BroadcastPayload::SteeringAngle,
    BroadcastPayload::TargetValues,
];

/// Actuator demand in wire units, after mapping and saturation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTargets {
    pub motor_torque: i16,
    pub brake_force: i16,
    pub steering_angle: i32,
}

/// Everything the coordinator requires from the transport layer.
///
/// Contract notes:
/// - `set_broadcast(_, true)` is always followed by one `transmit_now` for
///   the same payload from the coordinator, so implementations are free to
///   suppress periodic retransmission of unchanged payloads.
/// - At most one coupling write per device is in flight at a time; the
///   coordinator closes every transfer via `close_coupling_transfer` once the
///   stack reports a result.
pub trait BusPort {
    /// Requests an NMT state transition of a remote node.
    fn request_node_state(&mut self, device: BusDevice, state: NodeState);
    /// Starts an expedited object write on a remote node.
    fn start_coupling_write(&mut self, device: BusDevice, addr: ObjectAddr, value: u32);
    /// Releases the stack's transfer slot for a finished write.
    fn close_coupling_transfer(&mut self, device: BusDevice);
    /// Gates one periodic broadcast payload on or off.
    fn set_broadcast(&mut self, payload: BroadcastPayload, enable: bool);
    /// Forces one immediate transmission of a payload.
    fn transmit_now(&mut self, payload: BroadcastPayload);
    /// Publishes updated actuator demand into the broadcast buffers.
    fn publish_targets(&mut self, targets: WireTargets);
    /// Publishes this device's own operating mode.
    fn publish_self_state(&mut self, mode: u8);
}

/// One recorded [`BusPort`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortAction {
    NodeStateRequest(BusDevice, NodeState),
    CouplingWrite {
        device: BusDevice,
        addr: ObjectAddr,
        value: u32,
    },
    CloseTransfer(BusDevice),
    Broadcast(BroadcastPayload, bool),
    TransmitNow(BroadcastPayload),
    Targets(WireTargets),
    SelfState(u8),
}

/// Recording port for tests and the host simulator.
#[derive(Debug, Default)]
pub struct FixturePort {
    pub actions: Vec<PortAction>,
}

impl FixturePort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    /// Recorded coupling writes, in order.
    pub fn coupling_writes(&self) -> Vec<(BusDevice, u32)> {
        self.actions
            .iter()
            .filter_map(|action| match action {
                PortAction::CouplingWrite { device, value, .. } => Some((*device, *value)),
                _ => None,
            })
            .collect()
    }
}

impl BusPort for FixturePort {
    fn request_node_state(&mut self, device: BusDevice, state: NodeState) {
        self.actions.push(PortAction::NodeStateRequest(device, state));
    }

    fn start_coupling_write(&mut self, device: BusDevice, addr: ObjectAddr, value: u32) {
        self.actions
            .push(PortAction::CouplingWrite { device, addr, value });
    }

    fn close_coupling_transfer(&mut self, device: BusDevice) {
        self.actions.push(PortAction::CloseTransfer(device));
    }

    fn set_broadcast(&mut self, payload: BroadcastPayload, enable: bool) {
        self.actions.push(PortAction::Broadcast(payload, enable));
    }

    fn transmit_now(&mut self, payload: BroadcastPayload) {
        self.actions.push(PortAction::TransmitNow(payload));
    }

    fn publish_targets(&mut self, targets: WireTargets) {
        self.actions.push(PortAction::Targets(targets));
    }

    fn publish_self_state(&mut self, mode: u8) {
        self.actions.push(PortAction::SelfState(mode));
    }
}
