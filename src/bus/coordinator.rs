//! Device coordination over the fieldbus port.
//!
//! Tracks liveness of the monitored roster, drives the NMT state of the
//! controlled actuators back to their targets, runs the coupling write
//! protocol with latest-target retry, and maps normalized actuator demand to
//! wire units. All transport notifications enter through [`handle_event`];
//! everything outbound leaves through the [`BusPort`] seam.
//!
//! [`handle_event`]: BusCoordinator::handle_event

use heapless::Vec;
use tracing::{debug, info, warn};

use crate::bus::port::{BroadcastPayload, BusPort, ObjectAddr, WireTargets, ACTUATOR_PAYLOADS};
use crate::bus::{
    BusDevice, BusEvent, BusHealth, CouplingId, NodeState, SdoOutcome, MONITORED_DEVICES,
    ROSTER_CAP, RTD_STATE_BOOTUP, RTD_STATE_EMERGENCY, STATE_CONTROLLED_DEVICES,
};
use crate::status::{BusStatus, CouplingStatus, DeviceStatus, NodeStateStatus};

/// Both couplings live at the same manufacturer-specific object on their
/// respective actuator.
pub const COUPLING_ADDR: ObjectAddr = ObjectAddr {
    index: 0x60FE,
    sub_index: 0x01,
};
pub const COUPLING_ENGAGED: u32 = 0x0001_0000;
pub const COUPLING_DISENGAGED: u32 = 0x0000_0000;

/// Wire-unit spans of the actuator demand channels.
pub const TORQUE_WIRE_RANGE: (f32, f32) = (-2200.0, 2200.0);
pub const BRAKE_WIRE_RANGE: (f32, f32) = (5000.0, 14000.0);
pub const STEERING_WIRE_RANGE: (f32, f32) = (0x9AB as f32, 0x1700 as f32);

struct MonitoredDevice {
    device: BusDevice,
    online: bool,
}

struct ControlledNode {
    device: BusDevice,
    target: NodeState,
    current: NodeState,
}

struct Coupling {
    id: CouplingId,
    device: BusDevice,
    target_engaged: bool,
    /// Engagement value of the write currently in flight, if any.
    in_flight: Option<bool>,
    /// Last engagement value the actuator acknowledged.
    confirmed_engaged: Option<bool>,
}

impl Coupling {
    const fn new(id: CouplingId, device: BusDevice) -> Self {
        Self {
            id,
            device,
            target_engaged: false,
            in_flight: None,
            confirmed_engaged: None,
        }
    }
}

/// Coordination layer between the mode arbiter and the fieldbus transport.
pub struct BusCoordinator<P: BusPort> {
    port: P,
    monitored: Vec<MonitoredDevice, ROSTER_CAP>,
    nodes: Vec<ControlledNode, ROSTER_CAP>,
    couplings: [Coupling; 2],
    targets: WireTargets,
    /// Starts pessimistic; cleared by the first real-time device report.
    rtd_timeout: bool,
    rtd_emergency: bool,
    rtd_booted_up: bool,
}

impl<P: BusPort> BusCoordinator<P> {
    pub fn new(port: P) -> Self {
        let mut monitored = Vec::new();
        for device in MONITORED_DEVICES {
            // Capacity is a compile-time roster, cannot overflow.
            let _ = monitored.push(MonitoredDevice {
                device,
                online: false,
            });
        }
        let mut nodes = Vec::new();
        for device in STATE_CONTROLLED_DEVICES {
            let _ = nodes.push(ControlledNode {
                device,
                target: NodeState::Operational,
                current: NodeState::Unknown,
            });
        }
        let mut coordinator = Self {
            port,
            monitored,
            nodes,
            couplings: [
                Coupling::new(CouplingId::Brake, BusDevice::BrakeActuator),
                Coupling::new(CouplingId::Steering, BusDevice::SteeringActuator),
            ],
            targets: WireTargets::default(),
            rtd_timeout: true,
            rtd_emergency: false,
            rtd_booted_up: false,
        };
        coordinator.port.publish_targets(coordinator.targets);
        coordinator.set_broadcast(BroadcastPayload::SelfState, true);
        coordinator.set_actuator_broadcast(false);
        coordinator
    }

    /// Applies one transport notification.
    pub fn handle_event(&mut self, event: BusEvent) {
        match event {
            BusEvent::LivenessTimeout { device } => self.on_liveness_timeout(device),
            BusEvent::LivenessRecovered { device, reported } => {
                self.on_liveness_recovered(device, reported.into());
            }
            BusEvent::CouplingWriteResult { device, outcome } => {
                self.on_coupling_write_result(device, outcome);
            }
            BusEvent::RtdState { raw } => self.on_rtd_state(raw),
            BusEvent::RtdTimeout => {
                warn!("real-time device state report timed out");
                self.rtd_timeout = true;
            }
        }
    }

    fn on_liveness_timeout(&mut self, device: BusDevice) {
        if let Some(entry) = self.monitored.iter_mut().find(|e| e.device == device) {
            if entry.online {
                warn!(node = device.node_id(), "device heartbeat lost");
            }
            entry.online = false;
        }
        // Whatever state the node was in is no longer trustworthy.
        if let Some(node) = self.nodes.iter_mut().find(|n| n.device == device) {
            node.current = NodeState::Unknown;
        }
    }

    fn on_liveness_recovered(&mut self, device: BusDevice, reported: NodeState) {
        if let Some(entry) = self.monitored.iter_mut().find(|e| e.device == device) {
            if !entry.online {
                info!(node = device.node_id(), "device heartbeat recovered");
            }
            entry.online = true;
        }
        let Some(node) = self.nodes.iter_mut().find(|n| n.device == device) else {
            return;
        };
        node.current = reported;
        let target = node.target;
        if node.current != target {
            // The node came back in the wrong state (typically fresh from
            // boot-up); push it to where the current mode wants it.
            self.request_device_state(device, target);
        }
    }

    /// Requests an NMT transition and invalidates the locally tracked state,
    /// so a device that never reacts shows up as `Unknown` instead of
    /// appearing to already be at the target.
    pub fn request_device_state(&mut self, device: BusDevice, target: NodeState) {
        if target == NodeState::Unknown {
            warn!(node = device.node_id(), "cannot request Unknown node state");
            return;
        }
        let Some(node) = self.nodes.iter_mut().find(|n| n.device == device) else {
            warn!(node = device.node_id(), "state request for unmanaged device");
            return;
        };
        node.target = target;
        node.current = NodeState::Unknown;
        debug!(node = device.node_id(), ?target, "requesting node state");
        self.port.request_node_state(device, target);
    }

    /// Records the new engagement target and starts a write unless one is
    /// already in flight; the in-flight result handler picks up target
    /// changes when the transfer completes.
    pub fn set_coupling(&mut self, id: CouplingId, engaged: bool) {
        let coupling = &mut self.couplings[id as usize];
        coupling.target_engaged = engaged;
        if coupling.in_flight.is_some() {
            return;
        }
        coupling.in_flight = Some(engaged);
        let device = coupling.device;
        self.port.start_coupling_write(
            device,
            COUPLING_ADDR,
            if engaged {
                COUPLING_ENGAGED
            } else {
                COUPLING_DISENGAGED
            },
        );
    }

    pub fn set_coupling_states(&mut self, brake_engaged: bool, steering_engaged: bool) {
        self.set_coupling(CouplingId::Brake, brake_engaged);
        self.set_coupling(CouplingId::Steering, steering_engaged);
    }

    fn on_coupling_write_result(&mut self, device: BusDevice, outcome: SdoOutcome) {
        let Some(idx) = self.couplings.iter().position(|c| c.device == device) else {
            warn!(node = device.node_id(), "write result for unknown coupling");
            return;
        };
        // The stack's transfer slot is released no matter how the write went.
        self.port.close_coupling_transfer(device);
        let coupling = &mut self.couplings[idx];
        let Some(requested) = coupling.in_flight.take() else {
            warn!(node = device.node_id(), "write result without pending write");
            return;
        };
        match outcome {
            SdoOutcome::Finished => {
                coupling.confirmed_engaged = Some(requested);
                let target = coupling.target_engaged;
                if requested != target {
                    // Target flipped while the transfer was in flight; chase
                    // the latest demand.
                    self.set_coupling(coupling_id_at(idx), target);
                }
            }
            SdoOutcome::Timeout => {
                warn!(node = device.node_id(), "coupling write timed out, retrying");
                let target = coupling.target_engaged;
                self.set_coupling(coupling_id_at(idx), target);
            }
            SdoOutcome::Aborted(code) => {
                warn!(
                    node = device.node_id(),
                    abort_code = code,
                    "coupling write aborted by device"
                );
            }
        }
    }

    fn on_rtd_state(&mut self, raw: u8) {
        if self.rtd_timeout {
            info!(state = raw, "real-time device reporting again");
        }
        self.rtd_timeout = false;
        self.rtd_emergency = raw == RTD_STATE_EMERGENCY;
        // Any report other than boot-up means the device got through its
        // boot, emergency included.
        self.rtd_booted_up = raw != RTD_STATE_BOOTUP;
    }

    /// Normalized drive torque, -1.0 (full reverse) to 1.0 (full forward).
    pub fn set_motor_torque(&mut self, torque: f32) {
        self.targets.motor_torque =
            map_range(-1.0, 1.0, TORQUE_WIRE_RANGE.0, TORQUE_WIRE_RANGE.1, torque) as i16;
        self.port.publish_targets(self.targets);
    }

    /// Normalized brake force, 0.0 (released) to 1.0 (full braking).
    pub fn set_brake_force(&mut self, force: f32) {
        self.targets.brake_force =
            map_range(0.0, 1.0, BRAKE_WIRE_RANGE.0, BRAKE_WIRE_RANGE.1, force) as i16;
        self.port.publish_targets(self.targets);
    }

    /// Normalized steering angle, -1.0 (full left) to 1.0 (full right). The
    /// steering actuator counts in the opposite direction, so the sign is
    /// inverted before mapping.
    pub fn set_steering_angle(&mut self, angle: f32) {
        self.targets.steering_angle = map_range(
            -1.0,
            1.0,
            STEERING_WIRE_RANGE.0,
            STEERING_WIRE_RANGE.1,
            -angle,
        ) as i32;
        self.port.publish_targets(self.targets);
    }

    /// Gates one broadcast payload; enabling forces an immediate transmission
    /// so that ports suppressing unchanged payloads still push the first one.
    pub fn set_broadcast(&mut self, payload: BroadcastPayload, enable: bool) {
        self.port.set_broadcast(payload, enable);
        if enable {
            self.port.transmit_now(payload);
        }
    }

    /// Gates all actuator demand broadcasts together.
    pub fn set_actuator_broadcast(&mut self, enable: bool) {
        for payload in ACTUATOR_PAYLOADS {
            self.set_broadcast(payload, enable);
        }
    }

    /// Publishes this device's operating mode to the bus.
    pub fn set_self_state(&mut self, mode: u8) {
        self.port.publish_self_state(mode);
        self.port.transmit_now(BroadcastPayload::SelfState);
    }

    pub fn snapshot_health(&self) -> BusHealth {
        BusHealth {
            any_device_offline: self.rtd_timeout
                || self.monitored.iter().any(|entry| !entry.online),
            rtd_emergency: self.rtd_emergency,
            rtd_booted_up: self.rtd_booted_up,
        }
    }

    /// Read-only snapshot for presentation collaborators.
    pub fn status(&self) -> BusStatus {
        let mut monitored = Vec::new();
        for entry in &self.monitored {
            let _ = monitored.push(DeviceStatus {
                device: entry.device,
                online: entry.online,
            });
        }
        let mut nodes = Vec::new();
        for node in &self.nodes {
            let _ = nodes.push(NodeStateStatus {
                device: node.device,
                current: node.current,
                target: node.target,
            });
        }
        BusStatus {
            health: self.snapshot_health(),
            monitored,
            nodes,
            couplings: [
                coupling_status(&self.couplings[0]),
                coupling_status(&self.couplings[1]),
            ],
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }
}

fn coupling_status(coupling: &Coupling) -> CouplingStatus {
    CouplingStatus {
        id: coupling.id,
        target_engaged: coupling.target_engaged,
        confirmed_engaged: coupling.confirmed_engaged,
        write_pending: coupling.in_flight.is_some(),
    }
}

fn coupling_id_at(idx: usize) -> CouplingId {
    if idx == 0 {
        CouplingId::Brake
    } else {
        CouplingId::Steering
    }
}

/// Saturating linear interpolation from one span onto another.
pub fn map_range(from_min: f32, from_max: f32, to_min: f32, to_max: f32, value: f32) -> f32 {
    debug_assert!(from_min < from_max);
    let value = value.clamp(from_min, from_max);
    to_min + (value - from_min) / (from_max - from_min) * (to_max - to_min)
}
