//! Integration tests for mode arbitration, running full cycles against
//! fixture inputs and the recording port.

use std::sync::Arc;

use parking_lot::Mutex;

use interlock::arbiter::modes::canonical_table;
use interlock::arbiter::{
    ModeArbiter, ModeId, ModeTable, ModeTableError, OperatingMode, CYCLE_PERIOD_MS, MAX_MODES,
};
use interlock::bus::port::{BroadcastPayload, FixturePort, PortAction, WireTargets};
use interlock::bus::{
    BusDevice, BusEvent, NodeState, SdoOutcome, WireNodeState, MONITORED_DEVICES, RTD_STATE_READY,
};
use interlock::remote_control::{channel_map, FixtureReceiver, RemoteControl};
use interlock::sbus::SbusFrame;
use interlock::status::NullStatusSink;
use interlock::switches::FixtureSwitches;
use interlock::BusCoordinator;

struct Rig {
    bus: Arc<Mutex<BusCoordinator<FixturePort>>>,
    arbiter: ModeArbiter<FixturePort, FixtureReceiver, FixtureSwitches>,
    channels: [u16; 16],
    radio_alive: bool,
    now: u64,
}

fn rig() -> Rig {
    let bus = Arc::new(Mutex::new(BusCoordinator::new(FixturePort::new())));
    let arbiter = ModeArbiter::new(
        Arc::clone(&bus),
        RemoteControl::new(FixtureReceiver::default()),
        FixtureSwitches::default(),
        canonical_table().unwrap(),
    );
    let mut channels = [1000u16; 16];
    channels[channel_map::BRAKE] = 0;
    channels[channel_map::BUTTON_EMERGENCY] = 0;
    channels[channel_map::SWITCH_AUTONOMOUS] = 0;
    channels[channel_map::SWITCH_REMOTE_CONTROL] = 0;
    channels[channel_map::SWITCH_UNLOCK] = 0;
    Rig {
        bus,
        arbiter,
        channels,
        radio_alive: true,
        now: 0,
    }
}

impl Rig {
    fn bus_up(&mut self) {
        let mut bus = self.bus.lock();
        for device in MONITORED_DEVICES {
            bus.handle_event(BusEvent::LivenessRecovered {
                device,
                reported: WireNodeState::Operational,
            });
        }
        bus.handle_event(BusEvent::RtdState {
            raw: RTD_STATE_READY,
        });
    }

    fn cycle(&mut self) -> Option<ModeId> {
        self.now += CYCLE_PERIOD_MS;
        let receiver = self.arbiter.frame_source_mut();
        if self.radio_alive {
            let mut frame = SbusFrame {
                failsafe: false,
                frame_lost: false,
                last_update_ms: self.now,
                ..SbusFrame::neutral()
            };
            frame.channels = self.channels;
            receiver.frame = frame;
            receiver.available = true;
        } else {
            receiver.available = false;
        }
        self.arbiter.dispatch(self.now, &mut NullStatusSink);
        self.arbiter.current_mode()
    }

    fn reach_idle(&mut self) {
        self.bus_up();
        assert_eq!(self.cycle(), Some(ModeId::Start));
        assert_eq!(self.cycle(), Some(ModeId::Idle));
        // Let the startup coupling writes complete, as a responsive bus
        // would, so later transitions can start fresh ones.
        let mut bus = self.bus.lock();
        for device in [BusDevice::BrakeActuator, BusDevice::SteeringActuator] {
            bus.handle_event(BusEvent::CouplingWriteResult {
                device,
                outcome: SdoOutcome::Finished,
            });
        }
    }

    fn actions(&self) -> Vec<PortAction> {
        self.bus.lock().port().actions.clone()
    }

    fn clear_actions(&mut self) {
        self.bus.lock().port_mut().clear();
    }

    fn last_targets(&self) -> WireTargets {
        self.actions()
            .iter()
            .rev()
            .find_map(|action| match action {
                PortAction::Targets(targets) => Some(*targets),
                _ => None,
            })
            .expect("no targets published")
    }
}

fn dummy_mode(id: ModeId, priority: u8) -> OperatingMode<FixturePort> {
    OperatingMode {
        id,
        priority,
        engage_brake_coupling: false,
        engage_steering_coupling: false,
        send_targets: false,
        steering_state: NodeState::Preoperational,
        brake_state: NodeState::Preoperational,
        drive_motor_state: NodeState::Preoperational,
        requires_unlock: false,
        condition: |_| false,
        on_enter: |_| {},
        on_tick: |_| {},
    }
}

#[test]
fn test_duplicate_priority_is_fatal() {
    let mut modes: heapless::Vec<OperatingMode<FixturePort>, MAX_MODES> = heapless::Vec::new();
    let _ = modes.push(dummy_mode(ModeId::Start, 5));
    let _ = modes.push(dummy_mode(ModeId::Idle, 0));
    let _ = modes.push(dummy_mode(ModeId::Manual, 5));
    assert_eq!(
        ModeTable::new(modes).err(),
        Some(ModeTableError::DuplicatePriority { priority: 5 })
    );
}

#[test]
fn test_missing_fallback_is_fatal() {
    let mut modes: heapless::Vec<OperatingMode<FixturePort>, MAX_MODES> = heapless::Vec::new();
    let _ = modes.push(dummy_mode(ModeId::Start, 5));
    assert_eq!(
        ModeTable::new(modes).err(),
        Some(ModeTableError::MissingFallback)
    );
}

#[test]
fn test_start_waits_for_healthy_bus() {
    let mut rig = rig();
    // Nothing online yet; the start mode holds the vehicle.
    assert_eq!(rig.cycle(), Some(ModeId::Start));
    assert_eq!(rig.cycle(), Some(ModeId::Start));

    rig.bus_up();
    // One more cycle in start signals the checks passed, then idle takes over.
    assert_eq!(rig.cycle(), Some(ModeId::Start));
    assert_eq!(rig.cycle(), Some(ModeId::Idle));
}

#[test]
fn test_unlock_gates_remote_control_entry() {
    let mut rig = rig();
    rig.reach_idle();

    // Remote-control switch without unlock: refused.
    rig.channels[channel_map::SWITCH_REMOTE_CONTROL] = 1800;
    assert_eq!(rig.cycle(), Some(ModeId::Idle));

    // With unlock held: granted.
    rig.channels[channel_map::SWITCH_UNLOCK] = 1800;
    assert_eq!(rig.cycle(), Some(ModeId::RemoteControl));

    // Releasing unlock while active does not kick the mode out.
    rig.channels[channel_map::SWITCH_UNLOCK] = 0;
    assert_eq!(rig.cycle(), Some(ModeId::RemoteControl));

    // Releasing the mode switch does.
    rig.channels[channel_map::SWITCH_REMOTE_CONTROL] = 0;
    assert_eq!(rig.cycle(), Some(ModeId::Idle));
}

#[test]
fn test_deflected_throttle_blocks_remote_control_entry() {
    let mut rig = rig();
    rig.reach_idle();

    rig.channels[channel_map::SWITCH_REMOTE_CONTROL] = 1800;
    rig.channels[channel_map::SWITCH_UNLOCK] = 1800;
    rig.channels[channel_map::THROTTLE] = 1500;
    assert_eq!(rig.cycle(), Some(ModeId::Idle));

    rig.channels[channel_map::THROTTLE] = 1000;
    assert_eq!(rig.cycle(), Some(ModeId::RemoteControl));
}

#[test]
fn test_autonomous_selection_and_switch_conflict() {
    let mut rig = rig();
    rig.reach_idle();

    rig.channels[channel_map::SWITCH_AUTONOMOUS] = 1800;
    rig.channels[channel_map::SWITCH_UNLOCK] = 1800;
    assert_eq!(rig.cycle(), Some(ModeId::Autonomous));

    // Both drivable-mode switches at once satisfy neither condition.
    rig.channels[channel_map::SWITCH_REMOTE_CONTROL] = 1800;
    assert_eq!(rig.cycle(), Some(ModeId::Idle));
}

#[test]
fn test_remote_control_drives_actuator_targets() {
    let mut rig = rig();
    rig.reach_idle();
    rig.channels[channel_map::SWITCH_REMOTE_CONTROL] = 1800;
    rig.channels[channel_map::SWITCH_UNLOCK] = 1800;
    assert_eq!(rig.cycle(), Some(ModeId::RemoteControl));

    rig.channels[channel_map::BRAKE] = 2000;
    rig.channels[channel_map::STEERING] = 1500;
    rig.cycle();
    let targets = rig.last_targets();
    assert_eq!(targets.brake_force, 14000);
    assert_eq!(targets.motor_torque, 0);
    // Half right on the stick, inverted on the wire: below the span middle.
    assert!(targets.steering_angle < (0x9AB + 0x1700) / 2);
}

#[test]
fn test_deflected_throttle_drops_remote_control() {
    let mut rig = rig();
    rig.reach_idle();
    rig.channels[channel_map::SWITCH_REMOTE_CONTROL] = 1800;
    rig.channels[channel_map::SWITCH_UNLOCK] = 1800;
    assert_eq!(rig.cycle(), Some(ModeId::RemoteControl));

    // The mode holds only while the throttle is at rest.
    rig.channels[channel_map::THROTTLE] = 1500;
    assert_eq!(rig.cycle(), Some(ModeId::Idle));
}

#[test]
fn test_transition_side_effects() {
    let mut rig = rig();
    rig.reach_idle();
    rig.channels[channel_map::SWITCH_REMOTE_CONTROL] = 1800;
    rig.channels[channel_map::SWITCH_UNLOCK] = 1800;
    rig.clear_actions();
    assert_eq!(rig.cycle(), Some(ModeId::RemoteControl));

    let actions = rig.actions();
    assert!(actions.contains(&PortAction::SelfState(ModeId::RemoteControl.wire_value())));
    for device in [
        BusDevice::SteeringActuator,
        BusDevice::BrakeActuator,
        BusDevice::DriveMotorController,
        BusDevice::BrakePressureSensor,
    ] {
        assert!(actions.contains(&PortAction::NodeStateRequest(
            device,
            NodeState::Operational
        )));
    }
    assert!(actions.contains(&PortAction::Broadcast(BroadcastPayload::MotorTorque, true)));
    assert!(actions.contains(&PortAction::TransmitNow(BroadcastPayload::MotorTorque)));
    // Both couplings lock in.
    let writes = rig.bus.lock().port().coupling_writes();
    assert_eq!(
        writes,
        vec![
            (BusDevice::BrakeActuator, 0x0001_0000),
            (BusDevice::SteeringActuator, 0x0001_0000),
        ]
    );
}

#[test]
fn test_radio_timeout_soft_emergency_and_latch() {
    let mut rig = rig();
    rig.reach_idle();
    rig.channels[channel_map::SWITCH_REMOTE_CONTROL] = 1800;
    rig.channels[channel_map::SWITCH_UNLOCK] = 1800;
    assert_eq!(rig.cycle(), Some(ModeId::RemoteControl));

    // Link dies: braked to a stop.
    rig.radio_alive = false;
    assert_eq!(rig.cycle(), Some(ModeId::SoftEmergency));
    let targets = rig.last_targets();
    assert_eq!(targets.brake_force, 14000);
    assert_eq!(targets.motor_torque, 0);

    // Link returns but the switches are still engaged: latched.
    rig.radio_alive = true;
    assert_eq!(rig.cycle(), Some(ModeId::SoftEmergency));

    // Only after every remote switch is back does the vehicle release.
    rig.channels[channel_map::SWITCH_REMOTE_CONTROL] = 0;
    rig.channels[channel_map::SWITCH_UNLOCK] = 0;
    assert_eq!(rig.cycle(), Some(ModeId::Idle));
}

#[test]
fn test_emergency_button_from_radio() {
    let mut rig = rig();
    rig.reach_idle();
    rig.channels[channel_map::BUTTON_EMERGENCY] = 1800;
    assert_eq!(rig.cycle(), Some(ModeId::SoftEmergency));
}

#[test]
fn test_device_loss_triggers_soft_emergency() {
    let mut rig = rig();
    rig.reach_idle();
    rig.bus.lock().handle_event(BusEvent::LivenessTimeout {
        device: BusDevice::BrakeActuator,
    });
    assert_eq!(rig.cycle(), Some(ModeId::SoftEmergency));
}

#[test]
fn test_hardware_switches_outrank_radio_emergencies() {
    let mut rig = rig();
    rig.reach_idle();

    // Radio link dead and emergency switch pulled: hardware wins.
    rig.radio_alive = false;
    rig.arbiter.switch_source_mut().state.emergency = true;
    assert_eq!(rig.cycle(), Some(ModeId::Emergency));
    let targets = rig.last_targets();
    assert_eq!(targets.brake_force, 14000);

    // Manual override outranks the emergency stop.
    rig.arbiter.switch_source_mut().state.manual_override = true;
    assert_eq!(rig.cycle(), Some(ModeId::Manual));
}

#[test]
fn test_manual_entry_pushes_one_neutral_payload() {
    let mut rig = rig();
    rig.reach_idle();
    rig.clear_actions();

    rig.arbiter.switch_source_mut().state.manual_override = true;
    assert_eq!(rig.cycle(), Some(ModeId::Manual));

    let actions = rig.actions();
    // Neutral demand went out, then the broadcasts were pulsed on and off.
    assert!(actions.contains(&PortAction::Targets(WireTargets {
        motor_torque: 0,
        brake_force: 5000,
        steering_angle: 0,
    })));
    assert!(actions.contains(&PortAction::Broadcast(BroadcastPayload::BrakeForce, true)));
    assert!(actions.contains(&PortAction::Broadcast(BroadcastPayload::BrakeForce, false)));
}
