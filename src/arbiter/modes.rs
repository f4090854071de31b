//! The canonical operating-mode table.
//!
//! Priorities order the modes when several conditions hold at once: hardware
//! overrides (manual key, emergency stop) beat radio emergencies, which beat
//! the drivable modes, which beat idle. Start outranks everything until the
//! startup checks pass once.

use heapless::Vec;

use crate::arbiter::{
    ControlContext, ModeId, ModeTable, ModeTableError, OperatingMode, MAX_MODES,
};
use crate::bus::port::BusPort;
use crate::bus::NodeState;

pub const FULL_BRAKE: f32 = 1.0;
pub const NO_TORQUE: f32 = 0.0;

/// Builds the validated seven-mode table.
pub fn canonical_table<P: BusPort>() -> Result<ModeTable<P>, ModeTableError> {
    let mut modes: Vec<OperatingMode<P>, MAX_MODES> = Vec::new();
    let _ = modes.push(start());
    let _ = modes.push(idle());
    let _ = modes.push(remote_control());
    let _ = modes.push(autonomous());
    let _ = modes.push(soft_emergency());
    let _ = modes.push(manual());
    let _ = modes.push(emergency());
    ModeTable::new(modes)
}

fn noop<P: BusPort>(_ctx: &mut ControlContext<'_, P>) {}

/// One-time neutral push for modes that stop driving the actuators: zero the
/// demand, then pulse the broadcasts on and off so exactly one neutral
/// payload goes out.
fn push_neutral_targets<P: BusPort>(ctx: &mut ControlContext<'_, P>) {
    ctx.bus.set_motor_torque(NO_TORQUE);
    ctx.bus.set_brake_force(0.0);
    ctx.bus.set_actuator_broadcast(true);
    ctx.bus.set_actuator_broadcast(false);
}

fn start<P: BusPort>() -> OperatingMode<P> {
    OperatingMode {
        id: ModeId::Start,
        priority: 255,
        engage_brake_coupling: false,
        engage_steering_coupling: false,
        send_targets: false,
        steering_state: NodeState::Operational,
        brake_state: NodeState::Operational,
        drive_motor_state: NodeState::Operational,
        requires_unlock: false,
        condition: |inputs| !inputs.started_up,
        on_enter: noop,
        on_tick: |ctx| {
            // Not started up until every device is online and the real-time
            // device reports a successful boot.
            if ctx.inputs.health.rtd_booted_up && !ctx.inputs.health.any_device_offline {
                ctx.signal_started_up();
            }
        },
    }
}

fn idle<P: BusPort>() -> OperatingMode<P> {
    OperatingMode {
        id: ModeId::Idle,
        priority: 0,
        engage_brake_coupling: false,
        engage_steering_coupling: false,
        send_targets: false,
        steering_state: NodeState::Preoperational,
        brake_state: NodeState::Operational,
        drive_motor_state: NodeState::Operational,
        requires_unlock: false,
        // Replaced by the table validator; the fallback always runs.
        condition: |_| true,
        on_enter: push_neutral_targets,
        on_tick: noop,
    }
}

fn remote_control<P: BusPort>() -> OperatingMode<P> {
    OperatingMode {
        id: ModeId::RemoteControl,
        priority: 11,
        engage_brake_coupling: true,
        engage_steering_coupling: true,
        send_targets: true,
        steering_state: NodeState::Operational,
        brake_state: NodeState::Operational,
        drive_motor_state: NodeState::Operational,
        requires_unlock: true,
        // Refuses to take over while the throttle stick is deflected, so the
        // vehicle cannot jump on entry.
        condition: |inputs| {
            inputs.radio.switch_remote_control
                && !inputs.radio.switch_autonomous
                && !inputs.radio.throttle_is_up
        },
        on_enter: noop,
        on_tick: |ctx| {
            ctx.bus.set_brake_force(ctx.inputs.radio.brake);
            ctx.bus.set_motor_torque(ctx.inputs.radio.throttle);
            ctx.bus.set_steering_angle(ctx.inputs.radio.steering);
        },
    }
}

fn autonomous<P: BusPort>() -> OperatingMode<P> {
    OperatingMode {
        id: ModeId::Autonomous,
        priority: 10,
        engage_brake_coupling: true,
        engage_steering_coupling: true,
        // The autonomy computer publishes its own targets.
        send_targets: false,
        steering_state: NodeState::Operational,
        brake_state: NodeState::Operational,
        drive_motor_state: NodeState::Operational,
        requires_unlock: true,
        condition: |inputs| {
            inputs.radio.switch_autonomous && !inputs.radio.switch_remote_control
        },
        on_enter: noop,
        on_tick: noop,
    }
}

fn soft_emergency<P: BusPort>() -> OperatingMode<P> {
    OperatingMode {
        id: ModeId::SoftEmergency,
        priority: 100,
        engage_brake_coupling: true,
        engage_steering_coupling: true,
        send_targets: true,
        steering_state: NodeState::Operational,
        brake_state: NodeState::Operational,
        drive_motor_state: NodeState::Operational,
        requires_unlock: false,
        condition: |inputs| {
            // Latched until every remote switch is back in its initial
            // position, so releasing the trigger cannot re-arm the vehicle.
            let latched = inputs.current_mode == Some(ModeId::SoftEmergency)
                && (inputs.radio.switch_remote_control
                    || inputs.radio.switch_autonomous
                    || inputs.radio.switch_unlock);
            inputs.radio.timeout
                || inputs.radio.button_emergency
                || inputs.health.any_device_offline
                || inputs.health.rtd_emergency
                || latched
        },
        on_enter: noop,
        on_tick: brake_to_stop,
    }
}

fn manual<P: BusPort>() -> OperatingMode<P> {
    OperatingMode {
        id: ModeId::Manual,
        priority: 250,
        engage_brake_coupling: false,
        engage_steering_coupling: false,
        send_targets: false,
        steering_state: NodeState::Preoperational,
        brake_state: NodeState::Preoperational,
        drive_motor_state: NodeState::Preoperational,
        requires_unlock: false,
        condition: |inputs| inputs.switches.manual_override,
        on_enter: push_neutral_targets,
        on_tick: noop,
    }
}

fn emergency<P: BusPort>() -> OperatingMode<P> {
    OperatingMode {
        id: ModeId::Emergency,
        priority: 150,
        engage_brake_coupling: true,
        engage_steering_coupling: true,
        send_targets: true,
        steering_state: NodeState::Operational,
        brake_state: NodeState::Operational,
        drive_motor_state: NodeState::Operational,
        requires_unlock: false,
        condition: |inputs| inputs.switches.emergency,
        on_enter: noop,
        on_tick: brake_to_stop,
    }
}

fn brake_to_stop<P: BusPort>(ctx: &mut ControlContext<'_, P>) {
    ctx.bus.set_brake_force(FULL_BRAKE);
    ctx.bus.set_motor_torque(NO_TORQUE);
}
