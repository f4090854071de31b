//! Operating-mode arbitration.
//!
//! Once per control cycle the arbiter refreshes its inputs (bus health, radio
//! intent, hardware switches), selects the highest-priority mode whose
//! condition holds, performs the transition side effects when the winner
//! changed, runs the winner's per-cycle action, and feeds a status report to
//! the presentation seam.
//!
//! The mode table is validated at construction: exactly one fallback mode
//! with priority zero must exist and priorities must be unique, otherwise two
//! modes could be runnable at once. The fallback's condition is replaced with
//! an always-true one so the arbiter can never end a cycle without a mode.

use std::sync::Arc;
use std::time::Duration;

use heapless::Vec;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::bus::coordinator::BusCoordinator;
use crate::bus::port::BusPort;
use crate::bus::{BusDevice, BusHealth, NodeState};
use crate::remote_control::{FrameSource, RemoteControl, RemoteControlState};
use crate::status::{StatusReport, StatusSink};
use crate::switches::{SwitchSource, SwitchState};

pub mod modes;

/// Cadence the owner is expected to call [`ModeArbiter::dispatch`] at.
pub const CYCLE_PERIOD_MS: u64 = 20;

/// Bound on waiting for the bus coordinator; beyond this the cycle degrades
/// instead of stalling the control loop.
pub const BUS_LOCK_TIMEOUT: Duration = Duration::from_millis(5);

pub const MAX_MODES: usize = 8;

/// Priority reserved for the fallback mode.
pub const FALLBACK_PRIORITY: u8 = 0;

/// Operating modes, by the value published on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ModeId {
    Start = 0,
    Idle = 1,
    RemoteControl = 2,
    Autonomous = 4,
    SoftEmergency = 5,
    Emergency = 6,
    Manual = 7,
}

impl ModeId {
    pub const fn wire_value(self) -> u8 {
        self as u8
    }
}

/// Read-only inputs of one arbitration cycle.
#[derive(Debug, Clone, Copy)]
pub struct ControlInputs {
    pub health: BusHealth,
    pub radio: RemoteControlState,
    pub switches: SwitchState,
    /// Mode active when the cycle started; `None` on the very first cycle.
    pub current_mode: Option<ModeId>,
    pub started_up: bool,
}

/// Inputs plus the coordinator handle, passed to mode actions.
pub struct ControlContext<'a, P: BusPort> {
    pub inputs: &'a ControlInputs,
    pub bus: &'a mut BusCoordinator<P>,
    started_up: &'a mut bool,
}

impl<P: BusPort> ControlContext<'_, P> {
    /// Marks startup checks as passed; from the next cycle on the start mode
    /// no longer claims the vehicle.
    pub fn signal_started_up(&mut self) {
        *self.started_up = true;
    }
}

pub type ModeCondition = fn(&ControlInputs) -> bool;
pub type ModeAction<P> = fn(&mut ControlContext<'_, P>);

/// Static description of one operating mode: what the bus must look like
/// while it is active, and the condition/action functions that drive it.
pub struct OperatingMode<P: BusPort> {
    pub id: ModeId,
    pub priority: u8,
    pub engage_brake_coupling: bool,
    pub engage_steering_coupling: bool,
    /// Whether actuator demand broadcasts run continuously in this mode.
    pub send_targets: bool,
    pub steering_state: NodeState,
    pub brake_state: NodeState,
    pub drive_motor_state: NodeState,
    /// Entering from another mode requires the radio unlock switch.
    pub requires_unlock: bool,
    pub condition: ModeCondition,
    pub on_enter: ModeAction<P>,
    pub on_tick: ModeAction<P>,
}

impl<P: BusPort> Clone for OperatingMode<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: BusPort> Copy for OperatingMode<P> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ModeTableError {
    /// Two runnable modes could tie; the table is unusable.
    #[error("duplicate mode priority {priority}")]
    DuplicatePriority { priority: u8 },
    /// Without a priority-zero mode a cycle could end with nothing to run.
    #[error("no fallback mode with priority 0")]
    MissingFallback,
}

/// Validated, immutable set of operating modes.
pub struct ModeTable<P: BusPort> {
    modes: Vec<OperatingMode<P>, MAX_MODES>,
    fallback_idx: usize,
}

impl<P: BusPort> ModeTable<P> {
    pub fn new(mut modes: Vec<OperatingMode<P>, MAX_MODES>) -> Result<Self, ModeTableError> {
        for (idx, mode) in modes.iter().enumerate() {
            if modes[idx + 1..].iter().any(|m| m.priority == mode.priority) {
                return Err(ModeTableError::DuplicatePriority {
                    priority: mode.priority,
                });
            }
        }
        let fallback_idx = modes
            .iter()
            .position(|m| m.priority == FALLBACK_PRIORITY)
            .ok_or(ModeTableError::MissingFallback)?;
        // The fallback must be runnable whenever nothing else is.
        modes[fallback_idx].condition = |_| true;
        Ok(Self {
            modes,
            fallback_idx,
        })
    }

    pub fn modes(&self) -> &[OperatingMode<P>] {
        &self.modes
    }
}

/// The mode state machine. Sole writer of the current mode id.
pub struct ModeArbiter<P: BusPort, F: FrameSource, S: SwitchSource> {
    bus: Arc<Mutex<BusCoordinator<P>>>,
    remote_control: RemoteControl<F>,
    switches: S,
    table: ModeTable<P>,
    current_mode: Option<ModeId>,
    started_up: bool,
}

impl<P: BusPort, F: FrameSource, S: SwitchSource> ModeArbiter<P, F, S> {
    pub fn new(
        bus: Arc<Mutex<BusCoordinator<P>>>,
        remote_control: RemoteControl<F>,
        switches: S,
        table: ModeTable<P>,
    ) -> Self {
        Self {
            bus,
            remote_control,
            switches,
            table,
            current_mode: None,
            started_up: false,
        }
    }

    pub fn current_mode(&self) -> Option<ModeId> {
        self.current_mode
    }

    pub fn frame_source_mut(&mut self) -> &mut F {
        self.remote_control.source_mut()
    }

    pub fn switch_source_mut(&mut self) -> &mut S {
        &mut self.switches
    }

    /// Runs one arbitration cycle at wall time `now_ms`.
    pub fn dispatch(&mut self, now_ms: u64, sink: &mut dyn StatusSink) {
        let radio = self.remote_control.update(now_ms);
        let switches = self.switches.sample();
        let Some(mut bus) = self.bus.try_lock_for(BUS_LOCK_TIMEOUT) else {
            // The event pump is hogging the coordinator. Skip the cycle
            // rather than block the control loop; the next one retries with
            // fresh inputs.
            warn!("bus coordinator lock not acquired, skipping cycle");
            return;
        };

        let inputs = ControlInputs {
            health: bus.snapshot_health(),
            radio,
            switches,
            current_mode: self.current_mode,
            started_up: self.started_up,
        };
        let selected = self.table.modes[self.select(&inputs)];

        let mut ctx = ControlContext {
            inputs: &inputs,
            bus: &mut bus,
            started_up: &mut self.started_up,
        };
        if inputs.current_mode != Some(selected.id) {
            (selected.on_enter)(&mut ctx);
            info!(from = ?inputs.current_mode, to = ?selected.id, "operating mode transition");
            ctx.bus.set_self_state(selected.id.wire_value());
            ctx.bus.set_actuator_broadcast(selected.send_targets);
            ctx.bus
                .request_device_state(BusDevice::SteeringActuator, selected.steering_state);
            ctx.bus
                .request_device_state(BusDevice::BrakeActuator, selected.brake_state);
            ctx.bus
                .request_device_state(BusDevice::DriveMotorController, selected.drive_motor_state);
            // The pressure sensor has no per-mode target; it reports whenever
            // the bus is up.
            ctx.bus
                .request_device_state(BusDevice::BrakePressureSensor, NodeState::Operational);
            ctx.bus.set_coupling_states(
                selected.engage_brake_coupling,
                selected.engage_steering_coupling,
            );
        }
        (selected.on_tick)(&mut ctx);

        self.current_mode = Some(selected.id);
        let report = StatusReport {
            mode: self.current_mode,
            cycle_ms: now_ms,
            radio_timeout: radio.timeout,
            bus: bus.status(),
        };
        drop(bus);
        sink.publish(&report);
    }

    /// Highest-priority runnable mode, honoring the unlock gate: a mode
    /// requiring unlock is only eligible while the unlock switch is held or
    /// the mode is already active.
    fn select(&self, inputs: &ControlInputs) -> usize {
        let modes = self.table.modes();
        let mut selected = self.table.fallback_idx;
        for (idx, mode) in modes.iter().enumerate() {
            if !(mode.condition)(inputs) {
                continue;
            }
            if mode.priority < modes[selected].priority {
                continue;
            }
            let unlocked = !mode.requires_unlock
                || inputs.radio.switch_unlock
                || inputs.current_mode == Some(mode.id);
            if unlocked {
                selected = idx;
            }
        }
        selected
    }
}
