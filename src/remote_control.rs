//! Control intent derived from decoded radio frames.
//!
//! Maps the transmitter's channel layout onto normalized axes and switch
//! booleans, and tracks radio link health. The frame acquisition path is
//! abstracted behind [`FrameSource`] so the control loop can run against the
//! receiver driver on the target and against fixtures on the host.

use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use tracing::warn;

use crate::sbus::{SbusFrame, CHANNEL_COUNT, CHANNEL_MAX};

/// Transmitter channel assignment.
pub mod channel_map {
    pub const BRAKE: usize = 0;
    pub const STEERING: usize = 1;
    pub const THROTTLE: usize = 2;
    pub const BUTTON_EMERGENCY: usize = 4;
    pub const SWITCH_AUTONOMOUS: usize = 6;
    pub const SWITCH_REMOTE_CONTROL: usize = 7;
    pub const SWITCH_UNLOCK: usize = 8;
}

const_assert!(channel_map::BRAKE < CHANNEL_COUNT);
const_assert!(channel_map::STEERING < CHANNEL_COUNT);
const_assert!(channel_map::THROTTLE < CHANNEL_COUNT);
const_assert!(channel_map::BUTTON_EMERGENCY < CHANNEL_COUNT);
const_assert!(channel_map::SWITCH_AUTONOMOUS < CHANNEL_COUNT);
const_assert!(channel_map::SWITCH_REMOTE_CONTROL < CHANNEL_COUNT);
const_assert!(channel_map::SWITCH_UNLOCK < CHANNEL_COUNT);

/// Counts strictly within this distance of center (bidirectional) or zero
/// (unidirectional) are treated as exactly zero, absorbing stick jitter.
pub const DEADBAND: u16 = 10;

/// A switch channel strictly above this raw count reads as on.
pub const SWITCH_ON_MIN: u16 = 900;

const_assert!(SWITCH_ON_MIN < CHANNEL_MAX);

/// Frames older than this mean the radio link is gone.
pub const LINK_TIMEOUT_MS: u64 = 500;

/// Throttle magnitude above which the vehicle is considered commanded to move.
pub const THROTTLE_UP_THRESHOLD: f32 = 0.01;

/// Source of the most recent decoded frame.
///
/// `None` means no frame could be acquired within the source's bounded wait,
/// which consumers must treat as a radio timeout.
pub trait FrameSource {
    fn latest_frame(&mut self) -> Option<SbusFrame>;
}

/// Host-side source fed directly by tests and the simulator.
#[derive(Debug, Default)]
pub struct FixtureReceiver {
    pub frame: SbusFrame,
    pub available: bool,
}

impl FrameSource for FixtureReceiver {
    fn latest_frame(&mut self) -> Option<SbusFrame> {
        self.available.then_some(self.frame)
    }
}

/// Normalized operator intent for one control cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RemoteControlState {
    /// -1.0 (full reverse) to 1.0 (full forward).
    pub throttle: f32,
    /// 0.0 (released) to 1.0 (full braking).
    pub brake: f32,
    /// -1.0 (full left) to 1.0 (full right).
    pub steering: f32,
    pub switch_unlock: bool,
    pub switch_remote_control: bool,
    pub switch_autonomous: bool,
    pub button_emergency: bool,
    pub throttle_is_up: bool,
    /// Link lost: stale frame, failsafe frame, or no frame at all.
    pub timeout: bool,
}

impl Default for RemoteControlState {
    fn default() -> Self {
        Self {
            throttle: 0.0,
            brake: 0.0,
            steering: 0.0,
            switch_unlock: false,
            switch_remote_control: false,
            switch_autonomous: false,
            button_emergency: false,
            throttle_is_up: false,
            timeout: true,
        }
    }
}

pub struct RemoteControl<S: FrameSource> {
    source: S,
}

impl<S: FrameSource> RemoteControl<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Pulls the latest frame and derives the cycle's operator intent.
    pub fn update(&mut self, now_ms: u64) -> RemoteControlState {
        match self.source.latest_frame() {
            Some(frame) => derive(&frame, now_ms),
            None => {
                warn!("no radio frame available, reporting link timeout");
                RemoteControlState::default()
            }
        }
    }
}

/// Derives operator intent from one decoded frame at wall time `now_ms`.
pub fn derive(frame: &SbusFrame, now_ms: u64) -> RemoteControlState {
    let timeout =
        frame.failsafe || now_ms.saturating_sub(frame.last_update_ms) > LINK_TIMEOUT_MS;
    let throttle = bidirectional_axis(frame.channels[channel_map::THROTTLE]);
    RemoteControlState {
        throttle,
        brake: unidirectional_axis(frame.channels[channel_map::BRAKE]),
        steering: bidirectional_axis(frame.channels[channel_map::STEERING]),
        switch_unlock: switch_on(frame.channels[channel_map::SWITCH_UNLOCK]),
        switch_remote_control: switch_on(frame.channels[channel_map::SWITCH_REMOTE_CONTROL]),
        switch_autonomous: switch_on(frame.channels[channel_map::SWITCH_AUTONOMOUS]),
        button_emergency: switch_on(frame.channels[channel_map::BUTTON_EMERGENCY]),
        throttle_is_up: throttle.abs() > THROTTLE_UP_THRESHOLD,
        timeout,
    }
}

/// Center-sprung channel to -1.0..=1.0 with a deadband around center.
fn bidirectional_axis(value: u16) -> f32 {
    let center = CHANNEL_MAX / 2;
    if value.abs_diff(center) < DEADBAND {
        return 0.0;
    }
    f32::from(value) / f32::from(center) - 1.0
}

/// Single-ended channel to 0.0..=1.0 with a deadband near the rest position.
fn unidirectional_axis(value: u16) -> f32 {
    if value < DEADBAND {
        return 0.0;
    }
    f32::from(value) / f32::from(CHANNEL_MAX)
}

fn switch_on(value: u16) -> bool {
    value > SWITCH_ON_MIN
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with(channel: usize, value: u16) -> SbusFrame {
        let mut frame = SbusFrame {
            failsafe: false,
            frame_lost: false,
            ..SbusFrame::neutral()
        };
        frame.channels[channel] = value;
        frame
    }

    #[test]
    fn test_deadband_zeroes_center_jitter() {
        let frame = frame_with(channel_map::THROTTLE, 1000 + DEADBAND - 1);
        let state = derive(&frame, 0);
        assert_eq!(state.throttle, 0.0);
        assert!(!state.throttle_is_up);

        // The deadband edge itself is live.
        let frame = frame_with(channel_map::THROTTLE, 1000 + DEADBAND + 1);
        let state = derive(&frame, 0);
        assert!(state.throttle > 0.0);
        assert!(state.throttle_is_up);
    }

    #[test]
    fn test_axis_extremes() {
        let state = derive(&frame_with(channel_map::THROTTLE, CHANNEL_MAX), 0);
        assert_eq!(state.throttle, 1.0);

        let state = derive(&frame_with(channel_map::THROTTLE, 0), 0);
        assert_eq!(state.throttle, -1.0);

        let state = derive(&frame_with(channel_map::BRAKE, CHANNEL_MAX), 0);
        assert_eq!(state.brake, 1.0);
    }

    #[test]
    fn test_switch_threshold() {
        let state = derive(&frame_with(channel_map::SWITCH_UNLOCK, SWITCH_ON_MIN + 1), 0);
        assert!(state.switch_unlock);

        // The threshold itself still reads as off.
        let state = derive(&frame_with(channel_map::SWITCH_UNLOCK, SWITCH_ON_MIN), 0);
        assert!(!state.switch_unlock);
    }

    #[test]
    fn test_stale_frame_is_timeout() {
        let mut frame = frame_with(channel_map::THROTTLE, 1500);
        frame.last_update_ms = 0;
        assert!(!derive(&frame, LINK_TIMEOUT_MS).timeout);
        assert!(derive(&frame, LINK_TIMEOUT_MS + 1).timeout);
    }

    #[test]
    fn test_failsafe_frame_is_timeout() {
        let mut frame = SbusFrame::neutral();
        frame.last_update_ms = 100;
        assert!(derive(&frame, 100).timeout);
    }

    #[test]
    fn test_missing_frame_reports_timeout() {
        let mut rc = RemoteControl::new(FixtureReceiver::default());
        let state = rc.update(0);
        assert!(state.timeout);
        assert_eq!(state.brake, 0.0);
    }
}
