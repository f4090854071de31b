//! Hardware switch inputs on the interlock device itself.

use serde::{Deserialize, Serialize};

/// Debounced switch readings sampled once per control cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchState {
    /// Key switch handing the vehicle over to a human driver.
    pub manual_override: bool,
    /// Hard-wired emergency stop.
    pub emergency: bool,
}

/// Capability seam over the switch hardware (GPIO on the target, fixtures on
/// the host).
pub trait SwitchSource {
    fn sample(&mut self) -> SwitchState;
}

/// Host-side source set directly by tests and the simulator.
#[derive(Debug, Default)]
pub struct FixtureSwitches {
    pub state: SwitchState,
}

impl SwitchSource for FixtureSwitches {
    fn sample(&mut self) -> SwitchState {
        self.state
    }
}
