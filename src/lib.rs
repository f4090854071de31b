//! # Vehicle Safety Interlock Core
//!
//! Control core of a remote-controlled vehicle's safety interlock device:
//! arbitrates between operating modes (manual, remote-control, autonomous,
//! emergency), supervises a small CANopen-style fieldbus of actuators and
//! sensors, and derives control intent from decoded S.BUS receiver frames.
//!
//! ## Features
//!
//! - **Mode arbitration**: priority-ordered operating-mode table evaluated
//!   once per control cycle, with unlock gating and emergency latching
//! - **Bus coordination**: node liveness tracking, NMT-style state repair,
//!   SDO-style coupling writes with latest-target retry
//! - **Soft timers**: fixed-capacity alarm table dispatched by polling
//! - **S.BUS decoding**: bit-level unpacking and validation of the radio
//!   receiver's 25-byte link-layer frame
//! - **Embedded-friendly**: bounded tables, no per-mode heap allocation
//!
//! ## Architecture
//!
//! - [`arbiter`] - operating-mode state machine and the canonical mode table
//! - [`bus`] - device coordination layer and the fieldbus port seam
//! - [`sbus`] - raw radio frame decoding
//! - [`remote_control`] - control intent derived from decoded frames
//! - [`switches`] - hardware switch inputs
//! - [`timers`] - software alarm table
//! - [`status`] - read-only snapshots for presentation collaborators

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod arbiter;
pub mod bus;
pub mod remote_control;
pub mod sbus;
pub mod status;
pub mod switches;
pub mod timers;

// Re-export main public types for convenience
pub use arbiter::{ModeArbiter, ModeId, ModeTable};
pub use bus::coordinator::BusCoordinator;
pub use remote_control::{RemoteControl, RemoteControlState};
pub use sbus::{decode, SbusFrame};
pub use timers::{TimerHandle, TimerTable};
