//! Host simulator for the interlock control core.
//!
//! Runs the mode arbiter against fixture-backed inputs and a recording bus
//! port, with simulated time advancing one cycle per iteration. A small
//! scripted scenario brings the bus up, hands the vehicle to the remote
//! operator and optionally drops the radio link to show the soft-emergency
//! path. Status reports are printed as JSON lines.

use std::sync::Arc;

use clap::{App, Arg};
use colored::Colorize;
use parking_lot::Mutex;
use tracing::info;

use interlock::arbiter::modes::canonical_table;
use interlock::arbiter::CYCLE_PERIOD_MS;
use interlock::bus::port::FixturePort;
use interlock::bus::{BusEvent, WireNodeState, MONITORED_DEVICES, RTD_STATE_READY};
use interlock::remote_control::{channel_map, FixtureReceiver, RemoteControl};
use interlock::sbus::SbusFrame;
use interlock::status::{StatusReport, StatusSink};
use interlock::switches::FixtureSwitches;
use interlock::{BusCoordinator, ModeArbiter, TimerTable};

/// Cadence of the simulated real-time device state report.
const RTD_REPORT_PERIOD_MS: u64 = 125;

const TIMER_ID_RTD_REPORT: u32 = 1;
const TIMER_ID_DROP_LINK: u32 = 2;

/// Owner context of the simulation timers.
#[derive(Default)]
struct SimEvents {
    pending: Vec<BusEvent>,
    link_dropped: bool,
}

fn rtd_report(sim: &mut SimEvents, _id: u32) {
    sim.pending.push(BusEvent::RtdState {
        raw: RTD_STATE_READY,
    });
}

fn drop_link(sim: &mut SimEvents, _id: u32) {
    sim.link_dropped = true;
}

struct JsonStatusSink;

impl StatusSink for JsonStatusSink {
    fn publish(&mut self, report: &StatusReport) {
        match serde_json::to_string(report) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("status serialization failed: {e}"),
        }
    }
}

/// Frame with centered sticks and all switches off.
fn neutral_operator_frame(now_ms: u64) -> SbusFrame {
    let mut frame = SbusFrame {
        failsafe: false,
        frame_lost: false,
        last_update_ms: now_ms,
        ..SbusFrame::neutral()
    };
    frame.channels = [1000; 16];
    frame.channels[channel_map::BRAKE] = 0;
    frame.channels[channel_map::BUTTON_EMERGENCY] = 0;
    frame.channels[channel_map::SWITCH_AUTONOMOUS] = 0;
    frame.channels[channel_map::SWITCH_REMOTE_CONTROL] = 0;
    frame.channels[channel_map::SWITCH_UNLOCK] = 0;
    frame
}

fn main() {
    tracing_subscriber::fmt::init();

    let matches = App::new("interlock-sim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Safety interlock control core simulator")
        .arg(
            Arg::with_name("cycles")
                .long("cycles")
                .short("c")
                .takes_value(true)
                .default_value("250")
                .help("Number of 20 ms control cycles to run"),
        )
        .arg(
            Arg::with_name("engage-at")
                .long("engage-at")
                .takes_value(true)
                .default_value("1000")
                .help("Time (ms) at which the operator takes remote control"),
        )
        .arg(
            Arg::with_name("drop-link-at")
                .long("drop-link-at")
                .takes_value(true)
                .help("Time (ms) at which the radio link dies"),
        )
        .get_matches();

    let cycles: u64 = matches
        .value_of("cycles")
        .and_then(|v| v.parse().ok())
        .unwrap_or(250);
    let engage_at: u64 = matches
        .value_of("engage-at")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1000);
    let drop_link_at: Option<u64> = matches.value_of("drop-link-at").and_then(|v| v.parse().ok());

    println!("{}", "interlock control core simulator".bold().cyan());

    let bus = Arc::new(Mutex::new(BusCoordinator::new(FixturePort::new())));
    let table = canonical_table().expect("canonical mode table is valid");
    let remote_control = RemoteControl::new(FixtureReceiver::default());
    let mut arbiter = ModeArbiter::new(Arc::clone(&bus), remote_control, FixtureSwitches::default(), table);

    // Bring every monitored device online before the first cycle.
    {
        let mut bus = bus.lock();
        for device in MONITORED_DEVICES {
            bus.handle_event(BusEvent::LivenessRecovered {
                device,
                reported: WireNodeState::Preoperational,
            });
        }
    }

    let mut timers: TimerTable<SimEvents> = TimerTable::new();
    let mut sim = SimEvents::default();
    timers
        .arm(0, TIMER_ID_RTD_REPORT, rtd_report, 0, RTD_REPORT_PERIOD_MS)
        .expect("timer table has free slots");
    if let Some(at) = drop_link_at {
        timers
            .arm(0, TIMER_ID_DROP_LINK, drop_link, at, 0)
            .expect("timer table has free slots");
    }

    let mut sink = JsonStatusSink;
    let mut now_ms = 0u64;
    for _ in 0..cycles {
        now_ms += CYCLE_PERIOD_MS;

        timers.dispatch(now_ms, &mut sim);
        {
            let mut bus = bus.lock();
            for event in sim.pending.drain(..) {
                bus.handle_event(event);
            }
        }

        let receiver = arbiter.frame_source_mut();
        if sim.link_dropped {
            receiver.available = false;
        } else {
            let mut frame = neutral_operator_frame(now_ms);
            if now_ms >= engage_at {
                frame.channels[channel_map::SWITCH_REMOTE_CONTROL] = 1800;
                frame.channels[channel_map::SWITCH_UNLOCK] = 1800;
                frame.channels[channel_map::THROTTLE] = 1000;
            }
            receiver.frame = frame;
            receiver.available = true;
        }

        arbiter.dispatch(now_ms, &mut sink);
    }

    let port_actions = bus.lock().port().actions.len();
    info!(cycles, port_actions, "simulation finished");
    println!(
        "{} mode={:?} port-actions={}",
        "done".bold().green(),
        arbiter.current_mode(),
        port_actions
    );
}
