//! Simulated print session.
//!
//! Drives the monitor through a healthy printing phase followed by a feed
//! stall, using a simulated edge source in place of the real movement sensor.
//! Run with `cargo run --example simulated_print -p filawatch_core`.

use filawatch_core::{EdgeListener, JamConfig, Monitor, SensorCfg, TickCtx, TrackerCfg};
use filawatch_traits::{Clock, EdgeSource, MonotonicClock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Emits one edge per `wait_edge` call while `flowing` is set; otherwise
/// times out, like a sensor watching stopped filament.
struct SimulatedSensor {
    flowing: Arc<AtomicBool>,
}

impl EdgeSource for SimulatedSensor {
    fn wait_edge(
        &mut self,
        timeout: Duration,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        std::thread::sleep(timeout);
        Ok(self.flowing.load(Ordering::Relaxed))
    }
}

fn main() -> Result<(), eyre::Report> {
    let clock = MonotonicClock::new();
    let epoch = clock.now();

    let flowing = Arc::new(AtomicBool::new(true));
    let listener = EdgeListener::spawn(
        SimulatedSensor {
            flowing: flowing.clone(),
        },
        Duration::from_millis(20),
        clock,
    );

    // Short comparison window so the stall becomes visible quickly.
    let mut monitor = Monitor::builder()
        .with_tracker(TrackerCfg {
            window_ms: 1_000,
            ..TrackerCfg::default()
        })
        .with_sensor(SensorCfg::default())
        .build(clock.ms_since(epoch))?;
    monitor.start_print(clock.ms_since(epoch));

    // Short windows so the demo finishes in a few seconds of wall clock.
    let config = JamConfig {
        grace_time_ms: 300,
        start_timeout_ms: 200,
        hard_jam_time_ms: 800,
        check_interval_ms: 100,
        ..JamConfig::default()
    };

    let mut position = 0.0f32;
    monitor.on_telemetry(position, clock.ms_since(epoch));

    for step in 0..60 {
        // Stop the filament feed two seconds in.
        if step == 20 {
            flowing.store(false, Ordering::Relaxed);
            println!("-- feed stalled --");
        }

        clock.sleep(Duration::from_millis(100));
        let now = clock.ms_since(epoch);

        position += 1.5;
        monitor.on_telemetry(position, now);
        monitor.drain_pulses(listener.counter(), now);

        let state = monitor.tick(
            &TickCtx {
                now_ms: now,
                is_printing: true,
                has_telemetry: true,
            },
            &config,
        );
        println!(
            "t={now:>5}ms grace={:?} pass={:.2} hard={:>3.0}% jammed={}",
            state.grace, state.pass_ratio, state.hard_jam_percent, state.jammed
        );

        if monitor.pause_needed() {
            monitor.set_pause_requested();
            println!("-- pause requested --");
            break;
        }
    }
    Ok(())
}
