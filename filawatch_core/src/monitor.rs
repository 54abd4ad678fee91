//! Monitor façade: one tracker, one classifier, one runout latch.
//!
//! The driving loop feeds telemetry and pulses between ticks and calls
//! [`Monitor::tick`] once per check interval. The classifier stays decoupled
//! from the tracker: the monitor reads the tracker's windowed pair and hands
//! it over as plain numbers.

use crate::classifier::{JamClassifier, TickInput};
use crate::config::{SensorCfg, TrackerCfg};
use crate::error::BuildError;
use crate::pulse::PulseCounter;
use crate::runout::RunoutLatch;
use crate::state::JamState;
use crate::tracker::FlowTracker;

/// Per-tick context supplied by the driving loop.
#[derive(Debug, Clone, Copy)]
pub struct TickCtx {
    pub now_ms: u64,
    pub is_printing: bool,
    /// False while the telemetry link is down.
    pub has_telemetry: bool,
}

#[derive(Debug, Default)]
pub struct MonitorBuilder {
    tracker: TrackerCfg,
    sensor: SensorCfg,
}

impl MonitorBuilder {
    #[must_use]
    pub fn with_tracker(mut self, cfg: TrackerCfg) -> Self {
        self.tracker = cfg;
        self
    }

    #[must_use]
    pub fn with_sensor(mut self, cfg: SensorCfg) -> Self {
        self.sensor = cfg;
        self
    }

    pub fn build(self, now_ms: u64) -> Result<Monitor, BuildError> {
        if !(self.sensor.mm_per_pulse > 0.0) || !self.sensor.mm_per_pulse.is_finite() {
            return Err(BuildError::InvalidSensor("mm_per_pulse must be > 0"));
        }
        if self.tracker.window_ms == 0 {
            return Err(BuildError::InvalidTracker("window_ms must be > 0"));
        }
        if !self.tracker.ewma_alpha.is_finite() {
            return Err(BuildError::InvalidTracker("ewma_alpha must be finite"));
        }
        Ok(Monitor {
            tracker: FlowTracker::new(self.tracker, now_ms),
            classifier: JamClassifier::new(),
            runout: RunoutLatch::new(self.sensor.runout_debounce_n),
            sensor: self.sensor,
            pulse_count: 0,
            print_start_ms: now_ms,
        })
    }
}

#[derive(Debug)]
pub struct Monitor {
    tracker: FlowTracker,
    classifier: JamClassifier,
    runout: RunoutLatch,
    sensor: SensorCfg,
    /// Pulses observed since print start.
    pulse_count: u32,
    print_start_ms: u64,
}

impl Monitor {
    pub fn builder() -> MonitorBuilder {
        MonitorBuilder::default()
    }

    /// Arm everything for a new print starting at `now_ms`.
    pub fn start_print(&mut self, now_ms: u64) {
        tracing::info!(now_ms, "print start; monitor armed");
        self.tracker.reset(now_ms);
        self.classifier.reset(now_ms);
        self.runout.reset();
        self.pulse_count = 0;
        self.print_start_ms = now_ms;
    }

    /// Pause→resume: re-arm the classifier against the current position.
    pub fn resume_print(&mut self, now_ms: u64) {
        self.classifier
            .on_resume(now_ms, self.pulse_count, self.tracker.expected_position_mm());
    }

    /// One planner telemetry update.
    pub fn on_telemetry(&mut self, cumulative_mm: f32, now_ms: u64) {
        self.tracker.update_expected_position(cumulative_mm, now_ms);
    }

    /// One detected sensor pulse.
    pub fn on_pulse(&mut self, now_ms: u64) {
        self.pulse_count = self.pulse_count.saturating_add(1);
        self.tracker
            .add_sensor_pulse(self.sensor.mm_per_pulse, now_ms);
    }

    /// Drain the interrupt-side counter, crediting each edge at `now_ms`.
    /// Returns the number of edges consumed.
    pub fn drain_pulses(&mut self, counter: &PulseCounter, now_ms: u64) -> u32 {
        let n = counter.drain();
        for _ in 0..n {
            self.on_pulse(now_ms);
        }
        n
    }

    /// One runout switch sample (`true` = filament present).
    pub fn on_runout_sample(&mut self, present: bool) {
        self.runout.sample(present);
    }

    /// One evaluation tick: read the tracker pair, classify, return state.
    pub fn tick(&mut self, ctx: &TickCtx, config: &crate::config::JamConfig) -> JamState {
        let (expected_rate, actual_rate) = self.tracker.windowed_rates(ctx.now_ms);
        let input = TickInput {
            expected_mm: self.tracker.expected_distance(),
            actual_mm: self.tracker.sensor_distance(),
            pulse_count: self.pulse_count,
            is_printing: ctx.is_printing,
            has_telemetry: ctx.has_telemetry,
            now_ms: ctx.now_ms,
            print_start_ms: self.print_start_ms,
            expected_rate_mm_s: expected_rate,
            actual_rate_mm_s: actual_rate,
        };
        let state = self.classifier.update(&input, config);
        tracing::trace!(
            expected_mm = input.expected_mm,
            actual_mm = input.actual_mm,
            pass_ratio = state.pass_ratio,
            grace = ?state.grace,
            jammed = state.jammed,
            "tick"
        );
        state
    }

    /// True when the dispatcher should issue a pause: a confirmed jam, or a
    /// latched runout with pause-on-runout enabled, and no pause already
    /// requested for this event.
    pub fn pause_needed(&self) -> bool {
        let cause =
            self.classifier.state().jammed || (self.sensor.pause_on_runout && self.runout.is_runout());
        cause && !self.classifier.is_pause_requested()
    }

    pub fn is_pause_requested(&self) -> bool {
        self.classifier.is_pause_requested()
    }

    pub fn set_pause_requested(&mut self) {
        self.classifier.set_pause_requested();
    }

    pub fn clear_pause_request(&mut self) {
        self.classifier.clear_pause_request();
    }

    pub fn is_runout(&self) -> bool {
        self.runout.is_runout()
    }

    pub fn state(&self) -> JamState {
        self.classifier.state()
    }

    pub fn tracker(&self) -> &FlowTracker {
        &self.tracker
    }

    pub fn classifier(&self) -> &JamClassifier {
        &self.classifier
    }

    pub fn pulse_count(&self) -> u32 {
        self.pulse_count
    }
}
