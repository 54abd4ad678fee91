//! Reconciliation of expected vs. actual filament distance.
//!
//! The planner reports a cumulative extrusion position in noisy bursts; the
//! movement sensor reports discrete pulses that lag the planner by a variable
//! pipeline delay. `FlowTracker` turns the two into a comparable pair using
//! one of three smoothing strategies selected at construction.
//!
//! All entry points take the caller's monotonic clock reading; the tracker
//! owns no clock and performs no allocation after construction.

use crate::config::{TrackerCfg, TrackingMode};
use crate::util::rate_mm_per_sec;
use crate::window::SampleWindow;

/// Telemetry deltas below this are jitter, not movement.
const MIN_DELTA_MM: f32 = 0.01;

/// A telemetry silence longer than this, followed by net positive movement,
/// re-arms the grace clock (sparse infill, travel moves, pauses, speed
/// changes).
const GAP_RESYNC_MS: u64 = 2_000;

/// Strategy state for distance smoothing. Selected once at construction; the
/// uniform contract is on_expected_delta / on_actual_delta plus the two
/// distance getters on [`FlowTracker`].
#[derive(Debug, Clone)]
enum Tracking {
    /// Running totals since the last baseline resync; state lives in the
    /// tracker's cumulative accumulators.
    Cumulative,
    /// Trailing time window of paired samples.
    Windowed(SampleWindow),
    /// Exponentially weighted moving average of deltas.
    Ewma {
        expected: f32,
        actual: f32,
        /// Absolute position consumed by the last expected-delta update.
        last_expected_pos: f32,
    },
}

/// Reconciles planner telemetry and sensor pulses over a trailing window.
#[derive(Debug, Clone)]
pub struct FlowTracker {
    cfg: TrackerCfg,
    tracking: Tracking,

    initialized: bool,
    first_pulse_received: bool,

    /// Grace clock: re-armed on reset and on telemetry-gap resync, but not on
    /// retraction (frequent small retractions must not keep detection
    /// disarmed).
    grace_clock_ms: u64,
    /// Time of the last telemetry call, for gap measurement.
    last_telemetry_ms: u64,
    last_sensor_pulse_ms: u64,
    /// When the cumulative baseline was last resynced, for rate derivation.
    baseline_since_ms: u64,

    baseline_position_mm: f32,
    expected_position_mm: f32,
    sensor_distance_mm: f32,
}

impl FlowTracker {
    pub fn new(cfg: TrackerCfg, now_ms: u64) -> Self {
        let mut cfg = cfg;
        cfg.ewma_alpha = cfg.ewma_alpha.clamp(0.01, 1.0);
        cfg.window_ms = cfg.window_ms.max(1);
        let mut t = Self {
            cfg,
            tracking: Self::fresh_tracking(cfg),
            initialized: false,
            first_pulse_received: false,
            grace_clock_ms: now_ms,
            last_telemetry_ms: now_ms,
            last_sensor_pulse_ms: now_ms,
            baseline_since_ms: now_ms,
            baseline_position_mm: 0.0,
            expected_position_mm: 0.0,
            sensor_distance_mm: 0.0,
        };
        t.reset(now_ms);
        t
    }

    fn fresh_tracking(cfg: TrackerCfg) -> Tracking {
        match cfg.mode {
            TrackingMode::Cumulative => Tracking::Cumulative,
            TrackingMode::Windowed => Tracking::Windowed(SampleWindow::new()),
            TrackingMode::Ewma => Tracking::Ewma {
                expected: 0.0,
                actual: 0.0,
                last_expected_pos: 0.0,
            },
        }
    }

    /// Clear all accumulators, buffers, and flags; timestamps resync to `now_ms`.
    pub fn reset(&mut self, now_ms: u64) {
        self.initialized = false;
        self.first_pulse_received = false;
        self.grace_clock_ms = now_ms;
        self.last_telemetry_ms = now_ms;
        self.last_sensor_pulse_ms = now_ms;
        self.baseline_since_ms = now_ms;
        self.baseline_position_mm = 0.0;
        self.expected_position_mm = 0.0;
        self.sensor_distance_mm = 0.0;
        self.tracking = Self::fresh_tracking(self.cfg);
    }

    /// Feed one planner telemetry update: an absolute cumulative extrusion
    /// position. Retraction is signaled implicitly by a decrease.
    pub fn update_expected_position(&mut self, cumulative_mm: f32, now_ms: u64) {
        if !cumulative_mm.is_finite() {
            return;
        }
        if !self.initialized {
            self.initialized = true;
            self.grace_clock_ms = now_ms;
            self.last_telemetry_ms = now_ms;
            self.baseline_since_ms = now_ms;
            self.baseline_position_mm = cumulative_mm;
            self.expected_position_mm = cumulative_mm;
            self.sensor_distance_mm = 0.0;
            if let Tracking::Ewma {
                last_expected_pos, ..
            } = &mut self.tracking
            {
                *last_expected_pos = cumulative_mm;
            }
            return;
        }

        // Retraction: resync every baseline and drop the window, but leave
        // the grace clock alone.
        if cumulative_mm < self.expected_position_mm {
            self.resync_baseline(cumulative_mm, now_ms);
        }

        let expected_delta = cumulative_mm - self.expected_position_mm;

        // Telemetry-gap resync: silence followed by real movement re-arms the
        // grace clock so detection gets a fresh settling window.
        let since_last = now_ms.saturating_sub(self.last_telemetry_ms);
        if since_last > GAP_RESYNC_MS && expected_delta > MIN_DELTA_MM {
            tracing::debug!(gap_ms = since_last, "telemetry gap; grace re-armed");
            self.grace_clock_ms = now_ms;
        }

        // Purge gating: until the sensor has proven movement once, expected
        // distance must not count against the window.
        if self.first_pulse_received && expected_delta > MIN_DELTA_MM {
            match &mut self.tracking {
                Tracking::Cumulative => {}
                Tracking::Windowed(window) => {
                    window.prune_older_than(now_ms.saturating_sub(self.cfg.window_ms));
                    window.push(now_ms, expected_delta, 0.0);
                }
                Tracking::Ewma {
                    expected,
                    last_expected_pos,
                    ..
                } => {
                    let delta = cumulative_mm - *last_expected_pos;
                    *expected =
                        self.cfg.ewma_alpha * delta + (1.0 - self.cfg.ewma_alpha) * *expected;
                    *last_expected_pos = cumulative_mm;
                }
            }
        }

        self.expected_position_mm = cumulative_mm;
        self.last_telemetry_ms = now_ms;
    }

    /// Feed one detected sensor pulse. No-op for non-positive pulse lengths
    /// or before the first telemetry update.
    pub fn add_sensor_pulse(&mut self, mm_per_pulse: f32, now_ms: u64) {
        if !(mm_per_pulse > 0.0) || !self.initialized {
            return;
        }
        self.last_sensor_pulse_ms = now_ms;

        // First pulse: the sensor has confirmed real movement. Resync the
        // baseline to the current expected position and drop anything the
        // window collected during priming, so purge extrusion never shows up
        // as a deficit.
        if !self.first_pulse_received {
            self.first_pulse_received = true;
            self.resync_baseline(self.expected_position_mm, now_ms);
        }

        self.sensor_distance_mm += mm_per_pulse;
        match &mut self.tracking {
            Tracking::Cumulative => {}
            Tracking::Windowed(window) => {
                if let Some(s) = window.newest_mut() {
                    s.actual_mm += mm_per_pulse;
                }
            }
            Tracking::Ewma { actual, .. } => {
                *actual = self.cfg.ewma_alpha * mm_per_pulse + (1.0 - self.cfg.ewma_alpha) * *actual;
            }
        }
    }

    /// Reset baselines/window to `position_mm` without touching the grace
    /// clock. Shared by retraction handling and first-pulse sync.
    fn resync_baseline(&mut self, position_mm: f32, now_ms: u64) {
        self.baseline_position_mm = position_mm;
        self.sensor_distance_mm = 0.0;
        self.baseline_since_ms = now_ms;
        match &mut self.tracking {
            Tracking::Cumulative => {}
            Tracking::Windowed(window) => window.clear(),
            Tracking::Ewma {
                expected,
                actual,
                last_expected_pos,
            } => {
                *expected = 0.0;
                *actual = 0.0;
                *last_expected_pos = position_mm;
            }
        }
    }

    /// Expected distance over the active window/horizon.
    pub fn expected_distance(&self) -> f32 {
        if !self.initialized {
            return 0.0;
        }
        match &self.tracking {
            Tracking::Cumulative => self.expected_position_mm - self.baseline_position_mm,
            Tracking::Windowed(window) => window.sums().0,
            Tracking::Ewma { expected, .. } => *expected,
        }
    }

    /// Sensor-confirmed distance over the active window/horizon.
    pub fn sensor_distance(&self) -> f32 {
        if !self.initialized {
            return 0.0;
        }
        match &self.tracking {
            Tracking::Cumulative => self.sensor_distance_mm,
            Tracking::Windowed(window) => window.sums().1,
            Tracking::Ewma { actual, .. } => *actual,
        }
    }

    /// Shortfall of actual behind expected, floored at zero.
    pub fn deficit(&self) -> f32 {
        (self.expected_distance() - self.sensor_distance()).max(0.0)
    }

    /// actual/expected clamped to [0, 1.5]; 0 when uninitialized or the
    /// window requested no extrusion.
    pub fn flow_ratio(&self) -> f32 {
        if !self.initialized {
            return 0.0;
        }
        let expected = self.expected_distance();
        if expected <= 0.0 {
            return 0.0;
        }
        (self.sensor_distance() / expected).clamp(0.0, 1.5)
    }

    /// Windowed (expected, actual) rates in mm/s.
    pub fn windowed_rates(&self, now_ms: u64) -> (f32, f32) {
        if !self.initialized {
            return (0.0, 0.0);
        }
        let span_ms = match &self.tracking {
            Tracking::Windowed(window) => match window.oldest() {
                Some(oldest) => now_ms.saturating_sub(oldest.timestamp_ms).max(1),
                None => return (0.0, 0.0),
            },
            Tracking::Cumulative => now_ms.saturating_sub(self.baseline_since_ms).max(1),
            // EWMA values are smoothed deltas; report them over the nominal
            // window horizon.
            Tracking::Ewma { .. } => self.cfg.window_ms,
        };
        (
            rate_mm_per_sec(self.expected_distance(), span_ms),
            rate_mm_per_sec(self.sensor_distance(), span_ms),
        )
    }

    /// True while `now` is within `grace_ms` of the last grace-clock re-arm.
    pub fn is_within_grace_period(&self, grace_ms: u64, now_ms: u64) -> bool {
        if !self.initialized || grace_ms == 0 {
            return false;
        }
        now_ms.saturating_sub(self.grace_clock_ms) < grace_ms
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn first_pulse_received(&self) -> bool {
        self.first_pulse_received
    }

    /// Absolute cumulative position last reported by the planner.
    pub fn expected_position_mm(&self) -> f32 {
        self.expected_position_mm
    }

    pub fn last_sensor_pulse_ms(&self) -> u64 {
        self.last_sensor_pulse_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TrackerCfg, TrackingMode};

    fn cumulative_tracker(now: u64) -> FlowTracker {
        FlowTracker::new(
            TrackerCfg {
                mode: TrackingMode::Cumulative,
                ..TrackerCfg::default()
            },
            now,
        )
    }

    #[test]
    fn ewma_alpha_is_clamped_at_construction() {
        let t = FlowTracker::new(
            TrackerCfg {
                mode: TrackingMode::Ewma,
                ewma_alpha: 9.0,
                ..TrackerCfg::default()
            },
            0,
        );
        assert!((t.cfg.ewma_alpha - 1.0).abs() < 1e-6);
        let t = FlowTracker::new(
            TrackerCfg {
                mode: TrackingMode::Ewma,
                ewma_alpha: 0.0,
                ..TrackerCfg::default()
            },
            0,
        );
        assert!((t.cfg.ewma_alpha - 0.01).abs() < 1e-6);
    }

    #[test]
    fn cumulative_mode_tracks_position_minus_baseline() {
        let mut t = cumulative_tracker(0);
        t.update_expected_position(100.0, 1_000);
        t.add_sensor_pulse(2.88, 1_050);
        t.update_expected_position(110.0, 2_000);
        assert!((t.expected_distance() - 10.0).abs() < 1e-4);
        assert!((t.sensor_distance() - 2.88).abs() < 1e-4);
    }

    #[test]
    fn retraction_resyncs_cumulative_baseline() {
        let mut t = cumulative_tracker(0);
        t.update_expected_position(100.0, 1_000);
        t.add_sensor_pulse(2.88, 1_100);
        t.update_expected_position(110.0, 2_000);
        // Planner pulls back 3 mm.
        t.update_expected_position(107.0, 3_000);
        assert!((t.expected_distance() - 0.0).abs() < 1e-4);
        assert!((t.sensor_distance() - 0.0).abs() < 1e-4);
        // Movement after the retraction tracks from the new baseline.
        t.update_expected_position(109.0, 3_500);
        assert!((t.expected_distance() - 2.0).abs() < 1e-4);
    }

    #[test]
    fn non_finite_telemetry_is_ignored() {
        let mut t = cumulative_tracker(0);
        t.update_expected_position(f32::NAN, 1_000);
        assert!(!t.is_initialized());
        t.update_expected_position(10.0, 1_100);
        t.update_expected_position(f32::INFINITY, 1_200);
        assert!((t.expected_position_mm() - 10.0).abs() < 1e-6);
    }
}
