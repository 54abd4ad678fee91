//! Runtime configuration for the monitor core.
//!
//! These are the per-tick/boot snapshot structs consumed by `FlowTracker`,
//! `JamClassifier`, and `Monitor`. They are separate from the TOML-deserialized
//! schema in `filawatch_config`: the persisted file is validated loudly, while
//! these runtime values are clamped silently so a bad snapshot can never crash
//! the control loop mid-print.

use crate::state::DetectionMode;

/// Fallback values applied by [`JamConfig::clamped`] when a field is
/// out of range. These are deliberately conservative (longer debounce than the
/// shipping defaults) so a corrupted snapshot errs toward false negatives.
const FALLBACK_RATIO_THRESHOLD: f32 = 0.25;
const FALLBACK_SOFT_JAM_TIME_MS: u64 = 10_000;
const FALLBACK_HARD_JAM_TIME_MS: u64 = 5_000;
const FALLBACK_CHECK_INTERVAL_MS: u64 = 1_000;
const FALLBACK_HARD_PASS_RATIO: f32 = 0.10;
const FALLBACK_HARD_JAM_MM: f32 = 5.0;

/// Jam detection thresholds, read once per evaluation tick.
#[derive(Debug, Clone, Copy)]
pub struct JamConfig {
    /// Soft-jam passing threshold, (0, 1].
    pub ratio_threshold: f32,
    /// Expected distance with zero movement that characterizes a hard jam.
    pub hard_jam_mm: f32,
    /// Sustained under-extrusion time before a soft jam triggers.
    pub soft_jam_time_ms: u64,
    /// Sustained near-zero flow time before a hard jam triggers.
    pub hard_jam_time_ms: u64,
    /// Detection suppression window after start/resume/telemetry gap.
    pub grace_time_ms: u64,
    /// Extra start budget granted until the first pulse proves the pipeline.
    pub start_timeout_ms: u64,
    /// Evaluation tick interval; caps per-tick accumulation credit.
    pub check_interval_ms: u64,
    /// Hard-jam passing threshold, (0, 1). Stricter than `ratio_threshold`.
    pub hard_pass_ratio: f32,
    pub detection_mode: DetectionMode,
}

impl Default for JamConfig {
    fn default() -> Self {
        Self {
            ratio_threshold: 0.25,
            hard_jam_mm: 5.0,
            soft_jam_time_ms: 7_000,
            hard_jam_time_ms: 3_000,
            grace_time_ms: 5_000,
            start_timeout_ms: 2_000,
            check_interval_ms: 1_000,
            hard_pass_ratio: 0.10,
            detection_mode: DetectionMode::Both,
        }
    }
}

impl JamConfig {
    /// Return a copy with every out-of-range field replaced by its fallback.
    /// NaN compares false against every range check and therefore also maps
    /// to the fallback. Idempotent.
    #[must_use]
    pub fn clamped(&self) -> Self {
        let mut c = *self;
        if !(c.ratio_threshold > 0.0) {
            c.ratio_threshold = FALLBACK_RATIO_THRESHOLD;
        }
        if c.ratio_threshold > 1.0 {
            c.ratio_threshold = 1.0;
        }
        if !(c.hard_jam_mm > 0.0) {
            c.hard_jam_mm = FALLBACK_HARD_JAM_MM;
        }
        if c.soft_jam_time_ms == 0 {
            c.soft_jam_time_ms = FALLBACK_SOFT_JAM_TIME_MS;
        }
        if c.hard_jam_time_ms == 0 {
            c.hard_jam_time_ms = FALLBACK_HARD_JAM_TIME_MS;
        }
        if c.check_interval_ms == 0 {
            c.check_interval_ms = FALLBACK_CHECK_INTERVAL_MS;
        }
        if !(c.hard_pass_ratio > 0.0 && c.hard_pass_ratio < 1.0) {
            c.hard_pass_ratio = FALLBACK_HARD_PASS_RATIO;
        }
        c
    }
}

/// How the tracker smooths expected/actual distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingMode {
    /// Running totals since the last baseline resync.
    Cumulative,
    /// Trailing time window of paired samples.
    #[default]
    Windowed,
    /// Exponentially weighted moving average of deltas.
    Ewma,
}

/// Tracker construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct TrackerCfg {
    pub mode: TrackingMode,
    /// Trailing window length for windowed mode.
    pub window_ms: u64,
    /// EWMA smoothing factor; clamped to [0.01, 1.0] at construction.
    pub ewma_alpha: f32,
}

impl Default for TrackerCfg {
    fn default() -> Self {
        Self {
            mode: TrackingMode::Windowed,
            window_ms: 5_000,
            ewma_alpha: 0.3,
        }
    }
}

/// Sensor and runout parameters for the monitor façade.
#[derive(Debug, Clone, Copy)]
pub struct SensorCfg {
    /// Filament length per sensor pulse (device calibration constant).
    pub mm_per_pulse: f32,
    /// Request a pause when the runout switch latches.
    pub pause_on_runout: bool,
    /// Consecutive absent samples required to latch runout.
    pub runout_debounce_n: u8,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            mm_per_pulse: 2.88,
            pause_on_runout: true,
            runout_debounce_n: 3,
        }
    }
}

impl From<&filawatch_config::Detection> for JamConfig {
    fn from(d: &filawatch_config::Detection) -> Self {
        Self {
            ratio_threshold: d.ratio_threshold,
            hard_jam_mm: d.hard_jam_mm,
            soft_jam_time_ms: d.soft_jam_time_ms,
            hard_jam_time_ms: d.hard_jam_time_ms,
            grace_time_ms: d.grace_time_ms,
            start_timeout_ms: d.start_timeout_ms,
            check_interval_ms: d.check_interval_ms,
            hard_pass_ratio: d.hard_pass_ratio,
            detection_mode: match d.mode {
                filawatch_config::DetectionModeCfg::Both => DetectionMode::Both,
                filawatch_config::DetectionModeCfg::Hard => DetectionMode::HardOnly,
                filawatch_config::DetectionModeCfg::Soft => DetectionMode::SoftOnly,
            },
        }
    }
}

impl From<&filawatch_config::Tracking> for TrackerCfg {
    fn from(t: &filawatch_config::Tracking) -> Self {
        Self {
            mode: match t.mode {
                filawatch_config::TrackingModeCfg::Cumulative => TrackingMode::Cumulative,
                filawatch_config::TrackingModeCfg::Windowed => TrackingMode::Windowed,
                filawatch_config::TrackingModeCfg::Ewma => TrackingMode::Ewma,
            },
            window_ms: t.window_ms,
            ewma_alpha: t.ewma_alpha,
        }
    }
}

impl From<&filawatch_config::Sensor> for SensorCfg {
    fn from(s: &filawatch_config::Sensor) -> Self {
        Self {
            mm_per_pulse: s.mm_per_pulse,
            pause_on_runout: s.pause_on_runout,
            runout_debounce_n: s.runout_debounce_n,
        }
    }
}
