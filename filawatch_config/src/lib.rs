#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the filament flow monitor.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Validation is loud: a malformed persisted file is an operator error and
//!   should fail early with a precise message. The runtime clamping path in
//!   `filawatch_core` handles per-tick out-of-range values silently instead.
use serde::Deserialize;

/// Which jam evidence may trigger a pause.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetectionModeCfg {
    #[default]
    Both,
    Hard,
    Soft,
}

/// How expected/actual distances are smoothed before comparison.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrackingModeCfg {
    Cumulative,
    #[default]
    Windowed,
    Ewma,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Detection {
    pub mode: DetectionModeCfg,
    /// Soft-jam passing threshold: below this fraction of expected flow,
    /// the window counts as under-extruding.
    pub ratio_threshold: f32,
    /// Expected distance with zero movement that characterizes a hard jam.
    pub hard_jam_mm: f32,
    /// Sustained under-extrusion time before a soft jam triggers.
    pub soft_jam_time_ms: u64,
    /// Sustained near-zero flow time before a hard jam triggers.
    pub hard_jam_time_ms: u64,
    /// Detection suppression window after print start, resume, or a
    /// telemetry gap.
    pub grace_time_ms: u64,
    /// Extra start budget granted until the first sensor pulse arrives.
    pub start_timeout_ms: u64,
    /// Evaluation tick interval; also caps per-tick accumulation credit.
    pub check_interval_ms: u64,
    /// Hard-jam passing threshold (stricter than `ratio_threshold`).
    pub hard_pass_ratio: f32,
}

impl Default for Detection {
    fn default() -> Self {
        Self {
            mode: DetectionModeCfg::Both,
            ratio_threshold: 0.25,
            hard_jam_mm: 5.0,
            soft_jam_time_ms: 7_000,
            hard_jam_time_ms: 3_000,
            grace_time_ms: 5_000,
            start_timeout_ms: 2_000,
            check_interval_ms: 1_000,
            hard_pass_ratio: 0.10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Tracking {
    pub mode: TrackingModeCfg,
    /// Trailing comparison window for windowed mode.
    pub window_ms: u64,
    /// EWMA smoothing factor for ewma mode. Range: [0.01, 1.0].
    pub ewma_alpha: f32,
}

impl Default for Tracking {
    fn default() -> Self {
        Self {
            mode: TrackingModeCfg::Windowed,
            window_ms: 5_000,
            ewma_alpha: 0.3,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Sensor {
    /// Filament length per sensor pulse, from device calibration.
    pub mm_per_pulse: f32,
    /// Request a pause when the runout switch reports no filament.
    pub pause_on_runout: bool,
    /// Consecutive absent samples required to latch runout.
    pub runout_debounce_n: u8,
    /// Max time to wait for a movement edge per listener poll.
    pub edge_timeout_ms: u64,
}

impl Default for Sensor {
    fn default() -> Self {
        Self {
            mm_per_pulse: 2.88,
            pause_on_runout: true,
            runout_debounce_n: 3,
            edge_timeout_ms: 150,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub detection: Detection,
    pub tracking: Tracking,
    pub sensor: Sensor,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Detection
        if !(self.detection.ratio_threshold > 0.0 && self.detection.ratio_threshold <= 1.0) {
            eyre::bail!("detection.ratio_threshold must be in (0.0, 1.0]");
        }
        if !(self.detection.hard_pass_ratio > 0.0 && self.detection.hard_pass_ratio < 1.0) {
            eyre::bail!("detection.hard_pass_ratio must be in (0.0, 1.0)");
        }
        if self.detection.hard_pass_ratio > self.detection.ratio_threshold {
            eyre::bail!("detection.hard_pass_ratio must not exceed detection.ratio_threshold");
        }
        if self.detection.hard_jam_mm <= 0.0 {
            eyre::bail!("detection.hard_jam_mm must be > 0");
        }
        if self.detection.soft_jam_time_ms == 0 {
            eyre::bail!("detection.soft_jam_time_ms must be >= 1");
        }
        if self.detection.hard_jam_time_ms == 0 {
            eyre::bail!("detection.hard_jam_time_ms must be >= 1");
        }
        if self.detection.check_interval_ms == 0 {
            eyre::bail!("detection.check_interval_ms must be >= 1");
        }
        if self.detection.grace_time_ms > 5 * 60 * 1000 {
            eyre::bail!("detection.grace_time_ms is unreasonably large (>5min)");
        }
        if self.detection.soft_jam_time_ms > 10 * 60 * 1000 {
            eyre::bail!("detection.soft_jam_time_ms is unreasonably large (>10min)");
        }
        if self.detection.hard_jam_time_ms > 10 * 60 * 1000 {
            eyre::bail!("detection.hard_jam_time_ms is unreasonably large (>10min)");
        }

        // Tracking
        if self.tracking.window_ms == 0 {
            eyre::bail!("tracking.window_ms must be >= 1");
        }
        if self.tracking.window_ms > 60 * 1000 {
            eyre::bail!("tracking.window_ms is unreasonably large (>60s)");
        }
        if !(self.tracking.ewma_alpha > 0.0 && self.tracking.ewma_alpha <= 1.0) {
            eyre::bail!("tracking.ewma_alpha must be in (0.0, 1.0]");
        }

        // Sensor
        if self.sensor.mm_per_pulse <= 0.0 {
            eyre::bail!("sensor.mm_per_pulse must be > 0");
        }
        if self.sensor.runout_debounce_n == 0 {
            eyre::bail!("sensor.runout_debounce_n must be >= 1");
        }
        if self.sensor.edge_timeout_ms == 0 {
            eyre::bail!("sensor.edge_timeout_ms must be >= 1");
        }

        Ok(())
    }
}
