//! Trace replay: drive a `Monitor` from a recorded event stream.
//!
//! Trace CSV schema (headers enforced):
//!
//! ```text
//! time_ms,event,value
//! 0,telemetry,10.0
//! 150,pulse,1
//! 2000,runout,0
//! 9000,resume,0
//! ```
//!
//! Events: `telemetry` (cumulative extrusion mm), `pulse` (edge count),
//! `runout` (1 = filament present, 0 = absent), `resume` (pause→resume
//! marker; value ignored).

use eyre::WrapErr;
use filawatch_core::{GraceState, JamConfig, Monitor, SensorCfg, TickCtx, TrackerCfg};
use serde::Deserialize;
use std::io::Write;
use std::path::Path;

/// Telemetry is considered live while the last update is younger than this
/// many check intervals.
const TELEMETRY_LIVE_INTERVALS: u64 = 3;

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct TraceRow {
    pub time_ms: u64,
    #[serde(deserialize_with = "de_event")]
    pub event: TraceEvent,
    pub value: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    Telemetry,
    Pulse,
    Runout,
    Resume,
}

fn de_event<'de, D>(deserializer: D) -> Result<TraceEvent, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    match s.as_str() {
        "telemetry" => Ok(TraceEvent::Telemetry),
        "pulse" => Ok(TraceEvent::Pulse),
        "runout" => Ok(TraceEvent::Runout),
        "resume" => Ok(TraceEvent::Resume),
        other => Err(serde::de::Error::custom(format!(
            "unknown trace event '{other}' (expected telemetry|pulse|runout|resume)"
        ))),
    }
}

pub fn load_trace(path: &Path) -> eyre::Result<Vec<TraceRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open trace CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["time_ms", "event", "value"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "trace CSV must have headers 'time_ms,event,value', got: {}",
            actual.join(",")
        );
    }

    let mut rows: Vec<TraceRow> = Vec::new();
    for (idx, rec) in rdr.deserialize::<TraceRow>().enumerate() {
        match rec {
            Ok(row) => {
                if let Some(prev) = rows.last()
                    && row.time_ms < prev.time_ms
                {
                    eyre::bail!(
                        "trace row {} goes backwards in time ({} < {})",
                        idx + 2,
                        row.time_ms,
                        prev.time_ms
                    );
                }
                rows.push(row);
            }
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    Ok(rows)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReplaySummary {
    pub ticks: u64,
    pub pulses: u64,
    pub jam_detected: bool,
    pub first_jam_ms: Option<u64>,
    pub runout_detected: bool,
    pub pauses_requested: u32,
}

/// Run the trace through a freshly armed monitor, ticking every
/// `check_interval_ms`. Writes one JSON line per tick to `out` when
/// `emit_ticks` is set.
pub fn run(
    config: &filawatch_config::Config,
    rows: &[TraceRow],
    emit_ticks: bool,
    out: &mut impl Write,
) -> eyre::Result<ReplaySummary> {
    let jam_config = JamConfig::from(&config.detection);
    let mut monitor = Monitor::builder()
        .with_tracker(TrackerCfg::from(&config.tracking))
        .with_sensor(SensorCfg::from(&config.sensor))
        .build(0)
        .wrap_err("build monitor")?;

    let start_ms = rows.first().map_or(0, |r| r.time_ms);
    monitor.start_print(start_ms);

    let interval = jam_config.clamped().check_interval_ms;
    let mut next_tick = start_ms + interval;
    let mut last_telemetry_ms: Option<u64> = None;
    let mut summary = ReplaySummary::default();

    let end_ms = rows.last().map_or(start_ms, |r| r.time_ms);
    let mut idx = 0usize;
    while next_tick <= end_ms + interval {
        // Feed every event up to the tick boundary.
        while idx < rows.len() && rows[idx].time_ms <= next_tick {
            let row = rows[idx];
            match row.event {
                TraceEvent::Telemetry => {
                    monitor.on_telemetry(row.value, row.time_ms);
                    last_telemetry_ms = Some(row.time_ms);
                }
                TraceEvent::Pulse => {
                    let n = (row.value.max(0.0)) as u32;
                    for _ in 0..n.max(1) {
                        monitor.on_pulse(row.time_ms);
                        summary.pulses += 1;
                    }
                }
                TraceEvent::Runout => {
                    monitor.on_runout_sample(row.value > 0.5);
                }
                TraceEvent::Resume => {
                    monitor.resume_print(row.time_ms);
                }
            }
            idx += 1;
        }

        let has_telemetry = last_telemetry_ms
            .is_some_and(|t| next_tick.saturating_sub(t) < TELEMETRY_LIVE_INTERVALS * interval);
        let state = monitor.tick(
            &TickCtx {
                now_ms: next_tick,
                is_printing: true,
                has_telemetry,
            },
            &jam_config,
        );
        summary.ticks += 1;

        if state.jammed && summary.first_jam_ms.is_none() {
            summary.jam_detected = true;
            summary.first_jam_ms = Some(next_tick);
        }
        if monitor.is_runout() {
            summary.runout_detected = true;
        }
        if monitor.pause_needed() {
            monitor.set_pause_requested();
            summary.pauses_requested += 1;
            tracing::warn!(time_ms = next_tick, "pause requested");
        }

        if emit_ticks {
            let line = serde_json::json!({
                "time_ms": next_tick,
                "grace": grace_name(state.grace),
                "grace_active": state.grace_active,
                "jammed": state.jammed,
                "hard_pct": state.hard_jam_percent,
                "soft_pct": state.soft_jam_percent,
                "pass_ratio": state.pass_ratio,
                "deficit_mm": state.deficit_mm,
                "runout": monitor.is_runout(),
            });
            writeln!(out, "{line}").wrap_err("write tick line")?;
        }

        next_tick += interval;
    }

    Ok(summary)
}

pub fn grace_name(grace: GraceState) -> &'static str {
    match grace {
        GraceState::Idle => "idle",
        GraceState::StartGrace => "start_grace",
        GraceState::Active => "active",
        GraceState::ResumeGrace => "resume_grace",
        GraceState::Jammed => "jammed",
    }
}
