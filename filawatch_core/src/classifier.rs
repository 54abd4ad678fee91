//! Debounced jam/runout decision over the reconciled flow pair.
//!
//! The classifier consumes plain numeric inputs each evaluation tick; it
//! never holds a reference to the tracker. Two accumulators debounce the two
//! jam shapes: a *hard* jam (near-total stoppage, short strict duration, with
//! a forgiveness rule that requires proof of renewed movement) and a *soft*
//! jam (partial under-extrusion, longer duration, cleared by any healthy
//! tick). A grace state machine suppresses detection around print start,
//! pause/resume, and telemetry loss.

use crate::config::JamConfig;
use crate::state::{DetectionMode, GraceState, JamState};

/// Below this much expected movement the window cannot witness a hard jam
/// (idle/travel/ironing windows request ~no filament).
const MIN_HARD_WINDOW_MM: f32 = 1.0;
/// Per-tick deficit floor for soft-jam accumulation.
const MIN_SOFT_PER_CHECK_MM: f32 = 0.25;
/// Total accumulated deficit required to arm a soft jam.
const MIN_SOFT_TOTAL_MM: f32 = 0.5;
/// Slack beyond the check interval within which a pulse counts as "recent"
/// for hard-jam forgiveness.
const PULSE_RECENT_SLACK_MS: u64 = 500;

/// Per-tick inputs, assembled by the driving loop.
#[derive(Debug, Clone, Copy)]
pub struct TickInput {
    /// Expected distance over the evaluation window (mm).
    pub expected_mm: f32,
    /// Sensor-confirmed distance over the evaluation window (mm).
    pub actual_mm: f32,
    /// Pulses observed since print start.
    pub pulse_count: u32,
    pub is_printing: bool,
    /// False while the telemetry link is down; treated exactly like grace.
    pub has_telemetry: bool,
    pub now_ms: u64,
    pub print_start_ms: u64,
    pub expected_rate_mm_s: f32,
    pub actual_rate_mm_s: f32,
}

/// Grace/active/jammed state machine with hard/soft jam accumulators.
#[derive(Debug, Clone)]
pub struct JamClassifier {
    grace: GraceState,

    hard_jam_accum_ms: u64,
    soft_jam_accum_ms: u64,
    soft_jam_deficit_mm: f32,
    last_evaluation_ms: Option<u64>,

    /// Pulse count at print start / resume; movement past this proves the
    /// pipeline is live.
    pulse_baseline: u32,
    last_pulse_count: u32,
    last_pulse_seen_ms: u64,

    resume_ms: u64,

    hard_latched: bool,
    soft_latched: bool,
    pause_requested: bool,

    last_state: JamState,
}

impl Default for JamClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl JamClassifier {
    pub fn new() -> Self {
        Self {
            grace: GraceState::Idle,
            hard_jam_accum_ms: 0,
            soft_jam_accum_ms: 0,
            soft_jam_deficit_mm: 0.0,
            last_evaluation_ms: None,
            pulse_baseline: 0,
            last_pulse_count: 0,
            last_pulse_seen_ms: 0,
            resume_ms: 0,
            hard_latched: false,
            soft_latched: false,
            pause_requested: false,
            last_state: JamState::default(),
        }
    }

    /// Arm detection for a new print. Clears every accumulator and latch and
    /// enters the start-grace window.
    pub fn reset(&mut self, print_start_ms: u64) {
        self.grace = GraceState::StartGrace;
        self.zero_accumulators();
        self.last_evaluation_ms = None;
        self.pulse_baseline = 0;
        self.last_pulse_count = 0;
        self.last_pulse_seen_ms = print_start_ms;
        self.resume_ms = print_start_ms;
        self.hard_latched = false;
        self.soft_latched = false;
        self.pause_requested = false;
        self.last_state = JamState {
            grace: GraceState::StartGrace,
            grace_active: true,
            pass_ratio: 1.0,
            ..JamState::default()
        };
    }

    /// Pause→resume: record the new baseline, clear accumulators and latches,
    /// and enter the resume-grace window.
    pub fn on_resume(&mut self, now_ms: u64, pulse_count: u32, baseline_mm: f32) {
        tracing::info!(baseline_mm, pulse_count, "resume; detection re-arming");
        self.grace = GraceState::ResumeGrace;
        self.zero_accumulators();
        self.last_evaluation_ms = None;
        self.pulse_baseline = pulse_count;
        self.last_pulse_count = pulse_count;
        self.last_pulse_seen_ms = now_ms;
        self.resume_ms = now_ms;
        self.hard_latched = false;
        self.soft_latched = false;
        self.pause_requested = false;
        self.last_state = JamState {
            grace: GraceState::ResumeGrace,
            grace_active: true,
            pass_ratio: 1.0,
            ..JamState::default()
        };
    }

    fn zero_accumulators(&mut self) {
        self.hard_jam_accum_ms = 0;
        self.soft_jam_accum_ms = 0;
        self.soft_jam_deficit_mm = 0.0;
    }

    /// Latest emitted state (identical to the last `update` return value).
    pub fn state(&self) -> JamState {
        self.last_state
    }

    pub fn is_pause_requested(&self) -> bool {
        self.pause_requested
    }

    pub fn set_pause_requested(&mut self) {
        self.pause_requested = true;
    }

    pub fn clear_pause_request(&mut self) {
        self.pause_requested = false;
    }

    /// One evaluation tick. Never fails; every input is defensively clamped.
    pub fn update(&mut self, input: &TickInput, config: &JamConfig) -> JamState {
        let cfg = config.clamped();
        let now = input.now_ms;

        // Not printing: detection disabled, everything released except the
        // pause latch (cleared only by reset/on_resume).
        if !input.is_printing {
            if self.grace != GraceState::Idle {
                tracing::debug!(from = ?self.grace, "print stopped; classifier idle");
            }
            self.grace = GraceState::Idle;
            self.zero_accumulators();
            self.last_evaluation_ms = None;
            self.hard_latched = false;
            self.soft_latched = false;
            self.last_state = JamState {
                grace: GraceState::Idle,
                pass_ratio: 1.0,
                ..JamState::default()
            };
            return self.last_state;
        }

        // Pulse bookkeeping: a count increase is proof of physical movement.
        if input.pulse_count < self.last_pulse_count {
            // Counter restarted upstream; resync without claiming movement.
            self.last_pulse_count = input.pulse_count;
        } else if input.pulse_count > self.last_pulse_count {
            self.last_pulse_count = input.pulse_count;
            self.last_pulse_seen_ms = now;
        }
        // Movement past the start/resume baseline proves the pipeline is live.
        let new_pulses = input.pulse_count > self.pulse_baseline;

        // Printing resumed without an explicit reset: treat as a fresh start.
        if self.grace == GraceState::Idle {
            self.grace = GraceState::StartGrace;
        }

        // Grace resolution.
        match self.grace {
            GraceState::StartGrace => {
                let elapsed = now.saturating_sub(input.print_start_ms);
                let expired = elapsed > cfg.start_timeout_ms + cfg.grace_time_ms
                    || (elapsed > cfg.grace_time_ms && new_pulses);
                if expired {
                    tracing::debug!(elapsed_ms = elapsed, "start grace over; detection armed");
                    self.grace = GraceState::Active;
                }
            }
            GraceState::ResumeGrace => {
                let elapsed = now.saturating_sub(self.resume_ms);
                let expired = elapsed > cfg.grace_time_ms + cfg.start_timeout_ms
                    || (elapsed > cfg.grace_time_ms && new_pulses);
                if expired {
                    tracing::debug!(elapsed_ms = elapsed, "resume grace over; detection armed");
                    self.grace = GraceState::Active;
                }
            }
            GraceState::Idle | GraceState::Active | GraceState::Jammed => {}
        }

        let in_grace_window =
            matches!(self.grace, GraceState::StartGrace | GraceState::ResumeGrace);
        // No signal means no detection: telemetry loss suppresses exactly
        // like a grace window.
        let grace_active = in_grace_window || !input.has_telemetry;

        let deficit = (input.expected_mm - input.actual_mm).max(0.0);
        let pass_ratio = if input.expected_mm > 0.0 {
            (input.actual_mm / input.expected_mm).max(0.0)
        } else {
            // An idle/travel window is fully healthy, not undefined.
            1.0
        };

        if grace_active {
            self.zero_accumulators();
            self.last_evaluation_ms = Some(now);
            self.last_state = JamState {
                jammed: self.grace == GraceState::Jammed,
                hard_jam_triggered: self.hard_latched,
                soft_jam_triggered: self.soft_latched,
                hard_jam_percent: 0.0,
                soft_jam_percent: 0.0,
                pass_ratio,
                deficit_mm: deficit,
                grace: self.grace,
                grace_active: true,
                expected_rate_mm_s: input.expected_rate_mm_s,
                actual_rate_mm_s: input.actual_rate_mm_s,
            };
            return self.last_state;
        }

        // Bound the wall-clock credit a single tick can contribute, so a
        // stalled loop cannot instantly satisfy a jam's time requirement.
        let evaluation_delta_ms = match self.last_evaluation_ms {
            None => cfg.check_interval_ms,
            Some(last) => now.saturating_sub(last).min(cfg.check_interval_ms),
        };
        self.last_evaluation_ms = Some(now);

        // Hard jam: near-total stoppage while the window demands movement.
        let hard_condition =
            input.expected_mm >= MIN_HARD_WINDOW_MM && pass_ratio < cfg.hard_pass_ratio;
        let pulse_recent = now.saturating_sub(self.last_pulse_seen_ms)
            <= cfg.check_interval_ms + PULSE_RECENT_SLACK_MS;
        if hard_condition {
            self.hard_jam_accum_ms =
                (self.hard_jam_accum_ms + evaluation_delta_ms).min(cfg.hard_jam_time_ms);
        } else if self.hard_jam_accum_ms > 0 && pulse_recent {
            // Forgiveness requires proof of renewed movement; a transient
            // ratio improvement with no pulses does not erase progress.
            self.hard_jam_accum_ms = 0;
        }

        let mut hard_triggered = false;
        if self.hard_jam_accum_ms >= cfg.hard_jam_time_ms {
            if input.expected_mm >= MIN_HARD_WINDOW_MM {
                hard_triggered = true;
            } else {
                // Accumulation stale-carried into an idle window; discard it.
                self.hard_jam_accum_ms = 0;
            }
        }

        // Soft jam: sustained partial under-extrusion. Any healthy tick
        // clears all progress.
        let soft_condition = pass_ratio < cfg.ratio_threshold && deficit >= MIN_SOFT_PER_CHECK_MM;
        if soft_condition {
            self.soft_jam_accum_ms =
                (self.soft_jam_accum_ms + evaluation_delta_ms).min(cfg.soft_jam_time_ms);
            self.soft_jam_deficit_mm += deficit;
        } else {
            self.soft_jam_accum_ms = 0;
            self.soft_jam_deficit_mm = 0.0;
        }
        let soft_triggered = self.soft_jam_accum_ms >= cfg.soft_jam_time_ms
            && self.soft_jam_deficit_mm >= MIN_SOFT_TOTAL_MM;

        // Detection-mode gating.
        let (hard_triggered, soft_triggered) = match cfg.detection_mode {
            DetectionMode::Both => (hard_triggered, soft_triggered),
            DetectionMode::HardOnly => (hard_triggered, false),
            DetectionMode::SoftOnly => (false, soft_triggered),
        };

        if hard_triggered {
            self.hard_latched = true;
        }
        if soft_triggered {
            self.soft_latched = true;
        }
        let jammed = self.grace == GraceState::Jammed || hard_triggered || soft_triggered;

        if jammed && self.grace != GraceState::Jammed {
            tracing::warn!(
                hard = hard_triggered,
                soft = soft_triggered,
                pass_ratio,
                deficit_mm = deficit,
                "jam confirmed"
            );
            self.grace = GraceState::Jammed;
        }

        let hard_jam_percent = percent(self.hard_jam_accum_ms, cfg.hard_jam_time_ms);
        let soft_jam_percent = percent(self.soft_jam_accum_ms, cfg.soft_jam_time_ms);

        self.last_state = JamState {
            jammed,
            hard_jam_triggered: self.hard_latched,
            soft_jam_triggered: self.soft_latched,
            hard_jam_percent,
            soft_jam_percent,
            pass_ratio,
            deficit_mm: deficit,
            grace: self.grace,
            grace_active: false,
            expected_rate_mm_s: input.expected_rate_mm_s,
            actual_rate_mm_s: input.actual_rate_mm_s,
        };
        self.last_state
    }
}

fn percent(accum_ms: u64, required_ms: u64) -> f32 {
    if required_ms == 0 {
        return 0.0;
    }
    ((100.0 * accum_ms as f32) / required_ms as f32).clamp(0.0, 100.0)
}
