//! Public classifier state emitted on every evaluation tick.

/// Detection phase of the jam classifier.
///
/// `Jammed` is latched: once entered it is cleared only by `reset()` or
/// `on_resume()`, never by a healthy tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraceState {
    /// Not printing; detection disabled.
    #[default]
    Idle,
    /// Suppressing detection while the print starts up (purge/prime).
    StartGrace,
    /// Detection armed.
    Active,
    /// Suppressing detection after a pause/resume.
    ResumeGrace,
    /// A jam was confirmed; latched until externally cleared.
    Jammed,
}

/// Which jam evidence may set `jammed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionMode {
    /// Hard or soft evidence triggers.
    #[default]
    Both,
    /// Only near-total flow stoppage triggers.
    HardOnly,
    /// Only gradual under-extrusion triggers.
    SoftOnly,
}

/// Snapshot of the classifier output, recomputed each tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JamState {
    pub jammed: bool,
    pub hard_jam_triggered: bool,
    pub soft_jam_triggered: bool,
    /// Progress toward the hard-jam time requirement, 0..=100.
    pub hard_jam_percent: f32,
    /// Progress toward the soft-jam time requirement, 0..=100.
    pub soft_jam_percent: f32,
    /// actual/expected over the evaluation window; 1.0 when expected is zero.
    pub pass_ratio: f32,
    /// max(0, expected - actual) over the evaluation window.
    pub deficit_mm: f32,
    pub grace: GraceState,
    /// True while any grace window (start, resume, telemetry loss) suppresses
    /// detection.
    pub grace_active: bool,
    pub expected_rate_mm_s: f32,
    pub actual_rate_mm_s: f32,
}
