#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Filament flow monitoring core (hardware-agnostic).
//!
//! Reconciles two asynchronous signals — the motion planner's cumulative
//! extrusion position and the filament sensor's physical pulses — into a
//! comparable windowed pair, and turns that pair into a debounced jam/runout
//! decision. Hardware and transport stay behind `filawatch_traits`.
//!
//! ## Architecture
//!
//! - **Tracking**: expected/actual reconciliation with retraction and
//!   telemetry-gap resync (`tracker` module, ring in `window`)
//! - **Classification**: grace state machine + hard/soft jam accumulators
//!   (`classifier` module)
//! - **Configuration**: runtime snapshots with silent clamping (`config`)
//! - **Pulse plumbing**: interrupt-side atomic counter and edge listener
//!   (`pulse`)
//! - **Runout**: debounced switch latch (`runout`)
//! - **Monitor**: per-tick façade wiring the above (`monitor`)
//!
//! ## Timing
//!
//! Every entry point takes the caller's monotonic clock reading in
//! milliseconds; the core owns no clock and allocates nothing after
//! construction, bounding worst-case per-tick cost for control loops that
//! share the processor with other real-time duties.

pub mod classifier;
pub mod config;
pub mod error;
pub mod monitor;
pub mod pulse;
pub mod runout;
pub mod state;
pub mod tracker;
pub mod util;
pub mod window;

pub use classifier::{JamClassifier, TickInput};
pub use config::{JamConfig, SensorCfg, TrackerCfg, TrackingMode};
pub use error::{BuildError, Report, Result};
pub use monitor::{Monitor, MonitorBuilder, TickCtx};
pub use pulse::{EdgeListener, PulseCounter};
pub use runout::RunoutLatch;
pub use state::{DetectionMode, GraceState, JamState};
pub use tracker::FlowTracker;
pub use window::{MAX_SAMPLES, Sample, SampleWindow};
