//! Flow tracker behavior: initialization, purge gating, retraction resync,
//! telemetry gaps, window pruning, and the derived queries.

use filawatch_core::{FlowTracker, TrackerCfg, TrackingMode};
use rstest::rstest;

const MM_PER_PULSE: f32 = 2.88;

fn windowed(now: u64) -> FlowTracker {
    FlowTracker::new(TrackerCfg::default(), now)
}

#[test]
fn initial_state_is_zeroed() {
    let t = windowed(0);
    assert!(!t.is_initialized());
    assert_eq!(t.expected_distance(), 0.0);
    assert_eq!(t.sensor_distance(), 0.0);
    assert_eq!(t.deficit(), 0.0);
    assert_eq!(t.flow_ratio(), 0.0);
}

#[test]
fn reset_clears_session_and_is_idempotent() {
    let mut t = windowed(0);
    t.update_expected_position(50.0, 100);
    t.add_sensor_pulse(MM_PER_PULSE, 200);
    t.update_expected_position(55.0, 300);

    t.reset(1_000);
    assert!(!t.is_initialized());
    assert_eq!(t.deficit(), 0.0);
    assert_eq!(t.flow_ratio(), 0.0);

    // A second reset observes exactly the same state.
    t.reset(1_000);
    assert!(!t.is_initialized());
    assert_eq!(t.expected_distance(), 0.0);
    assert_eq!(t.sensor_distance(), 0.0);
}

#[test]
fn purge_extrusion_before_first_pulse_is_discarded() {
    let mut t = windowed(0);
    t.update_expected_position(10.0, 1_000);
    // Priming moves: planner extrudes but the sensor has never pulsed.
    t.update_expected_position(20.0, 1_500);
    t.update_expected_position(30.0, 1_900);
    assert_eq!(t.expected_distance(), 0.0);
    assert_eq!(t.deficit(), 0.0);

    // First pulse proves movement; tracking starts from here.
    t.add_sensor_pulse(MM_PER_PULSE, 2_000);
    t.update_expected_position(35.0, 2_400);
    assert!((t.expected_distance() - 5.0).abs() < 1e-4);
}

#[test]
fn pulses_pair_with_most_recent_sample() {
    let mut t = windowed(0);
    t.update_expected_position(10.0, 1_000);
    t.add_sensor_pulse(MM_PER_PULSE, 1_100);
    t.update_expected_position(15.0, 1_500);
    // Two pulses arrive late, after the telemetry burst they belong to.
    t.add_sensor_pulse(MM_PER_PULSE, 1_700);
    t.add_sensor_pulse(MM_PER_PULSE, 1_900);

    assert!((t.expected_distance() - 5.0).abs() < 1e-4);
    assert!((t.sensor_distance() - 2.0 * MM_PER_PULSE).abs() < 1e-4);
    assert!((t.deficit() - (5.0 - 2.0 * MM_PER_PULSE).max(0.0)).abs() < 1e-4);
}

#[test]
fn pulses_before_initialization_are_ignored() {
    let mut t = windowed(0);
    t.add_sensor_pulse(MM_PER_PULSE, 100);
    assert!(!t.is_initialized());
    assert_eq!(t.sensor_distance(), 0.0);
}

#[rstest]
#[case(0.0)]
#[case(-2.88)]
#[case(f32::NAN)]
fn degenerate_pulse_lengths_leave_state_unchanged(#[case] mm_per_pulse: f32) {
    let mut t = windowed(0);
    t.update_expected_position(10.0, 1_000);
    let before = t.sensor_distance();
    t.add_sensor_pulse(mm_per_pulse, 1_100);
    assert_eq!(t.sensor_distance(), before);
    assert!(!t.first_pulse_received());
}

#[test]
fn retraction_clears_window_but_not_grace_clock() {
    let mut t = windowed(0);
    t.update_expected_position(10.0, 100);
    t.add_sensor_pulse(MM_PER_PULSE, 200);
    t.update_expected_position(15.0, 300);
    assert!((t.expected_distance() - 5.0).abs() < 1e-4);
    assert!(t.is_within_grace_period(1_000, 500));

    // Planner pulls filament back: window drops, baselines resync.
    t.update_expected_position(12.0, 600);
    assert_eq!(t.expected_distance(), 0.0);
    assert_eq!(t.sensor_distance(), 0.0);

    // The grace clock still counts from initialization, so it expires on
    // schedule despite the retraction.
    assert!(t.is_within_grace_period(1_000, 900));
    assert!(!t.is_within_grace_period(1_000, 1_200));
}

#[test]
fn movement_after_retraction_tracks_from_new_baseline() {
    let mut t = windowed(0);
    t.update_expected_position(10.0, 100);
    t.add_sensor_pulse(MM_PER_PULSE, 200);
    t.update_expected_position(20.0, 400);
    t.update_expected_position(17.0, 600);
    t.update_expected_position(19.5, 800);
    assert!((t.expected_distance() - 2.5).abs() < 1e-4);
}

#[test]
fn telemetry_gap_with_movement_rearms_grace() {
    let mut t = windowed(0);
    t.update_expected_position(10.0, 100);
    t.add_sensor_pulse(MM_PER_PULSE, 150);
    t.update_expected_position(11.0, 400);

    // Grace from initialization has long expired.
    assert!(!t.is_within_grace_period(2_000, 4_000));

    // >2 s of telemetry silence followed by real movement re-arms it.
    t.update_expected_position(15.0, 5_000);
    assert!(t.is_within_grace_period(2_000, 6_000));
    assert!(!t.is_within_grace_period(2_000, 7_100));
}

#[test]
fn telemetry_gap_without_movement_does_not_rearm_grace() {
    let mut t = windowed(0);
    t.update_expected_position(10.0, 100);
    t.add_sensor_pulse(MM_PER_PULSE, 150);
    t.update_expected_position(11.0, 400);

    // Silence, then a report with no net movement (position hold).
    t.update_expected_position(11.0, 5_000);
    assert!(!t.is_within_grace_period(2_000, 5_100));
}

#[test]
fn samples_older_than_window_are_pruned() {
    let mut t = windowed(0);
    t.update_expected_position(10.0, 1_000);
    t.add_sensor_pulse(MM_PER_PULSE, 1_050);
    t.update_expected_position(12.0, 1_200);
    t.update_expected_position(14.0, 2_000);
    assert!((t.expected_distance() - 4.0).abs() < 1e-4);

    // 5.3 s later only the fresh sample survives the 5 s window.
    t.update_expected_position(16.0, 7_300);
    assert!((t.expected_distance() - 2.0).abs() < 1e-4);
}

#[test]
fn flow_ratio_is_clamped_and_guarded() {
    let mut t = windowed(0);
    assert_eq!(t.flow_ratio(), 0.0);

    t.update_expected_position(10.0, 1_000);
    t.add_sensor_pulse(MM_PER_PULSE, 1_100);
    t.update_expected_position(12.0, 1_500);
    // Ten pulses against 2 mm expected: ratio saturates at 1.5.
    for i in 0..10 {
        t.add_sensor_pulse(MM_PER_PULSE, 1_600 + i * 10);
    }
    assert!((t.flow_ratio() - 1.5).abs() < 1e-6);

    // 50% flow.
    let mut t = windowed(0);
    t.update_expected_position(0.0, 1_000);
    t.add_sensor_pulse(MM_PER_PULSE, 1_100);
    t.update_expected_position(2.0 * MM_PER_PULSE, 1_500);
    t.add_sensor_pulse(MM_PER_PULSE, 1_600);
    assert!((t.flow_ratio() - 0.5).abs() < 1e-4);
}

#[test]
fn windowed_rates_reflect_window_span() {
    let mut t = windowed(0);
    let (e, a) = t.windowed_rates(1_000);
    assert_eq!((e, a), (0.0, 0.0));

    t.update_expected_position(10.0, 1_000);
    t.add_sensor_pulse(MM_PER_PULSE, 1_050);
    t.update_expected_position(20.0, 2_000);
    t.add_sensor_pulse(MM_PER_PULSE, 2_050);

    let (expected_rate, actual_rate) = t.windowed_rates(3_000);
    assert!(expected_rate > 0.0);
    assert!(actual_rate > 0.0);
    assert!(expected_rate > actual_rate);
}

#[test]
fn ewma_mode_smooths_deltas() {
    let cfg = TrackerCfg {
        mode: TrackingMode::Ewma,
        ewma_alpha: 0.5,
        ..TrackerCfg::default()
    };
    let mut t = FlowTracker::new(cfg, 0);
    t.update_expected_position(10.0, 0);
    t.add_sensor_pulse(2.0, 10);
    assert!((t.sensor_distance() - 1.0).abs() < 1e-4);

    t.update_expected_position(14.0, 500);
    assert!((t.expected_distance() - 2.0).abs() < 1e-4);

    t.add_sensor_pulse(2.0, 600);
    assert!((t.sensor_distance() - 1.5).abs() < 1e-4);
}

#[test]
fn cumulative_mode_survives_large_time_jumps() {
    let cfg = TrackerCfg {
        mode: TrackingMode::Cumulative,
        ..TrackerCfg::default()
    };
    let mut t = FlowTracker::new(cfg, 0);
    t.update_expected_position(10.0, 1_000);
    t.add_sensor_pulse(MM_PER_PULSE, 1_100);

    // Pause/resume style jump.
    t.update_expected_position(15.0, 100_000);
    t.add_sensor_pulse(MM_PER_PULSE, 100_100);
    assert!(t.is_initialized());
    assert!((t.expected_distance() - 5.0).abs() < 1e-4);
    assert!((t.sensor_distance() - 2.0 * MM_PER_PULSE).abs() < 1e-4);
}

#[test]
fn alternating_updates_accumulate_in_windowed_mode() {
    let mut t = windowed(0);
    t.update_expected_position(0.0, 900);
    t.add_sensor_pulse(MM_PER_PULSE, 950);
    let mut now = 1_000;
    for i in 1..=10u32 {
        t.update_expected_position(3.0 * i as f32, now);
        t.add_sensor_pulse(MM_PER_PULSE, now + 20);
        now += 100;
    }
    assert!((t.expected_distance() - 30.0).abs() < 1e-3);
    assert!((t.sensor_distance() - 10.0 * MM_PER_PULSE).abs() < 1e-3);
}
