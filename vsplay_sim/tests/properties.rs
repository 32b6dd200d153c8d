//! Seed-sweeping properties of the reconciliation scenarios.

use proptest::prelude::*;
use vsplay_sim::{ScenarioId, ScenarioRunner};

fn runner(seed: u64) -> ScenarioRunner {
    ScenarioRunner::new(seed).with_frames(60).with_movers(5)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn homography_lag_reconciles_for_any_seed(seed in 1u64..u64::MAX) {
        let result = runner(seed).run(ScenarioId::HomographyLag);
        prop_assert!(result.passed, "{:?}", result.failure_reason);
    }

    #[test]
    fn jitter_reconciles_for_any_seed(seed in 1u64..u64::MAX) {
        let result = runner(seed).run(ScenarioId::Jitter);
        prop_assert!(result.passed, "{:?}", result.failure_reason);
    }

    #[test]
    fn late_joiner_sees_full_history(seed in 1u64..u64::MAX) {
        let result = runner(seed).run(ScenarioId::LateJoiner);
        prop_assert!(result.passed, "{:?}", result.failure_reason);
    }

    #[test]
    fn duplicate_reports_admit_one_event_each(seed in 1u64..u64::MAX) {
        let result = runner(seed).run(ScenarioId::DuplicateEvents);
        prop_assert!(result.passed, "{:?}", result.failure_reason);
        prop_assert_eq!(result.metrics.events_admitted, 5);
    }

    #[test]
    fn same_seed_same_run(seed in 1u64..u64::MAX) {
        let a = runner(seed).run(ScenarioId::Jitter);
        let b = runner(seed).run(ScenarioId::Jitter);
        prop_assert_eq!(a.metrics.core_turns, b.metrics.core_turns);
        prop_assert_eq!(a.metrics.deferred_peak, b.metrics.deferred_peak);
        prop_assert_eq!(a.metrics.rms_error, b.metrics.rms_error);
        prop_assert_eq!(a.final_track_count, b.final_track_count);
    }
}

#[test]
fn every_scenario_passes_default_seed() {
    for scenario in ScenarioId::all() {
        let result = runner(42).run(scenario);
        assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
    }
}
