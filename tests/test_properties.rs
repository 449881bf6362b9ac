//! Integration test: property checks for windowing, grouping and attribution

use fdr_anomaly::segments::{
    cluster_rows, DetectorSettings, DriverAnalyzer, DriverMetric, SegmentGrouper, SummaryBuilder,
};
use fdr_anomaly::timeseries::WindowPlan;
use ndarray::Array2;
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_window_count(n_rows in 5usize..400, window in 1usize..120, stride in 1usize..25) {
        let plan = WindowPlan::for_rows(n_rows, window, stride);
        let count = plan.n_windows(n_rows);
        if n_rows >= window {
            prop_assert_eq!(count, (n_rows - window) / stride + 1);
            prop_assert!(!plan.shrunk);
        } else {
            prop_assert_eq!(count, 1);
            prop_assert_eq!(plan.stride, 1);
        }
        prop_assert_eq!(plan.starts(n_rows).len(), count);
    }

    #[test]
    fn prop_gap_merge_rule(t1 in 0.0f64..10_000.0, delta in 0.0f64..6.0) {
        let t2 = t1 + delta;
        let clusters = cluster_rows(&[t1, t2], &[true, true], 2.0);
        if t2 - t1 <= 2.0 {
            prop_assert_eq!(clusters, vec![(0, 1)]);
        } else {
            prop_assert_eq!(clusters, vec![(0, 0), (1, 1)]);
        }
    }

    #[test]
    fn prop_flagged_percent_bounds(flags in proptest::collection::vec(any::<bool>(), 1..300)) {
        let summary = SummaryBuilder::build(
            1,
            &[],
            &flags,
            DetectorSettings::Windowed { window_size: 60, stride: 5 },
            97.0,
            0.0,
        );
        prop_assert!(summary.flagged_percent >= 0.0 && summary.flagged_percent <= 100.0);
        prop_assert_eq!(summary.flagged_percent == 0.0, flags.iter().all(|f| !f));
    }

    #[test]
    fn prop_driver_order(
        cells in proptest::collection::vec(0u8..4, 6..60),
        max_metric in any::<bool>(),
    ) {
        let n_features = 6;
        let n_rows = cells.len() / n_features;
        prop_assume!(n_rows > 0);
        let errors = Array2::from_shape_fn((n_rows, n_features), |(i, j)| cells[i * n_features + j] as f64);
        let names: Vec<String> = (0..n_features).map(|j| format!("p{}", j)).collect();
        let metric = if max_metric { DriverMetric::MaxRobustZ } else { DriverMetric::MeanError };

        let drivers = DriverAnalyzer::new(metric, n_features)
            .unwrap()
            .rank(&names, &errors, 0, n_rows - 1)
            .unwrap();
        prop_assert_eq!(drivers.len(), n_features);

        let index = |name: &str| names.iter().position(|n| n == name).unwrap();
        for pair in drivers.windows(2) {
            let (a, b) = (pair[0].magnitude.value(), pair[1].magnitude.value());
            prop_assert!(a >= b);
            if a == b {
                prop_assert!(index(&pair[0].parameter) < index(&pair[1].parameter));
            }
        }
    }

    #[test]
    fn prop_grouping_is_repeatable(scores in proptest::collection::vec(0.0f64..100.0, 2..200)) {
        let times: Vec<f64> = (0..scores.len()).map(|i| i as f64 * 0.5).collect();
        let grouper = SegmentGrouper::default();
        let first = grouper.group(&times, &scores, None).unwrap();
        let second = grouper.group(&times, &scores, None).unwrap();
        prop_assert_eq!(&first.spans, &second.spans);
        prop_assert!(!first.spans.is_empty());
        prop_assert!(first.spans.len() <= scores.len());
    }
}

#[test]
fn test_gap_just_over_limit_splits() {
    let clusters = cluster_rows(&[10.0, 12.0 + 1e-9], &[true, true], 2.0);
    assert_eq!(clusters, vec![(0, 0), (1, 1)]);
    let clusters = cluster_rows(&[10.0, 12.0], &[true, true], 2.0);
    assert_eq!(clusters, vec![(0, 1)]);
}
