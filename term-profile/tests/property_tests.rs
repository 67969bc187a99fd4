//! Property-based tests for the metric merge algebra.
//!
//! ## Properties
//!
//! - Merge is commutative and associative on every exactly-mergeable component.
//! - Merging with the zero value is the identity.
//! - Tracking a batch in one call equals tracking any split of it and merging.
//! - Serialized views decode to the same view.
//!
//! KLL sketches are bounded-error rather than bit-exact under regrouping, so sketch
//! components are compared on count, minimum and maximum.

use proptest::prelude::*;
use term_profile::metrics::{AnyMetric, Metric, MetricKind};
use term_profile::prelude::*;

// ============================================================================
// Input Generation
// ============================================================================

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        2 => Just(Value::Null),
        2 => any::<bool>().prop_map(Value::Bool),
        4 => (-1_000i64..1_000).prop_map(Value::Int),
        3 => (-1.0e6f64..1.0e6).prop_map(Value::Float),
        1 => Just(Value::Float(f64::NAN)),
        2 => "[a-z]{0,6}".prop_map(Value::Str),
        1 => prop::collection::vec((-10i64..10).prop_map(Value::Int), 1..4).prop_map(Value::List),
        1 => Just(Value::Object("timestamp".to_string())),
    ]
}

fn arb_batch() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(arb_value(), 0..60)
}

/// Any value, infinities included. Infinite input makes the running moments non-finite,
/// which the file format must carry unchanged.
fn arb_value_with_infinities() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => arb_value(),
        1 => prop_oneof![Just(f64::INFINITY), Just(f64::NEG_INFINITY)].prop_map(Value::Float),
    ]
}

fn schema() -> ColumnSchema {
    ColumnSchema::for_type(ColumnType::Integral)
}

fn metric_from(kind: MetricKind, batch: &[Value]) -> AnyMetric {
    let mut metric = AnyMetric::zero(kind, &schema()).unwrap();
    metric
        .columnar_update(&PreprocessedColumn::apply(batch))
        .unwrap();
    metric
}

/// Compares two metrics exactly, except for sketches which compare on n/min/max.
fn assert_equivalent(
    left: &AnyMetric,
    right: &AnyMetric,
) -> std::result::Result<(), TestCaseError> {
    match (left, right) {
        (AnyMetric::Distribution(a), AnyMetric::Distribution(b)) => {
            let (sa, sb) = (a.kll.sketch(), b.kll.sketch());
            prop_assert_eq!(sa.count(), sb.count());
            prop_assert_eq!(sa.min(), sb.min());
            prop_assert_eq!(sa.max(), sb.max());
            prop_assert!((a.mean.value() - b.mean.value()).abs() <= 1e-6 * (1.0 + a.mean.value().abs()));
            prop_assert!((a.m2.value() - b.m2.value()).abs() <= 1e-6 * (1.0 + a.m2.value().abs()));
        }
        _ => prop_assert_eq!(left, right),
    }
    Ok(())
}

// ============================================================================
// Merge Algebra
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn merge_is_commutative(a in arb_batch(), b in arb_batch()) {
        for kind in MetricKind::ALL {
            let (ma, mb) = (metric_from(kind, &a), metric_from(kind, &b));
            assert_equivalent(&ma.merge(&mb).unwrap(), &mb.merge(&ma).unwrap())?;
        }
    }

    #[test]
    fn merge_is_associative(a in arb_batch(), b in arb_batch(), c in arb_batch()) {
        for kind in MetricKind::ALL {
            let (ma, mb, mc) = (metric_from(kind, &a), metric_from(kind, &b), metric_from(kind, &c));
            let left = ma.merge(&mb).unwrap().merge(&mc).unwrap();
            let right = ma.merge(&mb.merge(&mc).unwrap()).unwrap();
            let swapped = ma.merge(&mc).unwrap().merge(&mb).unwrap();
            assert_equivalent(&left, &right)?;
            assert_equivalent(&left, &swapped)?;
        }
    }

    #[test]
    fn zero_is_merge_identity(a in arb_batch()) {
        for kind in MetricKind::ALL {
            let metric = metric_from(kind, &a);
            let zero = AnyMetric::zero(kind, &schema()).unwrap();
            prop_assert_eq!(&metric.merge(&zero).unwrap(), &metric);
            prop_assert_eq!(&zero.merge(&metric).unwrap().kind(), &kind);
        }
    }

    #[test]
    fn split_update_equals_merge(batch in arb_batch(), split in 0usize..60) {
        let k = split.min(batch.len());
        for kind in MetricKind::ALL {
            let whole = metric_from(kind, &batch);
            let merged = metric_from(kind, &batch[..k])
                .merge(&metric_from(kind, &batch[k..]))
                .unwrap();
            assert_equivalent(&whole, &merged)?;

            // Two sequential updates on one live metric land in the same state.
            let mut sequential = AnyMetric::zero(kind, &schema()).unwrap();
            sequential.columnar_update(&PreprocessedColumn::apply(&batch[..k])).unwrap();
            sequential.columnar_update(&PreprocessedColumn::apply(&batch[k..])).unwrap();
            assert_equivalent(&whole, &sequential)?;
        }
    }

    #[test]
    fn booleans_never_count_as_integral(flags in prop::collection::vec(any::<bool>(), 0..40)) {
        let batch: Vec<Value> = flags.iter().copied().map(Value::Bool).collect();
        let mut types = term_profile::metrics::TypeCountersMetric::zero(&schema()).unwrap();
        types.columnar_update(&PreprocessedColumn::apply(&batch)).unwrap();
        prop_assert_eq!(types.boolean.value(), flags.len() as i64);
        prop_assert_eq!(types.integral.value(), 0);
    }

    #[test]
    fn classification_is_deterministic(batch in arb_batch()) {
        prop_assert_eq!(PreprocessedColumn::apply(&batch), PreprocessedColumn::apply(&batch));
    }

    #[test]
    fn view_round_trips(
        a in prop::collection::vec(arb_value_with_infinities(), 0..60),
        b in arb_batch(),
    ) {
        let mut profile = DatasetProfile::new(
            DatasetSchema::new().with_column("x", ColumnType::Integral),
        ).unwrap();
        profile.track("x", &a).unwrap();
        profile.track("y", &b).unwrap();

        let view = profile.view();
        let decoded = DatasetProfileView::deserialize(&view.serialize().unwrap()).unwrap();
        prop_assert_eq!(decoded, view);
    }
}
