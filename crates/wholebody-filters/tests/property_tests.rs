//! Property-based tests for the filters.
//!
//! Inputs are drawn over realistic joint ranges; every property must hold
//! for any sample sequence, including non-finite values.

use proptest::prelude::*;
use wholebody_filters::prelude::*;

fn finite_value() -> impl Strategy<Value = f64> {
    -1.0e3f64..1.0e3
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn estimate_is_always_finite(
        values in proptest::collection::vec(prop_oneof![
            8 => finite_value(),
            1 => Just(f64::NAN),
            1 => Just(f64::INFINITY),
        ], 1..64),
        window in 2usize..40,
    ) {
        let mut est = AdaptiveWindowEstimator::new(
            FitOrder::Quadratic,
            AdaptiveWindowParams::new(window, 1.0),
        ).map_err(|e| TestCaseError::fail(e.to_string()))?;
        for (k, value) in values.iter().enumerate() {
            let estimate = est.update(*value, k as f64 * 0.01);
            prop_assert!(estimate.is_finite());
        }
        prop_assert!(est.len() <= window);
        prop_assert!(est.effective_window() <= est.len());
    }

    #[test]
    fn linear_fit_recovers_any_slope(
        slope in -100.0f64..100.0,
        offset in -10.0f64..10.0,
        n in 2usize..32,
    ) {
        let mut est = AdaptiveWindowEstimator::new(
            FitOrder::Linear,
            AdaptiveWindowParams::new(16, 1.0),
        ).map_err(|e| TestCaseError::fail(e.to_string()))?;
        for k in 0..n {
            let t = k as f64 * 0.005;
            est.update(offset + slope * t, t);
        }
        prop_assert!((est.estimate() - slope).abs() < 1e-6 * (1.0 + slope.abs()));
    }

    #[test]
    fn low_pass_output_stays_within_input_bounds(
        values in proptest::collection::vec(finite_value(), 1..128),
        cutoff in 0.1f64..100.0,
        dt in 1e-4f64..0.1,
    ) {
        let mut lp = LowPassFilter::new(cutoff)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        for value in &values {
            let y = lp.update(*value, dt);
            prop_assert!(y >= lo - 1e-9 && y <= hi + 1e-9);
        }
    }

    #[test]
    fn bank_rejects_any_length_mismatch(channels in 0usize..16, given in 0usize..16) {
        prop_assume!(channels != given);
        let mut bank = LowPassBank::new(3.0, channels)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let values = vec![0.0; given];
        let mut out = vec![0.0; channels];
        prop_assert!(bank.update(&values, 0.01, &mut out).is_err());
    }
}
