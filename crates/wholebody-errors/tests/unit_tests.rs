//! Unit tests for the error taxonomy.
//!
//! Tests Display implementations, conversions into the umbrella error and
//! category/severity classification.

use wholebody_errors::prelude::*;

#[test]
fn test_all_variants_display() {
    let errors: Vec<WholeBodyError> = vec![
        ConfigError::InvalidDof(0).into(),
        ConfigError::unknown_link("root_link").into(),
        ConfigError::invalid_parameter("threshold", f64::NAN).into(),
        ConfigError::PeriodTooShort {
            period_ms: 0.5,
            min_ms: 1.0,
        }
        .into(),
        ConfigError::dimension_mismatch("joint position", 3, 2).into(),
        ConfigError::MissingSensorProvider.into(),
        ConfigError::MissingKinematicModel.into(),
        ConfigError::Parse("bad yaml".into()).into(),
        NumericalError::SingularBaseJacobian { determinant: 0.0 }.into(),
        NumericalError::NonFinite("base pose").into(),
        QueryError::unknown_channel("motor_torque", 4).into(),
        QueryError::UnknownChannelName("l_knee".into()).into(),
        QueryError::sensor_read("timeout").into(),
        QueryError::Unsupported("base_acceleration").into(),
        LifecycleError::NotInitialized.into(),
        LifecycleError::Released.into(),
        LifecycleError::WorkerRunning.into(),
        LifecycleError::QueueFull.into(),
    ];

    for err in errors {
        assert!(!err.to_string().is_empty(), "{err:?} should display");
    }
}

#[test]
fn test_category_mapping() {
    let cases: Vec<(WholeBodyError, ErrorCategory)> = vec![
        (ConfigError::InvalidDof(0).into(), ErrorCategory::Config),
        (
            NumericalError::NonFinite("x").into(),
            ErrorCategory::Numerical,
        ),
        (
            QueryError::unknown_channel("joint_position", 1).into(),
            ErrorCategory::Query,
        ),
        (QueryError::sensor_read("x").into(), ErrorCategory::Sensor),
        (LifecycleError::Released.into(), ErrorCategory::Lifecycle),
    ];

    for (err, category) in cases {
        assert_eq!(err.category(), category, "{err}");
    }
}

#[test]
fn test_only_worker_failure_is_unrecoverable() {
    let fatal: WholeBodyError = LifecycleError::Worker("join failed".into()).into();
    assert!(!fatal.is_recoverable());

    let singular: WholeBodyError = NumericalError::SingularBaseJacobian { determinant: 1e-18 }.into();
    assert!(singular.is_recoverable());
}

#[test]
fn test_question_mark_conversion() {
    fn inner() -> Result<()> {
        let provider: std::result::Result<(), ConfigError> =
            Err(ConfigError::MissingSensorProvider);
        provider?;
        Ok(())
    }

    assert!(matches!(
        inner(),
        Err(WholeBodyError::Config(ConfigError::MissingSensorProvider))
    ));
}

mod property_tests {
    use proptest::prelude::*;
    use wholebody_errors::{ConfigError, ErrorCategory, QueryError, WholeBodyError};

    proptest! {
        #[test]
        fn unknown_channel_mentions_id(channel in 0usize..10_000) {
            let err: WholeBodyError = QueryError::unknown_channel("joint_velocity", channel).into();
            prop_assert!(err.to_string().contains(&channel.to_string()));
        }

        #[test]
        fn dimension_mismatch_is_config(expected in 0usize..64, actual in 0usize..64) {
            let err: WholeBodyError = ConfigError::dimension_mismatch("tau", expected, actual).into();
            prop_assert_eq!(err.category(), ErrorCategory::Config);
        }
    }
}
