//! Configuration file round-trip.

use locoprop_rs::{LocopropConfig, OptimizerSpec, Variant};
use tempfile::TempDir;

#[test]
fn test_config_toml_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("locoprop.toml");

    let config = LocopropConfig::builder()
        .optimizer(OptimizerSpec::Sgd { learning_rate: 0.2 })
        .learning_rate(2.5)
        .local_iterations(7)
        .variant(Variant::LocoPropS)
        .momentum(0.5)
        .correction(0.25)
        .build();
    config.to_file(&path).unwrap();

    let loaded = LocopropConfig::from_file(&path).unwrap();
    assert!((loaded.learning_rate - 2.5).abs() < f64::EPSILON);
    assert_eq!(loaded.local_iterations, 7);
    assert_eq!(loaded.variant, Variant::LocoPropS);
    assert!((loaded.momentum - 0.5).abs() < f64::EPSILON);
    assert!((loaded.correction - 0.25).abs() < f64::EPSILON);
    match loaded.optimizer {
        OptimizerSpec::Sgd { learning_rate } => assert!((learning_rate - 0.2).abs() < f64::EPSILON),
        other => panic!("expected Sgd optimizer, got {other:?}"),
    }
}

#[test]
fn test_missing_config_file_is_an_io_error() {
    let err = LocopropConfig::from_file("does-not-exist.toml").unwrap_err();
    assert!(err.to_string().contains("IO error"));
}
