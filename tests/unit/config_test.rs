//! Tests for configuration validation

use std::time::Duration;

use tenant_dispatch::config::{DispatchConfig, POLL_INTERVAL_ENV, SHUTDOWN_TIMEOUT_ENV};
use tenant_dispatch::core::ConfigError;

#[test]
fn test_builder_methods() {
    let cfg = DispatchConfig::new()
        .with_poll_interval(Duration::from_secs(5))
        .with_failure_interval(Duration::from_secs(15))
        .with_shutdown_timeout(Duration::from_millis(250));

    assert_eq!(cfg.poll_interval(), Duration::from_secs(5));
    assert_eq!(cfg.failure_interval(), Duration::from_secs(15));
    assert_eq!(cfg.shutdown_timeout(), Duration::from_millis(250));
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_zero_values_rejected() {
    let cfg = DispatchConfig::new().with_failure_interval(Duration::ZERO);
    assert_eq!(cfg.validate(), Err(ConfigError::NonPositive("failure interval")));

    let cfg = DispatchConfig::new().with_shutdown_timeout(Duration::ZERO);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_from_json_fills_defaults() {
    let cfg = DispatchConfig::from_json_str(r#"{"poll_interval_ms": 1500}"#).unwrap();

    assert_eq!(cfg.poll_interval(), Duration::from_millis(1500));
    assert_eq!(cfg.failure_interval(), DispatchConfig::default().failure_interval());
}

#[test]
fn test_from_json_rejects_invalid() {
    assert!(matches!(
        DispatchConfig::from_json_str("{not json"),
        Err(ConfigError::Parse(_))
    ));
    assert_eq!(
        DispatchConfig::from_json_str(r#"{"poll_interval_ms": 0}"#),
        Err(ConfigError::NonPositive("poll interval"))
    );
}

#[test]
fn test_from_env_reads_seconds() {
    std::env::set_var(POLL_INTERVAL_ENV, "7");
    std::env::set_var(SHUTDOWN_TIMEOUT_ENV, "3");
    let cfg = DispatchConfig::from_env();
    std::env::remove_var(POLL_INTERVAL_ENV);
    std::env::remove_var(SHUTDOWN_TIMEOUT_ENV);

    let cfg = cfg.unwrap();
    assert_eq!(cfg.poll_interval(), Duration::from_secs(7));
    assert_eq!(cfg.shutdown_timeout(), Duration::from_secs(3));
}
