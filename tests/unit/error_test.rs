//! Tests for error types

use std::error::Error;

use tenant_dispatch::core::{ConfigError, DecodeError, DispatchError, ProcessingError};

#[test]
fn test_dispatch_error_display() {
    let err = DispatchError::Transport("broker unreachable".into());
    assert_eq!(err.to_string(), "transport error: broker unreachable");
    assert!(err.is_transport());

    let err = DispatchError::Configuration("no identity".into());
    assert_eq!(err.to_string(), "configuration error: no identity");
    assert!(!err.is_transport());

    assert_eq!(DispatchError::Shutdown.to_string(), "dispatcher shut down");
}

#[test]
fn test_decode_error_converts() {
    let err: DispatchError = DecodeError::new("missing eventType").into();
    assert!(matches!(err, DispatchError::Decode(_)));
    assert_eq!(err.to_string(), "malformed message: missing eventType");
}

#[test]
fn test_processing_error_keeps_source() {
    let err = DispatchError::Processing {
        message_id: "m-1".into(),
        source: ProcessingError::new("visit not found"),
    };
    assert_eq!(
        err.to_string(),
        "processing failed for message m-1: visit not found"
    );
    assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("visit not found"));
}

#[test]
fn test_config_error_display() {
    assert_eq!(
        ConfigError::NonPositive("poll interval").to_string(),
        "poll interval must be greater than 0"
    );
    assert_eq!(ConfigError::Parse("bad".into()).to_string(), "parse error: bad");
}

#[test]
fn test_errors_flow_into_app_result() {
    fn load() -> tenant_dispatch::core::AppResult<()> {
        Err(ConfigError::NonPositive("failure interval").into())
    }
    assert!(load().unwrap_err().to_string().contains("failure interval"));
}
