use rse_core::errors::{ErrorInfo, RseError};
use rse_core::Stage;

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("dataset", "WeatherData")
        .with_context("fold", "2")
}

#[test]
fn decode_error_surface() {
    let err = RseError::Decode(sample_info("D001", "segment count mismatch"));
    assert_eq!(err.info().code, "D001");
    assert_eq!(err.to_string().split(':').next(), Some("decode error"));
}

#[test]
fn seed_not_found_surface() {
    let err = RseError::SeedNotFound(sample_info("S404", "no harvested seed"));
    assert!(err.info().context.contains_key("fold"));
    assert!(err.info().hint.is_none());
}

#[test]
fn stage_index_nine_is_config_error() {
    let err = Stage::from_index(9).unwrap_err();
    assert!(matches!(err, RseError::Config(_)));
    assert_eq!(err.info().context.get("index").map(String::as_str), Some("9"));
}

#[test]
fn errors_serialize_with_family_tag() {
    let err = RseError::Stage(sample_info("exit-status", "body exited with 3"));
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["family"], "Stage");
    assert_eq!(json["detail"]["code"], "exit-status");
    let back: RseError = serde_json::from_value(json).unwrap();
    assert_eq!(back, err);
}
