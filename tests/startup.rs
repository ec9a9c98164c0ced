//! Integration tests for startup: settings loading and credential checks.

#![allow(unsafe_code)] // For env var manipulation in tests

use std::fs;
use tempfile::TempDir;
use truck_tracker::core::TrackerSettings;
use truck_tracker::error::TrackerError;

#[test]
fn test_env_beats_file_and_override_beats_env() {
    // Prefix is unique to this test so parallel tests never see these vars.
    const PREFIX: &str = "TRACKER_ENV_PRECEDENCE";

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("tracker.yaml");
    fs::write(
        &path,
        r#"
threshold_m: 10
document: from-file
reference:
  latitude: 48.8566
  longitude: 2.3522
"#,
    )
    .unwrap();

    unsafe {
        std::env::set_var("TRACKER_ENV_PRECEDENCE__THRESHOLD_M", "25");
        std::env::set_var("TRACKER_ENV_PRECEDENCE__REFERENCE__LATITUDE", "1.5");
        std::env::set_var("TRACKER_ENV_PRECEDENCE__DOCUMENT", "from-env");
    }

    let result = TrackerSettings::builder()
        .with_file(&path)
        .with_env_overrides(PREFIX, "__")
        .with_override("document", "from-override")
        .build();

    unsafe {
        std::env::remove_var("TRACKER_ENV_PRECEDENCE__THRESHOLD_M");
        std::env::remove_var("TRACKER_ENV_PRECEDENCE__REFERENCE__LATITUDE");
        std::env::remove_var("TRACKER_ENV_PRECEDENCE__DOCUMENT");
    }

    let settings = result.unwrap();
    assert_eq!(settings.threshold_m, 25.0);
    assert_eq!(settings.reference.latitude, 1.5);
    assert_eq!(settings.reference.longitude, 2.3522);
    assert_eq!(settings.document, "from-override");
}

#[test]
fn test_settings_from_json_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("tracker.json");
    fs::write(
        &path,
        r#"{
            "reference": {"latitude": 0.0, "longitude": 0.0},
            "threshold_m": 50,
            "collection": "fleet",
            "document": "truck-7",
            "poll_interval_ms": 250
        }"#,
    )
    .unwrap();

    let settings = TrackerSettings::builder().with_file(&path).build().unwrap();
    assert_eq!(settings.threshold_m, 50.0);
    assert_eq!(settings.collection, "fleet");
    assert_eq!(settings.document, "truck-7");
    assert_eq!(settings.poll_interval().as_millis(), 250);
    assert_eq!(settings.database, "(default)");
}

#[test]
fn test_later_file_wins() {
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path().join("base.yaml");
    let local = temp_dir.path().join("local.yaml");
    fs::write(&base, "threshold_m: 10\ndocument: location\n").unwrap();
    fs::write(&local, "threshold_m: 30\n").unwrap();

    let settings = TrackerSettings::builder()
        .with_file(&base)
        .with_file(&local)
        .build()
        .unwrap();
    assert_eq!(settings.threshold_m, 30.0);
    assert_eq!(settings.document, "location");
}

#[test]
fn test_out_of_range_reference_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("tracker.yaml");
    fs::write(&path, "reference:\n  latitude: 123.0\n  longitude: 0.0\n").unwrap();

    let err = TrackerSettings::builder().with_file(&path).build().unwrap_err();
    assert!(matches!(err, TrackerError::Validation(ref msg) if msg.contains("reference.latitude")));
}

#[cfg(feature = "firestore")]
mod firestore {
    use super::*;
    use truck_tracker::feed::firestore::FirestoreClient;

    #[tokio::test]
    async fn test_missing_key_file_is_fatal_before_connecting() {
        let temp_dir = TempDir::new().unwrap();
        let key = temp_dir.path().join("missing-key.json");

        let err = FirestoreClient::from_service_account_json(&key)
            .await
            .err()
            .unwrap();

        assert!(matches!(err, TrackerError::CredentialsNotFound(ref p) if p == &key));
        let diagnostic = err.diagnostic();
        assert_eq!(diagnostic[0], "Authentication Error: The key file was not found.");
        assert!(diagnostic[1].contains("missing-key.json"));
    }

    #[tokio::test]
    async fn test_key_without_project_is_authentication_error() {
        let temp_dir = TempDir::new().unwrap();
        let key = temp_dir.path().join("key.json");
        fs::write(&key, r#"{"type": "service_account"}"#).unwrap();

        let err = FirestoreClient::from_service_account_json(&key)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TrackerError::Authentication(_)));
    }
}
