//! The tracker's settings.

use crate::core::{SettingsBuilder, Validate};
use crate::error::ValidationError;
use crate::geodesy::Coordinate;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Everything the tracker needs to start.
///
/// Fixed for the lifetime of the process once loaded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackerSettings {
    /// Where the observer is.
    pub reference: Coordinate,
    /// Alert distance in meters. Distances less than or equal to this alert.
    pub threshold_m: f64,
    /// Service-account key file.
    pub credentials_path: PathBuf,
    /// Collection holding the watched document.
    pub collection: String,
    /// Id of the watched document.
    pub document: String,
    /// Firestore database id.
    pub database: String,
    /// How often the document is polled, in milliseconds.
    pub poll_interval_ms: u64,
}

impl TrackerSettings {
    /// Create a builder seeded with [`TrackerSettings::default`].
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            reference: Coordinate::new(17.152335, 79.618608),
            threshold_m: 10.0,
            credentials_path: PathBuf::from(
                "truck-tracker-demo-firebase-adminsdk-fbsvc-035a1fbb0a.json",
            ),
            collection: "truck".to_string(),
            document: "location".to_string(),
            database: "(default)".to_string(),
            poll_interval_ms: 1000,
        }
    }
}

impl Validate for TrackerSettings {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        let Coordinate {
            latitude,
            longitude,
        } = self.reference;
        if !(-90.0..=90.0).contains(&latitude) {
            errors.push(ValidationError::invalid_field(
                "reference.latitude",
                format!("must be within [-90, 90], got {}", latitude),
            ));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            errors.push(ValidationError::invalid_field(
                "reference.longitude",
                format!("must be within [-180, 180], got {}", longitude),
            ));
        }
        if !self.threshold_m.is_finite() || self.threshold_m < 0.0 {
            errors.push(ValidationError::invalid_field(
                "threshold_m",
                format!("must be a non-negative number of meters, got {}", self.threshold_m),
            ));
        }
        for (field, value) in [
            ("collection", &self.collection),
            ("document", &self.document),
            ("database", &self.database),
        ] {
            if value.trim().is_empty() {
                errors.push(ValidationError::invalid_field(field, "must not be empty"));
            }
        }
        if self.credentials_path.as_os_str().is_empty() {
            errors.push(ValidationError::invalid_field(
                "credentials_path",
                "must not be empty",
            ));
        }
        if self.poll_interval_ms == 0 {
            errors.push(ValidationError::invalid_field(
                "poll_interval_ms",
                "must be greater than 0",
            ));
        }

        match ValidationError::from_list(errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = TrackerSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let settings = TrackerSettings {
            threshold_m: -1.0,
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { ref field, .. } if field == "threshold_m"));
    }

    #[test]
    fn test_zero_threshold_allowed() {
        let settings = TrackerSettings {
            threshold_m: 0.0,
            ..Default::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_errors_are_collected() {
        let settings = TrackerSettings {
            reference: Coordinate::new(95.0, 200.0),
            threshold_m: f64::NAN,
            document: " ".to_string(),
            poll_interval_ms: 0,
            ..Default::default()
        };
        match settings.validate().unwrap_err() {
            ValidationError::Multiple(errors) => assert_eq!(errors.len(), 5),
            other => panic!("expected multiple errors, got {:?}", other),
        }
    }
}
