//! Builder for loading TrackerSettings.

use crate::core::{TrackerSettings, Validate};
use crate::error::{Result, TrackerError, ValidationError};
use config::{Config, Environment, File};
use std::path::PathBuf;
use std::sync::Arc;

/// Type alias for extra validator functions.
type Validator = Arc<dyn Fn(&TrackerSettings) -> std::result::Result<(), ValidationError> + Send + Sync>;

/// Builder for loading [`TrackerSettings`].
///
/// Precedence, lowest first: built-in defaults, files in the order they were
/// added, environment variables, then explicit overrides.
///
/// # Examples
///
/// ```rust,no_run
/// use truck_tracker::core::TrackerSettings;
///
/// # fn example() -> truck_tracker::error::Result<()> {
/// // TRACKER__THRESHOLD_M=25 -> threshold_m = 25
/// let settings = TrackerSettings::builder()
///     .with_file("tracker.yaml")
///     .with_env_overrides("TRACKER", "__")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct SettingsBuilder {
    file_paths: Vec<PathBuf>,
    env_prefix: Option<String>,
    env_separator: Option<String>,
    overrides: Vec<(String, config::Value)>,
    validator: Option<Validator>,
}

impl SettingsBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            file_paths: Vec::new(),
            env_prefix: None,
            env_separator: None,
            overrides: Vec::new(),
            validator: None,
        }
    }

    /// Add a settings file with automatic format detection.
    ///
    /// Supported formats: YAML (.yaml, .yml), TOML (.toml), JSON (.json).
    /// Later files override earlier ones.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_paths.push(path.into());
        self
    }

    /// Read overrides from environment variables.
    ///
    /// # Arguments
    ///
    /// * `prefix` - Prefix for environment variables (e.g., "TRACKER")
    /// * `separator` - Separator for nested keys (e.g., "__" for TRACKER__REFERENCE__LATITUDE)
    pub fn with_env_overrides(mut self, prefix: &str, separator: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self.env_separator = Some(separator.to_string());
        self
    }

    /// Set a single key, overriding every other source.
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<config::Value>) -> Self {
        self.overrides.push((key.into(), value.into()));
        self
    }

    /// Add a check that runs after the built-in validation.
    pub fn with_validation<F>(mut self, validator: F) -> Self
    where
        F: Fn(&TrackerSettings) -> std::result::Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Load, merge, and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A settings file is missing or has an unsupported extension
    /// - A source cannot be parsed or deserialized
    /// - Validation fails
    pub fn build(self) -> Result<TrackerSettings> {
        let defaults = TrackerSettings::default();

        let mut builder = Config::builder()
            .set_default("reference.latitude", defaults.reference.latitude)?
            .set_default("reference.longitude", defaults.reference.longitude)?
            .set_default("threshold_m", defaults.threshold_m)?
            .set_default(
                "credentials_path",
                defaults.credentials_path.to_string_lossy().into_owned(),
            )?
            .set_default("collection", defaults.collection)?
            .set_default("document", defaults.document)?
            .set_default("database", defaults.database)?
            .set_default("poll_interval_ms", defaults.poll_interval_ms as i64)?;

        for path in &self.file_paths {
            validate_extension(path)?;
            if !path.exists() {
                return Err(TrackerError::Config(format!(
                    "Settings file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path.clone()).required(true));
        }

        if let (Some(prefix), Some(separator)) = (&self.env_prefix, &self.env_separator) {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .separator(separator)
                    .try_parsing(true),
            );
        }

        for (key, value) in self.overrides {
            builder = builder.set_override(key, value)?;
        }

        let settings: TrackerSettings = builder.build()?.try_deserialize()?;

        settings.validate()?;
        if let Some(validator) = &self.validator {
            validator(&settings)?;
        }

        tracing::debug!(?settings, "settings loaded");
        Ok(settings)
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_extension(path: &std::path::Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| {
            TrackerError::Config(format!(
                "Unable to determine file format for: {}",
                path.display()
            ))
        })?;

    match extension {
        "yaml" | "yml" | "toml" | "json" => Ok(()),
        _ => Err(TrackerError::Config(format!(
            "Unsupported file extension: {}. Supported: .yaml, .yml, .toml, .json",
            extension
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_only() {
        let settings = SettingsBuilder::new().build().unwrap();
        assert_eq!(settings, TrackerSettings::default());
    }

    #[test]
    fn test_builder_accumulates_files() {
        let builder = SettingsBuilder::new()
            .with_file("a.yaml")
            .with_file("b.toml");
        assert_eq!(builder.file_paths.len(), 2);
    }

    #[test]
    fn test_builder_env_overrides() {
        let builder = SettingsBuilder::new().with_env_overrides("TRACKER", "__");
        assert_eq!(builder.env_prefix, Some("TRACKER".to_string()));
        assert_eq!(builder.env_separator, Some("__".to_string()));
    }

    #[test]
    fn test_partial_yaml_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tracker.yaml");
        fs::write(
            &path,
            r#"
threshold_m: 25.5
reference:
  latitude: 48.8566
  longitude: 2.3522
"#,
        )
        .unwrap();

        let settings = SettingsBuilder::new().with_file(&path).build().unwrap();
        assert_eq!(settings.threshold_m, 25.5);
        assert_eq!(settings.reference.latitude, 48.8566);
        assert_eq!(settings.collection, "truck");
        assert_eq!(settings.poll_interval_ms, 1000);
    }

    #[test]
    fn test_override_beats_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tracker.toml");
        fs::write(&path, "threshold_m = 25.0\n").unwrap();

        let settings = SettingsBuilder::new()
            .with_file(&path)
            .with_override("threshold_m", 3.0)
            .build()
            .unwrap();
        assert_eq!(settings.threshold_m, 3.0);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = SettingsBuilder::new().with_file("tracker.txt").build();
        assert!(matches!(result, Err(TrackerError::Config(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = SettingsBuilder::new()
            .with_file("/nonexistent/tracker.yaml")
            .build();
        assert!(matches!(result, Err(TrackerError::Config(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = SettingsBuilder::new()
            .with_override("threshold_m", -5.0)
            .build();
        assert!(matches!(result, Err(TrackerError::Validation(_))));
    }

    #[test]
    fn test_custom_validator() {
        let result = SettingsBuilder::new()
            .with_validation(|s: &TrackerSettings| {
                if s.threshold_m > 5.0 {
                    return Err(ValidationError::invalid_field("threshold_m", "too loose"));
                }
                Ok(())
            })
            .build();
        assert!(matches!(result, Err(TrackerError::Validation(_))));
    }
}
