//! Error types for truck-tracker.

use std::fmt;
use std::path::PathBuf;

/// Result type alias for truck-tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors that can stop the tracker.
///
/// Everything here is fatal at startup or surfaces from the change feed.
/// Per-update problems (missing coordinates, bad values) never become a
/// `TrackerError`; the update handler reports them inline instead.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The service-account key file does not exist.
    #[error("The key file was not found: {}", .0.display())]
    CredentialsNotFound(PathBuf),

    /// The database client could not be created from the key file.
    #[error("Could not create Firestore client from key file: {0}")]
    Authentication(String),

    /// Failed to load or deserialize settings.
    #[error("Failed to load settings: {0}")]
    Config(String),

    /// Settings were loaded but are not usable.
    #[error("Settings validation failed: {0}")]
    Validation(String),

    /// The change feed could not be subscribed or polled.
    #[error("Change feed error: {0}")]
    Feed(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackerError {
    /// Lines printed to the console before the process exits on this error.
    pub fn diagnostic(&self) -> Vec<String> {
        match self {
            Self::CredentialsNotFound(path) => vec![
                "Authentication Error: The key file was not found.".to_string(),
                format!(
                    "Please make sure the file '{}' exists and is readable.",
                    path.display()
                ),
            ],
            Self::Authentication(details) => vec![
                "Authentication Error: Could not create Firestore client from key file."
                    .to_string(),
                format!("Error details: {}", details),
            ],
            other => vec![format!("Error: {}", other)],
        }
    }
}

impl From<config::ConfigError> for TrackerError {
    fn from(err: config::ConfigError) -> Self {
        TrackerError::Config(err.to_string())
    }
}

/// Validation error for tracker settings.
#[derive(Debug)]
pub enum ValidationError {
    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Collapse a list of errors: `None` when empty, the error itself when
    /// there is exactly one, `Multiple` otherwise.
    pub fn from_list(mut errors: Vec<ValidationError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Multiple(errors)),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for TrackerError {
    fn from(err: ValidationError) -> Self {
        TrackerError::Validation(err.to_string())
    }
}
