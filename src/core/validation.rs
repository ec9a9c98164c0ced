//! Settings validation support.

use crate::error::ValidationError;

/// Trait for settings validation.
///
/// Implemented by [`TrackerSettings`](crate::core::TrackerSettings); the
/// settings builder runs it after every load so an unusable value never
/// reaches the tracker.
///
/// # Examples
///
/// ```rust
/// use truck_tracker::core::Validate;
/// use truck_tracker::error::ValidationError;
///
/// struct Threshold(f64);
///
/// impl Validate for Threshold {
///     fn validate(&self) -> Result<(), ValidationError> {
///         if !(self.0 >= 0.0) {
///             return Err(ValidationError::invalid_field(
///                 "threshold_m",
///                 "must be a non-negative number of meters",
///             ));
///         }
///         Ok(())
///     }
/// }
///
/// assert!(Threshold(10.0).validate().is_ok());
/// assert!(Threshold(-1.0).validate().is_err());
/// ```
pub trait Validate {
    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self) -> Result<(), ValidationError>;
}
