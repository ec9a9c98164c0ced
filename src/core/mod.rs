//! Tracker settings: defaults, loading, and validation.

mod builder;
mod settings;
mod validation;

pub use builder::SettingsBuilder;
pub use settings::TrackerSettings;
pub use validation::Validate;
