use thiserror::Error;

/// Errors raised while loading or validating the relay configuration.
///
/// All of these are fatal: the run aborts before touching the source API.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The figment providers could not be merged or extracted.
    #[error("Configuration error: {0}")]
    Load(String),

    /// A required option is present but unusable.
    #[error("Invalid configuration: {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
