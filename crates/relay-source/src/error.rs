/// Errors produced while talking to the source platform.
///
/// None of these are fatal: the pager treats them as "no more data" and the
/// profile cache falls back to a placeholder.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, SourceError>;
