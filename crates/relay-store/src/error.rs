use thiserror::Error;

/// Errors raised by the message store. Every variant is fatal to a run.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The database file's directory could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No message row with the given ID exists.
    #[error("Message not found: {id}")]
    NotFound { id: i64 },

    /// The row already left the pending state; the flag never moves back.
    #[error("Message already relayed: {id}")]
    AlreadyRelayed { id: i64 },

    /// A stored relay state could not be decoded.
    #[error("Corrupt row {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
