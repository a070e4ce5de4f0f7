/// Errors produced by the relay dispatcher and its webhook sink.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Transport-level webhook failure; retried by the dispatcher.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Marking a record relayed failed. Fatal to the run.
    #[error("store error: {0}")]
    Store(#[from] relay_store::StoreError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
