//! `relay-core` — shared configuration, domain types and timing primitives
//! for the channel relay pipeline.

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{RecordingSleeper, Sleeper, TokioSleeper};
pub use config::RelayConfig;
pub use error::{ConfigError, Result};
pub use types::{MessageRecord, ProfileInfo, RelayMode, RelayState, RelayTarget, SourceMessage};
