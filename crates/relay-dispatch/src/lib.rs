//! `relay-dispatch` — forwards stored messages to a destination webhook.
//!
//! A message is split into chunks that fit the target's size limit, each
//! chunk is wrapped in a target-specific payload and posted with bounded
//! retries. The record is marked relayed once any chunk gets through.

pub mod dispatcher;
pub mod error;
pub mod format;
pub mod profile;
pub mod split;
pub mod webhook;

pub use dispatcher::{RelayDispatcher, RelayOutcome, RetryPolicy};
pub use error::{DispatchError, Result};
pub use profile::ProfileCache;
pub use split::split;
pub use webhook::{HttpWebhook, WebhookResponse, WebhookSink};
