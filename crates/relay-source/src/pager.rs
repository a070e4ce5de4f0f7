use std::sync::Arc;

use relay_core::SourceMessage;
use relay_store::MessageStore;
use tracing::{info, warn};

use crate::client::PacedSource;

/// Lower bound used when the store holds nothing for the channel
/// (2021-08-31T22:00:00Z).
pub const EPOCH_FALLBACK: f64 = 1_630_447_200.0;

/// Distance between the last stored timestamp and the next request's lower
/// bound.
pub const CURSOR_STEP: f64 = 1.0;

/// A single message returned by the history API.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub message: SourceMessage,
    /// Envelope exactly as received; this is what gets persisted.
    pub raw: serde_json::Value,
    pub has_more: bool,
}

impl FetchedMessage {
    pub fn body(&self) -> String {
        self.raw.to_string()
    }
}

/// Walks a channel's history forward, one message per call.
pub struct CursorPager {
    source: Arc<PacedSource>,
    store: Arc<MessageStore>,
    channel: String,
}

impl CursorPager {
    pub fn new(source: Arc<PacedSource>, store: Arc<MessageStore>, channel: String) -> Self {
        Self {
            source,
            store,
            channel,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Newest stored timestamp for the channel, or [`EPOCH_FALLBACK`].
    pub fn fetch_oldest_known_timestamp(&self) -> relay_store::Result<f64> {
        Ok(self
            .store
            .latest_timestamp(&self.channel)?
            .unwrap_or(EPOCH_FALLBACK))
    }

    /// Where the next run starts: strictly past everything already stored.
    pub fn initial_cursor(&self) -> relay_store::Result<f64> {
        Ok(next_cursor(self.fetch_oldest_known_timestamp()?))
    }

    /// Ask for exactly one message at or after `oldest`.
    ///
    /// Transport failures, error answers and empty pages all come back as
    /// `None`; the caller treats that as the end of the history.
    pub async fn fetch_next_message(&self, oldest: f64) -> Option<FetchedMessage> {
        let page = match self.source.history(&self.channel, oldest, 1).await {
            Ok(page) => page,
            Err(e) => {
                warn!(channel = %self.channel, oldest, error = %e, "history fetch failed");
                return None;
            }
        };

        if let Some(ref err) = page.error {
            warn!(channel = %self.channel, oldest, error = %err, "history call returned an error");
        }

        let raw = page.messages.into_iter().next()?;
        let message: SourceMessage = match serde_json::from_value(raw.clone()) {
            Ok(m) => m,
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "malformed message in history page");
                return None;
            }
        };

        info!(
            client_msg_id = message.client_msg_id.as_deref().unwrap_or("(no client_msg_id)"),
            ts = message.ts,
            "found new message"
        );

        Some(FetchedMessage {
            message,
            raw,
            has_more: page.has_more,
        })
    }
}

pub fn next_cursor(timestamp: f64) -> f64 {
    timestamp + CURSOR_STEP
}
