use std::sync::Arc;
use std::time::Duration;

use relay_core::{MessageRecord, RelayTarget, Sleeper};
use relay_store::MessageStore;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::format::{build_payload, render_text, ChunkContext};
use crate::profile::ProfileCache;
use crate::split::split;
use crate::webhook::WebhookSink;

/// Delivery attempts per chunk, including the first.
const DEFAULT_MAX_ATTEMPTS: u32 = 6;
/// Largest retry-after value taken to already be in seconds.
const RETRY_AFTER_CAP_SECS: f64 = 120.0;

/// Retry and pacing knobs for chunk delivery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait after a failure that carries no retry-after hint.
    pub retry_delay: Duration,
    /// Wait after every delivered chunk.
    pub success_pause: Duration,
    pub retry_after_cap: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_secs(1),
            success_pause: Duration::from_secs(1),
            retry_after_cap: RETRY_AFTER_CAP_SECS,
        }
    }
}

impl RetryPolicy {
    /// Wait for a retry-after hint of `value`.
    ///
    /// Up to the cap the value is taken as seconds. Above it the value is
    /// assumed to be milliseconds and becomes `ceil(value / 1000)` seconds,
    /// so a 150 s hint turns into a 1 s wait.
    pub fn rate_limit_wait(&self, value: f64) -> Duration {
        if !value.is_finite() || value <= 0.0 {
            return Duration::ZERO;
        }
        if value <= self.retry_after_cap {
            Duration::from_secs_f64(value)
        } else {
            Duration::from_secs_f64((value / 1000.0).ceil())
        }
    }
}

/// Per-message delivery tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelayOutcome {
    pub chunks: usize,
    pub sent: usize,
}

impl RelayOutcome {
    pub fn failed(&self) -> usize {
        self.chunks - self.sent
    }

    /// At least one chunk reached the destination.
    pub fn is_relayed(&self) -> bool {
        self.sent > 0
    }

    pub fn is_partial(&self) -> bool {
        self.sent > 0 && self.sent < self.chunks
    }
}

/// Formats, splits and delivers stored messages to one destination.
pub struct RelayDispatcher {
    target: RelayTarget,
    sink: Arc<dyn WebhookSink>,
    profiles: ProfileCache,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl RelayDispatcher {
    pub fn new(
        target: RelayTarget,
        sink: Arc<dyn WebhookSink>,
        profiles: ProfileCache,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            target,
            sink,
            profiles,
            sleeper,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn target(&self) -> RelayTarget {
        self.target
    }

    /// Deliver every chunk of `record`, then mark it relayed if any chunk
    /// got through.
    ///
    /// A partially delivered message is still marked relayed and is never
    /// retried; re-sending would duplicate the chunks that did arrive. Only
    /// store failures are returned as errors.
    #[instrument(skip(self, store, record), fields(id = record.id, ts = record.timestamp))]
    pub async fn relay(&mut self, store: &MessageStore, record: &MessageRecord) -> Result<RelayOutcome> {
        let Some(limit) = self.target.char_limit() else {
            debug!("relay target is none, skipping");
            return Ok(RelayOutcome::default());
        };

        let message = match record.message() {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "stored message body is unreadable, leaving it pending");
                return Ok(RelayOutcome::default());
            }
        };

        // Split what will be sent: the Discord rewrite can lengthen the text.
        let text = render_text(self.target, &message.text);
        let chunks = split(&text, limit);
        let total = chunks.len();
        let mut outcome = RelayOutcome {
            chunks: total,
            sent: 0,
        };

        for (index, chunk) in chunks.iter().enumerate() {
            let profile = self.profiles.resolve(message.sender_id()).await;
            let ctx = ChunkContext {
                text: chunk,
                profile: &profile,
                timestamp: message.ts,
                is_last: index + 1 == total,
            };
            let Some(payload) = build_payload(self.target, &ctx) else {
                continue;
            };

            if self.deliver(&payload, index + 1, total).await {
                outcome.sent += 1;
            }
        }

        if outcome.is_relayed() {
            store.mark_relayed(record.id)?;
            if outcome.is_partial() {
                warn!(
                    sent = outcome.sent,
                    failed = outcome.failed(),
                    "message partially relayed; failed chunks will not be retried"
                );
            } else {
                info!(chunks = total, "message relayed");
            }
        } else {
            warn!(chunks = total, "message not relayed, left pending");
        }
        Ok(outcome)
    }

    /// Post one chunk with bounded retries. Returns `true` once delivered.
    async fn deliver(&self, payload: &Value, chunk: usize, total: usize) -> bool {
        let max = self.policy.max_attempts.max(1);
        for attempt in 1..=max {
            let wait = match self.sink.post(payload).await {
                Ok(resp) if resp.is_delivered() => {
                    info!(chunk, total, attempt, "chunk delivered");
                    self.sleeper.sleep(self.policy.success_pause).await;
                    return true;
                }
                Ok(resp) => match resp.retry_after {
                    Some(value) => {
                        let wait = self.policy.rate_limit_wait(value);
                        warn!(
                            chunk,
                            attempt,
                            status = resp.status,
                            retry_after = value,
                            wait_secs = wait.as_secs_f64(),
                            "destination rate limited"
                        );
                        wait
                    }
                    None => {
                        warn!(chunk, attempt, status = resp.status, "chunk delivery failed");
                        self.policy.retry_delay
                    }
                },
                Err(e) => {
                    warn!(chunk, attempt, error = %e, "chunk delivery failed");
                    self.policy.retry_delay
                }
            };

            if attempt < max {
                self.sleeper.sleep(wait).await;
            }
        }

        warn!(chunk, total, attempts = max, "giving up on chunk");
        false
    }
}
