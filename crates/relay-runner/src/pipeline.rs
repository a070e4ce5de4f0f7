use std::sync::Arc;

use relay_core::{MessageRecord, RelayMode};
use relay_dispatch::{DispatchError, RelayDispatcher, RelayOutcome};
use relay_source::pager::next_cursor;
use relay_source::CursorPager;
use relay_store::{MessageStore, StoreError};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ingested: usize,
    /// Every chunk delivered.
    pub relayed: usize,
    /// Some chunks delivered; marked relayed, not retried.
    pub partial: usize,
    /// Nothing delivered; still pending.
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: RelayOutcome) {
        if outcome.is_partial() {
            self.partial += 1;
        } else if outcome.is_relayed() {
            self.relayed += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// One ingestion pass over a channel, plus relay according to the mode.
pub struct Pipeline {
    store: Arc<MessageStore>,
    pager: CursorPager,
    dispatcher: Option<RelayDispatcher>,
    mode: RelayMode,
}

impl Pipeline {
    /// `dispatcher` is dropped when the mode is `Off` or its target is
    /// `None`, so nothing is ever posted in either case.
    pub fn new(
        store: Arc<MessageStore>,
        pager: CursorPager,
        dispatcher: Option<RelayDispatcher>,
        mode: RelayMode,
    ) -> Self {
        let dispatcher = dispatcher
            .filter(|d| mode != RelayMode::Off && d.target().char_limit().is_some());
        Self {
            store,
            pager,
            dispatcher,
            mode,
        }
    }

    pub async fn run(&mut self) -> Result<RunSummary> {
        let channel = self.pager.channel().to_string();
        let relaying = self.dispatcher.is_some();
        info!(%channel, mode = %self.mode, relaying, "relay run starting");

        let mut summary = RunSummary::default();
        let mut cursor = self.pager.initial_cursor()?;
        debug!(cursor, "paging from");

        while let Some(fetched) = self.pager.fetch_next_message(cursor).await {
            let ts = fetched.message.ts;
            let id = self.store.insert(&channel, ts, &fetched.body())?;
            summary.ingested += 1;
            cursor = next_cursor(ts);

            if self.mode == RelayMode::Receipt {
                if let Some(ref mut dispatcher) = self.dispatcher {
                    let record = self.store.get(id)?.ok_or(StoreError::NotFound { id })?;
                    summary.record(dispatcher.relay(&self.store, &record).await?);
                }
            }

            if !fetched.has_more {
                break;
            }
        }

        if self.mode == RelayMode::Database {
            if let Some(ref mut dispatcher) = self.dispatcher {
                let pending: Vec<MessageRecord> = self.store.fetch_pending(&channel)?;
                info!(count = pending.len(), "relaying pending backlog");
                for record in &pending {
                    summary.record(dispatcher.relay(&self.store, record).await?);
                }
            }
        }

        info!(
            %channel,
            ingested = summary.ingested,
            relayed = summary.relayed,
            partial = summary.partial,
            failed = summary.failed,
            "relay run finished"
        );
        Ok(summary)
    }
}
