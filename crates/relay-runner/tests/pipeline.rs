use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use relay_core::{RecordingSleeper, RelayMode, RelayState, RelayTarget};
use relay_dispatch::{ProfileCache, RelayDispatcher, WebhookResponse, WebhookSink};
use relay_runner::{Pipeline, RunSummary};
use relay_source::client::{UserEntry, UserProfile};
use relay_source::{CursorPager, HistoryPage, PacedSource, RateLimiter, SourceApi, UserInfo};
use relay_store::MessageStore;
use serde_json::{json, Value};

/// Canned history pages, then empty ones. Profiles always resolve.
#[derive(Default)]
struct FakeSource {
    pages: Mutex<VecDeque<HistoryPage>>,
    requested: Mutex<Vec<f64>>,
}

impl FakeSource {
    fn with(messages: Vec<(Value, bool)>) -> Arc<Self> {
        let pages = messages
            .into_iter()
            .map(|(msg, has_more)| HistoryPage {
                ok: true,
                messages: vec![msg],
                has_more,
                error: None,
            })
            .collect();
        Arc::new(Self {
            pages: Mutex::new(pages),
            requested: Mutex::default(),
        })
    }

    fn requested(&self) -> Vec<f64> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceApi for FakeSource {
    async fn history(&self, _: &str, oldest: f64, _: u32) -> relay_source::Result<HistoryPage> {
        self.requested.lock().unwrap().push(oldest);
        Ok(self.pages.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn user_info(&self, _: &str) -> relay_source::Result<UserInfo> {
        Ok(UserInfo {
            ok: true,
            user: Some(UserEntry {
                profile: Some(UserProfile {
                    real_name: Some("Ada Lovelace".into()),
                    display_name: Some("ada".into()),
                    image_original: None,
                }),
            }),
            error: None,
        })
    }
}

#[derive(Default)]
struct FakeWebhook {
    answers: Mutex<VecDeque<u16>>,
    posted: Mutex<Vec<Value>>,
}

impl FakeWebhook {
    fn answering(statuses: Vec<u16>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(statuses.into()),
            posted: Mutex::default(),
        })
    }

    fn posted(&self) -> usize {
        self.posted.lock().unwrap().len()
    }
}

#[async_trait]
impl WebhookSink for FakeWebhook {
    async fn post(&self, payload: &Value) -> relay_dispatch::Result<WebhookResponse> {
        self.posted.lock().unwrap().push(payload.clone());
        let status = self.answers.lock().unwrap().pop_front().unwrap_or(204);
        Ok(WebhookResponse {
            status,
            retry_after: None,
        })
    }
}

/// Shared sink for formatted log lines.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn occurrences(&self, needle: &str) -> usize {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .matches(needle)
            .count()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn capture_warnings() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}

fn message(ts: &str, text: &str) -> Value {
    json!({"type": "message", "ts": ts, "user": "U1", "text": text, "client_msg_id": "m-1"})
}

fn pipeline(
    store: &Arc<MessageStore>,
    api: Arc<FakeSource>,
    sink: Arc<FakeWebhook>,
    target: RelayTarget,
    mode: RelayMode,
) -> Pipeline {
    let sleeper = Arc::new(RecordingSleeper::new());
    let limiter = RateLimiter::per_minute(50, sleeper.clone());
    let source = Arc::new(PacedSource::new(api, limiter));
    let pager = CursorPager::new(source.clone(), store.clone(), "C1".to_string());
    let dispatcher = RelayDispatcher::new(target, sink, ProfileCache::new(source), sleeper);
    Pipeline::new(store.clone(), pager, Some(dispatcher), mode)
}

#[tokio::test]
async fn next_run_resumes_past_last_stored_message() {
    let store = Arc::new(MessageStore::open_in_memory().unwrap());

    let first = FakeSource::with(vec![(message("1000", "hi"), false)]);
    let sink = FakeWebhook::answering(vec![]);
    let summary = pipeline(&store, first, sink.clone(), RelayTarget::Discord, RelayMode::Off)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.ingested, 1);
    assert_eq!(sink.posted(), 0);
    let pending = store.fetch_pending("C1").unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].timestamp, 1000.0);

    let second = FakeSource::with(vec![]);
    let summary = pipeline(&store, second.clone(), sink, RelayTarget::Discord, RelayMode::Off)
        .run()
        .await
        .unwrap();

    assert_eq!(summary, RunSummary::default());
    assert_eq!(second.requested(), vec![1001.0]);
    assert_eq!(store.fetch_pending("C1").unwrap().len(), 1);
}

#[tokio::test]
async fn partial_delivery_is_never_resent() {
    let (logs, _guard) = capture_warnings();
    let store = Arc::new(MessageStore::open_in_memory().unwrap());
    let text = format!("{}\n{}", "a".repeat(1500), "b".repeat(1500));
    let api = FakeSource::with(vec![(message("1000", &text), false)]);
    // chunk 1 delivered, chunk 2 fails all six attempts
    let sink = FakeWebhook::answering(vec![204, 500, 500, 500, 500, 500, 500]);

    let summary = pipeline(&store, api, sink.clone(), RelayTarget::Discord, RelayMode::Database)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.ingested, 1);
    assert_eq!(summary.partial, 1);
    assert_eq!(sink.posted(), 7);
    let record = store.get(1).unwrap().unwrap();
    assert_eq!(record.relay_state, RelayState::Relayed);
    assert!(record.relayed_at.is_some());
    assert_eq!(logs.occurrences("message partially relayed"), 1);
    assert_eq!(logs.occurrences("giving up on chunk"), 1);

    let later = FakeWebhook::answering(vec![]);
    let summary = pipeline(
        &store,
        FakeSource::with(vec![]),
        later.clone(),
        RelayTarget::Discord,
        RelayMode::Database,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(summary, RunSummary::default());
    assert_eq!(later.posted(), 0);
    assert_eq!(logs.occurrences("message partially relayed"), 1);
}

#[tokio::test]
async fn receipt_mode_relays_as_messages_arrive() {
    let store = Arc::new(MessageStore::open_in_memory().unwrap());
    let api = FakeSource::with(vec![
        (message("1000.000100", "first"), true),
        (message("1005.000200", "second"), false),
    ]);
    let sink = FakeWebhook::answering(vec![]);

    let summary = pipeline(&store, api.clone(), sink.clone(), RelayTarget::Slack, RelayMode::Receipt)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.ingested, 2);
    assert_eq!(summary.relayed, 2);
    assert_eq!(sink.posted(), 2);
    assert!(store.fetch_pending("C1").unwrap().is_empty());

    let requested = api.requested();
    assert_eq!(requested.len(), 2);
    assert!(requested[1] > 1000.0001);
}

#[tokio::test]
async fn failed_backlog_stays_pending_for_the_next_run() {
    let store = Arc::new(MessageStore::open_in_memory().unwrap());
    let api = FakeSource::with(vec![(message("1000", "hello"), false)]);
    let sink = FakeWebhook::answering(vec![500; 6]);

    let summary = pipeline(&store, api, sink, RelayTarget::Discord, RelayMode::Database)
        .run()
        .await
        .unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(store.fetch_pending("C1").unwrap().len(), 1);

    let retry = FakeWebhook::answering(vec![]);
    let summary = pipeline(
        &store,
        FakeSource::with(vec![]),
        retry.clone(),
        RelayTarget::Discord,
        RelayMode::Database,
    )
    .run()
    .await
    .unwrap();
    assert_eq!(summary.relayed, 1);
    assert_eq!(retry.posted(), 1);
    assert!(store.fetch_pending("C1").unwrap().is_empty());
}

#[tokio::test]
async fn none_target_never_posts() {
    let store = Arc::new(MessageStore::open_in_memory().unwrap());
    let api = FakeSource::with(vec![(message("1000", "hello"), false)]);
    let sink = FakeWebhook::answering(vec![]);

    let summary = pipeline(&store, api, sink.clone(), RelayTarget::None, RelayMode::Receipt)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.ingested, 1);
    assert_eq!(sink.posted(), 0);
    assert_eq!(store.fetch_pending("C1").unwrap().len(), 1);
}
