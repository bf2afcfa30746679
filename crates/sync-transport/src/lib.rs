//! Transport seam between the sync engine and a chat backend.
//!
//! The engine talks to its backend through two narrow interfaces: a
//! backward page fetch and a live-event subscription. `InMemoryChatServer`
//! implements both over seeded history and is the reference backend for
//! tests and the smoke binary.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use sync_core::{LiveEvent, Message, MessagePage, MessagePayload, ReactionSummary};

const LIVE_EVENT_BUFFER: usize = 64;

/// Errors produced by a page fetch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The upstream rejected or failed the request.
    #[error("page fetch failed with status {status}: {message}")]
    Upstream {
        /// HTTP-style status code.
        status: u16,
        /// Upstream error message.
        message: String,
    },
    /// The transport itself is unavailable.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Errors produced while establishing a live-event subscription.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The subscription was rejected by the backend.
    #[error("subscription rejected: {0}")]
    Rejected(String),
}

/// Backward page fetch.
///
/// Must be idempotent under retry with the same cursor: the same
/// `(channel_id, before)` pair yields the same page while no new history
/// is written before the cursor.
#[async_trait]
pub trait PageFetch: Send + Sync {
    /// Fetch up to `limit` messages strictly older than `before`
    /// (or the newest page when `before` is `None`).
    async fn fetch_page(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: u16,
    ) -> Result<MessagePage, FetchError>;
}

/// Live-event subscription setup.
#[async_trait]
pub trait LiveFeed: Send + Sync {
    /// Subscribe to create/update/delete events for one channel.
    async fn subscribe(&self, channel_id: &str) -> Result<LiveSubscription, FeedError>;
}

/// Handle to an established live-event subscription.
///
/// Dropping the handle tears the subscription down.
#[derive(Debug)]
pub struct LiveSubscription {
    events: mpsc::Receiver<LiveEvent>,
}

impl LiveSubscription {
    /// Wrap a receiver produced by a feed implementation.
    pub fn new(events: mpsc::Receiver<LiveEvent>) -> Self {
        Self { events }
    }

    /// Next pushed event; `None` once the feed has closed.
    pub async fn next_event(&mut self) -> Option<LiveEvent> {
        self.events.recv().await
    }
}

#[derive(Debug, Default)]
struct ServerState {
    // Per-channel history, ascending by (sent_at, id).
    history: HashMap<String, Vec<Message>>,
    subscribers: HashMap<String, Vec<mpsc::Sender<LiveEvent>>>,
    fail_next_fetch: Option<FetchError>,
}

/// In-memory chat backend implementing both transport traits.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChatServer {
    state: Arc<Mutex<ServerState>>,
    fetch_calls: Arc<AtomicUsize>,
}

impl InMemoryChatServer {
    /// Create an empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for a plain text message with a fresh ID.
    pub fn new_message(
        channel_id: impl Into<String>,
        author: impl Into<String>,
        body: impl Into<String>,
        sent_at: DateTime<Utc>,
    ) -> Message {
        Message {
            id: Uuid::new_v4().to_string(),
            channel_id: channel_id.into(),
            author: author.into(),
            sent_at,
            payload: MessagePayload::Text { body: body.into() },
            edited: false,
            deleted: false,
            reactions: ReactionSummary::new(),
            revision: 0,
        }
    }

    /// Seed (or extend) a channel's history. Messages are kept sorted.
    pub fn seed_channel(&self, channel_id: impl Into<String>, messages: Vec<Message>) {
        let mut state = self.lock_state();
        let history = state.history.entry(channel_id.into()).or_default();
        history.extend(messages);
        history.sort_by(|a, b| (a.sent_at, a.id.as_str()).cmp(&(b.sent_at, b.id.as_str())));
    }

    /// Apply a live event to server history and push it to subscribers of
    /// the event's channel.
    pub fn push_live(&self, event: LiveEvent) {
        let mut state = self.lock_state();
        apply_to_history(&mut state, &event);

        let channel_id = event.channel_id().to_owned();
        if let Some(subscribers) = state.subscribers.get_mut(&channel_id) {
            subscribers.retain(|tx| tx.try_send(event.clone()).is_ok());
        }
    }

    /// Close every open subscription for a channel, simulating a feed drop.
    pub fn drop_subscribers(&self, channel_id: &str) {
        let mut state = self.lock_state();
        if let Some(subscribers) = state.subscribers.remove(channel_id) {
            debug!(
                channel_id,
                count = subscribers.len(),
                "dropping live subscribers"
            );
        }
    }

    /// Make the next `fetch_page` call fail with the given error.
    pub fn fail_next_fetch(&self, error: FetchError) {
        self.lock_state().fail_next_fetch = Some(error);
    }

    /// Number of `fetch_page` calls served so far (failed ones included).
    pub fn fetch_call_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn apply_to_history(state: &mut ServerState, event: &LiveEvent) {
    let history = state
        .history
        .entry(event.channel_id().to_owned())
        .or_default();

    match event {
        LiveEvent::MessageCreated { message } => {
            if history.iter().any(|entry| entry.id == message.id) {
                return;
            }
            let index = history.partition_point(|entry| {
                (entry.sent_at, entry.id.as_str()) < (message.sent_at, message.id.as_str())
            });
            history.insert(index, message.clone());
        }
        LiveEvent::MessageUpdated { message } => {
            if let Some(entry) = history.iter_mut().find(|entry| entry.id == message.id)
                && message.revision > entry.revision
            {
                entry.payload = message.payload.clone();
                entry.edited = message.edited;
                entry.reactions = message.reactions.clone();
                entry.revision = message.revision;
            }
        }
        LiveEvent::MessageDeleted {
            message_id,
            revision,
            ..
        } => {
            if let Some(entry) = history.iter_mut().find(|entry| entry.id == *message_id) {
                entry.deleted = true;
                entry.revision = (*revision).max(entry.revision);
            }
        }
    }
}

#[async_trait]
impl PageFetch for InMemoryChatServer {
    async fn fetch_page(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: u16,
    ) -> Result<MessagePage, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.lock_state();
        if let Some(error) = state.fail_next_fetch.take() {
            return Err(error);
        }

        let Some(history) = state.history.get(channel_id) else {
            return Ok(MessagePage::default());
        };

        let upper = match before {
            Some(cursor_id) => history
                .iter()
                .position(|entry| entry.id == cursor_id)
                .ok_or_else(|| FetchError::Upstream {
                    status: 400,
                    message: format!("unknown cursor '{cursor_id}'"),
                })?,
            None => history.len(),
        };

        let lower = upper.saturating_sub(usize::from(limit));
        Ok(MessagePage::from_ascending(history[lower..upper].to_vec()))
    }
}

#[async_trait]
impl LiveFeed for InMemoryChatServer {
    async fn subscribe(&self, channel_id: &str) -> Result<LiveSubscription, FeedError> {
        let (tx, rx) = mpsc::channel(LIVE_EVENT_BUFFER);
        self.lock_state()
            .subscribers
            .entry(channel_id.to_owned())
            .or_default()
            .push(tx);
        Ok(LiveSubscription::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn seeded_server(count: usize) -> InMemoryChatServer {
        let server = InMemoryChatServer::new();
        let messages = (0..count)
            .map(|i| {
                let sent_at = Utc
                    .with_ymd_and_hms(2024, 1, 2, 9, 0, 0)
                    .unwrap()
                    + chrono::TimeDelta::minutes(i as i64);
                let mut message =
                    InMemoryChatServer::new_message("general", "alice", format!("m{i}"), sent_at);
                message.id = format!("msg-{i:03}");
                message
            })
            .collect();
        server.seed_channel("general", messages);
        server
    }

    #[tokio::test]
    async fn serves_the_newest_page_first() {
        let server = seeded_server(25);
        let page = server
            .fetch_page("general", None, 15)
            .await
            .expect("fetch should work");

        assert_eq!(page.message_count(), 15);
        assert_eq!(page.oldest_message_id(), Some("msg-010"));
    }

    #[tokio::test]
    async fn pages_are_contiguous_and_idempotent() {
        let server = seeded_server(25);
        let first = server
            .fetch_page("general", None, 15)
            .await
            .expect("first fetch");
        let cursor = first.oldest_message_id().map(ToOwned::to_owned);

        let second = server
            .fetch_page("general", cursor.as_deref(), 15)
            .await
            .expect("second fetch");
        let retried = server
            .fetch_page("general", cursor.as_deref(), 15)
            .await
            .expect("retried fetch");

        assert_eq!(second, retried);
        assert_eq!(second.message_count(), 10);
        assert_eq!(second.oldest_message_id(), Some("msg-000"));
    }

    #[tokio::test]
    async fn unknown_cursor_is_a_client_error() {
        let server = seeded_server(5);
        let err = server
            .fetch_page("general", Some("nope"), 15)
            .await
            .expect_err("unknown cursor must fail");
        assert!(matches!(err, FetchError::Upstream { status: 400, .. }));
    }

    #[tokio::test]
    async fn unknown_channel_yields_an_empty_page() {
        let server = InMemoryChatServer::new();
        let page = server
            .fetch_page("nowhere", None, 15)
            .await
            .expect("fetch should work");
        assert_eq!(page.message_count(), 0);
    }

    #[tokio::test]
    async fn injected_failure_hits_exactly_one_fetch() {
        let server = seeded_server(5);
        server.fail_next_fetch(FetchError::Upstream {
            status: 503,
            message: "maintenance".to_owned(),
        });

        server
            .fetch_page("general", None, 15)
            .await
            .expect_err("injected failure must surface");
        server
            .fetch_page("general", None, 15)
            .await
            .expect("next fetch should recover");
        assert_eq!(server.fetch_call_count(), 2);
    }

    #[tokio::test]
    async fn pushes_live_events_to_channel_subscribers_only() {
        let server = seeded_server(1);
        let mut general = server
            .subscribe("general")
            .await
            .expect("subscribe general");
        let mut random = server.subscribe("random").await.expect("subscribe random");

        let sent_at = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
        let message = InMemoryChatServer::new_message("general", "bob", "hi", sent_at);
        server.push_live(LiveEvent::MessageCreated {
            message: message.clone(),
        });

        let event = general.next_event().await.expect("general gets the event");
        assert_eq!(event.channel_id(), "general");

        server.drop_subscribers("random");
        assert!(random.next_event().await.is_none());
    }

    #[tokio::test]
    async fn live_create_lands_in_later_fetches() {
        let server = seeded_server(3);
        let sent_at = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
        let message = InMemoryChatServer::new_message("general", "bob", "fresh", sent_at);
        let id = message.id.clone();
        server.push_live(LiveEvent::MessageCreated { message });

        let page = server
            .fetch_page("general", None, 15)
            .await
            .expect("fetch should work");
        assert!(page.messages().any(|entry| entry.id == id));
    }
}
