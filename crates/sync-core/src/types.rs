use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Reaction summary attached to a message: emoji mapped to reactor user IDs.
///
/// Ordered maps/sets keep snapshots deterministic under comparison.
pub type ReactionSummary = BTreeMap<String, BTreeSet<String>>;

/// Kind-tagged message payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePayload {
    /// Plain text message.
    Text {
        /// Message body.
        body: String,
    },
    /// Image message referencing uploaded content.
    Image {
        /// Content URL.
        url: String,
        /// Optional caption shown with the image.
        caption: Option<String>,
    },
    /// Generic file attachment.
    File {
        /// Content URL.
        url: String,
        /// Original file name.
        file_name: String,
    },
    /// Poll message.
    Poll {
        /// Poll question.
        question: String,
        /// Poll options in display order.
        options: Vec<String>,
    },
    /// Server-generated system notice (joins, renames and similar).
    System {
        /// Notice text.
        note: String,
    },
}

/// Canonical message record held by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Stable unique message ID. Never changes once created.
    pub id: String,
    /// Channel the message belongs to.
    pub channel_id: String,
    /// Author user ID.
    pub author: String,
    /// Creation timestamp. Ordering key together with `id`.
    pub sent_at: DateTime<Utc>,
    /// Kind-tagged payload.
    pub payload: MessagePayload,
    /// Whether the message has been edited after creation.
    pub edited: bool,
    /// Tombstone flag. Deleted messages keep their list position.
    pub deleted: bool,
    /// Reaction summary (emoji -> reactor IDs).
    pub reactions: ReactionSummary,
    /// Monotonic revision used for supersession checks during merges.
    pub revision: u64,
}

/// Messages of a single calendar date inside a fetched page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateGroup {
    /// Calendar date of every message in the group.
    pub date: NaiveDate,
    /// Messages of that date, ascending by `sent_at`.
    pub messages: Vec<Message>,
}

/// One backward page as returned by a page fetch.
///
/// A page is a transient transport unit: its contents are folded into the
/// store and the page itself is discarded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagePage {
    /// Date groups in ascending date order.
    pub groups: Vec<DateGroup>,
}

impl MessagePage {
    /// Build a page from messages already ascending by `(sent_at, id)`,
    /// partitioning consecutive runs by calendar date.
    pub fn from_ascending(messages: Vec<Message>) -> Self {
        let mut groups: Vec<DateGroup> = Vec::new();
        for message in messages {
            let date = message.sent_at.date_naive();
            match groups.last_mut() {
                Some(group) if group.date == date => group.messages.push(message),
                _ => groups.push(DateGroup {
                    date,
                    messages: vec![message],
                }),
            }
        }
        Self { groups }
    }

    /// Total number of messages across all date groups.
    pub fn message_count(&self) -> usize {
        self.groups.iter().map(|group| group.messages.len()).sum()
    }

    /// Iterate messages in page order (oldest first).
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.groups.iter().flat_map(|group| group.messages.iter())
    }

    /// ID of the oldest message in the page, when the page is non-empty.
    pub fn oldest_message_id(&self) -> Option<&str> {
        self.messages().next().map(|message| message.id.as_str())
    }

    /// Consume the page into a flat, page-ordered message list.
    pub fn into_messages(self) -> Vec<Message> {
        self.groups
            .into_iter()
            .flat_map(|group| group.messages)
            .collect()
    }
}

/// Out-of-band notification pushed by the live feed.
///
/// Delivery is at-least-once and unordered relative to pagination; the store's
/// ID/revision merge absorbs duplicates and reordering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum LiveEvent {
    /// A new message was posted.
    MessageCreated {
        /// Full message record.
        message: Message,
    },
    /// An existing message was edited or its reactions changed.
    MessageUpdated {
        /// Replacement candidate; applied only when its revision is newer.
        message: Message,
    },
    /// A message was deleted server-side.
    MessageDeleted {
        /// Channel the message belongs to.
        channel_id: String,
        /// ID of the deleted message.
        message_id: String,
        /// Revision of the deletion.
        revision: u64,
    },
}

impl LiveEvent {
    /// Channel the event targets, used for active-channel filtering.
    pub fn channel_id(&self) -> &str {
        match self {
            LiveEvent::MessageCreated { message } | LiveEvent::MessageUpdated { message } => {
                &message.channel_id
            }
            LiveEvent::MessageDeleted { channel_id, .. } => channel_id,
        }
    }
}

/// Raw viewport scroll metrics reported by the scroll-producing surface.
///
/// `scroll_top` is the distance of the viewport top from the content top.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScrollMetrics {
    /// Viewport offset from the top of the content.
    pub scroll_top: f32,
    /// Visible viewport height.
    pub viewport_height: f32,
    /// Total scrollable content height.
    pub content_height: f32,
}

/// Command channel input accepted by the sync runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SyncCommand {
    /// Make a channel the active one, replacing any previous view.
    ActivateChannel {
        /// Target channel ID.
        channel_id: String,
    },
    /// Tear down the active view without activating another channel.
    DeactivateChannel,
    /// Request one older page of history for the active channel.
    RequestOlder,
    /// Clear a fetch error and re-issue the failed fetch.
    RetryFetch,
    /// Viewport scroll position changed.
    ScrollChanged {
        /// Current scroll metrics.
        metrics: ScrollMetrics,
    },
}

/// Coordinator phase of the active channel view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ViewPhase {
    /// No fetch in progress.
    Idle,
    /// A page fetch is in flight.
    Loading,
    /// The last page fetch failed; awaiting retry.
    Error,
}

/// Renderable block emitted to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MessageBlock {
    /// Day heading preceding the first message of a calendar date.
    DateDivider {
        /// Calendar date of the following messages.
        date: NaiveDate,
    },
    /// A message, tombstones included.
    Message {
        /// Message record.
        message: Message,
    },
}

/// Externally observable state of the active channel view.
///
/// This is the only contract the presentation layer depends on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewSnapshot {
    /// Channel the snapshot belongs to.
    pub channel_id: String,
    /// Ordered, deduplicated blocks (date dividers interleaved with messages).
    pub blocks: Vec<MessageBlock>,
    /// Current coordinator phase.
    pub phase: ViewPhase,
    /// Whether the start of history has been reached.
    pub end_of_history: bool,
    /// Last fetch error, present while `phase` is `Error`.
    pub error: Option<SyncError>,
}

impl ViewSnapshot {
    /// Whether a page fetch is currently in flight.
    pub fn is_loading(&self) -> bool {
        self.phase == ViewPhase::Loading
    }
}

/// Live-feed connection health reported to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedStatus {
    /// Whether the subscription is currently established.
    pub connected: bool,
    /// Optional hint about the next resubscribe delay.
    pub retry_hint_ms: Option<u64>,
}

/// Event channel output emitted by the sync runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SyncEvent {
    /// A channel became the active one and a fresh view was constructed.
    ChannelActivated {
        /// Newly active channel ID.
        channel_id: String,
    },
    /// The active view was torn down.
    ChannelDeactivated {
        /// Previously active channel ID.
        channel_id: String,
    },
    /// The active view changed; carries the full new snapshot.
    ViewUpdated {
        /// Fresh snapshot for rendering.
        snapshot: ViewSnapshot,
    },
    /// Live-feed connection status changed.
    FeedStatus(FeedStatus),
}
