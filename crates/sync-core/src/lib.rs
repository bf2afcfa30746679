//! Core contract of the chat history synchronization engine.
//!
//! This crate defines the command/event protocol, the canonical message
//! store with its revision-aware merge, pagination and scroll-proximity
//! helpers, and common error/channel abstractions. It performs no I/O;
//! transports and the coordinator runtime live in sibling crates.

/// Date-divider block derivation for presentation.
pub mod blocks;
/// Async command/event channel primitives.
pub mod channel;
/// Backward-pagination cursor and in-flight guard.
pub mod cursor;
/// Stable error types and HTTP classification helpers.
pub mod error;
/// Backoff schedule for live-feed resubscription.
pub mod retry;
/// Scroll proximity detection.
pub mod scroll;
/// Canonical ordered message store.
pub mod store;
/// Protocol types (commands, events, messages, snapshots).
pub mod types;
/// Per-channel view state and fetch phase machine.
pub mod view;

pub use blocks::blocks_for;
pub use channel::{EventStream, SyncChannelError, SyncChannels};
pub use cursor::{FetchPlan, PaginationCursor};
pub use error::{SyncError, SyncErrorCategory, classify_http_status};
pub use retry::ResubscribeBackoff;
pub use scroll::ScrollProximityDetector;
pub use store::MessageStore;
pub use types::{
    DateGroup, FeedStatus, LiveEvent, Message, MessageBlock, MessagePage, MessagePayload,
    ReactionSummary, ScrollMetrics, SyncCommand, SyncEvent, ViewPhase, ViewSnapshot,
};
pub use view::ChannelView;
