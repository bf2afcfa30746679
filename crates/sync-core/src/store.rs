use tracing::{debug, trace};

use crate::types::{LiveEvent, Message, MessagePage};

/// Canonical, deduplicated, ordered message set for one channel.
///
/// Entries are kept ascending by `(sent_at, id)`; the lexical ID tiebreak
/// makes ordering deterministic for equal timestamps. Merges are keyed by
/// message ID and guarded by revision comparison, so pages and live events
/// may be applied in any arrival order.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    entries: Vec<Message>,
}

impl MessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, tombstones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ordered view of the current entries.
    pub fn snapshot(&self) -> &[Message] {
        &self.entries
    }

    /// Whether a message with the given ID is present.
    pub fn contains(&self, message_id: &str) -> bool {
        self.position_of(message_id).is_some()
    }

    /// Fold one fetched page into the store. Returns the number of entries
    /// inserted or replaced.
    ///
    /// A pre-existing entry wins over the page copy unless the page revision
    /// is strictly newer; re-ingesting the same page is a no-op.
    pub fn ingest_page(&mut self, page: MessagePage) -> usize {
        let mut changed = 0;
        for incoming in page.into_messages() {
            match self.position_of(&incoming.id) {
                Some(index) => {
                    let existing = &mut self.entries[index];
                    if incoming.revision > existing.revision {
                        // Same ID keeps its settled position: the original
                        // creation timestamp is the ordering key.
                        let sent_at = existing.sent_at;
                        *existing = incoming;
                        existing.sent_at = sent_at;
                        changed += 1;
                    } else {
                        trace!(
                            message_id = %incoming.id,
                            "page copy not newer than stored entry; kept stored state"
                        );
                    }
                }
                None => {
                    self.insert_sorted(incoming);
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Apply one live event. Returns whether the store changed.
    ///
    /// Duplicate and stale events are absorbed silently; `updated`/`deleted`
    /// events for IDs not yet fetched are dropped — the next fetch reconciles.
    pub fn apply_live_event(&mut self, event: LiveEvent) -> bool {
        match event {
            LiveEvent::MessageCreated { message } => {
                if self.contains(&message.id) {
                    trace!(message_id = %message.id, "duplicate create dropped");
                    return false;
                }
                self.insert_sorted(message);
                true
            }
            LiveEvent::MessageUpdated { message } => {
                let Some(index) = self.position_of(&message.id) else {
                    debug!(message_id = %message.id, "update for unknown message dropped");
                    return false;
                };
                let existing = &mut self.entries[index];
                if message.revision <= existing.revision {
                    trace!(
                        message_id = %message.id,
                        stored = existing.revision,
                        incoming = message.revision,
                        "stale update ignored"
                    );
                    return false;
                }
                // Updates replace content in place; the tombstone flag and
                // the ordering key are never touched by an update.
                existing.payload = message.payload;
                existing.edited = message.edited;
                existing.reactions = message.reactions;
                existing.revision = message.revision;
                true
            }
            LiveEvent::MessageDeleted {
                message_id,
                revision,
                ..
            } => {
                let Some(index) = self.position_of(&message_id) else {
                    debug!(message_id = %message_id, "delete for unknown message dropped");
                    return false;
                };
                let existing = &mut self.entries[index];
                if existing.deleted {
                    trace!(message_id = %message_id, "duplicate delete dropped");
                    return false;
                }
                existing.deleted = true;
                existing.revision = existing.revision.max(revision);
                true
            }
        }
    }

    /// ID of the oldest entry, when present.
    pub fn oldest_id(&self) -> Option<&str> {
        self.entries.first().map(|message| message.id.as_str())
    }

    fn position_of(&self, message_id: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == message_id)
    }

    fn insert_sorted(&mut self, message: Message) {
        let index = self.entries.partition_point(|entry| {
            (entry.sent_at, entry.id.as_str()) < (message.sent_at, message.id.as_str())
        });
        self.entries.insert(index, message);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::types::{MessagePayload, ReactionSummary};

    fn message(id: &str, minute: u32, body: &str) -> Message {
        Message {
            id: id.to_owned(),
            channel_id: "general".to_owned(),
            author: "alice".to_owned(),
            sent_at: Utc.with_ymd_and_hms(2024, 1, 2, 10, minute, 0).unwrap(),
            payload: MessagePayload::Text {
                body: body.to_owned(),
            },
            edited: false,
            deleted: false,
            reactions: ReactionSummary::new(),
            revision: 0,
        }
    }

    fn page(messages: Vec<Message>) -> MessagePage {
        MessagePage::from_ascending(messages)
    }

    fn ids(store: &MessageStore) -> Vec<&str> {
        store
            .snapshot()
            .iter()
            .map(|entry| entry.id.as_str())
            .collect()
    }

    #[test]
    fn ingesting_the_same_page_twice_is_idempotent() {
        let mut store = MessageStore::new();
        let messages = vec![message("a", 0, "one"), message("b", 5, "two")];

        store.ingest_page(page(messages.clone()));
        let first = store.snapshot().to_vec();
        let changed = store.ingest_page(page(messages));

        assert_eq!(changed, 0);
        assert_eq!(store.snapshot(), first.as_slice());
    }

    #[test]
    fn orders_by_timestamp_with_id_tiebreak() {
        let mut store = MessageStore::new();
        store.ingest_page(page(vec![message("b", 5, "late")]));
        store.ingest_page(page(vec![message("a", 0, "early")]));
        store.apply_live_event(LiveEvent::MessageCreated {
            message: message("c", 5, "tied"),
        });

        // "b" and "c" share a timestamp; lexical ID order breaks the tie.
        assert_eq!(ids(&store), vec!["a", "b", "c"]);
    }

    #[test]
    fn live_create_before_page_does_not_duplicate() {
        let mut store = MessageStore::new();
        store.apply_live_event(LiveEvent::MessageCreated {
            message: message("x", 3, "pushed first"),
        });

        store.ingest_page(page(vec![
            message("w", 0, "older"),
            message("x", 3, "pushed first"),
        ]));

        assert_eq!(store.len(), 2);
        assert_eq!(ids(&store), vec!["w", "x"]);
    }

    #[test]
    fn page_copy_does_not_clobber_newer_live_state() {
        let mut store = MessageStore::new();
        let mut edited = message("x", 3, "edited body");
        edited.edited = true;
        edited.revision = 4;
        store.apply_live_event(LiveEvent::MessageCreated { message: edited });

        // The page still carries the pre-edit copy at revision 0.
        store.ingest_page(page(vec![message("x", 3, "original body")]));

        let stored = &store.snapshot()[0];
        assert!(stored.edited);
        assert_eq!(stored.revision, 4);
        assert_eq!(
            stored.payload,
            MessagePayload::Text {
                body: "edited body".to_owned()
            }
        );
    }

    #[test]
    fn strictly_newer_page_copy_replaces_stored_entry() {
        let mut store = MessageStore::new();
        store.ingest_page(page(vec![message("x", 3, "stale")]));

        let mut fresh = message("x", 3, "revised");
        fresh.edited = true;
        fresh.revision = 2;
        let changed = store.ingest_page(page(vec![fresh]));

        assert_eq!(changed, 1);
        let stored = &store.snapshot()[0];
        assert!(stored.edited);
        assert_eq!(stored.revision, 2);
    }

    #[test]
    fn stale_update_is_ignored() {
        let mut store = MessageStore::new();
        let mut current = message("x", 3, "current");
        current.revision = 5;
        store.ingest_page(page(vec![current]));

        let mut stale = message("x", 3, "stale edit");
        stale.edited = true;
        stale.revision = 5;
        let changed = store.apply_live_event(LiveEvent::MessageUpdated { message: stale });

        assert!(!changed);
        assert!(!store.snapshot()[0].edited);
    }

    #[test]
    fn update_applies_payload_edited_flag_and_reactions() {
        let mut store = MessageStore::new();
        store.ingest_page(page(vec![message("x", 3, "original")]));

        let mut reactions = ReactionSummary::new();
        reactions
            .entry("👍".to_owned())
            .or_default()
            .insert("bob".to_owned());
        let mut update = message("x", 3, "fixed typo");
        update.edited = true;
        update.reactions = reactions.clone();
        update.revision = 1;

        assert!(store.apply_live_event(LiveEvent::MessageUpdated { message: update }));
        let stored = &store.snapshot()[0];
        assert!(stored.edited);
        assert_eq!(stored.reactions, reactions);
        assert_eq!(stored.revision, 1);
    }

    #[test]
    fn delete_leaves_a_tombstone_in_place() {
        let mut store = MessageStore::new();
        store.ingest_page(page(vec![message("a", 0, "one"), message("b", 5, "two")]));

        let changed = store.apply_live_event(LiveEvent::MessageDeleted {
            channel_id: "general".to_owned(),
            message_id: "b".to_owned(),
            revision: 9,
        });

        assert!(changed);
        assert_eq!(ids(&store), vec!["a", "b"]);
        let tombstone = &store.snapshot()[1];
        assert!(tombstone.deleted);
        assert_eq!(tombstone.revision, 9);
    }

    #[test]
    fn duplicate_delete_is_absorbed() {
        let mut store = MessageStore::new();
        store.ingest_page(page(vec![message("a", 0, "one")]));

        let delete = LiveEvent::MessageDeleted {
            channel_id: "general".to_owned(),
            message_id: "a".to_owned(),
            revision: 2,
        };
        assert!(store.apply_live_event(delete.clone()));
        assert!(!store.apply_live_event(delete));
    }

    #[test]
    fn events_for_unknown_messages_are_dropped() {
        let mut store = MessageStore::new();

        let update = LiveEvent::MessageUpdated {
            message: message("ghost", 0, "boo"),
        };
        let delete = LiveEvent::MessageDeleted {
            channel_id: "general".to_owned(),
            message_id: "ghost".to_owned(),
            revision: 1,
        };

        assert!(!store.apply_live_event(update));
        assert!(!store.apply_live_event(delete));
        assert!(store.is_empty());
    }

    #[test]
    fn tracks_oldest_entry() {
        let mut store = MessageStore::new();
        assert_eq!(store.oldest_id(), None);

        store.ingest_page(page(vec![message("m", 30, "mid")]));
        store.ingest_page(page(vec![message("e", 1, "early")]));
        assert_eq!(store.oldest_id(), Some("e"));
    }
}
