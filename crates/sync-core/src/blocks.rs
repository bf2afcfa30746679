use chrono::NaiveDate;

use crate::types::{Message, MessageBlock};

/// Derive renderable blocks from an ordered message slice.
///
/// A date divider precedes the first message of each calendar day.
/// Tombstones stay in position; suppressing their content is the UI's job.
pub fn blocks_for(messages: &[Message]) -> Vec<MessageBlock> {
    let mut blocks = Vec::with_capacity(messages.len() + 4);
    let mut current_date: Option<NaiveDate> = None;

    for message in messages {
        let date = message.sent_at.date_naive();
        if current_date != Some(date) {
            blocks.push(MessageBlock::DateDivider { date });
            current_date = Some(date);
        }
        blocks.push(MessageBlock::Message {
            message: message.clone(),
        });
    }

    blocks
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::types::{MessagePayload, ReactionSummary};

    fn message(id: &str, day: u32, hour: u32) -> Message {
        Message {
            id: id.to_owned(),
            channel_id: "general".to_owned(),
            author: "alice".to_owned(),
            sent_at: Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap(),
            payload: MessagePayload::Text {
                body: "hello".to_owned(),
            },
            edited: false,
            deleted: false,
            reactions: ReactionSummary::new(),
            revision: 0,
        }
    }

    #[test]
    fn inserts_one_divider_per_calendar_day() {
        let blocks = blocks_for(&[
            message("a", 1, 9),
            message("b", 1, 17),
            message("c", 2, 8),
        ]);

        let dividers = blocks
            .iter()
            .filter(|block| matches!(block, MessageBlock::DateDivider { .. }))
            .count();
        assert_eq!(dividers, 2);
        assert_eq!(blocks.len(), 5);
        assert!(matches!(blocks[0], MessageBlock::DateDivider { .. }));
        assert!(matches!(blocks[3], MessageBlock::DateDivider { .. }));
    }

    #[test]
    fn keeps_tombstones_in_position() {
        let mut deleted = message("b", 1, 12);
        deleted.deleted = true;

        let blocks = blocks_for(&[message("a", 1, 9), deleted, message("c", 1, 15)]);

        match &blocks[2] {
            MessageBlock::Message { message } => {
                assert_eq!(message.id, "b");
                assert!(message.deleted);
            }
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[test]
    fn empty_input_yields_no_blocks() {
        assert!(blocks_for(&[]).is_empty());
    }
}
