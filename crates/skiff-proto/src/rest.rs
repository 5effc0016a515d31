//! REST boundary shapes.
//!
//! Pagination over room history is cursor-based: every page carries an
//! opaque continuation token, and the absence of a token means there are no
//! more pages in that direction.

use serde::{Deserialize, Serialize};

use crate::{
    ids::{MessageId, RoomId, UserId},
    time::Timestamp,
};

/// Opaque pagination token.
///
/// The client attaches no semantics beyond equality and presence/absence;
/// the server alone knows how to decode it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Wrap a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for query-string use.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned id.
    pub id: MessageId,
    /// Room the message belongs to.
    pub room_id: RoomId,
    /// Sender id.
    pub user_id: UserId,
    /// Sender display name at send time.
    pub username: String,
    /// Body text.
    pub content: String,
    /// Creation time, normalized to UTC.
    pub created_at: Timestamp,
}

impl Message {
    /// Chronological sort key: timestamp first, server id as tie-breaker.
    pub fn sort_key(&self) -> (Timestamp, MessageId) {
        (self.created_at, self.id)
    }
}

/// Room metadata from the room CRUD boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Server-assigned id.
    pub id: RoomId,
    /// Display name.
    pub name: String,
    /// Owner id.
    pub created_by: UserId,
    /// Creation time.
    pub created_at: Timestamp,
    /// When the current user last marked the room read. `None` if never.
    #[serde(default)]
    pub last_read_at: Option<Timestamp>,
    /// Messages since `last_read_at`. `None` when the server omits it.
    #[serde(default)]
    pub unread_count: Option<u32>,
}

/// One page of room history.
///
/// `messages` arrive newest-first, as the server returns them. `next_cursor`
/// continues pagination toward older messages (or toward newer ones on the
/// `newer` endpoint); `None` means the direction is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    /// Page contents, newest-first.
    pub messages: Vec<Message>,
    /// Continuation token. `None` when there are no more pages.
    #[serde(default)]
    pub next_cursor: Option<Cursor>,
}

/// A symmetric window around a jump-to-message target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    /// Window contents.
    pub messages: Vec<Message>,
    /// The message the window is centered on.
    pub target_message_id: MessageId,
    /// Continues the window toward older messages. `None` if exhausted.
    #[serde(default)]
    pub older_cursor: Option<Cursor>,
    /// Continues the window toward newer messages. `None` when the window
    /// already reaches the latest message.
    #[serde(default)]
    pub newer_cursor: Option<Cursor>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn page_deserializes_with_null_cursor() {
        let json = r#"{
            "messages": [
                {"id": 2, "room_id": 1, "user_id": 7, "username": "ada",
                 "content": "later", "created_at": "2024-01-01T12:00:01"},
                {"id": 1, "room_id": 1, "user_id": 7, "username": "ada",
                 "content": "earlier", "created_at": "2024-01-01T12:00:00"}
            ],
            "next_cursor": null
        }"#;

        let page: MessagePage = serde_json::from_str(json).unwrap();
        assert_eq!(page.messages.len(), 2);
        assert!(page.next_cursor.is_none());
        assert_eq!(page.messages[0].id, MessageId(2));
    }

    #[test]
    fn context_window_carries_both_cursors() {
        let json = r#"{
            "messages": [],
            "target_message_id": 42,
            "older_cursor": "b2xkZXI=",
            "newer_cursor": "bmV3ZXI="
        }"#;

        let window: ContextWindow = serde_json::from_str(json).unwrap();
        assert_eq!(window.target_message_id, MessageId(42));
        assert_eq!(window.older_cursor.unwrap().as_str(), "b2xkZXI=");
        assert_eq!(window.newer_cursor.unwrap().as_str(), "bmV3ZXI=");
    }

    #[test]
    fn sort_key_breaks_timestamp_ties_by_id() {
        let make = |id: i64| Message {
            id: MessageId(id),
            room_id: RoomId(1),
            user_id: UserId(1),
            username: "ada".into(),
            content: String::new(),
            created_at: Timestamp::parse("2024-01-01T00:00:00").unwrap(),
        };

        assert!(make(1).sort_key() < make(2).sort_key());
    }
}
