//! Socket envelope contract.
//!
//! Every frame on the persistent socket is a JSON object with a
//! discriminator field: `action` for client-to-server requests, `type` for
//! server-to-client events. Unknown or malformed frames must be rejectable
//! without touching the connection, so decoding is plain `serde_json` with
//! no side effects.

use serde::{Deserialize, Serialize};

use crate::{
    ids::{RoomId, UserId},
    rest::Message,
};

/// A user reference carried inside socket events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// User id.
    pub id: UserId,
    /// Display name.
    pub username: String,
}

/// Client-to-server socket actions, discriminated by `action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Start receiving events for a room.
    Subscribe {
        /// Room to subscribe to.
        room_id: RoomId,
    },

    /// Stop receiving events for a room.
    Unsubscribe {
        /// Room to unsubscribe from.
        room_id: RoomId,
    },

    /// Send a chat message.
    SendMessage {
        /// Target room.
        room_id: RoomId,
        /// Message body.
        content: String,
    },

    /// Notify other subscribers that the user is typing.
    UserTyping {
        /// Room the user is typing in.
        room_id: RoomId,
    },
}

/// Server-to-client socket events, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A new message was posted to a subscribed room.
    NewMessage {
        /// The delivered message.
        message: Message,
    },

    /// A user joined a subscribed room.
    UserJoined {
        /// Room the user joined.
        room_id: RoomId,
        /// The user.
        user: UserRef,
    },

    /// A user left a subscribed room.
    UserLeft {
        /// Room the user left.
        room_id: RoomId,
        /// The user.
        user: UserRef,
    },

    /// Subscription acknowledged; carries the room's current online users.
    Subscribed {
        /// The acknowledged room.
        room_id: RoomId,
        /// Users currently online in the room.
        online_users: Vec<UserRef>,
    },

    /// Unsubscription acknowledged.
    Unsubscribed {
        /// The unsubscribed room.
        room_id: RoomId,
    },

    /// Another subscriber is typing.
    TypingIndicator {
        /// Room the user is typing in.
        room_id: RoomId,
        /// The typing user.
        user: UserRef,
    },

    /// Server-side error report. Informational; the connection stays open.
    Error {
        /// Human-readable description.
        message: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_serialize_with_action_tag() {
        let frame = ClientFrame::SendMessage { room_id: RoomId(3), content: "hi".into() };
        let json: serde_json::Value = serde_json::to_value(&frame).unwrap();

        assert_eq!(json["action"], "send_message");
        assert_eq!(json["room_id"], 3);
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn subscribe_roundtrips() {
        let frame = ClientFrame::Subscribe { room_id: RoomId(9) };
        let json = serde_json::to_string(&frame).unwrap();
        let back: ClientFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, back);
    }

    #[test]
    fn new_message_event_decodes() {
        let json = r#"{
            "type": "new_message",
            "message": {"id": 5, "room_id": 1, "user_id": 2, "username": "bob",
                        "content": "hello", "created_at": "2024-01-01T12:00:00"}
        }"#;

        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        match frame {
            ServerFrame::NewMessage { message } => {
                assert_eq!(message.content, "hello");
                assert_eq!(message.room_id, RoomId(1));
            },
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn subscribed_event_carries_online_users() {
        let json = r#"{
            "type": "subscribed",
            "room_id": 4,
            "online_users": [{"id": 1, "username": "ada"}, {"id": 2, "username": "bob"}]
        }"#;

        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        match frame {
            ServerFrame::Subscribed { room_id, online_users } => {
                assert_eq!(room_id, RoomId(4));
                assert_eq!(online_users.len(), 2);
            },
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn unknown_discriminator_is_rejected() {
        let json = r#"{"type": "server_restarting", "room_id": 1}"#;
        assert!(serde_json::from_str::<ServerFrame>(json).is_err());
    }

    #[test]
    fn missing_fields_are_rejected() {
        let json = r#"{"type": "user_joined", "room_id": 1}"#;
        assert!(serde_json::from_str::<ServerFrame>(json).is_err());
    }
}
