//! The synchronization session: commands in, updates out.
//!
//! A [`SyncSession`] is an explicitly owned service object: one per
//! authenticated user, owning exactly one socket for its token. The
//! presentation layer drives it through a typed command channel and renders
//! from the typed update channel; there are no callbacks and no global
//! state, and `Shutdown` tears everything down deterministically.

mod runtime;
mod state;

use skiff_core::{LinkState, TimelineMutation, TimelineSnapshot};
use skiff_proto::{MessageId, Room, RoomId, UserRef};

pub use runtime::{SessionHandle, SyncSession};
pub use state::{FetchPayload, RoomView, SessionState, ViewStamp};

/// User intents forwarded by the presentation layer.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// Enter a room: subscribe and load its latest page.
    SelectRoom {
        /// Metadata of the room to enter (from the room directory).
        room: Room,
    },

    /// Leave a room for good (left or deleted).
    DeselectRoom {
        /// The room to drop.
        room_id: RoomId,
    },

    /// The user scrolled to the top: load the next older page.
    LoadOlder {
        /// The room being scrolled.
        room_id: RoomId,
    },

    /// The user scrolled to the bottom of a context window: load newer.
    LoadNewer {
        /// The room being scrolled.
        room_id: RoomId,
    },

    /// Jump to a specific message, entering context mode.
    JumpToMessage {
        /// The room containing the target.
        room_id: RoomId,
        /// The target message.
        message_id: MessageId,
    },

    /// Leave context mode and return to the latest view.
    ExitContext {
        /// The room to return to the latest view.
        room_id: RoomId,
    },

    /// Retry a failed initial load.
    RetryInitial {
        /// The room whose initial load failed.
        room_id: RoomId,
    },

    /// Send a chat message.
    SendMessage {
        /// Target room.
        room_id: RoomId,
        /// Message body.
        content: String,
    },

    /// Tell other subscribers the user is typing.
    Typing {
        /// The room being typed in.
        room_id: RoomId,
    },

    /// Move the room's read marker to now.
    MarkRead {
        /// The room to mark read.
        room_id: RoomId,
    },

    /// The token provider replaced the credentials: recycle the socket.
    RecycleSocket,

    /// Tear the session down.
    Shutdown,
}

/// Updates pushed to the presentation layer.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    /// The transport's connection status changed.
    Connection(LinkState),

    /// A room's timeline changed. The mutation feeds the scroll planner;
    /// the snapshot is what to render.
    TimelineChanged {
        /// The room that changed.
        room_id: RoomId,
        /// What kind of change happened.
        mutation: TimelineMutation,
        /// The post-mutation read model.
        snapshot: TimelineSnapshot,
    },

    /// Live messages are waiting behind a historical window.
    NewMessagesAvailable {
        /// The room with buffered messages.
        room_id: RoomId,
        /// How many are buffered.
        buffered: usize,
    },

    /// A room's online-user list changed.
    Presence {
        /// The room whose presence changed.
        room_id: RoomId,
        /// Users currently online, sorted by id.
        online: Vec<UserRef>,
    },

    /// A room's set of typing users changed.
    Typing {
        /// The room being typed in.
        room_id: RoomId,
        /// Users with a live typing indicator, sorted by id.
        users: Vec<UserRef>,
    },

    /// A room's unread counter changed.
    Unread {
        /// The room whose counter changed.
        room_id: RoomId,
        /// The new count.
        unread: u32,
    },

    /// The initial load for a room failed; retry with
    /// [`SessionCommand::RetryInitial`].
    InitialLoadFailed {
        /// The room whose load failed.
        room_id: RoomId,
        /// Human-readable failure description.
        error: String,
    },

    /// The server reported an application-level error.
    ServerNotice {
        /// Human-readable description.
        message: String,
    },
}
