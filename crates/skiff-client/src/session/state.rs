//! Session state: the engine's view of every subscribed room.
//!
//! Pure with respect to I/O: socket frames, fetch results, and the clock
//! are passed in; updates for the presentation layer come back out. The
//! runtime owns the channels and tasks around this.
//!
//! Staleness is handled with view stamps: every room entry and every mode
//! switch bumps a generation counter, and each fetch carries the stamp
//! captured when it was issued. A result whose stamp no longer matches the
//! room's current generation belongs to a superseded view and is discarded,
//! never merged.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use skiff_core::{SubscriptionAction, SubscriptionSet, Timeline};
use skiff_proto::{
    ContextWindow, MessagePage, Room, RoomId, ServerFrame, Timestamp, UserId, UserRef,
};

use crate::session::SessionUpdate;

/// Identifies the room-view a fetch was issued for.
///
/// Captured at request time; a response is merged only if the room's
/// generation still matches at apply time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewStamp {
    /// The room the fetch belongs to.
    pub room_id: RoomId,
    /// Generation of the room view when the fetch was issued.
    pub generation: u64,
}

/// A successfully fetched payload, tagged by what it means to the timeline.
#[derive(Debug, Clone)]
pub enum FetchPayload {
    /// Initial (or retried) latest page for the room view.
    Initial(MessagePage),
    /// An older page for infinite scroll up.
    Older(MessagePage),
    /// A newer page in context mode.
    Newer(MessagePage),
    /// A jump-to-message context window.
    Context(ContextWindow),
    /// A fresh latest page that ends context mode.
    Exit(MessagePage),
    /// The room's read marker moved.
    MarkedRead(Option<Timestamp>),
}

/// A typing indicator with its arrival time.
#[derive(Debug, Clone)]
struct TypingEntry {
    user: UserRef,
    seen: Instant,
}

/// Per-room view state: timeline, presence, and typing indicators.
#[derive(Debug, Clone)]
pub struct RoomView {
    /// Room metadata (name, read marker, unread counter).
    pub meta: Room,
    /// The reconciled message sequence.
    pub timeline: Timeline,
    /// Users currently online, as reported by the server.
    pub online: Vec<UserRef>,
    /// Generation this view was created (or mode-switched) at.
    pub generation: u64,
    typing: HashMap<UserId, TypingEntry>,
}

impl RoomView {
    fn new(meta: Room, generation: u64) -> Self {
        Self {
            meta,
            timeline: Timeline::new(),
            online: Vec::new(),
            generation,
            typing: HashMap::new(),
        }
    }

    /// Users with a live typing indicator, sorted by id.
    pub fn typing_users(&self) -> Vec<UserRef> {
        let mut users: Vec<UserRef> = self.typing.values().map(|e| e.user.clone()).collect();
        users.sort_unstable_by_key(|u| u.id);
        users
    }
}

/// The engine's state across all subscribed rooms.
#[derive(Debug, Clone)]
pub struct SessionState {
    self_user: UserRef,
    subscriptions: SubscriptionSet,
    rooms: HashMap<RoomId, RoomView>,
    active: Option<RoomId>,
    /// Monotonic generation counter for view stamps.
    counter: u64,
    typing_expiry: Duration,
}

impl SessionState {
    /// Create state for the given user.
    pub fn new(self_user: UserRef, subscription_capacity: usize, typing_expiry: Duration) -> Self {
        Self {
            self_user,
            subscriptions: SubscriptionSet::new(subscription_capacity),
            rooms: HashMap::new(),
            active: None,
            counter: 0,
            typing_expiry,
        }
    }

    /// The authenticated user.
    pub fn self_user(&self) -> &UserRef {
        &self.self_user
    }

    /// The room the user is currently looking at.
    pub fn active_room(&self) -> Option<RoomId> {
        self.active
    }

    /// View state for a room, if subscribed.
    pub fn room(&self, room_id: RoomId) -> Option<&RoomView> {
        self.rooms.get(&room_id)
    }

    /// Rooms currently subscribed, most recent first.
    pub fn subscribed_rooms(&self) -> Vec<RoomId> {
        self.subscriptions.iter().collect()
    }

    /// Actions to replay after the transport replaced its socket.
    pub fn resubscribe_actions(&self) -> Vec<SubscriptionAction> {
        self.subscriptions.resubscribe_all()
    }

    /// Whether a stamp still refers to the room's current view.
    pub fn is_current(&self, stamp: ViewStamp) -> bool {
        self.rooms.get(&stamp.room_id).is_some_and(|view| view.generation == stamp.generation)
    }

    /// Enter a room: subscribe (possibly evicting the least-recently-used
    /// room), reset the view for a fresh room-view session, and hand back
    /// the stamp the initial fetch must carry.
    ///
    /// An evicted room loses its entire view state; re-selecting it later
    /// starts a fresh session with a freshly resolved unread boundary.
    pub fn begin_view(&mut self, room: Room) -> (ViewStamp, Vec<SubscriptionAction>) {
        let room_id = room.id;
        let actions = self.subscriptions.select(room_id);

        for action in &actions {
            if let SubscriptionAction::Unsubscribe(evicted) = action {
                self.rooms.remove(evicted);
                tracing::debug!(room = %evicted, "evicted least-recently-used room");
            }
        }

        self.counter += 1;
        let generation = self.counter;

        match self.rooms.get_mut(&room_id) {
            Some(view) => {
                // Re-entry is a new room-view session: fresh timeline and
                // unread boundary, but presence survives.
                view.meta = room;
                view.timeline = Timeline::new();
                view.generation = generation;
            },
            None => {
                self.rooms.insert(room_id, RoomView::new(room, generation));
            },
        }

        self.active = Some(room_id);
        (ViewStamp { room_id, generation }, actions)
    }

    /// Leave a room entirely (user left or the room was deleted).
    pub fn end_view(&mut self, room_id: RoomId) -> Vec<SubscriptionAction> {
        self.rooms.remove(&room_id);
        if self.active == Some(room_id) {
            self.active = None;
        }
        self.subscriptions.deselect(room_id)
    }

    /// Invalidate in-flight fetches for a room on a mode switch and return
    /// the stamp the next fetch must carry. `None` if the room is unknown.
    pub fn bump(&mut self, room_id: RoomId) -> Option<ViewStamp> {
        let view = self.rooms.get_mut(&room_id)?;
        self.counter += 1;
        view.generation = self.counter;
        Some(ViewStamp { room_id, generation: self.counter })
    }

    /// The current stamp for a room, for fetches that do not switch modes.
    pub fn stamp(&self, room_id: RoomId) -> Option<ViewStamp> {
        self.rooms.get(&room_id).map(|view| ViewStamp { room_id, generation: view.generation })
    }

    /// Apply a fetch result. Stale stamps are discarded without touching
    /// any state.
    pub fn apply_fetch(&mut self, stamp: ViewStamp, payload: FetchPayload) -> Vec<SessionUpdate> {
        if !self.is_current(stamp) {
            tracing::debug!(room = %stamp.room_id, "discarding fetch result for superseded view");
            return vec![];
        }

        let self_id = self.self_user.id;
        let Some(view) = self.rooms.get_mut(&stamp.room_id) else {
            return vec![];
        };

        let mutation = match payload {
            FetchPayload::Initial(page) => {
                view.timeline.apply_initial(page, view.meta.last_read_at, self_id)
            },
            FetchPayload::Older(page) => view.timeline.prepend_older(page),
            FetchPayload::Newer(page) => view.timeline.append_newer(page),
            FetchPayload::Context(window) => view.timeline.enter_context(window),
            FetchPayload::Exit(page) => view.timeline.exit_context(page),
            FetchPayload::MarkedRead(marker) => {
                view.meta.last_read_at = marker.or(view.meta.last_read_at);
                view.meta.unread_count = Some(0);
                return vec![SessionUpdate::Unread { room_id: stamp.room_id, unread: 0 }];
            },
        };

        vec![SessionUpdate::TimelineChanged {
            room_id: stamp.room_id,
            mutation,
            snapshot: view.timeline.snapshot(),
        }]
    }

    /// Apply an inbound socket event.
    pub fn handle_frame(&mut self, frame: ServerFrame, now: Instant) -> Vec<SessionUpdate> {
        match frame {
            ServerFrame::NewMessage { message } => self.handle_new_message(message),
            ServerFrame::UserJoined { room_id, user } => {
                let Some(view) = self.rooms.get_mut(&room_id) else {
                    return vec![];
                };
                if !view.online.iter().any(|u| u.id == user.id) {
                    view.online.push(user);
                    view.online.sort_unstable_by_key(|u| u.id);
                }
                vec![SessionUpdate::Presence { room_id, online: view.online.clone() }]
            },
            ServerFrame::UserLeft { room_id, user } => {
                let Some(view) = self.rooms.get_mut(&room_id) else {
                    return vec![];
                };
                view.online.retain(|u| u.id != user.id);
                view.typing.remove(&user.id);
                vec![SessionUpdate::Presence { room_id, online: view.online.clone() }]
            },
            ServerFrame::Subscribed { room_id, online_users } => {
                let Some(view) = self.rooms.get_mut(&room_id) else {
                    return vec![];
                };
                view.online = online_users;
                view.online.sort_unstable_by_key(|u| u.id);
                vec![SessionUpdate::Presence { room_id, online: view.online.clone() }]
            },
            ServerFrame::Unsubscribed { room_id } => {
                tracing::debug!(room = %room_id, "unsubscribe acknowledged");
                vec![]
            },
            ServerFrame::TypingIndicator { room_id, user } => {
                if user.id == self.self_user.id {
                    return vec![];
                }
                let Some(view) = self.rooms.get_mut(&room_id) else {
                    return vec![];
                };
                view.typing.insert(user.id, TypingEntry { user, seen: now });
                vec![SessionUpdate::Typing { room_id, users: view.typing_users() }]
            },
            ServerFrame::Error { message } => {
                tracing::warn!(%message, "server reported an error");
                vec![SessionUpdate::ServerNotice { message }]
            },
        }
    }

    /// Expire typing indicators that have not been refreshed.
    pub fn prune_typing(&mut self, now: Instant) -> Vec<SessionUpdate> {
        let expiry = self.typing_expiry;
        let mut updates = Vec::new();

        for (&room_id, view) in &mut self.rooms {
            let before = view.typing.len();
            view.typing.retain(|_, entry| now.duration_since(entry.seen) < expiry);
            if view.typing.len() != before {
                updates.push(SessionUpdate::Typing { room_id, users: view.typing_users() });
            }
        }

        updates
    }

    fn handle_new_message(&mut self, message: skiff_proto::Message) -> Vec<SessionUpdate> {
        let room_id = message.room_id;
        let sender = message.user_id;

        let Some(view) = self.rooms.get_mut(&room_id) else {
            // Either never subscribed or an unsubscribe is in flight.
            tracing::debug!(room = %room_id, "dropping message for unsubscribed room");
            return vec![];
        };

        let mutation = view.timeline.append_live(message);
        if matches!(mutation, skiff_core::TimelineMutation::Noop) {
            return vec![];
        }

        // A message from a user ends their typing indicator.
        let typing_changed = view.typing.remove(&sender).is_some();

        let mut updates = vec![SessionUpdate::TimelineChanged {
            room_id,
            mutation,
            snapshot: view.timeline.snapshot(),
        }];

        if let skiff_core::TimelineMutation::LiveBuffered { buffered } = mutation {
            updates.push(SessionUpdate::NewMessagesAvailable { room_id, buffered });
        }

        if typing_changed {
            updates.push(SessionUpdate::Typing { room_id, users: view.typing_users() });
        }

        if self.active != Some(room_id) && sender != self.self_user.id {
            let unread = view.meta.unread_count.unwrap_or(0) + 1;
            view.meta.unread_count = Some(unread);
            updates.push(SessionUpdate::Unread { room_id, unread });
        }

        updates
    }
}
