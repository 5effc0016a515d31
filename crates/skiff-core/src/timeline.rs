//! Per-room message timeline reconciliation.
//!
//! The [`Timeline`] merges three independently-arriving sources into one
//! id-deduplicated, chronologically-ordered sequence: paginated REST
//! history, live-pushed messages, and jump-to-message context windows.
//!
//! The governing invariant: for any interleaving of initial fetch,
//! older-page fetch, and live delivery, the displayed sequence is the
//! deterministic union of all distinct-id messages sorted by
//! `(created_at, id)` ascending, and re-applying any event is a no-op.
//!
//! Methods return a [`TimelineMutation`] describing what changed, which the
//! scroll planner consumes to keep the viewport stable.

use std::{collections::HashSet, sync::Arc};

use skiff_proto::{ContextWindow, Cursor, Message, MessageId, MessagePage, Timestamp, UserId};

/// Which window of the room the timeline currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// The normal latest-first view: the sequence ends at the newest known
    /// message and live messages append directly.
    Latest,
    /// A jump-to-message window centered on a target. Live messages only
    /// append directly once the window reaches the true latest message.
    Context {
        /// The highlighted target message.
        target: MessageId,
    },
}

/// Description of a timeline change, for the scroll planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineMutation {
    /// The sequence was replaced by an initial (or refreshed) history page.
    InitialLoaded,
    /// The sequence was replaced by a context window around `target`.
    ContextLoaded {
        /// The jump target.
        target: MessageId,
    },
    /// Older messages were merged in.
    OlderPrepended {
        /// Id of the message that led the sequence before the mutation;
        /// the planner keeps it visually fixed.
        anchor: Option<MessageId>,
        /// Number of messages actually added.
        added: usize,
    },
    /// Newer messages were merged in (context mode only).
    NewerAppended {
        /// Number of messages actually added.
        added: usize,
    },
    /// A live message was appended to the visible sequence.
    LiveAppended,
    /// A live message was buffered instead of shown (historical window).
    LiveBuffered {
        /// Total buffered live messages.
        buffered: usize,
    },
    /// Nothing changed (duplicate delivery, empty page).
    Noop,
}

/// Cheap read-model of a timeline, for handing across task boundaries.
#[derive(Debug, Clone)]
pub struct TimelineSnapshot {
    /// The displayed sequence, chronological.
    pub messages: Arc<[Message]>,
    /// The unread-boundary message, if one was resolved for this session.
    pub unread_anchor: Option<MessageId>,
    /// The highlighted jump target, if in context mode.
    pub target: Option<MessageId>,
    /// Whether the view ends at the newest known message.
    pub pinned_to_latest: bool,
    /// Live messages held back while viewing a historical window.
    pub buffered_live: usize,
    /// Whether an older page can still be fetched.
    pub has_older: bool,
    /// Whether a newer page can still be fetched (context mode).
    pub has_newer: bool,
}

/// Ordered, id-deduplicated message sequence for one room-view session.
#[derive(Debug, Clone)]
pub struct Timeline {
    /// Displayed sequence, sorted by `(created_at, id)`.
    messages: Vec<Message>,
    /// Ids present in `messages`.
    ids: HashSet<MessageId>,
    older_cursor: Option<Cursor>,
    newer_cursor: Option<Cursor>,
    mode: ViewMode,
    /// Resolved once per room-view session, then frozen.
    unread_anchor: Option<MessageId>,
    unread_resolved: bool,
    /// Live tail held back while the view shows a historical window.
    pending_live: Vec<Message>,
}

impl Timeline {
    /// Create an empty timeline for a fresh room-view session.
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            ids: HashSet::new(),
            older_cursor: None,
            newer_cursor: None,
            mode: ViewMode::Latest,
            unread_anchor: None,
            unread_resolved: false,
            pending_live: Vec::new(),
        }
    }

    /// The displayed sequence, chronological.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Current view mode.
    #[must_use]
    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    /// Cursor toward older history, if any remains.
    #[must_use]
    pub fn older_cursor(&self) -> Option<&Cursor> {
        self.older_cursor.as_ref()
    }

    /// Cursor toward newer history, if any remains (context mode).
    #[must_use]
    pub fn newer_cursor(&self) -> Option<&Cursor> {
        self.newer_cursor.as_ref()
    }

    /// The unread-boundary message id, if resolved for this session.
    #[must_use]
    pub fn unread_anchor(&self) -> Option<MessageId> {
        self.unread_anchor
    }

    /// Live messages currently held back from display.
    #[must_use]
    pub fn buffered_live(&self) -> usize {
        self.pending_live.len()
    }

    /// Whether the view ends at the newest known message.
    ///
    /// True in the normal latest view, and in context mode once no newer
    /// page remains outstanding.
    #[must_use]
    pub fn is_pinned_to_latest(&self) -> bool {
        match self.mode {
            ViewMode::Latest => true,
            ViewMode::Context { .. } => self.newer_cursor.is_none(),
        }
    }

    /// Build a snapshot for consumers on other tasks.
    pub fn snapshot(&self) -> TimelineSnapshot {
        TimelineSnapshot {
            messages: self.messages.clone().into(),
            unread_anchor: self.unread_anchor,
            target: match self.mode {
                ViewMode::Context { target } => Some(target),
                ViewMode::Latest => None,
            },
            pinned_to_latest: self.is_pinned_to_latest(),
            buffered_live: self.pending_live.len(),
            has_older: self.older_cursor.is_some(),
            has_newer: self.newer_cursor.is_some(),
        }
    }

    /// Replace the sequence with an initial history page.
    ///
    /// Live messages already held (displayed or buffered) that are strictly
    /// newer than the newest history item survive the replacement, so a
    /// concurrent re-fetch never drops an in-flight live message.
    ///
    /// The unread boundary is resolved here, exactly once per room-view
    /// session: the first history message newer than `last_read_at` and not
    /// authored by `self_id`. Later-arriving live messages never move it.
    pub fn apply_initial(
        &mut self,
        page: MessagePage,
        last_read_at: Option<Timestamp>,
        self_id: UserId,
    ) -> TimelineMutation {
        let history = chronological(page.messages);

        if !self.unread_resolved {
            self.unread_resolved = true;
            self.unread_anchor = history
                .iter()
                .find(|m| {
                    last_read_at.is_none_or(|read| m.created_at > read) && m.user_id != self_id
                })
                .map(|m| m.id);
        }

        self.replace_with(history, page.next_cursor);
        TimelineMutation::InitialLoaded
    }

    /// Merge an older page (infinite scroll up, either view mode).
    ///
    /// Reports the id of the message that led the sequence before the
    /// mutation so the scroll planner can keep it visually fixed.
    pub fn prepend_older(&mut self, page: MessagePage) -> TimelineMutation {
        let anchor = self.messages.first().map(|m| m.id);
        let added = self.merge_batch(chronological(page.messages));
        self.older_cursor = page.next_cursor;
        TimelineMutation::OlderPrepended { anchor, added }
    }

    /// Merge a newer page (context mode scroll down).
    ///
    /// Once the newer direction is exhausted the view is pinned to the
    /// latest message, so any live messages buffered along the way merge in.
    pub fn append_newer(&mut self, page: MessagePage) -> TimelineMutation {
        let mut added = self.merge_batch(chronological(page.messages));
        self.newer_cursor = page.next_cursor;

        if self.newer_cursor.is_none() && !self.pending_live.is_empty() {
            let buffered: Vec<Message> = self.pending_live.drain(..).collect();
            added += self.merge_batch(buffered);
        }

        TimelineMutation::NewerAppended { added }
    }

    /// Deliver a live-pushed message.
    ///
    /// Duplicate deliveries (by id) are no-ops. In the latest view the
    /// message is inserted in order. In a context window it is shown only
    /// when the view is already pinned to the true latest message;
    /// otherwise it is buffered for the jump-to-latest affordance rather
    /// than silently injected into a historical window.
    pub fn append_live(&mut self, message: Message) -> TimelineMutation {
        if self.ids.contains(&message.id) {
            return TimelineMutation::Noop;
        }

        match self.mode {
            ViewMode::Latest => {
                self.insert_sorted(message);
                TimelineMutation::LiveAppended
            },
            ViewMode::Context { .. } => {
                if self.newer_cursor.is_none() {
                    self.insert_sorted(message);
                    return TimelineMutation::LiveAppended;
                }

                if self.pending_live.iter().any(|m| m.id == message.id) {
                    return TimelineMutation::Noop;
                }

                self.pending_live.push(message);
                TimelineMutation::LiveBuffered { buffered: self.pending_live.len() }
            },
        }
    }

    /// Replace the sequence with a jump-to-message context window.
    pub fn enter_context(&mut self, window: ContextWindow) -> TimelineMutation {
        let target = window.target_message_id;
        let messages = sorted_dedup(window.messages);

        self.ids = messages.iter().map(|m| m.id).collect();
        self.messages = messages;
        self.older_cursor = window.older_cursor;
        self.newer_cursor = window.newer_cursor;
        self.mode = ViewMode::Context { target };
        self.pending_live.clear();

        TimelineMutation::ContextLoaded { target }
    }

    /// Leave context mode with a freshly fetched latest-view page.
    ///
    /// Context-only messages outside the normal window are discarded; live
    /// messages buffered during context mode merge in under the same
    /// newest-message cutoff rule as a history replace. The unread anchor,
    /// already resolved, is untouched.
    pub fn exit_context(&mut self, page: MessagePage) -> TimelineMutation {
        self.replace_with(chronological(page.messages), page.next_cursor);
        TimelineMutation::InitialLoaded
    }

    /// Swap in `history` as the new sequence, preserving the live tail.
    fn replace_with(&mut self, history: Vec<Message>, older_cursor: Option<Cursor>) {
        let cutoff = history.last().map(Message::sort_key);

        let tail: Vec<Message> = self
            .messages
            .drain(..)
            .chain(self.pending_live.drain(..))
            .filter(|m| cutoff.is_none_or(|c| m.sort_key() > c))
            .collect();

        self.ids = history.iter().map(|m| m.id).collect();
        self.messages = history;
        self.merge_batch(tail);

        self.older_cursor = older_cursor;
        self.newer_cursor = None;
        self.mode = ViewMode::Latest;
    }

    /// Merge a batch, skipping ids already present. Returns how many were
    /// actually added. The sequence is re-sorted afterwards, so callers
    /// never observe an intermediate order.
    fn merge_batch(&mut self, batch: impl IntoIterator<Item = Message>) -> usize {
        let mut added = 0;
        for message in batch {
            if self.ids.insert(message.id) {
                self.messages.push(message);
                added += 1;
            }
        }

        if added > 0 {
            self.messages.sort_unstable_by_key(Message::sort_key);
        }
        added
    }

    /// Insert one message at its sorted position.
    fn insert_sorted(&mut self, message: Message) {
        self.ids.insert(message.id);
        let key = message.sort_key();
        let index = self.messages.partition_point(|m| m.sort_key() <= key);
        self.messages.insert(index, message);
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize a server page (newest-first) to chronological order, dropping
/// in-page duplicates.
fn chronological(page: Vec<Message>) -> Vec<Message> {
    sorted_dedup(page)
}

fn sorted_dedup(mut messages: Vec<Message>) -> Vec<Message> {
    messages.sort_unstable_by_key(Message::sort_key);
    messages.dedup_by_key(|m| m.id);
    messages
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::DateTime;
    use skiff_proto::RoomId;

    use super::*;

    const SELF: UserId = UserId(1);
    const OTHER: UserId = UserId(2);

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_utc(DateTime::from_timestamp(secs, 0).unwrap())
    }

    fn msg(id: i64, secs: i64) -> Message {
        msg_from(id, secs, OTHER)
    }

    fn msg_from(id: i64, secs: i64, user_id: UserId) -> Message {
        Message {
            id: MessageId(id),
            room_id: RoomId(1),
            user_id,
            username: "someone".into(),
            content: format!("message {id}"),
            created_at: ts(secs),
        }
    }

    fn page(messages: Vec<Message>, cursor: Option<&str>) -> MessagePage {
        MessagePage { messages, next_cursor: cursor.map(Cursor::new) }
    }

    fn ids(timeline: &Timeline) -> Vec<i64> {
        timeline.messages().iter().map(|m| m.id.0).collect()
    }

    #[test]
    fn initial_page_is_reversed_to_chronological() {
        let mut timeline = Timeline::new();
        // Server order: newest first.
        timeline.apply_initial(
            page(vec![msg(3, 30), msg(2, 20), msg(1, 10)], Some("older")),
            None,
            SELF,
        );

        assert_eq!(ids(&timeline), vec![1, 2, 3]);
        assert!(timeline.older_cursor().is_some());
    }

    #[test]
    fn duplicate_live_delivery_is_a_noop() {
        let mut timeline = Timeline::new();
        timeline.apply_initial(page(vec![], None), None, SELF);

        assert_eq!(timeline.append_live(msg(5, 50)), TimelineMutation::LiveAppended);
        assert_eq!(timeline.append_live(msg(5, 50)), TimelineMutation::Noop);
        assert_eq!(ids(&timeline), vec![5]);
    }

    #[test]
    fn live_messages_survive_a_concurrent_refetch() {
        let mut timeline = Timeline::new();
        timeline.apply_initial(page(vec![msg(2, 20), msg(1, 10)], None), None, SELF);

        // Live messages arrive while a refresh is in flight.
        timeline.append_live(msg(4, 40));
        timeline.append_live(msg(3, 30));

        // The refresh resolves without the newest live messages.
        timeline.apply_initial(page(vec![msg(2, 20), msg(1, 10)], None), None, SELF);

        assert_eq!(ids(&timeline), vec![1, 2, 3, 4]);
    }

    #[test]
    fn older_page_prepends_and_reports_the_anchor() {
        let mut timeline = Timeline::new();
        timeline.apply_initial(page(vec![msg(4, 40), msg(3, 30)], Some("c1")), None, SELF);

        let mutation =
            timeline.prepend_older(page(vec![msg(2, 20), msg(1, 10)], None));

        assert_eq!(
            mutation,
            TimelineMutation::OlderPrepended { anchor: Some(MessageId(3)), added: 2 }
        );
        assert_eq!(ids(&timeline), vec![1, 2, 3, 4]);
        assert!(timeline.older_cursor().is_none());
    }

    #[test]
    fn older_page_filters_already_present_ids() {
        let mut timeline = Timeline::new();
        timeline.apply_initial(page(vec![msg(3, 30), msg(2, 20)], Some("c1")), None, SELF);

        let mutation = timeline.prepend_older(page(vec![msg(2, 20), msg(1, 10)], None));

        assert_eq!(
            mutation,
            TimelineMutation::OlderPrepended { anchor: Some(MessageId(2)), added: 1 }
        );
        assert_eq!(ids(&timeline), vec![1, 2, 3]);
    }

    #[test]
    fn timestamp_ties_break_by_id() {
        let mut timeline = Timeline::new();
        timeline.apply_initial(page(vec![], None), None, SELF);

        timeline.append_live(msg(7, 10));
        timeline.append_live(msg(5, 10));
        timeline.append_live(msg(6, 10));

        assert_eq!(ids(&timeline), vec![5, 6, 7]);
    }

    #[test]
    fn unread_anchor_resolves_from_initial_fetch_only() {
        let mut timeline = Timeline::new();
        timeline.apply_initial(
            page(vec![msg(3, 30), msg(2, 20), msg(1, 10)], None),
            Some(ts(15)),
            SELF,
        );

        assert_eq!(timeline.unread_anchor(), Some(MessageId(2)));

        // Later live messages never move it.
        timeline.append_live(msg(9, 90));
        assert_eq!(timeline.unread_anchor(), Some(MessageId(2)));

        // Nor does a refresh within the same session.
        timeline.apply_initial(page(vec![msg(9, 90), msg(3, 30)], None), Some(ts(15)), SELF);
        assert_eq!(timeline.unread_anchor(), Some(MessageId(2)));
    }

    #[test]
    fn unread_anchor_skips_own_messages() {
        let mut timeline = Timeline::new();
        timeline.apply_initial(
            page(vec![msg(3, 30), msg_from(2, 20, SELF), msg(1, 10)], None),
            Some(ts(15)),
            SELF,
        );

        assert_eq!(timeline.unread_anchor(), Some(MessageId(3)));
    }

    #[test]
    fn never_read_room_anchors_at_first_foreign_message() {
        let mut timeline = Timeline::new();
        timeline.apply_initial(
            page(vec![msg(2, 20), msg_from(1, 10, SELF)], None),
            None,
            SELF,
        );

        assert_eq!(timeline.unread_anchor(), Some(MessageId(2)));
    }

    #[test]
    fn fully_read_room_has_no_anchor() {
        let mut timeline = Timeline::new();
        timeline.apply_initial(
            page(vec![msg(2, 20), msg(1, 10)], None),
            Some(ts(30)),
            SELF,
        );

        assert_eq!(timeline.unread_anchor(), None);
    }

    #[test]
    fn context_window_buffers_live_messages() {
        let mut timeline = Timeline::new();
        let window = ContextWindow {
            messages: vec![msg(10, 100), msg(11, 110), msg(12, 120)],
            target_message_id: MessageId(11),
            older_cursor: Some(Cursor::new("older")),
            newer_cursor: Some(Cursor::new("newer")),
        };

        let mutation = timeline.enter_context(window);
        assert_eq!(mutation, TimelineMutation::ContextLoaded { target: MessageId(11) });
        assert!(!timeline.is_pinned_to_latest());

        // Live messages are buffered, not injected into the historical view.
        let mutation = timeline.append_live(msg(50, 500));
        assert_eq!(mutation, TimelineMutation::LiveBuffered { buffered: 1 });
        assert_eq!(ids(&timeline), vec![10, 11, 12]);

        // Duplicate delivery of the buffered message is also a no-op.
        assert_eq!(timeline.append_live(msg(50, 500)), TimelineMutation::Noop);
        assert_eq!(timeline.buffered_live(), 1);
    }

    #[test]
    fn context_pinned_to_latest_appends_live_directly() {
        let mut timeline = Timeline::new();
        let window = ContextWindow {
            messages: vec![msg(10, 100)],
            target_message_id: MessageId(10),
            older_cursor: Some(Cursor::new("older")),
            newer_cursor: None,
        };
        timeline.enter_context(window);
        assert!(timeline.is_pinned_to_latest());

        assert_eq!(timeline.append_live(msg(11, 110)), TimelineMutation::LiveAppended);
        assert_eq!(ids(&timeline), vec![10, 11]);
    }

    #[test]
    fn reaching_the_live_edge_merges_the_buffer() {
        let mut timeline = Timeline::new();
        let window = ContextWindow {
            messages: vec![msg(10, 100)],
            target_message_id: MessageId(10),
            older_cursor: None,
            newer_cursor: Some(Cursor::new("newer")),
        };
        timeline.enter_context(window);

        timeline.append_live(msg(30, 300));

        // The final newer page exhausts the cursor; the buffer merges.
        let mutation = timeline.append_newer(page(vec![msg(20, 200)], None));
        assert_eq!(mutation, TimelineMutation::NewerAppended { added: 2 });
        assert_eq!(ids(&timeline), vec![10, 20, 30]);
        assert_eq!(timeline.buffered_live(), 0);
        assert!(timeline.is_pinned_to_latest());
    }

    #[test]
    fn exit_context_merges_buffered_live_messages() {
        let mut timeline = Timeline::new();
        timeline.apply_initial(page(vec![msg(2, 20), msg(1, 10)], None), None, SELF);

        let window = ContextWindow {
            messages: vec![msg(1, 10)],
            target_message_id: MessageId(1),
            older_cursor: None,
            newer_cursor: Some(Cursor::new("newer")),
        };
        timeline.enter_context(window);
        timeline.append_live(msg(5, 50));

        // Back to the normal view: the fresh page lacks the live message.
        let mutation = timeline.exit_context(page(vec![msg(3, 30), msg(2, 20)], Some("c")));

        assert_eq!(mutation, TimelineMutation::InitialLoaded);
        assert_eq!(ids(&timeline), vec![2, 3, 5]);
        assert_eq!(timeline.mode(), ViewMode::Latest);
        assert_eq!(timeline.buffered_live(), 0);
    }

    #[test]
    fn interleavings_converge_to_the_same_union() {
        let initial = || page(vec![msg(4, 40), msg(3, 30)], Some("c1"));
        let older = || page(vec![msg(2, 20), msg(1, 10)], None);
        let live = || msg(5, 50);

        let mut a = Timeline::new();
        a.apply_initial(initial(), None, SELF);
        a.prepend_older(older());
        a.append_live(live());

        let mut b = Timeline::new();
        b.apply_initial(initial(), None, SELF);
        b.append_live(live());
        b.prepend_older(older());

        assert_eq!(ids(&a), vec![1, 2, 3, 4, 5]);
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn snapshot_reflects_view_state() {
        let mut timeline = Timeline::new();
        timeline.apply_initial(page(vec![msg(1, 10)], Some("older")), None, SELF);

        let snap = timeline.snapshot();
        assert_eq!(snap.messages.len(), 1);
        assert!(snap.pinned_to_latest);
        assert!(snap.has_older);
        assert!(!snap.has_newer);
        assert_eq!(snap.target, None);
    }
}
