//! Bounded multi-room subscription set.
//!
//! Tracks the rooms the user currently cares about, ordered by recency of
//! selection and bounded at a fixed capacity. Selecting past the bound
//! evicts the least-recently-used room. Methods return the transport
//! actions the driver must issue, so the set itself stays pure.

use std::collections::VecDeque;

use skiff_proto::RoomId;

/// Default maximum number of concurrently subscribed rooms.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 10;

/// Transport actions produced by the subscription set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionAction {
    /// Issue a subscribe for this room.
    Subscribe(RoomId),
    /// Issue an unsubscribe for this room.
    Unsubscribe(RoomId),
}

/// Recency-ordered, bounded set of subscribed rooms.
///
/// Invariants: no duplicate entries; the length never exceeds the capacity;
/// every member has exactly one outstanding transport subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionSet {
    /// Members, most-recently-selected first.
    order: VecDeque<RoomId>,
    capacity: usize,
}

impl SubscriptionSet {
    /// Create an empty set with the given capacity (at least 1).
    pub fn new(capacity: usize) -> Self {
        Self { order: VecDeque::new(), capacity: capacity.max(1) }
    }

    /// Number of subscribed rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no rooms are subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Whether the room is currently subscribed.
    #[must_use]
    pub fn contains(&self, room_id: RoomId) -> bool {
        self.order.contains(&room_id)
    }

    /// Members, most-recently-selected first.
    pub fn iter(&self) -> impl Iterator<Item = RoomId> + '_ {
        self.order.iter().copied()
    }

    /// Select a room.
    ///
    /// An already-present room moves to most-recent without any transport
    /// traffic. A new room is inserted as most-recent and subscribed; if
    /// that pushes the set past its capacity, the least-recently-used room
    /// is evicted and unsubscribed.
    pub fn select(&mut self, room_id: RoomId) -> Vec<SubscriptionAction> {
        if let Some(pos) = self.order.iter().position(|&id| id == room_id) {
            self.order.remove(pos);
            self.order.push_front(room_id);
            return vec![];
        }

        self.order.push_front(room_id);
        let mut actions = vec![SubscriptionAction::Subscribe(room_id)];

        if self.order.len() > self.capacity
            && let Some(evicted) = self.order.pop_back()
        {
            actions.push(SubscriptionAction::Unsubscribe(evicted));
        }

        actions
    }

    /// Drop a room (leave or delete), regardless of its position.
    pub fn deselect(&mut self, room_id: RoomId) -> Vec<SubscriptionAction> {
        match self.order.iter().position(|&id| id == room_id) {
            Some(pos) => {
                self.order.remove(pos);
                vec![SubscriptionAction::Unsubscribe(room_id)]
            },
            None => vec![],
        }
    }

    /// Re-issue a subscribe for every member, most recent first.
    ///
    /// Called after the transport replaces its socket: subscriptions do not
    /// survive a reconnect, so the whole set must be replayed.
    pub fn resubscribe_all(&self) -> Vec<SubscriptionAction> {
        self.order.iter().map(|&id| SubscriptionAction::Subscribe(id)).collect()
    }
}

impl Default for SubscriptionSet {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIPTION_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(id: i64) -> RoomId {
        RoomId(id)
    }

    #[test]
    fn new_room_is_subscribed() {
        let mut subs = SubscriptionSet::default();
        let actions = subs.select(room(1));
        assert_eq!(actions, vec![SubscriptionAction::Subscribe(room(1))]);
        assert!(subs.contains(room(1)));
    }

    #[test]
    fn reselect_refreshes_recency_without_traffic() {
        let mut subs = SubscriptionSet::new(2);
        subs.select(room(1));
        subs.select(room(2));

        // Re-selecting room 1 makes it most recent but sends nothing.
        let actions = subs.select(room(1));
        assert!(actions.is_empty());
        assert_eq!(subs.iter().collect::<Vec<_>>(), vec![room(1), room(2)]);

        // Room 2 is now least recent and gets evicted by the next insert.
        let actions = subs.select(room(3));
        assert_eq!(actions, vec![
            SubscriptionAction::Subscribe(room(3)),
            SubscriptionAction::Unsubscribe(room(2)),
        ]);
    }

    #[test]
    fn eleventh_room_evicts_the_first_selected() {
        let mut subs = SubscriptionSet::default();
        for id in 1..=10 {
            subs.select(room(id));
        }
        assert_eq!(subs.len(), 10);

        let actions = subs.select(room(11));
        assert_eq!(actions, vec![
            SubscriptionAction::Subscribe(room(11)),
            SubscriptionAction::Unsubscribe(room(1)),
        ]);
        assert_eq!(subs.len(), 10);
        assert!(!subs.contains(room(1)));
    }

    #[test]
    fn bound_holds_under_many_selections() {
        let mut subs = SubscriptionSet::default();
        for id in 1..=100 {
            subs.select(room(id));
            assert!(subs.len() <= DEFAULT_SUBSCRIPTION_CAPACITY);
        }
    }

    #[test]
    fn eviction_unsubscribes_exactly_once() {
        let mut subs = SubscriptionSet::new(3);
        for id in 1..=4 {
            subs.select(room(id));
        }

        let unsubscribes: Vec<_> = (5..=20)
            .flat_map(|id| subs.select(room(id)))
            .filter(|a| matches!(a, SubscriptionAction::Unsubscribe(_)))
            .collect();

        // One eviction per overflow insert, never more.
        assert_eq!(unsubscribes.len(), 16);
    }

    #[test]
    fn deselect_removes_from_any_position() {
        let mut subs = SubscriptionSet::default();
        subs.select(room(1));
        subs.select(room(2));
        subs.select(room(3));

        let actions = subs.deselect(room(2));
        assert_eq!(actions, vec![SubscriptionAction::Unsubscribe(room(2))]);
        assert_eq!(subs.iter().collect::<Vec<_>>(), vec![room(3), room(1)]);

        // Deselecting an absent room is silent.
        assert!(subs.deselect(room(99)).is_empty());
    }

    #[test]
    fn resubscribe_replays_every_member() {
        let mut subs = SubscriptionSet::default();
        subs.select(room(1));
        subs.select(room(2));

        let actions = subs.resubscribe_all();
        assert_eq!(actions, vec![
            SubscriptionAction::Subscribe(room(2)),
            SubscriptionAction::Subscribe(room(1)),
        ]);
    }
}
