//! Connection registry: tracks which (room, client) memberships belong to
//! each live transport session, so a dropped connection can be cleaned up
//! without the driver having to remember what it joined.
//!
//! Unlike the teacher's `ConnectionRegistry`, this one does not double as the
//! room-membership store — each [`crate::room::Room`] owns its own `clients`
//! set directly (§3 Room invariants). This registry only answers "what must
//! I tear down when session N disconnects?" and there is no one-session-
//! per-user enforcement: a `ClientId` is unique only within a room (§3), and
//! nothing in the spec forbids one connection joining several rooms or one
//! user running several tabs.

use std::collections::HashMap;
use std::collections::HashSet;

/// A (room, client) pair identifying one membership.
pub type Membership = (String, String);

/// Tracks, per transport session, the set of rooms/clientIds it has joined.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Session id → memberships established over that connection.
    sessions: HashMap<u64, HashSet<Membership>>,
}

impl ConnectionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session with no memberships yet.
    ///
    /// Returns `false` if the session id is already registered.
    pub fn register_session(&mut self, session_id: u64) -> bool {
        if self.sessions.contains_key(&session_id) {
            return false;
        }
        self.sessions.insert(session_id, HashSet::new());
        true
    }

    /// Remove a session and return every membership it held, so the caller
    /// can issue a `handle_leave` against each room.
    pub fn unregister_session(&mut self, session_id: u64) -> HashSet<Membership> {
        self.sessions.remove(&session_id).unwrap_or_default()
    }

    /// Whether a session is currently registered.
    #[must_use]
    pub fn has_session(&self, session_id: u64) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Record that a session joined `(room_id, client_id)`.
    ///
    /// Returns `false` if the session is not registered.
    pub fn record_join(&mut self, session_id: u64, room_id: &str, client_id: &str) -> bool {
        let Some(memberships) = self.sessions.get_mut(&session_id) else {
            return false;
        };
        memberships.insert((room_id.to_string(), client_id.to_string()));
        true
    }

    /// Record that a session left `(room_id, client_id)`, e.g. on an
    /// explicit `leave` message that doesn't close the transport.
    pub fn record_leave(&mut self, session_id: u64, room_id: &str, client_id: &str) {
        if let Some(memberships) = self.sessions.get_mut(&session_id) {
            memberships.remove(&(room_id.to_string(), client_id.to_string()));
        }
    }

    /// Every membership currently held by a session.
    pub fn memberships(&self, session_id: u64) -> impl Iterator<Item = &Membership> {
        self.sessions.get(&session_id).into_iter().flatten()
    }

    /// Every `(session_id, client_id)` pair currently joined to `room_id`,
    /// across all sessions. Used by the driver to resolve a room's
    /// broadcast/send-to targets back to transport sessions.
    pub fn sessions_for_room<'a>(
        &'a self,
        room_id: &'a str,
    ) -> impl Iterator<Item = (u64, &'a str)> + 'a {
        self.sessions.iter().flat_map(move |(&session_id, memberships)| {
            memberships.iter().filter_map(move |(r, client_id)| {
                (r == room_id).then_some((session_id, client_id.as_str()))
            })
        })
    }

    /// Total number of registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup_session() {
        let mut registry = ConnectionRegistry::new();
        assert!(registry.register_session(1));
        assert!(registry.has_session(1));
        assert!(!registry.has_session(2));
    }

    #[test]
    fn register_duplicate_session_fails() {
        let mut registry = ConnectionRegistry::new();
        assert!(registry.register_session(1));
        assert!(!registry.register_session(1));
    }

    #[test]
    fn record_join_requires_registered_session() {
        let mut registry = ConnectionRegistry::new();
        assert!(!registry.record_join(99, "room-1", "a"));
    }

    #[test]
    fn unregister_session_returns_all_memberships() {
        let mut registry = ConnectionRegistry::new();
        registry.register_session(1);
        registry.record_join(1, "room-1", "a");
        registry.record_join(1, "room-2", "a");

        let memberships = registry.unregister_session(1);
        assert_eq!(memberships.len(), 2);
        assert!(memberships.contains(&("room-1".to_string(), "a".to_string())));
        assert!(memberships.contains(&("room-2".to_string(), "a".to_string())));
        assert!(!registry.has_session(1));
    }

    #[test]
    fn record_leave_removes_single_membership() {
        let mut registry = ConnectionRegistry::new();
        registry.register_session(1);
        registry.record_join(1, "room-1", "a");
        registry.record_join(1, "room-2", "a");

        registry.record_leave(1, "room-1", "a");

        let remaining: Vec<_> = registry.memberships(1).cloned().collect();
        assert_eq!(remaining, vec![("room-2".to_string(), "a".to_string())]);
    }

    #[test]
    fn one_session_can_join_multiple_rooms_and_multiple_sessions_can_share_a_room() {
        let mut registry = ConnectionRegistry::new();
        registry.register_session(1);
        registry.register_session(2);

        assert!(registry.record_join(1, "room-1", "a"));
        assert!(registry.record_join(1, "room-2", "a"));
        assert!(registry.record_join(2, "room-1", "b"));

        assert_eq!(registry.memberships(1).count(), 2);
        assert_eq!(registry.memberships(2).count(), 1);
    }

    #[test]
    fn sessions_for_room_returns_only_matching_room() {
        let mut registry = ConnectionRegistry::new();
        registry.register_session(1);
        registry.register_session(2);
        registry.record_join(1, "room-1", "a");
        registry.record_join(2, "room-1", "b");
        registry.record_join(2, "room-2", "b");

        let mut found: Vec<_> = registry.sessions_for_room("room-1").collect();
        found.sort_unstable();
        assert_eq!(found, vec![(1, "a"), (2, "b")]);
    }

    #[test]
    fn session_count_tracks_registrations() {
        let mut registry = ConnectionRegistry::new();
        assert_eq!(registry.session_count(), 0);
        registry.register_session(1);
        assert_eq!(registry.session_count(), 1);
        registry.register_session(2);
        assert_eq!(registry.session_count(), 2);
        registry.unregister_session(1);
        assert_eq!(registry.session_count(), 1);
    }
}
