//! Lazy-creating registry of [`Room`]s, keyed by `roomId`.
//!
//! The teacher's `RoomManager` requires explicit room creation to guard
//! against accidental rooms and leave room for future authorization. This
//! spec's rooms are unauthenticated and named by client-supplied string id
//! (§3 GLOSSARY `RoomId`), so there is nothing to authorize against and no
//! reason to reject a first reference — the first `join` for an unseen
//! `roomId` simply creates it (see `DESIGN.md` REDESIGN decision 1).

use std::collections::HashMap;

use collab_core::OtDocument;

use crate::room::Room;

/// Owns every currently-live room.
#[derive(Debug, Default)]
pub struct RoomRegistry<D: OtDocument> {
    rooms: HashMap<String, Room<D>>,
}

impl<D: OtDocument> RoomRegistry<D> {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { rooms: HashMap::new() }
    }

    /// The room for `room_id`, creating it at version 0 if this is the first
    /// reference.
    pub fn get_or_create(&mut self, room_id: &str) -> &mut Room<D> {
        self.rooms.entry(room_id.to_string()).or_insert_with(|| Room::new(room_id))
    }

    /// The room for `room_id`, if it has been created.
    #[must_use]
    pub fn get(&self, room_id: &str) -> Option<&Room<D>> {
        self.rooms.get(room_id)
    }

    /// Mutable access to the room for `room_id`, if it has been created.
    pub fn get_mut(&mut self, room_id: &str) -> Option<&mut Room<D>> {
        self.rooms.get_mut(room_id)
    }

    /// Drop a room with no remaining clients. Idle, empty rooms are never
    /// cleaned up automatically by this registry; callers decide when
    /// (e.g. after a `leave` empties the last client).
    pub fn remove_if_empty(&mut self, room_id: &str) {
        if self.rooms.get(room_id).is_some_and(Room::is_empty) {
            self.rooms.remove(room_id);
        }
    }

    /// Every live room, for heartbeat ticking.
    pub fn rooms_mut(&mut self) -> impl Iterator<Item = &mut Room<D>> {
        self.rooms.values_mut()
    }

    /// Number of currently live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
