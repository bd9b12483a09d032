//! Per-room presence tracking (§4.1).

use std::collections::HashMap;

use collab_proto::PresenceRecord;

/// In-memory mapping from client id to presence record, owned exclusively by
/// a single [`crate::room`]-equivalent driver (§5 Shared-resource policy).
///
/// A record's timestamp is stamped by the caller on upsert; the store itself
/// does not read the system clock, keeping it a pure, deterministic
/// collection for property testing.
#[derive(Debug, Clone, Default)]
pub struct PresenceStore {
    records: HashMap<String, PresenceRecord>,
}

impl PresenceStore {
    /// An empty presence store.
    #[must_use]
    pub fn new() -> Self {
        Self { records: HashMap::new() }
    }

    /// Insert or replace the record for `client_id`.
    pub fn upsert(&mut self, client_id: impl Into<String>, record: PresenceRecord) {
        self.records.insert(client_id.into(), record);
    }

    /// Refresh only the timestamp of an existing record, leaving cursor and
    /// metadata untouched.
    ///
    /// This is the `pong` touch (§4.2 `handlePong`, §9 Open Questions: the
    /// source overwrote cursor fields with a synthetic presence on `pong`;
    /// this implementation never does that). A no-op if the client has no
    /// record yet — there is nothing to touch.
    pub fn touch(&mut self, client_id: &str, now_ms: i64) {
        if let Some(record) = self.records.get_mut(client_id) {
            record.timestamp = now_ms;
        }
    }

    /// Idempotently remove a client's record.
    pub fn remove(&mut self, client_id: &str) {
        self.records.remove(client_id);
    }

    /// Look up a client's current record.
    #[must_use]
    pub fn get(&self, client_id: &str) -> Option<&PresenceRecord> {
        self.records.get(client_id)
    }

    /// Enumerate every current record. Order is unobservable to clients
    /// (§4.1): callers must not depend on it being stable across calls.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &PresenceRecord)> {
        self.records.iter().map(|(id, record)| (id.as_str(), record))
    }

    /// Remove and return the id of every record whose `now_ms - timestamp >
    /// cutoff_ms`.
    pub fn prune_older_than(&mut self, now_ms: i64, cutoff_ms: i64) -> Vec<String> {
        let stale: Vec<String> = self
            .records
            .iter()
            .filter(|(_, record)| now_ms - record.timestamp > cutoff_ms)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            self.records.remove(id);
        }
        stale
    }

    /// Number of currently tracked records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
