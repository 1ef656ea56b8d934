use std::collections::HashMap;

use parking_lot::RwLock;

use super::traits::EventId;

/// Per-partition consumer cursor map: `consumer-name -> next-unacked
/// EventID` (spec.md §4.4 state, §3 ConsumerCursor entity).
///
/// Guarded by its own lock, separate from the event log's (spec.md §5
/// "Shared resources": "Per-partition cursor map: separate mutex").
#[derive(Default)]
pub struct CursorTable {
    cursors: RwLock<HashMap<String, EventId>>,
}

impl CursorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `name`'s cursor, creating it at 0 if this is the first
    /// time the name is seen.
    pub fn get_or_init(&self, name: &str) -> EventId {
        if let Some(existing) = self.cursors.read().get(name) {
            return *existing;
        }
        *self.cursors.write().entry(name.to_string()).or_insert(0)
    }

    /// Raises `name`'s cursor to `event_id + 1`. A no-op if that would
    /// regress the existing value — acknowledge is monotonic.
    pub fn acknowledge(&self, name: &str, event_id: EventId) {
        let candidate = event_id.saturating_add(1);
        let mut cursors = self.cursors.write();
        let entry = cursors.entry(name.to_string()).or_insert(0);
        if candidate > *entry {
            *entry = candidate;
        }
    }

    pub fn current(&self, name: &str) -> Option<EventId> {
        self.cursors.read().get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_consumer_starts_at_zero() {
        let table = CursorTable::new();
        assert_eq!(table.get_or_init("alice"), 0);
    }

    #[test]
    fn acknowledge_raises_cursor_past_acked_event() {
        let table = CursorTable::new();
        table.acknowledge("alice", 4);
        assert_eq!(table.current("alice"), Some(5));
    }

    #[test]
    fn acknowledge_never_regresses_cursor() {
        let table = CursorTable::new();
        table.acknowledge("alice", 10);
        table.acknowledge("alice", 2);
        assert_eq!(table.current("alice"), Some(11));
    }
}
