//! In-memory presence
//!
//! Maps each user to the set of live connection handles. A user is online
//! while that set is non-empty. State is process-local and starts empty on
//! every boot.
//!
//! Both maps are sharded, so unrelated users never contend. Every mutation of a
//! user's handle set happens under that entry's shard lock, and emptying the set
//! removes the entry in the same critical section, which is what makes the
//! online/offline transitions fire exactly once.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Identifies one realtime connection
pub type ConnectionId = Uuid;

#[derive(Default)]
pub struct PresenceTracker {
    users: DashMap<String, HashSet<ConnectionId>>,
    owners: DashMap<ConnectionId, String>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `handle` to `user_id`. Returns `true` when the user just came online.
    ///
    /// A handle is bound to a single identity for its whole life; attaching it
    /// again under the same identity is a no-op.
    pub fn connect(&self, user_id: &str, handle: ConnectionId) -> Result<bool> {
        match self.owners.entry(handle) {
            Entry::Occupied(owner) if owner.get() == user_id => return Ok(false),
            Entry::Occupied(_) => {
                return Err(Error::Forbidden(
                    "Connection is already bound to another user".to_string(),
                ))
            }
            Entry::Vacant(slot) => {
                slot.insert(user_id.to_string());
            }
        }

        let mut handles = self.users.entry(user_id.to_string()).or_default();
        let came_online = handles.is_empty();
        handles.insert(handle);
        Ok(came_online)
    }

    /// Detach `handle`. Returns the user id when this was their last handle.
    pub fn disconnect(&self, handle: ConnectionId) -> Option<String> {
        let (_, user_id) = self.owners.remove(&handle)?;
        self.users
            .remove_if_mut(&user_id, |_, handles| {
                handles.remove(&handle);
                handles.is_empty()
            })
            .map(|(user_id, _)| user_id)
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.users
            .get(user_id)
            .map(|handles| !handles.is_empty())
            .unwrap_or(false)
    }

    pub fn handles_for(&self, user_id: &str) -> HashSet<ConnectionId> {
        self.users
            .get(user_id)
            .map(|handles| handles.value().clone())
            .unwrap_or_default()
    }

    /// Everyone with at least one live connection, sorted.
    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.users.iter().map(|entry| entry.key().clone()).collect();
        users.sort();
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_multiple_handles_single_offline() {
        let tracker = PresenceTracker::new();
        let (h1, h2) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(tracker.connect("u", h1).unwrap());
        assert!(!tracker.connect("u", h2).unwrap());
        assert!(tracker.is_online("u"));

        assert_eq!(tracker.disconnect(h1), None);
        assert!(tracker.is_online("u"));

        let mut offline_events = 0;
        if tracker.disconnect(h2).is_some() {
            offline_events += 1;
        }
        if tracker.disconnect(h2).is_some() {
            offline_events += 1;
        }
        assert_eq!(offline_events, 1);
        assert!(!tracker.is_online("u"));
        assert!(tracker.handles_for("u").is_empty());
    }

    #[test]
    fn test_rebinding_handle() {
        let tracker = PresenceTracker::new();
        let h = Uuid::new_v4();
        assert!(tracker.connect("u", h).unwrap());
        assert!(!tracker.connect("u", h).unwrap());
        assert!(matches!(tracker.connect("v", h), Err(Error::Forbidden(_))));
        assert!(tracker.handles_for("u").contains(&h));
        assert!(!tracker.is_online("v"));
    }

    #[test]
    fn test_unknown_handle_disconnect() {
        let tracker = PresenceTracker::new();
        assert_eq!(tracker.disconnect(Uuid::new_v4()), None);
    }

    #[test]
    fn test_online_users() {
        let tracker = PresenceTracker::new();
        let b = Uuid::new_v4();
        tracker.connect("b", b).unwrap();
        tracker.connect("a", Uuid::new_v4()).unwrap();
        assert_eq!(tracker.online_users(), vec!["a", "b"]);

        tracker.disconnect(b);
        assert_eq!(tracker.online_users(), vec!["a"]);
    }

    #[test]
    fn test_concurrent_transitions_fire_once() {
        let tracker = Arc::new(PresenceTracker::new());
        let handles: Vec<ConnectionId> = (0..64).map(|_| Uuid::new_v4()).collect();
        let online_events = AtomicUsize::new(0);
        let offline_events = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for chunk in handles.chunks(8) {
                let tracker = &tracker;
                let online_events = &online_events;
                scope.spawn(move || {
                    for &h in chunk {
                        if tracker.connect("shared", h).unwrap() {
                            online_events.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });
        assert_eq!(online_events.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.handles_for("shared").len(), 64);

        std::thread::scope(|scope| {
            for chunk in handles.chunks(8) {
                let tracker = &tracker;
                let offline_events = &offline_events;
                scope.spawn(move || {
                    for &h in chunk {
                        if tracker.disconnect(h).is_some() {
                            offline_events.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });
        assert_eq!(offline_events.load(Ordering::SeqCst), 1);
        assert!(!tracker.is_online("shared"));
    }
}
