use crate::domain_model::*;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// In-memory projection of the social graph for one signed-in member.
///
/// Only the subscription manager (confirmed remote state) and the mutation
/// executor (optimistic and rollback state) write to it.
pub struct ClientCache {
    snapshot: watch::Sender<ClientCacheSnapshot>,
    search_results: watch::Sender<Vec<MemberSummary>>,
    // bumped on every remote delivery, read and written under the snapshot lock
    profile_generation: AtomicU64,
    incoming_generation: AtomicU64,
}

/// State captured around one optimistic change, enough to undo it.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub saved: ClientCacheSnapshot,
    pub applied: ClientCacheSnapshot,
    profile_generation: u64,
    incoming_generation: u64,
}

impl Checkpoint {
    fn touches_profile(&self) -> bool {
        self.saved.friends != self.applied.friends || self.saved.outgoing != self.applied.outgoing
    }

    fn touches_incoming(&self) -> bool {
        self.saved.incoming != self.applied.incoming
    }
}

impl ClientCache {
    pub fn new() -> Self {
        Self {
            snapshot: watch::Sender::new(ClientCacheSnapshot::default()),
            search_results: watch::Sender::new(Vec::new()),
            profile_generation: AtomicU64::new(0),
            incoming_generation: AtomicU64::new(0),
        }
    }

    pub fn get_snapshot(&self) -> ClientCacheSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientCacheSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn apply_snapshot(&self, snapshot: ClientCacheSnapshot) {
        self.snapshot.send_replace(snapshot);
    }

    pub fn apply_remote_profile(&self, friends: Vec<Friendship>, outgoing: Vec<OutgoingRequest>) {
        self.snapshot.send_modify(|s| {
            s.friends = friends;
            s.outgoing = outgoing;
            self.profile_generation.fetch_add(1, Ordering::Relaxed);
        });
    }

    pub fn apply_remote_incoming(&self, incoming: Vec<IncomingRequest>) {
        self.snapshot.send_modify(|s| {
            s.incoming = incoming;
            self.incoming_generation.fetch_add(1, Ordering::Relaxed);
        });
    }

    /// Checks preconditions and applies the optimistic change in one step.
    ///
    /// Returns a [`Checkpoint`] holding the pre-mutation and applied
    /// snapshots. On a failed precondition nothing changes and watchers are
    /// not woken.
    pub fn try_apply<F>(&self, change: F) -> Result<Checkpoint, SkipReason>
    where
        F: FnOnce(&mut ClientCacheSnapshot) -> Result<(), SkipReason>,
    {
        let mut outcome = Err(SkipReason::RequestNotFound);
        self.snapshot.send_if_modified(|current| {
            let mut next = current.clone();
            match change(&mut next) {
                Ok(()) => {
                    let saved = std::mem::replace(current, next.clone());
                    outcome = Ok(Checkpoint {
                        saved,
                        applied: next,
                        profile_generation: self.profile_generation.load(Ordering::Relaxed),
                        incoming_generation: self.incoming_generation.load(Ordering::Relaxed),
                    });
                    true
                }
                Err(reason) => {
                    outcome = Err(reason);
                    false
                }
            }
        });
        outcome
    }

    /// Undoes an optimistic change.
    ///
    /// Only slices the change touched are restored, and only while no remote
    /// snapshot has replaced them since the checkpoint was taken. A slice the
    /// store has delivered in the meantime already holds confirmed state.
    pub fn rollback(&self, checkpoint: &Checkpoint) {
        self.snapshot.send_if_modified(|current| {
            let mut restored = false;
            if checkpoint.touches_profile()
                && self.profile_generation.load(Ordering::Relaxed) == checkpoint.profile_generation
            {
                current.friends = checkpoint.saved.friends.clone();
                current.outgoing = checkpoint.saved.outgoing.clone();
                restored = true;
            }
            if checkpoint.touches_incoming()
                && self.incoming_generation.load(Ordering::Relaxed)
                    == checkpoint.incoming_generation
            {
                current.incoming = checkpoint.saved.incoming.clone();
                restored = true;
            }
            restored
        });
    }

    pub fn search_results(&self) -> Vec<MemberSummary> {
        self.search_results.borrow().clone()
    }

    pub fn set_search_results(&self, results: Vec<MemberSummary>) {
        self.search_results.send_replace(results);
    }
}

impl Default for ClientCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn friend(id: &str, name: &str) -> Friendship {
        Friendship {
            member_id: id.into(),
            display_name: name.into(),
        }
    }

    #[test]
    fn snapshots_are_copies() {
        let cache = ClientCache::new();
        let mut snapshot = cache.get_snapshot();
        snapshot.friends.push(friend("u2", "bob"));
        assert!(cache.get_snapshot().friends.is_empty());
    }

    #[test]
    fn remote_profile_replaces_instead_of_merging() {
        let cache = ClientCache::new();
        cache.apply_snapshot(ClientCacheSnapshot {
            friends: vec![friend("u2", "bob")],
            ..Default::default()
        });
        cache.apply_remote_profile(Vec::new(), Vec::new());
        assert_eq!(cache.get_snapshot().friends, Vec::<Friendship>::new());
    }

    #[test]
    fn failed_precondition_leaves_state_and_watchers_alone() {
        let cache = ClientCache::new();
        let mut rx = cache.subscribe();
        rx.borrow_and_update();

        let result = cache.try_apply(|_| Err(SkipReason::NotFriends));

        assert_eq!(result, Err(SkipReason::NotFriends));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn applied_change_returns_both_sides() {
        let cache = ClientCache::new();
        let checkpoint = cache
            .try_apply(|s| {
                s.friends.push(friend("u2", "bob"));
                Ok(())
            })
            .unwrap();
        assert!(checkpoint.saved.friends.is_empty());
        assert_eq!(checkpoint.applied.friends, vec![friend("u2", "bob")]);
        assert_eq!(cache.get_snapshot(), checkpoint.applied);
    }

    #[test]
    fn rollback_restores_the_saved_snapshot() {
        let cache = ClientCache::new();
        cache.apply_remote_profile(vec![friend("u4", "dave")], Vec::new());
        let before = cache.get_snapshot();

        let checkpoint = cache
            .try_apply(|s| {
                s.friends.clear();
                Ok(())
            })
            .unwrap();
        cache.rollback(&checkpoint);

        assert_eq!(cache.get_snapshot(), before);
    }

    #[test]
    fn rollback_keeps_remote_state_delivered_in_flight() {
        let cache = ClientCache::new();
        let checkpoint = cache
            .try_apply(|s| {
                s.outgoing.push(OutgoingRequest {
                    receiver_id: "u5".into(),
                    receiver_display_name: "erin".into(),
                });
                Ok(())
            })
            .unwrap();

        let confirmed = IncomingRequest {
            request_id: "r1".into(),
            sender_id: "u2".into(),
            sender_display_name: "bob".into(),
        };
        cache.apply_remote_incoming(vec![confirmed.clone()]);
        cache.rollback(&checkpoint);

        let snapshot = cache.get_snapshot();
        assert_eq!(snapshot.incoming, vec![confirmed]);
        assert!(snapshot.outgoing.is_empty());
    }

    #[test]
    fn rollback_skips_a_slice_the_store_replaced() {
        let cache = ClientCache::new();
        cache.apply_remote_profile(vec![friend("u4", "dave")], Vec::new());
        let checkpoint = cache
            .try_apply(|s| {
                s.friends.clear();
                Ok(())
            })
            .unwrap();

        // the store confirms a different friend list while the write is pending
        cache.apply_remote_profile(vec![friend("u6", "fay")], Vec::new());
        cache.rollback(&checkpoint);

        assert_eq!(cache.get_snapshot().friends, vec![friend("u6", "fay")]);
    }
}
