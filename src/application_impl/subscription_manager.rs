use crate::application_impl::ClientCache;
use crate::domain_model::*;
use crate::domain_port::*;
use futures_util::future::join_all;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SubscriptionPhase {
    Idle,
    Starting,
    Active,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SubscriptionStatus {
    pub phase: SubscriptionPhase,
    pub profile_loaded: bool,
    pub requests_loaded: bool,
}

impl SubscriptionStatus {
    fn idle() -> Self {
        Self {
            phase: SubscriptionPhase::Idle,
            profile_loaded: false,
            requests_loaded: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.phase == SubscriptionPhase::Active
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Slice {
    Profile,
    Requests,
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slice::Profile => write!(f, "profile"),
            Slice::Requests => write!(f, "requests"),
        }
    }
}

struct ActiveListeners {
    member: MemberId,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Binds the client cache to the store's live snapshots while the owning
/// scope is active.
pub struct SubscriptionManager {
    store: Arc<dyn RemoteStore>,
    cache: Arc<ClientCache>,
    active: Mutex<Option<ActiveListeners>>,
    status: Arc<watch::Sender<SubscriptionStatus>>,
}

impl SubscriptionManager {
    pub fn new(store: Arc<dyn RemoteStore>, cache: Arc<ClientCache>) -> Self {
        Self {
            store,
            cache,
            active: Mutex::new(None),
            status: Arc::new(watch::Sender::new(SubscriptionStatus::idle())),
        }
    }

    pub fn status(&self) -> SubscriptionStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<SubscriptionStatus> {
        self.status.subscribe()
    }

    /// Resolves once both slices have delivered their first snapshot (or
    /// failed). Returns `false` if the manager went idle first.
    pub async fn wait_ready(&self) -> bool {
        let mut rx = self.status.subscribe();
        match rx
            .wait_for(|s| s.is_ready() || s.phase == SubscriptionPhase::Idle)
            .await
        {
            Ok(status) => status.is_ready(),
            Err(_) => false,
        }
    }

    pub async fn start(&self, identity: &Identity) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            tracing::debug!("restarting listeners for {}", previous.member);
            shutdown(previous).await;
        }

        self.status.send_replace(SubscriptionStatus {
            phase: SubscriptionPhase::Starting,
            profile_loaded: false,
            requests_loaded: false,
        });

        let member = identity.member_id.clone();
        let cancel = CancellationToken::new();
        let targets = [
            (
                Slice::Profile,
                ListenTarget::Document(DocumentRef::profile(&member)),
            ),
            (
                Slice::Requests,
                ListenTarget::Collection(requests_collection(&member)),
            ),
        ];

        let mut handles = Vec::with_capacity(targets.len());
        for (slice, target) in targets {
            match self.store.subscribe(target).await {
                Ok(stream) => handles.push(tokio::spawn(run_listener(
                    slice,
                    stream,
                    self.cache.clone(),
                    self.status.clone(),
                    cancel.clone(),
                ))),
                Err(e) => {
                    tracing::error!("subscribe {slice} for {member}: {e}");
                    mark_loaded(&self.status, slice);
                }
            }
        }

        tracing::info!("listeners started for {member}");
        *active = Some(ActiveListeners {
            member,
            cancel,
            handles,
        });
    }

    /// Safe to call repeatedly or before `start`.
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            tracing::info!("listeners stopped for {}", previous.member);
            shutdown(previous).await;
        }
        self.status.send_replace(SubscriptionStatus::idle());
    }
}

async fn shutdown(listeners: ActiveListeners) {
    listeners.cancel.cancel();
    for result in join_all(listeners.handles).await {
        if let Err(e) = result {
            tracing::error!("listener task failed: {e}");
        }
    }
}

fn mark_loaded(status: &watch::Sender<SubscriptionStatus>, slice: Slice) {
    status.send_if_modified(|s| {
        if s.phase == SubscriptionPhase::Idle {
            return false;
        }
        let before = *s;
        match slice {
            Slice::Profile => s.profile_loaded = true,
            Slice::Requests => s.requests_loaded = true,
        }
        if s.profile_loaded && s.requests_loaded {
            s.phase = SubscriptionPhase::Active;
        }
        *s != before
    });
}

async fn run_listener(
    slice: Slice,
    mut stream: SnapshotStream,
    cache: Arc<ClientCache>,
    status: Arc<watch::Sender<SubscriptionStatus>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = stream.recv() => match event {
                Some(Ok(snapshot)) => {
                    if let Err(e) = apply_remote(slice, snapshot, &cache) {
                        tracing::warn!("{slice} snapshot rejected: {e}");
                    }
                    mark_loaded(&status, slice);
                }
                Some(Err(e)) => {
                    tracing::error!("{slice} listener error: {e}");
                    mark_loaded(&status, slice);
                }
                None => {
                    tracing::warn!("{slice} listener closed by store");
                    mark_loaded(&status, slice);
                    break;
                }
            },
        }
    }
    tracing::trace!("{slice} listener exiting");
}

#[derive(Debug, thiserror::Error)]
enum ApplyError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("expected a {0} snapshot")]
    WrongShape(Slice),
}

fn apply_remote(slice: Slice, snapshot: RemoteSnapshot, cache: &ClientCache) -> Result<(), ApplyError> {
    match (slice, snapshot) {
        (Slice::Profile, RemoteSnapshot::Document(Some(document))) => {
            let profile = ProfileDocument::decode(&document)?;
            cache.apply_remote_profile(profile.friends, profile.outgoing_requests);
        }
        (Slice::Profile, RemoteSnapshot::Document(None)) => {
            cache.apply_remote_profile(Vec::new(), Vec::new());
        }
        (Slice::Requests, RemoteSnapshot::Collection(documents)) => {
            let incoming = documents
                .iter()
                .filter_map(|d| match IncomingRequest::decode(d) {
                    Ok(request) => Some(request),
                    Err(e) => {
                        tracing::warn!("skipping friend request: {e}");
                        None
                    }
                })
                .collect();
            cache.apply_remote_incoming(incoming);
        }
        (slice, _) => return Err(ApplyError::WrongShape(slice)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_local::MemoryRemoteStore;
    use serde_json::json;

    fn alice() -> Identity {
        Identity::new("u1", "alice")
    }

    fn setup() -> (Arc<MemoryRemoteStore>, Arc<ClientCache>, SubscriptionManager) {
        let store = Arc::new(MemoryRemoteStore::new());
        store
            .seed_profile(
                &"u1".into(),
                &ProfileDocument {
                    display_name: "alice".into(),
                    friends: vec![Friendship {
                        member_id: "u2".into(),
                        display_name: "bob".into(),
                    }],
                    outgoing_requests: Vec::new(),
                },
            )
            .unwrap();
        let cache = Arc::new(ClientCache::new());
        let manager = SubscriptionManager::new(store.clone(), cache.clone());
        (store, cache, manager)
    }

    #[tokio::test]
    async fn start_loads_both_slices() {
        let (_store, cache, manager) = setup();
        assert_eq!(manager.status().phase, SubscriptionPhase::Idle);

        manager.start(&alice()).await;
        assert!(manager.wait_ready().await);

        assert_eq!(cache.get_snapshot().friends.len(), 1);
        manager.stop().await;
    }

    #[tokio::test]
    async fn restart_does_not_duplicate_listeners() {
        let (store, _cache, manager) = setup();
        manager.start(&alice()).await;
        manager.start(&alice()).await;
        assert_eq!(store.listener_count(), 2);

        manager.stop().await;
        manager.stop().await;
        assert_eq!(store.listener_count(), 0);
        assert_eq!(manager.status(), SubscriptionStatus::idle());
    }

    #[tokio::test]
    async fn remote_snapshot_overwrites_optimistic_state() {
        let (store, cache, manager) = setup();
        manager.start(&alice()).await;
        assert!(manager.wait_ready().await);

        let mut rx = cache.subscribe();
        rx.borrow_and_update();
        store
            .update_document(
                &DocumentRef::profile(&"u1".into()),
                Patch::new().set(FRIENDS_FIELD, json!([])),
            )
            .await
            .unwrap();
        rx.changed().await.unwrap();

        assert!(cache.get_snapshot().friends.is_empty());
        manager.stop().await;
    }

    #[tokio::test]
    async fn failed_subscribe_still_reports_ready() {
        let (store, cache, manager) = setup();
        store.fail_subscribe(StoreError::PermissionDenied("users".into()));

        manager.start(&alice()).await;
        assert!(manager.wait_ready().await);
        assert_eq!(cache.get_snapshot(), ClientCacheSnapshot::default());
        manager.stop().await;
    }

    #[tokio::test]
    async fn malformed_profile_keeps_last_known_slice() {
        let (store, cache, manager) = setup();
        manager.start(&alice()).await;
        assert!(manager.wait_ready().await);

        store
            .set_document(
                &DocumentRef::profile(&"u1".into()),
                json!({ "displayName": 42 }),
                false,
            )
            .await
            .unwrap();
        // a later valid write proves the listener survived the bad snapshot
        let mut rx = cache.subscribe();
        rx.borrow_and_update();
        store
            .seed_request(
                &"u1".into(),
                &"r1".into(),
                &RequestDocument {
                    sender_id: "u3".into(),
                    sender_display_name: "carol".into(),
                },
            )
            .unwrap();
        rx.changed().await.unwrap();

        let snapshot = cache.get_snapshot();
        assert_eq!(snapshot.friends.len(), 1);
        assert_eq!(snapshot.incoming.len(), 1);
        manager.stop().await;
    }
}
