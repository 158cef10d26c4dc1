use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::watch;

/// Upper bound on incoming requests fetched by [`CommunitySession::refresh`].
const REFRESH_REQUESTS_LIMIT: usize = 500;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub search_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { search_limit: 10 }
    }
}

/// Everything that belongs to one signed-in member: cache, executor and
/// listeners. Sessions are isolated from each other.
pub struct CommunitySession {
    identity: Identity,
    config: SessionConfig,
    store: Arc<dyn RemoteStore>,
    cache: Arc<ClientCache>,
    executor: MutationExecutor,
    subscriptions: SubscriptionManager,
}

impl CommunitySession {
    /// Makes sure the member has a profile document, then builds the session.
    /// Listeners are not started until [`activate`](Self::activate).
    pub async fn open(
        identity: Identity,
        store: Arc<dyn RemoteStore>,
        alerts: Arc<dyn AlertSink>,
        config: SessionConfig,
    ) -> Result<Self, CommunityError> {
        let profile = DocumentRef::profile(&identity.member_id);
        if store.get_document(&profile).await?.is_none() {
            tracing::info!("creating profile for {}", identity.member_id);
            let mut fields = Map::new();
            fields.insert(
                DISPLAY_NAME_FIELD.to_owned(),
                Value::String(identity.display_name.clone()),
            );
            store
                .set_document(&profile, Value::Object(fields), true)
                .await?;
        }

        let cache = Arc::new(ClientCache::new());
        let executor = MutationExecutor::new(
            identity.clone(),
            cache.clone(),
            store.clone(),
            alerts,
        );
        let subscriptions = SubscriptionManager::new(store.clone(), cache.clone());

        Ok(Self {
            identity,
            config,
            store,
            cache,
            executor,
            subscriptions,
        })
    }

    pub async fn activate(&self) {
        self.subscriptions.start(&self.identity).await;
    }

    pub async fn deactivate(&self) {
        self.subscriptions.stop().await;
    }

    /// In-flight writes keep running; only the listeners are detached.
    pub async fn dispose(&self) {
        self.subscriptions.stop().await;
        self.cache.set_search_results(Vec::new());
        tracing::info!(
            pending = self.executor.pending_mutations(),
            "session for {} disposed",
            self.identity.member_id
        );
    }

    pub async fn wait_ready(&self) -> bool {
        self.subscriptions.wait_ready().await
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.subscriptions.status()
    }

    pub fn watch_status(&self) -> watch::Receiver<SubscriptionStatus> {
        self.subscriptions.watch_status()
    }

    pub fn search_results(&self) -> Vec<MemberSummary> {
        self.cache.search_results()
    }

    pub fn pending_mutations(&self) -> usize {
        self.executor.pending_mutations()
    }

    pub fn cache(&self) -> &Arc<ClientCache> {
        &self.cache
    }
}

#[async_trait::async_trait]
impl CommunityService for CommunitySession {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn snapshot(&self) -> ClientCacheSnapshot {
        self.cache.get_snapshot()
    }

    fn watch_snapshot(&self) -> watch::Receiver<ClientCacheSnapshot> {
        self.cache.subscribe()
    }

    fn relation_to(&self, other: &MemberId) -> RelationStatus {
        self.cache
            .get_snapshot()
            .relation_to(&self.identity.member_id, other)
    }

    fn send_request(&self, target: &MemberSummary) -> MutationTicket {
        self.executor.send_request(target)
    }

    fn accept_request(&self, request_id: &RequestId) -> MutationTicket {
        self.executor.accept_request(request_id)
    }

    fn reject_request(&self, request_id: &RequestId) -> MutationTicket {
        self.executor.reject_request(request_id)
    }

    fn cancel_request(&self, target: &MemberId) -> MutationTicket {
        self.executor.cancel_request(target)
    }

    fn remove_friend(&self, target: &MemberId) -> MutationTicket {
        self.executor.remove_friend(target)
    }

    async fn search_members(&self, prefix: &str) -> Result<Vec<MemberSummary>, CommunityError> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            self.cache.set_search_results(Vec::new());
            return Ok(Vec::new());
        }

        let clauses = [
            WhereClause::new(DISPLAY_NAME_FIELD, Comparison::Ge, prefix),
            WhereClause::new(DISPLAY_NAME_FIELD, Comparison::Le, format!("{prefix}\u{f8ff}")),
        ];
        // one extra row so that excluding ourselves still fills the page
        let documents = self
            .store
            .query(USERS_COLLECTION, &clauses, self.config.search_limit.saturating_add(1))
            .await?;

        let mut results = Vec::with_capacity(documents.len());
        for document in &documents {
            if document.id == self.identity.member_id.0 {
                continue;
            }
            match MemberSummary::decode(document) {
                Ok(member) => results.push(member),
                Err(e) => tracing::warn!("skipping search hit: {e}"),
            }
        }
        results.truncate(self.config.search_limit);

        tracing::debug!("search {prefix:?}: {} hit(s)", results.len());
        self.cache.set_search_results(results.clone());
        Ok(results)
    }

    async fn refresh(&self) -> Result<ClientCacheSnapshot, CommunityError> {
        let member = &self.identity.member_id;
        let profile = self
            .store
            .get_document(&DocumentRef::profile(member))
            .await?
            .ok_or_else(|| CommunityError::ProfileNotFound(member.clone()))?;
        let profile = ProfileDocument::decode(&profile)?;

        let documents = self
            .store
            .query(&requests_collection(member), &[], REFRESH_REQUESTS_LIMIT)
            .await?;
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

        self.cache
            .apply_remote_profile(profile.friends, profile.outgoing_requests);
        self.cache.apply_remote_incoming(incoming);
        Ok(self.cache.get_snapshot())
    }
}
