use crate::domain_model::*;
use crate::domain_port::StoreError;
use tokio::sync::watch;

#[derive(Debug, thiserror::Error)]
pub enum CommunityError {
    #[error("profile not found: {0}")]
    ProfileNotFound(MemberId),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("encode document: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Handle on one optimistic mutation.
///
/// The cache change has already happened by the time the ticket is returned;
/// the ticket only reports how the remote write settles.
#[derive(Debug)]
pub struct MutationTicket {
    pub id: MutationId,
    pub kind: MutationKind,
    state: watch::Receiver<MutationState>,
}

impl MutationTicket {
    pub fn new(id: MutationId, kind: MutationKind, state: watch::Receiver<MutationState>) -> Self {
        Self { id, kind, state }
    }

    pub fn skipped(kind: MutationKind, reason: SkipReason) -> Self {
        let (_, state) = watch::channel(MutationState::Skipped(reason));
        Self::new(MutationId::new(), kind, state)
    }

    pub fn state(&self) -> MutationState {
        self.state.borrow().clone()
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.state(), MutationState::Skipped(_))
    }

    /// Waits for `Committed` or `RolledBack`. Returns the last known state if
    /// the writer went away without settling.
    pub async fn settled(mut self) -> MutationState {
        loop {
            let current = self.state.borrow_and_update().clone();
            if current.is_settled() {
                return current;
            }
            if self.state.changed().await.is_err() {
                return self.state.borrow().clone();
            }
        }
    }
}

/// Social graph operations for the signed-in member.
///
/// Mutations return immediately after the optimistic cache update and must be
/// called from within a tokio runtime.
#[async_trait::async_trait]
pub trait CommunityService: Send + Sync {
    fn identity(&self) -> &Identity;
    fn snapshot(&self) -> ClientCacheSnapshot;
    fn watch_snapshot(&self) -> watch::Receiver<ClientCacheSnapshot>;
    fn relation_to(&self, other: &MemberId) -> RelationStatus;

    fn send_request(&self, target: &MemberSummary) -> MutationTicket;
    fn accept_request(&self, request_id: &RequestId) -> MutationTicket;
    fn reject_request(&self, request_id: &RequestId) -> MutationTicket;
    fn cancel_request(&self, target: &MemberId) -> MutationTicket;
    fn remove_friend(&self, target: &MemberId) -> MutationTicket;

    async fn search_members(&self, prefix: &str) -> Result<Vec<MemberSummary>, CommunityError>;
    async fn refresh(&self) -> Result<ClientCacheSnapshot, CommunityError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn skipped_ticket_is_already_settled() {
        let ticket = MutationTicket::skipped(MutationKind::SendRequest, SkipReason::SelfTarget);
        assert!(ticket.is_skipped());
        assert_eq!(
            ticket.settled().await,
            MutationState::Skipped(SkipReason::SelfTarget)
        );
    }

    #[tokio::test]
    async fn settled_waits_for_the_writer() {
        let (tx, rx) = watch::channel(MutationState::Applied);
        let ticket = MutationTicket::new(MutationId::new(), MutationKind::RemoveFriend, rx);
        tokio::spawn(async move {
            let _ = tx.send(MutationState::Committed);
        });
        assert_eq!(ticket.settled().await, MutationState::Committed);
    }
}
