use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct MutationId(pub uuid::Uuid);

impl MutationId {
    pub fn new() -> Self {
        MutationId(uuid::Uuid::new_v4())
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MutationKind {
    SendRequest,
    AcceptRequest,
    RejectRequest,
    CancelRequest,
    RemoveFriend,
}

impl MutationKind {
    /// Static text shown to the member when the remote write fails.
    pub fn failure_message(&self) -> &'static str {
        match self {
            MutationKind::SendRequest => "Could not send the friend request. Please try again.",
            MutationKind::AcceptRequest => "Could not accept the friend request. Please try again.",
            MutationKind::RejectRequest => "Could not decline the friend request. Please try again.",
            MutationKind::CancelRequest => "Could not cancel the friend request. Please try again.",
            MutationKind::RemoveFriend => "Could not remove this friend. Please try again.",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum SkipReason {
    #[error("cannot target yourself")]
    SelfTarget,
    #[error("already friends")]
    AlreadyFriends,
    #[error("a request between the pair is already pending")]
    RequestPending,
    #[error("request not found")]
    RequestNotFound,
    #[error("not friends")]
    NotFriends,
}

/// Lifecycle of one optimistic mutation.
///
/// `Skipped` never touches the cache. `Applied` is the optimistic state and
/// always settles to `Committed` or `RolledBack`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum MutationState {
    Skipped(SkipReason),
    Applied,
    Committed,
    RolledBack(String),
}

impl MutationState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, MutationState::Applied)
    }
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub kind: MutationKind,
    pub message: &'static str,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn for_mutation(kind: MutationKind) -> Self {
        Self {
            kind,
            message: kind.failure_message(),
            raised_at: Utc::now(),
        }
    }
}
