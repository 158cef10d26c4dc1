use crate::application_impl::{Checkpoint, ClientCache};
use crate::application_port::{CommunityError, MutationTicket};
use crate::domain_model::*;
use crate::domain_port::*;
use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Upper bound on request documents looked up when cancelling a request.
const CANCEL_LOOKUP_LIMIT: usize = 16;

/// Runs each social graph action as optimistic update, then remote write,
/// then rollback if the write fails.
pub struct MutationExecutor {
    me: Identity,
    cache: Arc<ClientCache>,
    store: Arc<dyn RemoteStore>,
    alerts: Arc<dyn AlertSink>,
    inflight: Arc<DashMap<MutationId, MutationKind>>,
}

impl MutationExecutor {
    pub fn new(
        me: Identity,
        cache: Arc<ClientCache>,
        store: Arc<dyn RemoteStore>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            me,
            cache,
            store,
            alerts,
            inflight: Arc::new(DashMap::new()),
        }
    }

    pub fn pending_mutations(&self) -> usize {
        self.inflight.len()
    }

    pub fn send_request(&self, target: &MemberSummary) -> MutationTicket {
        let kind = MutationKind::SendRequest;
        let me = &self.me.member_id;
        let outgoing = OutgoingRequest {
            receiver_id: target.member_id.clone(),
            receiver_display_name: target.display_name.clone(),
        };

        let applied = self.cache.try_apply(|s| {
            if &target.member_id == me {
                return Err(SkipReason::SelfTarget);
            }
            if s.is_friend(&target.member_id) {
                return Err(SkipReason::AlreadyFriends);
            }
            if s.has_outgoing_to(&target.member_id) || s.incoming_from(&target.member_id).is_some()
            {
                return Err(SkipReason::RequestPending);
            }
            s.outgoing.push(outgoing.clone());
            Ok(())
        });
        match applied {
            Ok(checkpoint) => self.launch(
                kind,
                checkpoint,
                write_send_request(self.store.clone(), self.me.clone(), outgoing),
            ),
            Err(reason) => self.skip(kind, reason),
        }
    }

    pub fn accept_request(&self, request_id: &RequestId) -> MutationTicket {
        let kind = MutationKind::AcceptRequest;
        let mut accepted = None;

        let applied = self.cache.try_apply(|s| {
            let position = s
                .incoming
                .iter()
                .position(|r| &r.request_id == request_id)
                .ok_or(SkipReason::RequestNotFound)?;
            let request = s.incoming.remove(position);
            if !s.is_friend(&request.sender_id) {
                s.friends.push(Friendship {
                    member_id: request.sender_id.clone(),
                    display_name: request.sender_display_name.clone(),
                });
            }
            accepted = Some(request);
            Ok(())
        });
        match (applied, accepted) {
            (Ok(checkpoint), Some(request)) => self.launch(
                kind,
                checkpoint,
                write_accept_request(self.store.clone(), self.me.clone(), request),
            ),
            (Err(reason), _) => self.skip(kind, reason),
            (Ok(_), None) => self.skip(kind, SkipReason::RequestNotFound),
        }
    }

    pub fn reject_request(&self, request_id: &RequestId) -> MutationTicket {
        let kind = MutationKind::RejectRequest;

        let applied = self.cache.try_apply(|s| {
            let before = s.incoming.len();
            s.incoming.retain(|r| &r.request_id != request_id);
            if s.incoming.len() == before {
                return Err(SkipReason::RequestNotFound);
            }
            Ok(())
        });
        match applied {
            Ok(checkpoint) => {
                let doc = DocumentRef::friend_request(&self.me.member_id, request_id);
                self.launch(kind, checkpoint, write_reject_request(self.store.clone(), doc))
            }
            Err(reason) => self.skip(kind, reason),
        }
    }

    pub fn cancel_request(&self, target: &MemberId) -> MutationTicket {
        let kind = MutationKind::CancelRequest;

        let applied = self.cache.try_apply(|s| {
            let before = s.outgoing.len();
            s.outgoing.retain(|r| &r.receiver_id != target);
            if s.outgoing.len() == before {
                return Err(SkipReason::RequestNotFound);
            }
            Ok(())
        });
        match applied {
            Ok(checkpoint) => self.launch(
                kind,
                checkpoint,
                write_cancel_request(
                    self.store.clone(),
                    self.me.member_id.clone(),
                    target.clone(),
                ),
            ),
            Err(reason) => self.skip(kind, reason),
        }
    }

    pub fn remove_friend(&self, target: &MemberId) -> MutationTicket {
        let kind = MutationKind::RemoveFriend;

        let applied = self.cache.try_apply(|s| {
            let before = s.friends.len();
            s.friends.retain(|f| &f.member_id != target);
            if s.friends.len() == before {
                return Err(SkipReason::NotFriends);
            }
            Ok(())
        });
        match applied {
            Ok(checkpoint) => self.launch(
                kind,
                checkpoint,
                write_remove_friend(
                    self.store.clone(),
                    self.me.member_id.clone(),
                    target.clone(),
                ),
            ),
            Err(reason) => self.skip(kind, reason),
        }
    }

    fn skip(&self, kind: MutationKind, reason: SkipReason) -> MutationTicket {
        tracing::debug!(?kind, "mutation skipped: {reason}");
        MutationTicket::skipped(kind, reason)
    }

    fn launch<F>(&self, kind: MutationKind, checkpoint: Checkpoint, remote: F) -> MutationTicket
    where
        F: Future<Output = Result<(), CommunityError>> + Send + 'static,
    {
        let id = MutationId::new();
        let (state_tx, state_rx) = watch::channel(MutationState::Applied);
        self.inflight.insert(id, kind);
        tracing::debug!(%id, ?kind, "optimistic update applied");

        let cache = self.cache.clone();
        let alerts = self.alerts.clone();
        let inflight = self.inflight.clone();
        tokio::spawn(async move {
            let settled = match remote.await {
                Ok(()) => {
                    tracing::debug!(%id, ?kind, "mutation committed");
                    MutationState::Committed
                }
                Err(e) => {
                    tracing::warn!(%id, ?kind, "mutation failed, rolling back: {e}");
                    cache.rollback(&checkpoint);
                    alerts.alert(Alert::for_mutation(kind)).await;
                    MutationState::RolledBack(e.to_string())
                }
            };
            inflight.remove(&id);
            let _ = state_tx.send(settled);
        });

        MutationTicket::new(id, kind, state_rx)
    }
}

// region remote writes

async fn write_send_request(
    store: Arc<dyn RemoteStore>,
    sender: Identity,
    outgoing: OutgoingRequest,
) -> Result<(), CommunityError> {
    let request_id = RequestId::generate();
    let body = RequestDocument {
        sender_id: sender.member_id.clone(),
        sender_display_name: sender.display_name.clone(),
    };
    let ops = vec![
        WriteOp::Set {
            doc: DocumentRef::friend_request(&outgoing.receiver_id, &request_id),
            data: serde_json::to_value(&body)?,
            merge: false,
        },
        WriteOp::Update {
            doc: DocumentRef::profile(&sender.member_id),
            patch: Patch::new()
                .array_union(OUTGOING_REQUESTS_FIELD, vec![serde_json::to_value(&outgoing)?]),
        },
    ];
    store.batch_write(ops).await?;
    Ok(())
}

async fn write_accept_request(
    store: Arc<dyn RemoteStore>,
    me: Identity,
    request: IncomingRequest,
) -> Result<(), CommunityError> {
    let for_me = Friendship {
        member_id: request.sender_id.clone(),
        display_name: request.sender_display_name.clone(),
    };
    let for_sender = Friendship {
        member_id: me.member_id.clone(),
        display_name: me.display_name.clone(),
    };
    // one delete, one friend-array update per side
    let ops = vec![
        WriteOp::Update {
            doc: DocumentRef::profile(&me.member_id),
            patch: Patch::new().array_union(FRIENDS_FIELD, vec![serde_json::to_value(&for_me)?]),
        },
        WriteOp::Update {
            doc: DocumentRef::profile(&request.sender_id),
            patch: Patch::new()
                .array_union(FRIENDS_FIELD, vec![serde_json::to_value(&for_sender)?])
                .array_remove_where(
                    OUTGOING_REQUESTS_FIELD,
                    RECEIVER_ID_KEY,
                    Value::String(me.member_id.0.clone()),
                ),
        },
        WriteOp::Delete {
            doc: DocumentRef::friend_request(&me.member_id, &request.request_id),
        },
    ];
    store.batch_write(ops).await?;
    Ok(())
}

async fn write_reject_request(
    store: Arc<dyn RemoteStore>,
    doc: DocumentRef,
) -> Result<(), CommunityError> {
    store.delete_document(&doc).await?;
    Ok(())
}

async fn write_cancel_request(
    store: Arc<dyn RemoteStore>,
    me: MemberId,
    target: MemberId,
) -> Result<(), CommunityError> {
    let collection = requests_collection(&target);
    let pending = store
        .query(
            &collection,
            &[WhereClause::new(SENDER_ID_FIELD, Comparison::Eq, me.0.clone())],
            CANCEL_LOOKUP_LIMIT,
        )
        .await?;

    let mut ops: Vec<WriteOp> = pending
        .into_iter()
        .map(|d| WriteOp::Delete {
            doc: DocumentRef::new(collection.clone(), d.id),
        })
        .collect();
    ops.push(WriteOp::Update {
        doc: DocumentRef::profile(&me),
        patch: Patch::new().array_remove_where(
            OUTGOING_REQUESTS_FIELD,
            RECEIVER_ID_KEY,
            Value::String(target.0.clone()),
        ),
    });
    store.batch_write(ops).await?;
    Ok(())
}

async fn write_remove_friend(
    store: Arc<dyn RemoteStore>,
    me: MemberId,
    target: MemberId,
) -> Result<(), CommunityError> {
    let mut tx = store.begin_transaction().await?;

    // re-read both sides so concurrent edits are not clobbered
    let mine = tx
        .get(&DocumentRef::profile(&me))
        .await?
        .ok_or_else(|| CommunityError::ProfileNotFound(me.clone()))?;
    let theirs = tx.get(&DocumentRef::profile(&target)).await?;

    let mine = ProfileDocument::decode(&mine)?;
    stage_friends_without(&mut *tx, &me, mine.friends, &target)?;
    if let Some(theirs) = theirs {
        let theirs = ProfileDocument::decode(&theirs)?;
        stage_friends_without(&mut *tx, &target, theirs.friends, &me)?;
    }

    tx.commit().await?;
    Ok(())
}

fn stage_friends_without(
    tx: &mut (dyn StoreTransaction + '_),
    owner: &MemberId,
    friends: Vec<Friendship>,
    removed: &MemberId,
) -> Result<(), CommunityError> {
    let remaining: Vec<Friendship> = friends
        .into_iter()
        .filter(|f| &f.member_id != removed)
        .collect();
    tx.stage(WriteOp::Update {
        doc: DocumentRef::profile(owner),
        patch: Patch::new().set(FRIENDS_FIELD, serde_json::to_value(&remaining)?),
    });
    Ok(())
}

// endregion
