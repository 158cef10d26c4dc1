use crate::domain_model::*;

/// Point-in-time copy of the social graph held by the client cache.
///
/// Captured by value before every mutation and restored verbatim when the
/// remote write fails.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ClientCacheSnapshot {
    pub friends: Vec<Friendship>,
    pub incoming: Vec<IncomingRequest>,
    pub outgoing: Vec<OutgoingRequest>,
}

impl ClientCacheSnapshot {
    pub fn is_friend(&self, member: &MemberId) -> bool {
        self.friends.iter().any(|f| &f.member_id == member)
    }

    pub fn find_incoming(&self, request_id: &RequestId) -> Option<&IncomingRequest> {
        self.incoming.iter().find(|r| &r.request_id == request_id)
    }

    pub fn incoming_from(&self, sender: &MemberId) -> Option<&IncomingRequest> {
        self.incoming.iter().find(|r| &r.sender_id == sender)
    }

    pub fn has_outgoing_to(&self, receiver: &MemberId) -> bool {
        self.outgoing.iter().any(|r| &r.receiver_id == receiver)
    }

    pub fn relation_to(&self, me: &MemberId, other: &MemberId) -> RelationStatus {
        if me == other {
            RelationStatus::Myself
        } else if self.is_friend(other) {
            RelationStatus::Friend
        } else if self.has_outgoing_to(other) {
            RelationStatus::RequestSent
        } else if let Some(request) = self.incoming_from(other) {
            RelationStatus::RequestReceived(request.request_id.clone())
        } else {
            RelationStatus::Stranger
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClientCacheSnapshot {
        ClientCacheSnapshot {
            friends: vec![Friendship {
                member_id: "u2".into(),
                display_name: "bob".into(),
            }],
            incoming: vec![IncomingRequest {
                request_id: "r1".into(),
                sender_id: "u3".into(),
                sender_display_name: "carol".into(),
            }],
            outgoing: vec![OutgoingRequest {
                receiver_id: "u4".into(),
                receiver_display_name: "dave".into(),
            }],
        }
    }

    #[test]
    fn relation_to_covers_every_edge() {
        let snapshot = sample();
        let me = MemberId::from("u1");
        assert_eq!(snapshot.relation_to(&me, &"u1".into()), RelationStatus::Myself);
        assert_eq!(snapshot.relation_to(&me, &"u2".into()), RelationStatus::Friend);
        assert_eq!(
            snapshot.relation_to(&me, &"u3".into()),
            RelationStatus::RequestReceived("r1".into())
        );
        assert_eq!(snapshot.relation_to(&me, &"u4".into()), RelationStatus::RequestSent);
        assert_eq!(snapshot.relation_to(&me, &"u5".into()), RelationStatus::Stranger);
    }
}
