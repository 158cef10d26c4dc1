use crate::domain_model::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const USERS_COLLECTION: &str = "users";
pub const FRIEND_REQUESTS_COLLECTION: &str = "friendRequests";

pub const DISPLAY_NAME_FIELD: &str = "displayName";
pub const FRIENDS_FIELD: &str = "friends";
pub const OUTGOING_REQUESTS_FIELD: &str = "outgoingRequests";
pub const SENDER_ID_FIELD: &str = "senderId";
pub const MEMBER_ID_KEY: &str = "memberId";
pub const RECEIVER_ID_KEY: &str = "receiverId";

/// Raw document as handed out by the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct DocumentRef {
    pub collection: String,
    pub id: String,
}

impl DocumentRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn profile(member: &MemberId) -> Self {
        Self::new(USERS_COLLECTION, member.0.clone())
    }

    pub fn friend_request(receiver: &MemberId, request_id: &RequestId) -> Self {
        Self::new(requests_collection(receiver), request_id.0.clone())
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

pub fn requests_collection(receiver: &MemberId) -> String {
    format!("{USERS_COLLECTION}/{receiver}/{FRIEND_REQUESTS_COLLECTION}")
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed document {id}: {source}")]
    Malformed {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Body of `users/{memberId}`.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDocument {
    pub display_name: String,
    #[serde(default)]
    pub friends: Vec<Friendship>,
    #[serde(default)]
    pub outgoing_requests: Vec<OutgoingRequest>,
}

impl ProfileDocument {
    pub fn decode(document: &Document) -> Result<Self, DecodeError> {
        decode(document)
    }
}

/// Body of `users/{receiverId}/friendRequests/{requestId}`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDocument {
    pub sender_id: MemberId,
    pub sender_display_name: String,
}

impl IncomingRequest {
    pub fn decode(document: &Document) -> Result<Self, DecodeError> {
        let body: RequestDocument = decode(document)?;
        Ok(IncomingRequest {
            request_id: RequestId(document.id.clone()),
            sender_id: body.sender_id,
            sender_display_name: body.sender_display_name,
        })
    }
}

impl MemberSummary {
    pub fn decode(document: &Document) -> Result<Self, DecodeError> {
        let profile = ProfileDocument::decode(document)?;
        Ok(MemberSummary {
            member_id: MemberId(document.id.clone()),
            display_name: profile.display_name,
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(document: &Document) -> Result<T, DecodeError> {
    T::deserialize(&document.data).map_err(|source| DecodeError::Malformed {
        id: document.id.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn profile_decodes_with_missing_arrays() {
        let doc = Document {
            id: "u1".into(),
            data: json!({ "displayName": "alice" }),
        };
        let profile = ProfileDocument::decode(&doc).unwrap();
        assert_eq!(profile.display_name, "alice");
        assert!(profile.friends.is_empty());
        assert!(profile.outgoing_requests.is_empty());
    }

    #[test]
    fn malformed_friend_entry_is_rejected() {
        let doc = Document {
            id: "u1".into(),
            data: json!({ "displayName": "alice", "friends": [{ "memberId": 7 }] }),
        };
        let err = ProfileDocument::decode(&doc).unwrap_err();
        assert!(err.to_string().contains("u1"));
    }

    #[test]
    fn request_takes_its_id_from_the_document() {
        let doc = Document {
            id: "r1".into(),
            data: json!({ "senderId": "u2", "senderDisplayName": "bob" }),
        };
        let request = IncomingRequest::decode(&doc).unwrap();
        assert_eq!(request.request_id, RequestId::from("r1"));
        assert_eq!(request.sender_id, MemberId::from("u2"));
        assert_eq!(request.sender_display_name, "bob");
    }

    #[test]
    fn request_paths_nest_under_the_receiver() {
        let doc = DocumentRef::friend_request(&"u2".into(), &"r1".into());
        assert_eq!(doc.to_string(), "users/u2/friendRequests/r1");
    }
}
