use crate::domain_model::MemberId;
use nanoid::nanoid;
use serde::{Deserialize, Serialize};
use std::fmt;

const REQUEST_ID_ALPHABET: [char; 62] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
    'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j',
    'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1',
    '2', '3', '4', '5', '6', '7', '8', '9',
];

#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Same shape as the backend's auto-generated document ids.
    pub fn generate() -> Self {
        RequestId(nanoid!(20, &REQUEST_ID_ALPHABET))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId(s.to_owned())
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Friendship {
    pub member_id: MemberId,
    pub display_name: String,
}

/// A pending request addressed to the signed-in member. The id is the id of the
/// request document, not part of its body.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IncomingRequest {
    pub request_id: RequestId,
    pub sender_id: MemberId,
    pub sender_display_name: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingRequest {
    pub receiver_id: MemberId,
    pub receiver_display_name: String,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RelationStatus {
    Myself,
    Friend,
    RequestSent,
    RequestReceived(RequestId),
    Stranger,
}
