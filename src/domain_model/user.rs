use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MemberId {
    fn from(s: &str) -> Self {
        MemberId(s.to_owned())
    }
}

/// The signed-in principal as reported by the auth provider.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Identity {
    pub member_id: MemberId,
    pub display_name: String,
}

impl Identity {
    pub fn new(member_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            member_id: MemberId(member_id.into()),
            display_name: display_name.into(),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub member_id: MemberId,
    pub display_name: String,
}

impl From<&Identity> for MemberSummary {
    fn from(identity: &Identity) -> Self {
        MemberSummary {
            member_id: identity.member_id.clone(),
            display_name: identity.display_name.clone(),
        }
    }
}
