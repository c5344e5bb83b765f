use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rocket::serde::json::Value;
use serde::{Deserialize, Serialize};

use crate::model::{
    api::{attendance::AttendanceSummary, id::ApiId},
    db::vote::Vote,
};

/// A ballot as submitted by a voter: position name to candidate ID. Values
/// are kept raw so every malformed entry can be reported at once.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotRequest {
    #[serde(default)]
    pub election_id: Option<String>,
    #[serde(default)]
    pub votes: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteView {
    pub id: ApiId,
    pub election_id: ApiId,
    pub flat_number: String,
    pub votes: BTreeMap<String, ApiId>,
    pub timestamp: DateTime<Utc>,
}

impl From<Vote> for VoteView {
    fn from(vote: Vote) -> Self {
        Self {
            id: vote.id.into(),
            election_id: vote.vote.election_id.into(),
            flat_number: vote.vote.flat_number,
            votes: vote
                .vote
                .votes
                .into_iter()
                .map(|(position, candidate)| (position, candidate.into()))
                .collect(),
            timestamp: vote.vote.timestamp,
        }
    }
}

/// Returned with `201 Created` once a ballot is recorded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    pub success: bool,
    pub message: String,
    pub vote: VoteView,
}

/// Whether the logged-in voter has voted, and whether they still can.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterStatus {
    pub success: bool,
    pub has_voted: bool,
    pub vote: Option<VoteView>,
    pub election: VoterElection,
    pub attendance: Option<AttendanceSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterElection {
    pub id: ApiId,
    pub name: String,
    pub is_open: bool,
}

#[cfg(test)]
mod tests {
    use rocket::serde::json::from_str;

    use super::*;

    #[test]
    fn ballot_keeps_malformed_values() {
        let ballot: BallotRequest = from_str(
            r#"{"votes": {"President": "6957030455dee196ac3b31c4", "Vice President": null, "Joint Secretary": 7}}"#,
        )
        .unwrap();
        assert_eq!(ballot.election_id, None);
        assert_eq!(ballot.votes.len(), 3);
        assert!(ballot.votes["Vice President"].is_null());
    }
}
