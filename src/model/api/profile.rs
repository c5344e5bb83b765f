use serde::Serialize;

use crate::model::{
    api::id::ApiId,
    db::{admin::Admin, voter::Voter},
};

/// An admin as shown to clients, without the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminProfile {
    pub id: ApiId,
    pub username: String,
    pub name: Option<String>,
    pub role: &'static str,
}

impl From<Admin> for AdminProfile {
    fn from(admin: Admin) -> Self {
        Self {
            id: admin.id.into(),
            username: admin.admin.username,
            name: admin.admin.name,
            role: "admin",
        }
    }
}

/// A resident as shown to clients, without the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterProfile {
    pub id: ApiId,
    pub flat_number: String,
    pub wing: Option<String>,
    pub name: String,
    pub role: &'static str,
}

impl From<Voter> for VoterProfile {
    fn from(voter: Voter) -> Self {
        Self {
            id: voter.id.into(),
            flat_number: voter.voter.flat_number,
            wing: voter.voter.wing,
            name: voter.voter.name,
            role: "voter",
        }
    }
}
