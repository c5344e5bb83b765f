use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

/// Status of an election's results. Anything other than `Ongoing` is final
/// until the election is reset.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionStatus {
    /// Votes are being collected, or voting has closed and nothing is final yet.
    #[default]
    Ongoing,
    /// Results have been published.
    Declared,
    /// Some votes were rejected and the election was stopped.
    Cancelled,
}

impl ElectionStatus {
    pub fn is_final(self) -> bool {
        self != Self::Ongoing
    }
}

impl From<ElectionStatus> for Bson {
    fn from(status: ElectionStatus) -> Self {
        let name = match status {
            ElectionStatus::Ongoing => "ongoing",
            ElectionStatus::Declared => "declared",
            ElectionStatus::Cancelled => "cancelled",
        };
        Bson::String(name.to_string())
    }
}
