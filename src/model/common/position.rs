use std::{fmt::Display, str::FromStr};

use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

/// The committee positions residents vote for. Every ballot names at most
/// one candidate per position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "President")]
    President,
    #[serde(rename = "Vice President")]
    VicePresident,
    #[serde(rename = "General Secretary")]
    GeneralSecretary,
    #[serde(rename = "Joint Secretary")]
    JointSecretary,
    #[serde(rename = "Finance Secretary")]
    FinanceSecretary,
}

impl Position {
    pub const ALL: [Position; 5] = [
        Self::President,
        Self::VicePresident,
        Self::GeneralSecretary,
        Self::JointSecretary,
        Self::FinanceSecretary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::President => "President",
            Self::VicePresident => "Vice President",
            Self::GeneralSecretary => "General Secretary",
            Self::JointSecretary => "Joint Secretary",
            Self::FinanceSecretary => "Finance Secretary",
        }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPosition(pub String);

impl Display for UnknownPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown position '{}'", self.0)
    }
}

impl std::error::Error for UnknownPosition {}

impl FromStr for Position {
    type Err = UnknownPosition;

    /// Case-insensitive; hyphens and underscores stand in for spaces, so
    /// `vice-president` names the same position as `Vice President`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .trim()
            .chars()
            .map(|c| if c == '-' || c == '_' { ' ' } else { c })
            .collect::<String>();
        Self::ALL
            .into_iter()
            .find(|position| position.as_str().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| UnknownPosition(s.to_string()))
    }
}

impl From<Position> for Bson {
    fn from(position: Position) -> Self {
        Bson::String(position.as_str().to_string())
    }
}
