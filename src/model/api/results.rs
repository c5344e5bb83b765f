use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::{candidate::CandidateView, id::ApiId},
    common::{ElectionStatus, Position},
    db::results::{CandidateResult, Results, VotingStatistics},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResultView {
    pub candidate_id: ApiId,
    pub candidate_name: String,
    pub position: Position,
    pub total_votes: i64,
    pub voted_by_flats: Vec<String>,
}

impl From<CandidateResult> for CandidateResultView {
    fn from(result: CandidateResult) -> Self {
        Self {
            candidate_id: result.candidate_id.into(),
            candidate_name: result.candidate_name,
            position: result.position,
            total_votes: result.total_votes,
            voted_by_flats: result.voted_by_flats,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsView {
    pub total_voters: i64,
    pub total_flats: i64,
    pub total_votes_cast: i64,
    pub voting_percentage: f64,
    pub non_voting_flats: Vec<String>,
    pub rejected_votes: i64,
}

impl From<VotingStatistics> for StatisticsView {
    fn from(stats: VotingStatistics) -> Self {
        Self {
            total_voters: stats.total_voters,
            total_flats: stats.total_flats,
            total_votes_cast: stats.total_votes_cast,
            voting_percentage: stats.voting_percentage,
            non_voting_flats: stats.non_voting_flats,
            rejected_votes: stats.rejected_votes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsView {
    pub election_id: ApiId,
    pub candidate_results: Vec<CandidateResultView>,
    pub voting_statistics: StatisticsView,
    pub election_status: ElectionStatus,
    pub declared_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<Results> for ResultsView {
    fn from(results: Results) -> Self {
        let r = results.results;
        Self {
            election_id: r.election_id.into(),
            candidate_results: r.candidate_results.into_iter().map(Into::into).collect(),
            voting_statistics: r.voting_statistics.into(),
            election_status: r.election_status,
            declared_at: r.declared_at,
            updated_at: r.updated_at,
        }
    }
}

/// Reply to declaration, rejection and tally rebuilds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsResponse {
    pub success: bool,
    pub message: String,
    pub results: ResultsView,
}

/// One position's candidates by running vote counter, leader first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResults {
    pub success: bool,
    pub position: Position,
    pub count: usize,
    pub leader: Option<CandidateView>,
    pub candidates: Vec<CandidateView>,
}

impl PositionResults {
    /// Group already-filtered candidates, sorting them by votes.
    pub fn new(position: Position, mut candidates: Vec<CandidateView>) -> Self {
        candidates.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.name.cmp(&b.name)));
        Self {
            success: true,
            position,
            count: candidates.len(),
            leader: candidates.first().cloned(),
            candidates,
        }
    }
}

/// Live results across every position.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentResults {
    pub success: bool,
    pub total_votes: u64,
    pub election_status: ElectionStatus,
    pub phase: &'static str,
    pub positions: Vec<PositionResults>,
}

impl CurrentResults {
    /// Split candidates into positions, in the fixed position order. Positions
    /// without candidates are left out.
    pub fn group(
        candidates: Vec<CandidateView>,
        total_votes: u64,
        election_status: ElectionStatus,
        phase: &'static str,
    ) -> Self {
        let mut candidates = candidates;
        let positions = Position::ALL
            .into_iter()
            .filter_map(|position| {
                let (matching, rest) = candidates
                    .drain(..)
                    .partition::<Vec<_>, _>(|c| c.position == position);
                candidates = rest;
                (!matching.is_empty()).then(|| PositionResults::new(position, matching))
            })
            .collect();
        Self {
            success: true,
            total_votes,
            election_status,
            phase,
            positions,
        }
    }
}

/// Published outcome of a declared or cancelled election.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedResults {
    pub success: bool,
    pub election_status: ElectionStatus,
    pub declared_at: Option<DateTime<Utc>>,
    pub statistics: StatisticsView,
    pub winners: Vec<CandidateResultView>,
    pub losers: Vec<CandidateResultView>,
}

impl From<Results> for FinalizedResults {
    /// Per position, every candidate sharing the highest non-zero tally wins.
    fn from(results: Results) -> Self {
        let r = results.results;
        let mut winners = Vec::new();
        let mut losers = Vec::new();
        for position in Position::ALL {
            let top = r
                .candidate_results
                .iter()
                .filter(|c| c.position == position)
                .map(|c| c.total_votes)
                .max()
                .unwrap_or(0);
            for candidate in r.candidate_results.iter().filter(|c| c.position == position) {
                let view = CandidateResultView::from(candidate.clone());
                if top > 0 && candidate.total_votes == top {
                    winners.push(view);
                } else {
                    losers.push(view);
                }
            }
        }
        Self {
            success: true,
            election_status: r.election_status,
            declared_at: r.declared_at,
            statistics: r.voting_statistics.into(),
            winners,
            losers,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VotedFlat {
    pub flat_number: String,
    pub voted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VotedFlats {
    pub success: bool,
    pub count: usize,
    pub flats: Vec<VotedFlat>,
}

/// Admin request to throw out the ballots of some flats.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequest {
    #[serde(default)]
    pub flat_numbers: Vec<String>,
    #[serde(default)]
    pub reject: bool,
}
