//! Finalising an election: rebuilding the tallies from the vote log,
//! declaring results, and rejecting votes.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::error::{Denial, Error, Result};
use crate::model::{
    common::ElectionStatus,
    db::{
        candidate::Candidate,
        election::ElectionUpdate,
        results::{CandidateResult, Results, ResultsCore, VotingStatistics},
        vote::Vote,
        voter::Voter,
    },
    mongodb::Id,
};
use crate::store::Store;

use super::sync::snapshot;

/// Tally entries for every candidate, rebuilt from the ballots. Candidates
/// without votes get an empty entry; ballots naming a candidate that no
/// longer exists are counted under "Unknown".
pub fn tally(candidates: &[Candidate], votes: &[Vote]) -> Vec<CandidateResult> {
    let mut entries = candidates
        .iter()
        .map(|c| CandidateResult::new(c.id, c.name.clone(), c.position))
        .collect::<Vec<_>>();
    for vote in votes {
        for (position, candidate_id) in vote.choices() {
            match entries.iter_mut().find(|e| e.candidate_id == candidate_id) {
                Some(entry) => entry.add_vote(&vote.flat_number),
                None => {
                    let mut entry = CandidateResult::new(candidate_id, "Unknown", position);
                    entry.add_vote(&vote.flat_number);
                    entries.push(entry);
                }
            }
        }
    }
    entries
}

/// Turnout figures. Flats are the registered voters, or `fallback_flats`
/// while nobody is registered.
pub fn statistics(
    voters: &[Voter],
    votes: &[Vote],
    fallback_flats: u32,
    rejected_votes: i64,
) -> VotingStatistics {
    let total_voters = voters.len() as i64;
    let total_flats = if total_voters > 0 {
        total_voters
    } else {
        i64::from(fallback_flats)
    };
    let total_votes_cast = votes.len() as i64;
    let voting_percentage = if total_flats > 0 {
        let percentage = total_votes_cast as f64 / total_flats as f64 * 100.0;
        (percentage * 100.0).round() / 100.0
    } else {
        0.0
    };
    let voted = votes
        .iter()
        .map(|v| v.flat_number.as_str())
        .collect::<BTreeSet<_>>();
    let non_voting_flats = voters
        .iter()
        .map(|v| v.flat_number.as_str())
        .filter(|flat| !voted.contains(flat))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect();
    VotingStatistics {
        total_voters,
        total_flats,
        total_votes_cast,
        voting_percentage,
        non_voting_flats,
        rejected_votes,
    }
}

/// Results recomputed from the vote log, not yet stored.
struct Recount {
    results: Results,
    candidates: Vec<Candidate>,
}

impl Recount {
    /// Votes per candidate, as the candidate counters should read.
    fn counters(&self) -> BTreeMap<Id, i64> {
        self.results
            .candidate_results
            .iter()
            .map(|entry| (entry.candidate_id, entry.total_votes))
            .collect()
    }
}

/// Recompute tallies and statistics, keeping the identity, status and
/// rejection count of any existing results.
async fn recount(
    store: &dyn Store,
    election_id: Id,
    fallback_flats: u32,
    extra_rejected: i64,
    now: DateTime<Utc>,
) -> Result<Recount> {
    let votes = store.votes(election_id).await?;
    let candidates = store.candidates(election_id, None).await?;
    let voters = store.voters().await?;

    let existing = store.results(election_id).await?;
    let (id, mut core) = match existing {
        Some(results) => (results.id, results.results),
        None => (
            Id::new(),
            ResultsCore::fresh(election_id, VotingStatistics::default(), now),
        ),
    };
    let rejected = core.voting_statistics.rejected_votes + extra_rejected;
    core.candidate_results = tally(&candidates, &votes);
    core.voting_statistics = statistics(&voters, &votes, fallback_flats, rejected);
    core.updated_at = now;

    Ok(Recount {
        results: Results { id, results: core },
        candidates,
    })
}

async fn reset_counters(store: &dyn Store, recount: &Recount) -> Result<()> {
    let counters = recount.counters();
    for candidate in &recount.candidates {
        let votes = counters.get(&candidate.id).copied().unwrap_or(0);
        if candidate.votes != votes {
            warn!(
                "Candidate {} counter drifted ({} stored, {votes} counted)",
                candidate.id, candidate.votes
            );
            store.set_candidate_votes(candidate.id, votes).await?;
        }
    }
    Ok(())
}

/// Rebuild the results and candidate counters from the vote log without
/// changing the results status.
pub async fn rebuild(
    store: &dyn Store,
    election_id: Id,
    fallback_flats: u32,
    now: DateTime<Utc>,
) -> Result<Results> {
    if store.election(election_id).await?.is_none() {
        return Err(Error::not_found("Election"));
    }
    let recount = recount(store, election_id, fallback_flats, 0, now).await?;
    reset_counters(store, &recount).await?;
    store.replace_results(&recount.results).await?;
    info!("Rebuilt results of election {election_id}");
    Ok(recount.results)
}

/// Publish final results. Voting must be closed and nothing may be final yet.
pub async fn declare(
    store: &dyn Store,
    election_id: Id,
    fallback_flats: u32,
    now: DateTime<Utc>,
) -> Result<Results> {
    let snapshot = snapshot(store, election_id, now).await?;
    if snapshot.status.is_final() {
        return Err(Error::Forbidden(Denial::Finalized));
    }
    if !snapshot.phase.can_declare() {
        return Err(Error::Forbidden(Denial::NotClosed));
    }

    let mut recount = recount(store, election_id, fallback_flats, 0, now).await?;
    reset_counters(store, &recount).await?;
    recount.results.results.election_status = ElectionStatus::Declared;
    recount.results.results.declared_at = Some(now);
    store.replace_results(&recount.results).await?;
    info!(
        "Declared results of election {election_id}: {} of {} flats voted",
        recount.results.voting_statistics.total_votes_cast,
        recount.results.voting_statistics.total_flats
    );
    Ok(recount.results)
}

/// What a rejection removed, and the results it left behind.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub removed: Vec<Vote>,
    pub results: Results,
}

/// Reject the ballots of the given flats and stop the election.
///
/// The flats' votes are deleted and their voters can never vote again in
/// this election. The election is closed with auto mode off, so no schedule
/// can reopen it, and the results are marked cancelled.
pub async fn reject(
    store: &dyn Store,
    election_id: Id,
    flats: &[String],
    fallback_flats: u32,
    now: DateTime<Utc>,
) -> Result<Rejection> {
    let flats = flats
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();
    if flats.is_empty() {
        return Err(Error::validation("flatNumbers must be a non-empty array"));
    }

    let snapshot = snapshot(store, election_id, now).await?;
    if !snapshot.phase.can_reject() {
        return Err(Error::Forbidden(Denial::Finalized));
    }

    let removed = store.delete_votes_by_flats(election_id, &flats).await?;
    for vote in &removed {
        for (_, candidate_id) in vote.choices() {
            store.increment_candidate_votes(candidate_id, -1).await?;
        }
    }

    // Voters of deleted ballots, plus anyone registered for the flats, so a
    // flat that never voted cannot start now.
    let mut rejected = removed
        .iter()
        .map(|v| (v.voter_id, v.flat_number.clone()))
        .collect::<BTreeMap<_, _>>();
    for flat in &flats {
        if let Some(voter) = store.voter_by_flat(flat).await? {
            rejected.entry(voter.id).or_insert_with(|| flat.clone());
        }
    }
    for (voter_id, flat) in &rejected {
        store.reject_attendance(*voter_id, election_id, flat, now).await?;
    }

    let close = ElectionUpdate::at(now).open(false).auto(false);
    store.update_election(election_id, &close).await?;

    let mut recount = recount(store, election_id, fallback_flats, removed.len() as i64, now).await?;
    recount.results.results.election_status = ElectionStatus::Cancelled;
    store.replace_results(&recount.results).await?;
    warn!(
        "Rejected {} vote(s) from flats {flats:?} in election {election_id}; election cancelled",
        removed.len()
    );
    Ok(Rejection {
        removed,
        results: recount.results,
    })
}
