use chrono::{DateTime, Utc};
use log::{error, info};

use crate::error::Result;
use crate::model::{
    common::RequestOrigin,
    db::{
        results::CandidateResult,
        vote::{Vote, VoteCore},
        voter::Voter,
    },
};
use crate::store::Store;

use super::admission::Ballot;

/// Record an admitted ballot: store the vote, then bring the candidate
/// counters, the voter's attendance and the results tally up to date.
///
/// Only the vote insert guards against double voting. The follow-up writes
/// are separate documents; if one fails the vote stands, and
/// [`super::declaration::rebuild`] restores the counts from the vote log.
pub async fn record(
    store: &dyn Store,
    voter: &Voter,
    ballot: &Ballot,
    origin: &RequestOrigin,
    now: DateTime<Utc>,
) -> Result<Vote> {
    let election_id = ballot.election.id;
    let vote = VoteCore::new(voter.id, election_id, &voter.flat_number, &ballot.choices, now);
    let vote = store.insert_vote(vote).await?;
    info!(
        "Flat {} voted in election {election_id} ({} positions)",
        voter.flat_number,
        ballot.choices.len()
    );

    if let Err(e) = apply_counts(store, voter, ballot, origin, now).await {
        error!(
            "Vote {} recorded but counts not updated ({e}); rebuild results for election {election_id}",
            vote.id
        );
        return Err(e);
    }
    Ok(vote)
}

async fn apply_counts(
    store: &dyn Store,
    voter: &Voter,
    ballot: &Ballot,
    origin: &RequestOrigin,
    now: DateTime<Utc>,
) -> Result<()> {
    let election_id = ballot.election.id;

    for candidate_id in ballot.choices.values() {
        store.increment_candidate_votes(*candidate_id, 1).await?;
    }

    let attendance = store
        .mark_voted(voter.id, election_id, &voter.flat_number, origin, now)
        .await?;
    if attendance.name.is_none() {
        store.set_attendance_name(attendance.id, &voter.name).await?;
    }

    for (position, candidate_id) in &ballot.choices {
        let flat = voter.flat_number.as_str();
        if store.increment_tally(election_id, *candidate_id, flat, now).await? {
            continue;
        }
        let name = store
            .candidate(*candidate_id)
            .await?
            .map_or_else(|| "Unknown".to_string(), |c| c.name.clone());
        let mut entry = CandidateResult::new(*candidate_id, name, *position);
        entry.add_vote(flat);
        if !store.push_tally(election_id, &entry, now).await? {
            // Another ballot created the entry first.
            store.increment_tally(election_id, *candidate_id, flat, now).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::error::Error;
    use crate::lifecycle::{admission::admit, fixtures};
    use crate::model::{
        common::Position,
        db::{
            candidate::CandidateCore,
            election::{Election, ElectionUpdate},
        },
        mongodb::Id,
    };
    use crate::store::MemoryStore;
    use rocket::serde::json::Value;

    async fn open_election(store: &MemoryStore, now: DateTime<Utc>) -> Id {
        let id = fixtures::election(store, now).await;
        store
            .update_election(id, &ElectionUpdate::at(now).open(true))
            .await
            .unwrap();
        id
    }

    fn ballot_for(election: Election, choices: &[(Position, Id)]) -> Ballot {
        Ballot {
            election,
            choices: choices.iter().copied().collect(),
        }
    }

    #[rocket::async_test]
    async fn counts_follow_the_ballot() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let election_id = open_election(&store, now).await;
        let election = store.election(election_id).await.unwrap().unwrap();
        let candidate = store
            .insert_candidate(CandidateCore::example(election_id, "Asha Rao", Position::President))
            .await
            .unwrap();
        store.set_candidate_votes(candidate.id, 3).await.unwrap();
        // Three earlier ballots already tallied.
        let mut entry = CandidateResult::new(candidate.id, "Asha Rao", Position::President);
        for flat in ["B-1", "B-2", "B-3"] {
            entry.add_vote(flat);
        }
        assert!(store.push_tally(election_id, &entry, now).await.unwrap());

        let voter = fixtures::voter(&store, "A-101").await;
        let ballot = ballot_for(election, &[(Position::President, candidate.id)]);
        record(&store, &voter, &ballot, &RequestOrigin::default(), now)
            .await
            .unwrap();

        assert_eq!(store.candidate(candidate.id).await.unwrap().unwrap().votes, 4);
        let results = store.results(election_id).await.unwrap().unwrap();
        let tally = &results.for_position(Position::President)[0];
        assert_eq!(tally.total_votes, 4);
        assert_eq!(
            tally.voted_by_flats.iter().filter(|f| *f == "A-101").count(),
            1
        );

        let attendance = store.attendance(voter.id, election_id).await.unwrap().unwrap();
        assert!(attendance.voted);
        assert_eq!(attendance.vote_time, Some(now));
        assert_eq!(attendance.name.as_deref(), Some(voter.name.as_str()));
    }

    #[rocket::async_test]
    async fn unknown_candidate_gets_placeholder_entry() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let election_id = open_election(&store, now).await;
        let election = store.election(election_id).await.unwrap().unwrap();
        let voter = fixtures::voter(&store, "A-101").await;
        let ghost = Id::new();

        let ballot = ballot_for(election, &[(Position::FinanceSecretary, ghost)]);
        record(&store, &voter, &ballot, &RequestOrigin::default(), now)
            .await
            .unwrap();

        let results = store.results(election_id).await.unwrap().unwrap();
        assert_eq!(results.candidate_results.len(), 1);
        assert_eq!(results.candidate_results[0].candidate_name, "Unknown");
        assert_eq!(results.candidate_results[0].total_votes, 1);
        assert_eq!(results.voting_statistics.total_votes_cast, 1);
    }

    #[rocket::async_test]
    async fn concurrent_double_submit_records_once() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let election_id = open_election(&store, now).await;
        let candidate = store
            .insert_candidate(CandidateCore::example(election_id, "Asha Rao", Position::President))
            .await
            .unwrap();
        let voter = fixtures::voter(&store, "A-101").await;
        let selections: BTreeMap<String, Value> =
            BTreeMap::from([("President".to_string(), Value::String(candidate.id.to_hex()))]);

        let submit = || async {
            let ballot = admit(&store, voter.id, election_id, &selections, now).await?;
            record(&store, &voter, &ballot, &RequestOrigin::default(), now).await
        };
        let (first, second) = rocket::tokio::join!(submit(), submit());

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, Err(Error::Conflict(_)))));
        assert_eq!(store.count_votes(election_id).await.unwrap(), 1);
        assert_eq!(store.candidate(candidate.id).await.unwrap().unwrap().votes, 1);
    }
}
