use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use rocket::serde::json::Value;

use crate::error::{Denial, Error, Result};
use crate::model::{
    common::{ElectionPhase, Position},
    db::election::{Election, ElectionUpdate},
    mongodb::Id,
};
use crate::store::Store;

use super::sync::effective_window;

/// A ballot that passed every admission check.
#[derive(Debug, Clone, PartialEq)]
pub struct Ballot {
    pub election: Election,
    pub choices: BTreeMap<Position, Id>,
}

/// Decide whether `voter_id` may cast the given selections in an election.
///
/// Checks run in a fixed order and stop at the first failure:
///
/// 1. the election exists;
/// 2. the voter's earlier ballot was not rejected;
/// 3. in auto mode, `now` lies within the schedule (read fresh from the
///    schedule, not the election's cached dates);
/// 4. in manual mode, the freshly read open flag is set;
/// 5. voting is open;
/// 6. results are neither declared nor cancelled;
/// 7. the voter has no ballot yet;
/// 8. every selection names a position and a well-formed candidate ID.
pub async fn admit(
    store: &dyn Store,
    voter_id: Id,
    election_id: Id,
    selections: &BTreeMap<String, Value>,
    now: DateTime<Utc>,
) -> Result<Ballot> {
    let election = store
        .election(election_id)
        .await?
        .ok_or_else(|| Error::not_found("Election"))?;

    let rejected = store
        .attendance(voter_id, election_id)
        .await?
        .map_or(false, |attendance| attendance.rejected);
    if rejected {
        return Err(Error::Forbidden(Denial::Rejected));
    }

    let mut window = election.cached_window();
    let effective_open = if election.auto_open_enabled {
        let schedule = store.schedule(election_id).await?;
        if let Some(schedule) = &schedule {
            repair_cached_dates(
                store,
                &election,
                schedule.start_date,
                schedule.end_date,
                now,
            )
            .await;
        }
        window = effective_window(&election, schedule.as_ref());
        match window {
            Some(window) => {
                let within = window.contains(now);
                if election.is_open != within {
                    store
                        .update_election(election_id, &ElectionUpdate::at(now).open(within))
                        .await?;
                }
                if !within {
                    return Err(Error::Forbidden(Denial::OutsideWindow));
                }
                true
            }
            // Ambiguous schedule: trust the stored flag.
            None => election.is_open,
        }
    } else {
        store
            .election(election_id)
            .await?
            .map_or(election.is_open, |fresh| fresh.is_open)
    };
    if !effective_open {
        return Err(Error::Forbidden(Denial::Closed));
    }

    let status = store
        .results(election_id)
        .await?
        .map(|results| results.election_status)
        .unwrap_or_default();
    let has_dates = window.is_some() || election.has_dates();
    let phase = ElectionPhase::derive(effective_open, window, has_dates, status, now);
    if !phase.accepts_votes() {
        return Err(Error::Forbidden(Denial::Finalized));
    }

    if store.vote(voter_id, election_id).await?.is_some() {
        return Err(Error::already_voted());
    }

    let choices = validate_selections(selections)?;
    debug!("Admitted ballot from voter {voter_id} in election {election_id}");
    Ok(Ballot { election, choices })
}

/// Copy the schedule's dates onto the election if they drifted. Failure only
/// costs a stale cache, so it is logged and otherwise ignored.
async fn repair_cached_dates(
    store: &dyn Store,
    election: &Election,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) {
    let mut update = ElectionUpdate::at(now);
    if election.start_date != Some(start) {
        update = update.start(Some(start));
    }
    if election.end_date != Some(end) {
        update = update.end(Some(end));
    }
    if update.is_empty() {
        return;
    }
    if let Err(e) = store.update_election(election.id, &update).await {
        warn!("Failed to repair cached dates of election {}: {e}", election.id);
    }
}

/// Check every selection, reporting all problems at once. A ballot must
/// select at least one candidate.
pub fn validate_selections(
    selections: &BTreeMap<String, Value>,
) -> Result<BTreeMap<Position, Id>> {
    if selections.is_empty() {
        return Err(Error::validation("Election ID and votes are required"));
    }
    let mut choices = BTreeMap::new();
    let mut errors = Vec::new();
    for (key, value) in selections {
        let candidate = match value {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => match s.trim().parse::<Id>() {
                Ok(id) => Some(Ok(id)),
                Err(_) => Some(Err(())),
            },
            _ => Some(Err(())),
        };
        let candidate = match candidate {
            None => {
                errors.push(format!("No candidate selected for {key}"));
                continue;
            }
            Some(Err(())) => {
                errors.push(format!("Invalid candidate ID for {key}"));
                continue;
            }
            Some(Ok(id)) => id,
        };
        match key.parse::<Position>() {
            Ok(position) => {
                if choices.insert(position, candidate).is_some() {
                    errors.push(format!("More than one selection for {position}"));
                }
            }
            Err(e) => errors.push(e.to_string()),
        }
    }
    if errors.is_empty() {
        Ok(choices)
    } else {
        Err(Error::Validation {
            message: "Invalid vote data".to_string(),
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rocket::serde::json::json;

    use super::*;
    use crate::lifecycle::fixtures;
    use crate::model::{
        common::{ElectionStatus, RequestOrigin},
        db::{
            results::{Results, ResultsCore, VotingStatistics},
            vote::VoteCore,
        },
    };
    use crate::store::MemoryStore;

    fn selections(value: Value) -> BTreeMap<String, Value> {
        rocket::serde::json::from_value(value).unwrap()
    }

    fn one_vote() -> BTreeMap<String, Value> {
        selections(json!({ "President": Id::new().to_hex() }))
    }

    async fn open_manually(store: &MemoryStore, id: Id, now: DateTime<Utc>) {
        store
            .update_election(id, &ElectionUpdate::at(now).open(true))
            .await
            .unwrap();
    }

    async fn set_status(store: &MemoryStore, id: Id, status: ElectionStatus, now: DateTime<Utc>) {
        let mut core = ResultsCore::fresh(id, VotingStatistics::default(), now);
        core.election_status = status;
        store
            .replace_results(&Results {
                id: Id::new(),
                results: core,
            })
            .await
            .unwrap();
    }

    #[rocket::async_test]
    async fn missing_election() {
        let store = MemoryStore::new();
        let err = admit(&store, Id::new(), Id::new(), &one_vote(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[rocket::async_test]
    async fn scheduled_window_decides() {
        let store = MemoryStore::new();
        let t = Utc::now();
        let id = fixtures::election(&store, t).await;
        fixtures::schedule(&store, id, t, 0, 60, true).await;
        store.update_election(id, &ElectionUpdate::at(t).auto(true)).await.unwrap();
        let voter = fixtures::voter(&store, "A-1").await;

        let inside = t + Duration::minutes(30);
        let ballot = admit(&store, voter.id, id, &one_vote(), inside).await.unwrap();
        assert_eq!(ballot.choices.len(), 1);
        let election = store.election(id).await.unwrap().unwrap();
        assert!(election.is_open);
        // The cached dates were repaired from the schedule.
        assert_eq!(election.start_date, Some(t));

        let outside = t + Duration::hours(2);
        let err = admit(&store, voter.id, id, &one_vote(), outside).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(Denial::OutsideWindow)));
        assert!(!store.election(id).await.unwrap().unwrap().is_open);
    }

    #[rocket::async_test]
    async fn schedule_preferred_over_cached_dates() {
        let store = MemoryStore::new();
        let t = Utc::now();
        let id = fixtures::election(&store, t).await;
        // Cached dates say open; the schedule moved to tomorrow.
        let stale = ElectionUpdate::at(t)
            .auto(true)
            .open(true)
            .start(Some(t - Duration::hours(1)))
            .end(Some(t + Duration::hours(1)));
        store.update_election(id, &stale).await.unwrap();
        fixtures::schedule(&store, id, t, 24 * 60, 25 * 60, true).await;
        let voter = fixtures::voter(&store, "A-1").await;

        let err = admit(&store, voter.id, id, &one_vote(), t).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(Denial::OutsideWindow)));
    }

    #[rocket::async_test]
    async fn manual_open_ignores_dates() {
        let store = MemoryStore::new();
        let t = Utc::now();
        let id = fixtures::election(&store, t).await;
        // Long-past dates, but auto mode is off.
        let update = ElectionUpdate::at(t)
            .open(true)
            .start(Some(t - Duration::days(3)))
            .end(Some(t - Duration::days(2)));
        store.update_election(id, &update).await.unwrap();
        fixtures::schedule(&store, id, t, -3 * 24 * 60, -2 * 24 * 60, false).await;
        let voter = fixtures::voter(&store, "A-1").await;

        assert!(admit(&store, voter.id, id, &one_vote(), t).await.is_ok());
    }

    #[rocket::async_test]
    async fn closed_election() {
        let store = MemoryStore::new();
        let t = Utc::now();
        let id = fixtures::election(&store, t).await;
        let voter = fixtures::voter(&store, "A-1").await;
        let err = admit(&store, voter.id, id, &one_vote(), t).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(Denial::Closed)));
    }

    #[rocket::async_test]
    async fn rejected_voter_blocked_even_when_open() {
        let store = MemoryStore::new();
        let t = Utc::now();
        let id = fixtures::election(&store, t).await;
        open_manually(&store, id, t).await;
        let voter = fixtures::voter(&store, "A-1").await;
        store.reject_attendance(voter.id, id, "A-1", t).await.unwrap();

        let err = admit(&store, voter.id, id, &one_vote(), t).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(Denial::Rejected)));
    }

    #[rocket::async_test]
    async fn finalized_results_block_votes() {
        let store = MemoryStore::new();
        let t = Utc::now();
        let id = fixtures::election(&store, t).await;
        open_manually(&store, id, t).await;
        let voter = fixtures::voter(&store, "A-1").await;

        for status in [ElectionStatus::Declared, ElectionStatus::Cancelled] {
            set_status(&store, id, status, t).await;
            let err = admit(&store, voter.id, id, &one_vote(), t).await.unwrap_err();
            assert!(matches!(err, Error::Forbidden(Denial::Finalized)));
        }
    }

    #[rocket::async_test]
    async fn second_ballot_conflicts() {
        let store = MemoryStore::new();
        let t = Utc::now();
        let id = fixtures::election(&store, t).await;
        open_manually(&store, id, t).await;
        let voter = fixtures::voter(&store, "A-1").await;
        let vote = VoteCore::new(voter.id, id, "A-1", &BTreeMap::new(), t);
        store.insert_vote(vote).await.unwrap();
        store
            .mark_voted(voter.id, id, "A-1", &RequestOrigin::default(), t)
            .await
            .unwrap();

        let err = admit(&store, voter.id, id, &one_vote(), t).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn every_bad_selection_reported() {
        let result = validate_selections(&selections(json!({
            "President": "not-an-id",
            "Vice President": null,
            "General Secretary": "",
            "Treasurer": Id::new().to_hex(),
            "Joint Secretary": 42,
            "Finance Secretary": Id::new().to_hex(),
        })));
        match result {
            Err(Error::Validation { message, errors }) => {
                assert_eq!(message, "Invalid vote data");
                assert_eq!(errors.len(), 5);
                assert!(errors.contains(&"Invalid candidate ID for President".to_string()));
                assert!(errors.contains(&"No candidate selected for Vice President".to_string()));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn loose_position_names_accepted() {
        let id = Id::new();
        let ballot = selections(json!({ "vice-president": id.to_hex() }));
        let choices = validate_selections(&ballot).unwrap();
        assert_eq!(choices.get(&Position::VicePresident), Some(&id));
    }

    #[test]
    fn empty_ballot_refused() {
        let err = validate_selections(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(err.to_string(), "Election ID and votes are required");
    }

    #[rocket::async_test]
    async fn empty_ballot_leaves_vote_unused() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let id = fixtures::election(&store, now).await;
        open_manually(&store, id, now).await;
        let voter = fixtures::voter(&store, "D-404").await;

        let err = admit(&store, voter.id, id, &BTreeMap::new(), now).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(store.vote(voter.id, id).await.unwrap().is_none());

        assert!(admit(&store, voter.id, id, &one_vote(), now).await.is_ok());
    }
}
