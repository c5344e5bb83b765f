use chrono::Utc;
use rocket::{http::Status, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    lifecycle::{admission::admit, recorder::record, sync::snapshot},
    model::{
        api::{
            attendance::AttendanceSummary,
            auth::AuthToken,
            results::{CurrentResults, PositionResults},
            vote::{BallotRequest, VoteReceipt, VoterElection, VoterStatus},
            ApiId,
        },
        common::RequestOrigin,
        db::voter::Voter,
    },
    store::{DynStore, Store},
    Config,
};

use super::{
    election_id as parse_election_id,
    results::{current_results, position_results},
};

pub fn routes() -> Vec<Route> {
    routes![cast_vote, results, results_by_position, status]
}

#[post("/vote", data = "<ballot>", format = "json")]
async fn cast_vote(
    token: AuthToken<Voter>,
    ballot: Json<BallotRequest>,
    origin: RequestOrigin,
    store: &State<DynStore>,
    config: &State<Config>,
) -> Result<(Status, Json<VoteReceipt>)> {
    let store = store.inner().as_ref();
    let election_id = match ballot.election_id.as_deref() {
        Some(id) => ApiId::parse(id, "election")?,
        None => config.election_id(),
    };
    let voter = store
        .voter(token.id)
        .await?
        .ok_or_else(|| Error::not_found("Voter"))?;

    let now = Utc::now();
    let admitted = admit(store, voter.id, election_id, &ballot.votes, now).await?;
    let vote = record(store, &voter, &admitted, &origin, now).await?;

    Ok((
        Status::Created,
        Json(VoteReceipt {
            success: true,
            message: "Vote cast successfully".to_string(),
            vote: vote.into(),
        }),
    ))
}

#[get("/vote/results/<election_id>")]
async fn results(
    _token: AuthToken<Voter>,
    election_id: &str,
    store: &State<DynStore>,
) -> Result<Json<CurrentResults>> {
    let election_id = parse_election_id(election_id)?;
    Ok(Json(current_results(store.inner().as_ref(), election_id).await?))
}

#[get("/vote/results/<election_id>/position/<position>")]
async fn results_by_position(
    _token: AuthToken<Voter>,
    election_id: &str,
    position: &str,
    store: &State<DynStore>,
) -> Result<Json<PositionResults>> {
    let election_id = parse_election_id(election_id)?;
    Ok(Json(
        position_results(store.inner().as_ref(), election_id, position).await?,
    ))
}

#[get("/vote/status/<election_id>")]
async fn status(
    token: AuthToken<Voter>,
    election_id: &str,
    store: &State<DynStore>,
) -> Result<Json<VoterStatus>> {
    let election_id = parse_election_id(election_id)?;
    let store = store.inner().as_ref();
    let snapshot = snapshot(store, election_id, Utc::now()).await?;
    let vote = store.vote(token.id, election_id).await?;
    let attendance = store.attendance(token.id, election_id).await?;

    Ok(Json(VoterStatus {
        success: true,
        has_voted: vote.is_some(),
        vote: vote.map(Into::into),
        election: VoterElection {
            id: election_id.into(),
            name: snapshot.election.name.clone(),
            is_open: snapshot.phase.accepts_votes(),
        },
        attendance: attendance.as_ref().map(AttendanceSummary::from),
    }))
}
