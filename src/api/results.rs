use chrono::Utc;
use rocket::{
    serde::json::{json, Json, Value},
    Route, State,
};

use crate::{
    error::{Error, Result},
    lifecycle::{declaration, sync::snapshot, watcher::ScheduleWatchers},
    model::{
        api::{
            auth::AuthToken,
            candidate::CandidateView,
            election::PublicScheduleStatus,
            results::{
                CurrentResults, FinalizedResults, PositionResults, RejectRequest, ResultsResponse,
                ResultsView, VotedFlat, VotedFlats,
            },
        },
        common::Position,
        db::admin::Admin,
        mongodb::Id,
    },
    store::{DynStore, Store},
    Config,
};

use super::election_id as parse_election_id;

pub fn routes() -> Vec<Route> {
    routes![
        schedule_status,
        current,
        by_position,
        voted_flats,
        declare,
        reject,
        finalized,
        rebuild,
    ]
}

/// Live results from the candidate counters, grouped by position.
pub(super) async fn current_results(store: &dyn Store, election_id: Id) -> Result<CurrentResults> {
    let snapshot = snapshot(store, election_id, Utc::now()).await?;
    let candidates = store
        .candidates(election_id, None)
        .await?
        .into_iter()
        .map(CandidateView::from)
        .collect();
    let total_votes = store.count_votes(election_id).await?;
    Ok(CurrentResults::group(
        candidates,
        total_votes,
        snapshot.status,
        snapshot.phase.public_name(),
    ))
}

/// Live results for one position, leader first.
pub(super) async fn position_results(
    store: &dyn Store,
    election_id: Id,
    position: &str,
) -> Result<PositionResults> {
    let position = position
        .parse::<Position>()
        .map_err(|e| Error::validation(e.to_string()))?;
    if store.election(election_id).await?.is_none() {
        return Err(Error::not_found("Election"));
    }
    let candidates = store
        .candidates(election_id, Some(position))
        .await?
        .into_iter()
        .map(CandidateView::from)
        .collect();
    Ok(PositionResults::new(position, candidates))
}

#[get("/results/<election_id>/schedule-status")]
async fn schedule_status(
    election_id: &str,
    store: &State<DynStore>,
) -> Result<Json<PublicScheduleStatus>> {
    let election_id = parse_election_id(election_id)?;
    let snapshot = snapshot(store.inner().as_ref(), election_id, Utc::now()).await?;
    let (start_date, end_date) = snapshot.dates();
    Ok(Json(PublicScheduleStatus {
        success: true,
        status: snapshot.phase.public_name(),
        is_open: snapshot.election.is_open,
        auto_open_enabled: snapshot.election.auto_open_enabled,
        start_date,
        end_date,
        election_status: snapshot.status,
    }))
}

#[get("/results/<election_id>")]
async fn current(election_id: &str, store: &State<DynStore>) -> Result<Json<CurrentResults>> {
    let election_id = parse_election_id(election_id)?;
    Ok(Json(current_results(store.inner().as_ref(), election_id).await?))
}

#[get("/results/<election_id>/position/<position>")]
async fn by_position(
    election_id: &str,
    position: &str,
    store: &State<DynStore>,
) -> Result<Json<PositionResults>> {
    let election_id = parse_election_id(election_id)?;
    Ok(Json(
        position_results(store.inner().as_ref(), election_id, position).await?,
    ))
}

#[get("/results/<election_id>/voted-flats")]
async fn voted_flats(
    _token: AuthToken<Admin>,
    election_id: &str,
    store: &State<DynStore>,
) -> Result<Json<VotedFlats>> {
    let election_id = parse_election_id(election_id)?;
    let flats = store
        .votes(election_id)
        .await?
        .into_iter()
        .map(|vote| VotedFlat {
            flat_number: vote.vote.flat_number,
            voted_at: vote.vote.timestamp,
        })
        .collect::<Vec<_>>();
    Ok(Json(VotedFlats {
        success: true,
        count: flats.len(),
        flats,
    }))
}

#[post("/results/<election_id>/declare")]
async fn declare(
    _token: AuthToken<Admin>,
    election_id: &str,
    store: &State<DynStore>,
    config: &State<Config>,
    watchers: &State<ScheduleWatchers>,
) -> Result<Json<ResultsResponse>> {
    let election_id = parse_election_id(election_id)?;
    let results = declaration::declare(
        store.inner().as_ref(),
        election_id,
        config.total_flats(),
        Utc::now(),
    )
    .await?;
    watchers.cancel(election_id).await;
    Ok(Json(ResultsResponse {
        success: true,
        message: "Results declared".to_string(),
        results: results.into(),
    }))
}

#[post("/results/<election_id>/reject", data = "<request>", format = "json")]
async fn reject(
    _token: AuthToken<Admin>,
    election_id: &str,
    request: Json<RejectRequest>,
    store: &State<DynStore>,
    config: &State<Config>,
    watchers: &State<ScheduleWatchers>,
) -> Result<Json<Value>> {
    let election_id = parse_election_id(election_id)?;
    if !request.reject {
        return Err(Error::validation("reject must be true to reject votes"));
    }
    let rejection = declaration::reject(
        store.inner().as_ref(),
        election_id,
        &request.flat_numbers,
        config.total_flats(),
        Utc::now(),
    )
    .await?;
    watchers.cancel(election_id).await;

    let removed = rejection.removed.len();
    let results = ResultsView::from(rejection.results);
    Ok(Json(json!({
        "success": true,
        "message": format!("Rejected {removed} vote(s); the election has been cancelled"),
        "rejectedCount": removed,
        "results": results,
    })))
}

#[get("/results/<election_id>/finalized")]
async fn finalized(election_id: &str, store: &State<DynStore>) -> Result<Json<FinalizedResults>> {
    let election_id = parse_election_id(election_id)?;
    let results = store
        .results(election_id)
        .await?
        .filter(|results| results.election_status.is_final())
        .ok_or_else(|| Error::not_found("Finalized results"))?;
    Ok(Json(results.into()))
}

#[post("/results/<election_id>/rebuild")]
async fn rebuild(
    _token: AuthToken<Admin>,
    election_id: &str,
    store: &State<DynStore>,
    config: &State<Config>,
) -> Result<Json<ResultsResponse>> {
    let election_id = parse_election_id(election_id)?;
    let results = declaration::rebuild(
        store.inner().as_ref(),
        election_id,
        config.total_flats(),
        Utc::now(),
    )
    .await?;
    Ok(Json(ResultsResponse {
        success: true,
        message: "Results rebuilt from recorded votes".to_string(),
        results: results.into(),
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, Utc};
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::{json, Value},
    };

    use crate::lifecycle::{admission::admit, recorder::record};
    use crate::model::{
        common::{Position, RequestOrigin},
        db::{
            candidate::CandidateCore,
            election::{examples::ELECTION_ID, ElectionUpdate},
            voter::VoterCore,
        },
        mongodb::Id,
    };
    use crate::store::{MemoryStore, Store};

    fn election() -> Id {
        ELECTION_ID.parse().unwrap()
    }

    /// Open the election and cast one ballot per flat for the given candidate.
    async fn votes_for(store: &MemoryStore, candidate: Id, flats: &[&str]) {
        let now = Utc::now();
        store
            .update_election(election(), &ElectionUpdate::at(now).open(true))
            .await
            .unwrap();
        let selections = BTreeMap::from([(
            "President".to_string(),
            Value::String(candidate.to_hex()),
        )]);
        for flat in flats {
            let voter = store.insert_voter(VoterCore::for_flat(flat)).await.unwrap();
            let ballot = admit(store, voter.id, election(), &selections, now).await.unwrap();
            record(store, &voter, &ballot, &RequestOrigin::default(), now).await.unwrap();
        }
    }

    async fn candidate(store: &MemoryStore, name: &str) -> Id {
        store
            .insert_candidate(CandidateCore::example(election(), name, Position::President))
            .await
            .unwrap()
            .id
    }

    async fn close(store: &MemoryStore) {
        store
            .update_election(election(), &ElectionUpdate::at(Utc::now()).open(false))
            .await
            .unwrap();
    }

    #[backend_test]
    async fn schedule_status_phases(client: Client, store: MemoryStore) {
        let path = format!("/results/{ELECTION_ID}/schedule-status");
        let body = client.get(path.as_str()).dispatch().await.into_json::<Value>().await.unwrap();
        assert_eq!(body["status"], json!("not_started"));

        let now = Utc::now();
        let update = ElectionUpdate::at(now)
            .auto(true)
            .start(Some(now - Duration::hours(1)))
            .end(Some(now + Duration::hours(1)));
        store.update_election(election(), &update).await.unwrap();
        let body = client.get(path.as_str()).dispatch().await.into_json::<Value>().await.unwrap();
        assert_eq!(body["status"], json!("ongoing"));
        assert_eq!(body["isOpen"], json!(true));

        let response = client
            .get(format!("/results/{}/schedule-status", Id::new()))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test]
    async fn current_results_group_positions(client: Client, store: MemoryStore) {
        let asha = candidate(&store, "Asha Rao").await;
        candidate(&store, "Ravi Iyer").await;
        votes_for(&store, asha, &["A-1", "A-2"]).await;

        let body = client
            .get(format!("/results/{ELECTION_ID}"))
            .dispatch()
            .await
            .into_json::<Value>()
            .await
            .unwrap();
        assert_eq!(body["totalVotes"], json!(2));
        assert_eq!(body["phase"], json!("ongoing"));
        assert_eq!(body["positions"][0]["leader"]["name"], json!("Asha Rao"));
        assert_eq!(body["positions"][0]["count"], json!(2));

        let response = client
            .get(format!("/results/{ELECTION_ID}/position/vice-president"))
            .dispatch()
            .await;
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["position"], json!("Vice President"));
        assert_eq!(body["count"], json!(0));

        let response = client
            .get(format!("/results/{ELECTION_ID}/position/Treasurer"))
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test(admin)]
    async fn declare_flow(client: Client, store: MemoryStore) {
        let asha = candidate(&store, "Asha Rao").await;
        let ravi = candidate(&store, "Ravi Iyer").await;
        votes_for(&store, asha, &["A-1", "A-2"]).await;
        votes_for(&store, ravi, &["B-1"]).await;

        // Not while voting is open.
        let declare = format!("/results/{ELECTION_ID}/declare");
        let response = client.post(declare.as_str()).dispatch().await;
        assert_eq!(Status::Forbidden, response.status());

        let finalized = format!("/results/{ELECTION_ID}/finalized");
        let response = client.get(finalized.as_str()).dispatch().await;
        assert_eq!(Status::NotFound, response.status());

        close(&store).await;
        let response = client.post(declare.as_str()).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["results"]["electionStatus"], json!("declared"));
        assert_eq!(body["results"]["votingStatistics"]["totalVotesCast"], json!(3));

        let body = client
            .get(finalized.as_str())
            .dispatch()
            .await
            .into_json::<Value>()
            .await
            .unwrap();
        assert_eq!(body["winners"][0]["candidateName"], json!("Asha Rao"));
        assert_eq!(body["losers"][0]["candidateName"], json!("Ravi Iyer"));

        let response = client.post(declare.as_str()).dispatch().await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test(admin)]
    async fn reject_flow(client: Client, store: MemoryStore) {
        let asha = candidate(&store, "Asha Rao").await;
        votes_for(&store, asha, &["A-1", "A-2"]).await;

        let path = format!("/results/{ELECTION_ID}/reject");
        let response = client
            .post(path.as_str())
            .header(ContentType::JSON)
            .body(json!({ "flatNumbers": ["A-1"] }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        let response = client
            .post(path.as_str())
            .header(ContentType::JSON)
            .body(json!({ "flatNumbers": ["A-1"], "reject": true }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["rejectedCount"], json!(1));
        assert_eq!(body["results"]["electionStatus"], json!("cancelled"));

        let voted = client
            .get(format!("/results/{ELECTION_ID}/voted-flats"))
            .dispatch()
            .await
            .into_json::<Value>()
            .await
            .unwrap();
        assert_eq!(voted["flats"][0]["flatNumber"], json!("A-2"));
        assert_eq!(voted["count"], json!(1));

        let body = client
            .get(format!("/results/{ELECTION_ID}/finalized"))
            .dispatch()
            .await
            .into_json::<Value>()
            .await
            .unwrap();
        assert_eq!(body["electionStatus"], json!("cancelled"));
        assert_eq!(body["statistics"]["rejectedVotes"], json!(1));
    }

    #[backend_test(admin)]
    async fn rebuild_on_demand(client: Client, store: MemoryStore) {
        let asha = candidate(&store, "Asha Rao").await;
        votes_for(&store, asha, &["A-1"]).await;
        store.set_candidate_votes(asha, 40).await.unwrap();

        let response = client
            .post(format!("/results/{ELECTION_ID}/rebuild"))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert_eq!(store.candidate(asha).await.unwrap().unwrap().votes, 1);
    }

    #[backend_test]
    async fn admin_only_results_routes(client: Client) {
        let response = client.post(format!("/results/{ELECTION_ID}/declare")).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
        let response = client.get(format!("/results/{ELECTION_ID}/voted-flats")).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
    }
}
