use chrono::Utc;
use log::info;
use rocket::{
    http::Status,
    serde::json::{json, Json, Value},
    Route, State,
};

use crate::{
    error::{Denial, Error, Result},
    lifecycle::sync::snapshot,
    model::{
        api::{
            auth::AuthToken,
            candidate::{CandidateEdit, CandidateRequest, CandidateView},
            ApiId,
        },
        db::{admin::Admin, candidate::CandidateUpdate},
        mongodb::Id,
    },
    store::{DynStore, Store},
    Config,
};

use super::election_id as parse_election_id;

pub fn routes() -> Vec<Route> {
    routes![list, create, edit, remove]
}

/// Refuse roster changes once the election's results are declared.
async fn ensure_unlocked(store: &dyn Store, election_id: Id) -> Result<()> {
    if snapshot(store, election_id, Utc::now()).await?.phase.locks_roster() {
        return Err(Error::Forbidden(Denial::Locked));
    }
    Ok(())
}

#[get("/candidates/<election_id>")]
async fn list(election_id: &str, store: &State<DynStore>) -> Result<Json<Value>> {
    let election_id = parse_election_id(election_id)?;
    let candidates = store
        .candidates(election_id, None)
        .await?
        .into_iter()
        .map(CandidateView::from)
        .collect::<Vec<_>>();
    Ok(Json(json!({
        "success": true,
        "count": candidates.len(),
        "candidates": candidates,
    })))
}

#[post("/candidates", data = "<request>", format = "json")]
async fn create(
    _token: AuthToken<Admin>,
    request: Json<CandidateRequest>,
    store: &State<DynStore>,
    config: &State<Config>,
) -> Result<(Status, Json<Value>)> {
    let store = store.inner().as_ref();
    let candidate = request
        .into_inner()
        .into_candidate(config.election_id(), Utc::now())?;
    ensure_unlocked(store, candidate.election_id).await?;

    let candidate = store.insert_candidate(candidate).await?;
    info!(
        "Added candidate {} for {} in election {}",
        candidate.name, candidate.position, candidate.election_id
    );
    Ok((
        Status::Created,
        Json(json!({
            "success": true,
            "candidate": CandidateView::from(candidate),
        })),
    ))
}

#[put("/candidates/<candidate_id>", data = "<edit>", format = "json")]
async fn edit(
    _token: AuthToken<Admin>,
    candidate_id: &str,
    edit: Json<CandidateEdit>,
    store: &State<DynStore>,
) -> Result<Json<Value>> {
    let store = store.inner().as_ref();
    let candidate_id = ApiId::parse(candidate_id, "candidate")?;
    let update = CandidateUpdate::try_from(edit.into_inner())?;
    let existing = store
        .candidate(candidate_id)
        .await?
        .ok_or_else(|| Error::not_found("Candidate"))?;
    ensure_unlocked(store, existing.election_id).await?;

    let candidate = store
        .update_candidate(candidate_id, &update)
        .await?
        .ok_or_else(|| Error::not_found("Candidate"))?;
    Ok(Json(json!({
        "success": true,
        "candidate": CandidateView::from(candidate),
    })))
}

#[delete("/candidates/<candidate_id>")]
async fn remove(
    _token: AuthToken<Admin>,
    candidate_id: &str,
    store: &State<DynStore>,
) -> Result<Json<Value>> {
    let store = store.inner().as_ref();
    let candidate_id = ApiId::parse(candidate_id, "candidate")?;
    let existing = store
        .candidate(candidate_id)
        .await?
        .ok_or_else(|| Error::not_found("Candidate"))?;
    ensure_unlocked(store, existing.election_id).await?;

    if !store.delete_candidate(candidate_id).await? {
        return Err(Error::not_found("Candidate"));
    }
    info!("Removed candidate {}", existing.name);
    Ok(Json(json!({
        "success": true,
        "message": "Candidate deleted successfully",
    })))
}
