use chrono::Utc;
use rocket::{
    serde::json::{json, Json, Value},
    Route, State,
};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            attendance::{AttendanceReport, AttendanceSummary},
            auth::AuthToken,
        },
        common::RequestOrigin,
        db::{admin::Admin, voter::Voter},
    },
    store::{DynStore, Store},
};

use super::election_id as parse_election_id;

pub fn routes() -> Vec<Route> {
    routes![record_login, report]
}

#[post("/attendance/<election_id>/login")]
async fn record_login(
    token: AuthToken<Voter>,
    election_id: &str,
    origin: RequestOrigin,
    store: &State<DynStore>,
) -> Result<Json<Value>> {
    let election_id = parse_election_id(election_id)?;
    let store = store.inner().as_ref();
    if store.election(election_id).await?.is_none() {
        return Err(Error::not_found("Election"));
    }
    let voter = store
        .voter(token.id)
        .await?
        .ok_or_else(|| Error::not_found("Voter"))?;

    let attendance = store
        .record_login(&voter, election_id, &origin, Utc::now())
        .await?;
    Ok(Json(json!({
        "success": true,
        "attendance": AttendanceSummary::from(&attendance),
    })))
}

#[get("/attendance/<election_id>")]
async fn report(
    _token: AuthToken<Admin>,
    election_id: &str,
    store: &State<DynStore>,
) -> Result<Json<AttendanceReport>> {
    let election_id = parse_election_id(election_id)?;
    let attendances = store.attendances(election_id).await?;
    Ok(Json(attendances.into()))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rocket::{
        http::{Header, Status},
        local::asynchronous::Client,
        serde::json::{json, Value},
    };

    use crate::model::{
        common::RequestOrigin,
        db::{election::examples::ELECTION_ID, voter::VoterCore},
        mongodb::Id,
    };
    use crate::store::{MemoryStore, Store};

    #[backend_test(voter)]
    async fn login_is_recorded_once(client: Client, store: MemoryStore) {
        let path = format!("/attendance/{ELECTION_ID}/login");
        let response = client
            .post(path.as_str())
            .header(Header::new("User-Agent", "first-browser"))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["attendance"]["voted"], json!(false));
        let first_login = body["attendance"]["loginTime"].clone();
        assert!(first_login.is_string());

        let response = client
            .post(path.as_str())
            .header(Header::new("User-Agent", "second-browser"))
            .dispatch()
            .await;
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["attendance"]["loginTime"], first_login);

        let election: Id = ELECTION_ID.parse().unwrap();
        let records = store.attendances(election).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_agent.as_deref(), Some("first-browser"));
    }

    #[backend_test(voter)]
    async fn unknown_election(client: Client) {
        let response = client
            .post(format!("/attendance/{}/login", Id::new()))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test(admin)]
    async fn report_counts(client: Client, store: MemoryStore) {
        let election: Id = ELECTION_ID.parse().unwrap();
        let now = Utc::now();
        let origin = RequestOrigin::default();
        for flat in ["A-1", "A-2", "B-1"] {
            let voter = store.insert_voter(VoterCore::for_flat(flat)).await.unwrap();
            store.record_login(&voter, election, &origin, now).await.unwrap();
        }
        let voter = store.voter_by_flat("A-1").await.unwrap().unwrap();
        store
            .mark_voted(voter.id, election, "A-1", &origin, now)
            .await
            .unwrap();
        let voter = store.voter_by_flat("B-1").await.unwrap().unwrap();
        store
            .reject_attendance(voter.id, election, "B-1", now)
            .await
            .unwrap();

        let body = client
            .get(format!("/attendance/{ELECTION_ID}"))
            .dispatch()
            .await
            .into_json::<Value>()
            .await
            .unwrap();
        assert_eq!(
            body["summary"],
            json!({ "total": 3, "voted": 1, "notVoted": 2, "rejected": 1 })
        );
        assert_eq!(body["attendance"].as_array().unwrap().len(), 3);
    }

    #[backend_test(voter)]
    async fn report_is_admin_only(client: Client) {
        let response = client.get(format!("/attendance/{ELECTION_ID}")).dispatch().await;
        assert_eq!(Status::Forbidden, response.status());
    }
}
