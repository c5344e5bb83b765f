use chrono::Utc;
use log::info;
use rocket::{
    http::{CookieJar, Status},
    serde::json::{json, Json, Value},
    Route, State,
};

use crate::{
    error::{Error, Result},
    lifecycle::{control, sync::snapshot, watcher::ScheduleWatchers},
    model::{
        api::{
            auth::{AdminCredentials, AuthToken, LoginResponse, VoterRegistration},
            election::{
                ElectionStatusView, ElectionView, ResetRequest, ScheduleRequest, ScheduleView,
                StatusRequest,
            },
            profile::{AdminProfile, VoterProfile},
        },
        db::{admin::Admin, voter::NewVoter},
    },
    store::{DynStore, Store},
    Config,
};

use super::election_id as parse_election_id;

pub fn routes() -> Vec<Route> {
    routes![
        login,
        profile,
        get_status,
        set_status,
        set_schedule,
        reset,
        register_voter,
        list_voters,
    ]
}

#[post("/admin/login", data = "<credentials>", format = "json")]
async fn login(
    cookies: &CookieJar<'_>,
    credentials: Json<AdminCredentials>,
    store: &State<DynStore>,
    config: &State<Config>,
) -> Result<Json<LoginResponse<AdminProfile>>> {
    credentials.require_fields()?;
    let admin = store
        .admin_by_username(credentials.username.trim())
        .await?
        .filter(|admin| admin.verify_password(&credentials.password))
        .ok_or_else(|| Error::validation("Invalid credentials"))?;

    let jwt = AuthToken::new(&admin).encode(config)?;
    cookies.add(AuthToken::<Admin>::cookie(jwt.clone(), config));
    info!("Admin {} logged in", admin.username);

    Ok(Json(LoginResponse {
        success: true,
        token: jwt,
        user: admin.into(),
        election_id: None,
    }))
}

#[get("/admin/profile")]
async fn profile(token: AuthToken<Admin>, store: &State<DynStore>) -> Result<Json<Value>> {
    let admin = store
        .admin(token.id)
        .await?
        .ok_or_else(|| Error::not_found("Admin"))?;
    Ok(Json(json!({
        "success": true,
        "admin": AdminProfile::from(admin),
    })))
}

#[get("/admin/election/<election_id>/status")]
async fn get_status(
    _token: AuthToken<Admin>,
    election_id: &str,
    store: &State<DynStore>,
) -> Result<Json<ElectionStatusView>> {
    let election_id = parse_election_id(election_id)?;
    let snapshot = snapshot(store.inner().as_ref(), election_id, Utc::now()).await?;
    Ok(Json(ElectionStatusView {
        success: true,
        election: snapshot.election.into(),
        schedule: snapshot.schedule.map(Into::into),
        phase: snapshot.phase,
        election_status: snapshot.status,
    }))
}

#[put("/admin/election/<election_id>/status", data = "<request>", format = "json")]
async fn set_status(
    _token: AuthToken<Admin>,
    election_id: &str,
    request: Json<StatusRequest>,
    store: &State<DynStore>,
    watchers: &State<ScheduleWatchers>,
) -> Result<Json<Value>> {
    let election_id = parse_election_id(election_id)?;
    let election = control::set_status(
        store.inner().as_ref(),
        election_id,
        request.is_open,
        request.auto_open_enabled,
        Utc::now(),
    )
    .await?;

    // Manual control takes over from the schedule, and auto mode hands it back.
    match store.schedule(election_id).await? {
        Some(schedule) if election.auto_open_enabled => watchers.watch(&schedule).await,
        _ => watchers.cancel(election_id).await,
    }

    let message = if election.is_open {
        "Election opened"
    } else {
        "Election closed"
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "election": ElectionView::from(election),
    })))
}

#[put("/admin/election/<election_id>/schedule", data = "<request>", format = "json")]
async fn set_schedule(
    _token: AuthToken<Admin>,
    election_id: &str,
    request: Json<ScheduleRequest>,
    store: &State<DynStore>,
    config: &State<Config>,
    watchers: &State<ScheduleWatchers>,
) -> Result<Json<Value>> {
    let election_id = parse_election_id(election_id)?;
    let (start, end) = request.window()?;
    let (election, schedule) = control::set_schedule(
        store.inner().as_ref(),
        election_id,
        start,
        end,
        request.auto_open_enabled,
        config.total_flats(),
        Utc::now(),
    )
    .await?;
    watchers.watch(&schedule).await;

    Ok(Json(json!({
        "success": true,
        "message": "Election schedule updated",
        "election": ElectionView::from(election),
        "schedule": ScheduleView::from(schedule),
    })))
}

#[post("/admin/election/<election_id>/reset", data = "<request>")]
async fn reset(
    _token: AuthToken<Admin>,
    election_id: &str,
    request: Option<Json<ResetRequest>>,
    store: &State<DynStore>,
    config: &State<Config>,
    watchers: &State<ScheduleWatchers>,
) -> Result<Json<Value>> {
    let election_id = parse_election_id(election_id)?;
    let (start, end) = match request {
        Some(request) => request.dates()?,
        None => (None, None),
    };
    watchers.cancel(election_id).await;
    let election = control::reset(
        store.inner().as_ref(),
        election_id,
        start,
        end,
        config.total_flats(),
        Utc::now(),
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Election reset successfully",
        "election": ElectionView::from(election),
    })))
}

#[post("/admin/voters", data = "<registration>", format = "json")]
async fn register_voter(
    _token: AuthToken<Admin>,
    registration: Json<VoterRegistration>,
    store: &State<DynStore>,
) -> Result<(Status, Json<Value>)> {
    let voter: NewVoter = registration.into_inner().try_into()?;
    let voter = store.insert_voter(voter).await?;
    info!("Registered flat {}", voter.flat_number);
    Ok((
        Status::Created,
        Json(json!({
            "success": true,
            "voter": VoterProfile::from(voter),
        })),
    ))
}

#[get("/admin/voters")]
async fn list_voters(_token: AuthToken<Admin>, store: &State<DynStore>) -> Result<Json<Value>> {
    let voters = store
        .voters()
        .await?
        .into_iter()
        .map(VoterProfile::from)
        .collect::<Vec<_>>();
    Ok(Json(json!({
        "success": true,
        "count": voters.len(),
        "voters": voters,
    })))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::{json, Value},
    };

    use crate::model::{
        api::auth::{AdminCredentials, AUTH_TOKEN_COOKIE},
        db::{admin::NewAdmin, election::examples::ELECTION_ID},
    };
    use crate::store::{MemoryStore, Store};

    fn path(suffix: &str) -> String {
        format!("/admin/election/{ELECTION_ID}/{suffix}")
    }

    #[backend_test]
    async fn login_valid(client: Client, store: MemoryStore) {
        store.insert_admin(NewAdmin::example()).await.unwrap();

        let response = client
            .post("/admin/login")
            .header(ContentType::JSON)
            .body(json!(AdminCredentials::example()).to_string())
            .dispatch()
            .await;

        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["user"]["username"], json!("committee-admin"));
        assert!(body["user"].get("passwordHash").is_none());
        assert!(body["token"].as_str().is_some());
    }

    #[backend_test]
    async fn login_invalid(client: Client, store: MemoryStore) {
        store.insert_admin(NewAdmin::example()).await.unwrap();

        // Missing fields.
        let response = client
            .post("/admin/login")
            .header(ContentType::JSON)
            .body(json!(AdminCredentials::empty()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        // Wrong password.
        let response = client
            .post("/admin/login")
            .header(ContentType::JSON)
            .body(
                json!({ "username": "committee-admin", "password": "not the password" })
                    .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));
    }

    #[backend_test]
    async fn admin_routes_need_admin(client: Client) {
        let response = client.get("/admin/profile").dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["success"], json!(false));
    }

    #[backend_test(voter)]
    async fn voters_are_not_admins(client: Client) {
        let response = client.get(path("status")).dispatch().await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test(admin)]
    async fn profile(client: Client) {
        let response = client.get("/admin/profile").dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["admin"]["role"], json!("admin"));
    }

    #[backend_test(admin)]
    async fn status_of_fresh_election(client: Client) {
        let response = client.get(path("status")).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["election"]["isOpen"], json!(false));
        assert_eq!(body["phase"], json!("not_scheduled"));
        assert_eq!(body["schedule"], Value::Null);

        let response = client.get("/admin/election/nope/status").dispatch().await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test(admin)]
    async fn manual_toggle(client: Client) {
        let response = client
            .put(path("status"))
            .header(ContentType::JSON)
            .body(json!({ "isOpen": true }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["election"]["isOpen"], json!(true));
        assert_eq!(body["election"]["autoOpenEnabled"], json!(false));

        let response = client
            .put(path("status"))
            .header(ContentType::JSON)
            .body(json!({}).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test(admin)]
    async fn schedule_opens_in_window(client: Client, store: MemoryStore) {
        let now = chrono::Utc::now();
        let response = client
            .put(path("schedule"))
            .header(ContentType::JSON)
            .body(
                json!({
                    "startDate": (now - Duration::hours(1)).to_rfc3339(),
                    "endDate": (now + Duration::hours(1)).to_rfc3339(),
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["election"]["isOpen"], json!(true));
        assert_eq!(body["schedule"]["autoOpenEnabled"], json!(true));

        let id = ELECTION_ID.parse().unwrap();
        assert!(store.results(id).await.unwrap().is_some());
        assert!(client
            .rocket()
            .state::<crate::lifecycle::watcher::ScheduleWatchers>()
            .unwrap()
            .is_watching(id)
            .await);
    }

    #[backend_test(admin)]
    async fn schedule_rejects_inverted_window(client: Client) {
        let response = client
            .put(path("schedule"))
            .header(ContentType::JSON)
            .body(
                json!({ "startDate": "2024-05-02T10:00", "endDate": "2024-05-01T10:00" })
                    .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["message"], json!("startDate must be before endDate"));
    }

    #[backend_test(admin)]
    async fn reset_without_body(client: Client, store: MemoryStore) {
        let response = client.post(path("reset")).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let id = ELECTION_ID.parse().unwrap();
        let results = store.results(id).await.unwrap().unwrap();
        assert_eq!(results.voting_statistics.total_votes_cast, 0);
        let election = store.election(id).await.unwrap().unwrap();
        assert_eq!(election.start_date, None);
    }

    #[backend_test(admin)]
    async fn reset_with_dates(client: Client, store: MemoryStore) {
        let response = client
            .post(path("reset"))
            .header(ContentType::JSON)
            .body(
                json!({
                    "startDate": "2030-01-10T09:00:00Z",
                    "endDate": "2030-01-10T18:00:00Z",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let election = store.election(ELECTION_ID.parse().unwrap()).await.unwrap().unwrap();
        assert!(election.start_date.is_some());
        assert!(election.end_date.is_some());
        assert!(!election.is_open);
        assert!(!election.auto_open_enabled);
    }

    #[backend_test(admin)]
    async fn register_voters(client: Client) {
        let registration = json!({
            "flatNumber": "B-202",
            "wing": "B",
            "name": "Kiran Patel",
            "password": "long-enough",
        });
        let response = client
            .post("/admin/voters")
            .header(ContentType::JSON)
            .body(registration.to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());

        // Same flat again.
        let response = client
            .post("/admin/voters")
            .header(ContentType::JSON)
            .body(registration.to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        let response = client.get("/admin/voters").dispatch().await;
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["count"], json!(1));
    }
}
