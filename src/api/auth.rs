use log::info;
use rocket::{
    http::{Cookie, CookieJar},
    serde::json::{json, Json, Value},
    Route, State,
};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::{AuthToken, LoginResponse, VoterCredentials, AUTH_TOKEN_COOKIE},
            profile::VoterProfile,
        },
        db::voter::Voter,
    },
    store::{DynStore, Store},
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![authenticate_voter, logout]
}

#[post("/auth/voter", data = "<credentials>", format = "json")]
async fn authenticate_voter(
    cookies: &CookieJar<'_>,
    credentials: Json<VoterCredentials>,
    store: &State<DynStore>,
    config: &State<Config>,
) -> Result<Json<LoginResponse<VoterProfile>>> {
    credentials.require_fields()?;
    let voter = store
        .voter_by_flat(credentials.flat_number.trim())
        .await?
        .filter(|voter| voter.verify_password(&credentials.password))
        .ok_or_else(|| Error::validation("Invalid flat number or password"))?;

    let jwt = AuthToken::new(&voter).encode(config)?;
    cookies.add(AuthToken::<Voter>::cookie(jwt.clone(), config));
    info!("Flat {} logged in", voter.flat_number);

    Ok(Json(LoginResponse {
        success: true,
        token: jwt,
        user: voter.into(),
        election_id: Some(config.election_id().into()),
    }))
}

#[delete("/auth")]
fn logout(cookies: &CookieJar<'_>) -> Json<Value> {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    Json(json!({
        "success": true,
        "message": "Logged out",
    }))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Header, Status},
        local::asynchronous::{Client, LocalResponse},
        serde::json::{json, Value},
    };

    use crate::model::{
        api::auth::{AdminCredentials, VoterCredentials, AUTH_TOKEN_COOKIE},
        db::{admin::NewAdmin, election::examples::ELECTION_ID, voter::NewVoter},
    };
    use crate::store::{MemoryStore, Store};

    async fn login(client: &Client, credentials: Value) -> LocalResponse<'_> {
        client
            .post("/auth/voter")
            .header(ContentType::JSON)
            .body(credentials.to_string())
            .dispatch()
            .await
    }

    #[backend_test]
    async fn voter_login(client: Client, store: MemoryStore) {
        store.insert_voter(NewVoter::example()).await.unwrap();

        let response = login(&client, json!(VoterCredentials::example())).await;
        assert_eq!(Status::Ok, response.status());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["electionId"], json!(ELECTION_ID));
        assert_eq!(body["user"]["flatNumber"], json!("A-101"));
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());
    }

    #[backend_test]
    async fn voter_login_invalid(client: Client, store: MemoryStore) {
        store.insert_voter(NewVoter::example()).await.unwrap();

        let wrong_password = json!({ "flatNumber": "A-101", "password": "wrong-pass" });
        let response = login(&client, wrong_password).await;
        assert_eq!(Status::BadRequest, response.status());

        let unknown_flat = json!({ "flatNumber": "Z-999", "password": "resident-pass" });
        let response = login(&client, unknown_flat).await;
        assert_eq!(Status::BadRequest, response.status());

        let response = login(&client, json!({ "flatNumber": "A-101" })).await;
        assert_eq!(Status::BadRequest, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));
    }

    #[backend_test(voter)]
    async fn logout_clears_cookie(client: Client) {
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());
        let response = client.delete("/auth").dispatch().await;
        assert_eq!(Status::Ok, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));
    }

    #[backend_test]
    async fn bearer_token_accepted(client: Client, store: MemoryStore) {
        store.insert_voter(NewVoter::example()).await.unwrap();
        let response = login(&client, json!(VoterCredentials::example())).await;
        let token = response.into_json::<Value>().await.unwrap()["token"]
            .as_str()
            .unwrap()
            .to_string();
        client.delete("/auth").dispatch().await;

        let path = format!("/vote/status/{ELECTION_ID}");
        let response = client.get(path.as_str()).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());

        let response = client
            .get(path.as_str())
            .header(Header::new("Authorization", format!("Bearer {token}")))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let response = client
            .get(path.as_str())
            .header(Header::new("Authorization", "Bearer not-a-jwt"))
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test]
    async fn admin_session_round_trip(client: Client, store: MemoryStore) {
        store.insert_admin(NewAdmin::example()).await.unwrap();
        let response = client
            .post("/admin/login")
            .header(ContentType::JSON)
            .body(json!(AdminCredentials::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let token = response.into_json::<Value>().await.unwrap()["token"]
            .as_str()
            .unwrap()
            .to_string();

        // Cookie set by the login.
        let status_path = format!("/admin/election/{ELECTION_ID}/status");
        let response = client.get(status_path.as_str()).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let response = client.get("/admin/profile").dispatch().await;
        assert_eq!(Status::Ok, response.status());

        // Header only.
        client.delete("/auth").dispatch().await;
        let response = client
            .get(status_path.as_str())
            .header(Header::new("Authorization", format!("Bearer {token}")))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        // An admin token is no voter token.
        let response = client
            .get(format!("/vote/status/{ELECTION_ID}"))
            .header(Header::new("Authorization", format!("Bearer {token}")))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test(voter)]
    async fn voter_cookie_reaches_voter_routes(client: Client) {
        let response = client
            .get(format!("/vote/status/{ELECTION_ID}"))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["hasVoted"], json!(false));

        let response = client
            .get(format!("/attendance/{ELECTION_ID}"))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }
}
