use rocket::{
    serde::json::{json, Json, Value},
    Catcher, Request, Route,
};

use crate::error::Result;
use crate::model::{api::ApiId, mongodb::Id};

mod admin;
mod attendance;
mod auth;
mod candidates;
mod results;
mod vote;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(admin::routes());
    routes.extend(auth::routes());
    routes.extend(vote::routes());
    routes.extend(results::routes());
    routes.extend(candidates::routes());
    routes.extend(attendance::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![
        bad_request,
        unauthorized,
        forbidden,
        not_found,
        unprocessable,
        internal_error
    ]
}

/// Parse an election ID from a path segment.
fn election_id(param: &str) -> Result<Id> {
    ApiId::parse(param, "election")
}

fn failure(message: &str) -> Json<Value> {
    Json(json!({
        "success": false,
        "message": message,
    }))
}

#[catch(400)]
fn bad_request() -> Json<Value> {
    failure("Bad request")
}

#[catch(401)]
fn unauthorized() -> Json<Value> {
    failure("Authentication required")
}

#[catch(403)]
fn forbidden() -> Json<Value> {
    failure("Access denied")
}

#[catch(404)]
fn not_found(req: &Request) -> Json<Value> {
    failure(&format!("No route for {} {}", req.method(), req.uri()))
}

#[catch(422)]
fn unprocessable() -> Json<Value> {
    failure("Malformed request body")
}

#[catch(500)]
fn internal_error() -> Json<Value> {
    failure("Something went wrong. Please try again.")
}
