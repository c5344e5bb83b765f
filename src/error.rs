use std::fmt::{Display, Formatter};

use argon2::Error as Argon2Error;
use jsonwebtoken::errors::Error as JwtError;
use log::{debug, error};
use mongodb::error::Error as DbError;
use rocket::{
    http::Status,
    response::{self, Responder, Response},
    serde::json::{json, Json, Value},
    Request,
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Why an otherwise well-formed request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// The voter's earlier ballot was rejected by an admin.
    Rejected,
    /// Voting is closed.
    Closed,
    /// Auto mode is on and the current time is outside the schedule.
    OutsideWindow,
    /// Results have been declared or cancelled.
    Finalized,
    /// The candidate roster can no longer change.
    Locked,
    /// Results can only be declared once voting has closed.
    NotClosed,
}

impl Denial {
    /// Does this denial mean the caller cannot vote right now?
    fn closes_voting(self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Closed | Self::OutsideWindow | Self::Finalized
        )
    }
}

impl Display for Denial {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            Self::Rejected => "Your previous vote was rejected by the admin. You cannot vote again in this election.",
            Self::Closed => "Voting is closed for this election",
            Self::OutsideWindow => "Voting is closed for this election (outside scheduled window)",
            Self::Finalized => "Voting is closed for this election (results already declared or cancelled)",
            Self::Locked => "Candidates cannot be changed after results are declared",
            Self::NotClosed => "Voting must be closed before results can be declared",
        };
        f.write_str(message)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error("{message}")]
    Validation {
        message: String,
        errors: Vec<String>,
    },
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(Denial),
    #[error("{0}")]
    Conflict(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// A validation error with a single message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    /// A missing resource, e.g. `Error::not_found("Election")`.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// A second ballot from the same voter in the same election.
    pub fn already_voted() -> Self {
        Self::Conflict("You have already voted in this election".to_string())
    }

    /// Storage, signing and hashing failures, and broken invariants.
    fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Db(_) | Self::Jwt(_) | Self::Argon2(_) | Self::Internal(_)
        )
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Validation { .. } | Self::Conflict(_) => Status::BadRequest,
            Self::Unauthorized(_) => Status::Unauthorized,
            Self::NotFound(_) => Status::NotFound,
            Self::Forbidden(_) => Status::Forbidden,
            Self::Db(_) | Self::Jwt(_) | Self::Argon2(_) | Self::Internal(_) => {
                Status::InternalServerError
            }
        }
    }

    /// The JSON body sent to the caller. Internal details never leave the server.
    fn body(&self) -> Value {
        let message = if self.is_internal() {
            "Something went wrong. Please try again.".to_string()
        } else {
            self.to_string()
        };
        let mut body = json!({
            "success": false,
            "message": message,
        });
        match self {
            Self::Validation { errors, .. } if !errors.is_empty() => {
                body["errors"] = json!(errors);
            }
            Self::Conflict(_) => {
                body["alreadyVoted"] = json!(true);
            }
            Self::Forbidden(denial) => {
                if denial.closes_voting() {
                    body["electionOpen"] = json!(false);
                }
                if *denial == Denial::Rejected {
                    body["rejected"] = json!(true);
                }
            }
            _ => {}
        }
        body
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        if self.is_internal() {
            error!("{} {}: {self}", req.method(), req.uri());
        } else {
            debug!("{} {} refused: {self}", req.method(), req.uri());
        }
        Response::build_from(Json(self.body()).respond_to(req)?)
            .status(status)
            .ok()
    }
}
