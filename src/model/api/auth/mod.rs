mod request;
mod token;
mod user;

pub use request::{
    hash_password, AdminCredentials, LoginResponse, VoterCredentials, VoterRegistration,
};
pub use token::{AuthToken, AUTH_TOKEN_COOKIE};
pub use user::{Rights, User};
