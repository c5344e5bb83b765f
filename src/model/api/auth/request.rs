use argon2::Config;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::id::ApiId,
    db::{admin::NewAdmin, voter::NewVoter},
};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    // 16 bytes is recommended for password hashing:
    //  https://en.wikipedia.org/wiki/Argon2
    let mut salt = [0_u8; 16];
    rand::thread_rng().fill(&mut salt);
    Ok(argon2::hash_encoded(
        password.as_bytes(),
        &salt,
        &Config::default(),
    )?)
}

/// Raw admin credentials, received from a user. These are never stored directly,
/// since the password is in plaintext.
#[derive(Clone, Deserialize, Serialize)]
pub struct AdminCredentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl AdminCredentials {
    /// Reject a login request with a blank field before touching the store.
    pub fn require_fields(&self) -> Result<()> {
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(Error::validation("Username and password are required"));
        }
        Ok(())
    }
}

impl TryFrom<AdminCredentials> for NewAdmin {
    type Error = Error;

    /// Convert [`AdminCredentials`] to a new admin by hashing the password.
    /// This enforces that the username is non-empty, and the password meets
    /// minimum length.
    fn try_from(cred: AdminCredentials) -> Result<Self> {
        if cred.username.trim().is_empty() || cred.password.len() < MIN_PASSWORD_LENGTH {
            return Err(Error::validation(format!(
                "Admin username must be non-empty and password at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        Ok(Self {
            password_hash: hash_password(&cred.password)?,
            username: cred.username,
            name: None,
        })
    }
}

/// A resident's login request.
#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterCredentials {
    #[serde(default)]
    pub flat_number: String,
    #[serde(default)]
    pub password: String,
}

impl VoterCredentials {
    pub fn require_fields(&self) -> Result<()> {
        if self.flat_number.trim().is_empty() || self.password.is_empty() {
            return Err(Error::validation("Flat number and password are required"));
        }
        Ok(())
    }
}

/// An admin's request to register a resident.
#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterRegistration {
    pub flat_number: String,
    #[serde(default)]
    pub wing: Option<String>,
    pub name: String,
    pub password: String,
}

impl TryFrom<VoterRegistration> for NewVoter {
    type Error = Error;

    fn try_from(reg: VoterRegistration) -> Result<Self> {
        let mut errors = Vec::new();
        if reg.flat_number.trim().is_empty() {
            errors.push("flatNumber must not be empty".to_string());
        }
        if reg.name.trim().is_empty() {
            errors.push("name must not be empty".to_string());
        }
        if reg.password.len() < MIN_PASSWORD_LENGTH {
            errors.push(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            ));
        }
        if !errors.is_empty() {
            return Err(Error::Validation {
                message: "Invalid voter details".to_string(),
                errors,
            });
        }
        Ok(Self {
            password_hash: hash_password(&reg.password)?,
            flat_number: reg.flat_number.trim().to_string(),
            wing: reg.wing,
            name: reg.name,
        })
    }
}

/// Successful login. The token is also set as a cookie.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse<U> {
    pub success: bool,
    pub token: String,
    pub user: U,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub election_id: Option<ApiId>,
}
