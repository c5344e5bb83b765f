use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{error, info};
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::{
    api::auth::AdminCredentials,
    db::{admin::NewAdmin, election::Election},
    mongodb::{ensure_indexes_exist, Id},
};
use crate::store::{DynStore, MemoryStore, MongoStore, Store};

/// Application configuration as written in `Rocket.toml` and `ROCKET_*`
/// environment variables.
#[derive(Deserialize)]
struct RawConfig {
    // non-secrets
    auth_ttl: u32,
    election_id: String,
    total_flats: u32,
    // secrets
    jwt_secret: String,
}

/// Validated application configuration. This struct becomes managed state
/// and can be inspected by any endpoint.
pub struct Config {
    auth_ttl: u32,
    election_id: Id,
    total_flats: u32,
    jwt_secret: String,
}

impl TryFrom<RawConfig> for Config {
    type Error = String;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let election_id = raw
            .election_id
            .parse::<Id>()
            .map_err(|e| format!("`election_id` is not a valid object ID: {e}"))?;
        if raw.jwt_secret.is_empty() {
            return Err("`jwt_secret` must not be empty".to_string());
        }
        Ok(Self {
            auth_ttl: raw.auth_ttl,
            election_id,
            total_flats: raw.total_flats,
            jwt_secret: raw.jwt_secret,
        })
    }
}

impl Config {
    /// Valid lifetime of auth tokens in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// The election this deployment runs. Ballots that do not name an
    /// election are cast in this one.
    pub fn election_id(&self) -> Id {
        self.election_id
    }

    /// Number of flats to report in statistics while no residents are
    /// registered.
    pub fn total_flats(&self) -> u32 {
        self.total_flats
    }

    /// Secret key used to sign JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let raw = match rocket.figment().extract::<RawConfig>() {
            Ok(raw) => raw,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        match Config::try_from(raw) {
            Ok(config) => Ok(rocket.manage(config)),
            Err(e) => {
                error!("Invalid application config: {e}");
                Err(rocket)
            }
        }
    }
}

/// Which storage backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StorageKind {
    Mongodb,
    Memory,
}

fn default_storage() -> StorageKind {
    StorageKind::Mongodb
}

fn default_db_name() -> String {
    "flat_elections".to_string()
}

/// Configuration for the store.
#[derive(Deserialize)]
struct DbConfig {
    #[serde(default = "default_storage")]
    storage: StorageKind,
    #[serde(default = "default_db_name")]
    db_name: String,
    // secrets
    db_uri: Option<String>,
}

/// A fairing that loads the store config, connects to the database if
/// needed, ensures the required indexes exist, and places a [`DynStore`]
/// into managed state.
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let store: DynStore = match config.storage {
            StorageKind::Memory => {
                info!("Using in-memory store; nothing will be persisted");
                Arc::new(MemoryStore::new())
            }
            StorageKind::Mongodb => {
                let db_uri = match config.db_uri {
                    Some(uri) => uri,
                    None => {
                        error!("`db_uri` must be set when `storage` is \"mongodb\"");
                        return Err(rocket);
                    }
                };
                info!("Loaded database config, connecting...");
                let client = match MongoClient::with_uri_str(db_uri).await {
                    Ok(client) => client,
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                };
                let db = client.database(&config.db_name);
                if let Err(e) = ensure_indexes_exist(&db).await {
                    error!("Failed to create database indexes: {e}");
                    return Err(rocket);
                }
                info!("...database connection online!");
                Arc::new(MongoStore::new(&db))
            }
        };

        Ok(rocket.manage(store))
    }
}

/// Credentials of the admin account created on first launch.
#[derive(Deserialize)]
struct AdminBootstrap {
    admin_username: String,
    admin_password: String,
}

/// A fairing that makes sure the store holds at least one admin and the
/// configured election. Must be attached after the config and store are
/// available.
pub struct BootstrapFairing;

#[rocket::async_trait]
impl Fairing for BootstrapFairing {
    fn info(&self) -> Info {
        Info {
            name: "Bootstrap",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let bootstrap = match rocket.figment().extract::<AdminBootstrap>() {
            Ok(bootstrap) => bootstrap,
            Err(e) => {
                error!("Failed to load admin bootstrap config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        let (store, election_id) = match (rocket.state::<DynStore>(), rocket.state::<Config>()) {
            (Some(store), Some(config)) => (store.clone(), config.election_id()),
            _ => {
                error!("Store and config must be available before bootstrapping");
                return Err(rocket);
            }
        };

        let credentials = AdminCredentials {
            username: bootstrap.admin_username,
            password: bootstrap.admin_password,
        };
        if let Err(e) = ensure_admin_exists(store.as_ref(), credentials).await {
            error!("Failed to ensure an admin exists: {e}");
            return Err(rocket);
        }
        if let Err(e) = ensure_election_exists(store.as_ref(), election_id).await {
            error!("Failed to ensure election {election_id} exists: {e}");
            return Err(rocket);
        }

        Ok(rocket)
    }
}

/// Create the bootstrap admin if the store has no admins at all.
async fn ensure_admin_exists(
    store: &dyn Store,
    credentials: AdminCredentials,
) -> crate::error::Result<()> {
    if store.count_admins().await? > 0 {
        return Ok(());
    }
    let username = credentials.username.clone();
    let admin = NewAdmin::try_from(credentials)?;
    store.insert_admin(admin).await?;
    info!("Created bootstrap admin {username}");
    Ok(())
}

/// Create the configured election, closed and in manual mode, if it is missing.
async fn ensure_election_exists(store: &dyn Store, election_id: Id) -> crate::error::Result<()> {
    if store.election(election_id).await?.is_some() {
        return Ok(());
    }
    let election = Election::new(election_id, "Committee Election", Utc::now());
    store.insert_election(&election).await?;
    info!("Created election {election_id}");
    Ok(())
}

#[cfg(test)]
impl Config {
    /// The config [`test_figment`] produces.
    pub fn example() -> Self {
        Self {
            auth_ttl: 3600,
            election_id: crate::model::db::election::examples::ELECTION_ID
                .parse()
                .unwrap(),
            total_flats: 105,
            jwt_secret: "test-jwt-secret".to_string(),
        }
    }
}

/// Figment for tests: every required key set, storage left to the caller.
#[cfg(test)]
pub fn test_figment() -> rocket::figment::Figment {
    rocket::Config::figment()
        .merge(("jwt_secret", "test-jwt-secret"))
        .merge(("auth_ttl", 3600))
        .merge(("election_id", crate::model::db::election::examples::ELECTION_ID))
        .merge(("total_flats", 105))
        .merge(("admin_username", "bootstrap"))
        .merge(("admin_password", "bootstrap-password"))
        .merge(("log_level", "off"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawConfig {
        RawConfig {
            auth_ttl: 60,
            election_id: "6957030455dee196ac3b31c4".to_string(),
            total_flats: 105,
            jwt_secret: "secret".to_string(),
        }
    }

    #[test]
    fn valid_config() {
        let config = Config::try_from(raw()).unwrap();
        assert_eq!(config.auth_ttl(), Duration::seconds(60));
        assert_eq!(config.election_id().to_hex(), "6957030455dee196ac3b31c4");
        assert_eq!(config.total_flats(), 105);
    }

    #[test]
    fn invalid_election_id() {
        let mut raw = raw();
        raw.election_id = "not-an-id".to_string();
        assert!(Config::try_from(raw).is_err());
    }

    #[test]
    fn empty_secret() {
        let mut raw = raw();
        raw.jwt_secret = String::new();
        assert!(Config::try_from(raw).is_err());
    }

    #[rocket::async_test]
    async fn bootstrap_is_idempotent() {
        let store = MemoryStore::new();
        let id: Id = "6957030455dee196ac3b31c4".parse().unwrap();
        let credentials = AdminCredentials::example();

        ensure_admin_exists(&store, credentials.clone()).await.unwrap();
        ensure_admin_exists(&store, credentials).await.unwrap();
        assert_eq!(store.count_admins().await.unwrap(), 1);

        ensure_election_exists(&store, id).await.unwrap();
        ensure_election_exists(&store, id).await.unwrap();
        let election = store.election(id).await.unwrap().unwrap();
        assert!(!election.is_open);
        assert!(!election.auto_open_enabled);
    }
}
