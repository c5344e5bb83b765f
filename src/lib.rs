#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{figment::Figment, Build, Rocket};

use crate::config::{BootstrapFairing, ConfigFairing, StoreFairing};
use crate::lifecycle::watcher::ScheduleWatcherFairing;
use crate::logging::LoggerFairing;
use crate::store::DynStore;

pub mod api;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod scheduled_task;
pub mod store;

pub use crate::config::Config;

/// Build the server from the default figment (`Rocket.toml` and `ROCKET_*`
/// environment variables), connecting to whichever store is configured.
pub fn build() -> Rocket<Build> {
    mount(
        rocket::build()
            .attach(LoggerFairing)
            .attach(ConfigFairing)
            .attach(StoreFairing),
    )
}

/// Build the server over an existing store. The store fairing is skipped, so
/// no database connection is made.
pub fn rocket_for_store(figment: Figment, store: DynStore) -> Rocket<Build> {
    mount(
        rocket::custom(figment)
            .manage(store)
            .attach(LoggerFairing)
            .attach(ConfigFairing),
    )
}

/// Attach the fairings that depend on the store, and mount the API.
/// Fairings run in attachment order, so the store must already be managed or
/// provided by an earlier fairing.
fn mount(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .attach(BootstrapFairing)
        .attach(ScheduleWatcherFairing)
        .mount("/", api::routes())
        .register("/", api::catchers())
}
