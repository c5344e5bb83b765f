use flat_election_backend::Config;
use log::{error, info, LevelFilter};
use rocket::Error as RocketError;
use thiserror::Error;

/// Failures that stop the server from starting or keep it from running.
#[derive(Debug, Error)]
enum StartupError {
    #[error("failed to initialise logging: {0}")]
    Logging(String),
    #[error(transparent)]
    Rocket(#[from] RocketError),
}

fn init_logging() -> Result<(), StartupError> {
    log4rs::init_file("log4rs.yaml", log4rs_dynamic_filters::default_deserializers())
        .map_err(|e| StartupError::Logging(e.to_string()))
}

async fn serve() -> Result<(), StartupError> {
    let rocket = flat_election_backend::build().ignite().await?;
    if let Some(config) = rocket.state::<Config>() {
        info!(
            "Running election {} ({} flats until residents register)",
            config.election_id(),
            config.total_flats()
        );
    }
    // The logger fairing reports from here on.
    log4rs_dynamic_filters::DynamicLevelFilter::set("rocket", LevelFilter::Off);
    rocket.launch().await?;
    Ok(())
}

#[rocket::main]
async fn main() {
    if let Err(e) = init_logging() {
        eprintln!("{e}");
        std::process::exit(1);
    }

    if let Err(e) = serve().await {
        error!("{e}");
        error!("Server stopped");
        std::process::exit(1);
    }
}
