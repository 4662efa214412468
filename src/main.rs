use log::{error, info, warn, LevelFilter};
use polls_backend::config::Config;
use rocket::{Error as RocketError, Ignite, Rocket};
use thiserror::Error;

/// Errors that are critical to the entire server.
#[derive(Debug, Error)]
enum Error {
    #[error(transparent)]
    RocketError(#[from] RocketError),
}

async fn run() -> Result<(), Error> {
    info!("Configuring server...");
    let rocket = polls_backend::build().ignite().await?;
    info!("...server configured!");
    describe(&rocket);
    // Disable rocket logging from now on.
    log4rs_dynamic_filters::DynamicLevelFilter::set("rocket", LevelFilter::Off);
    let _ = rocket.launch().await?;
    Ok(())
}

/// Log what the configured server is about to serve.
fn describe(rocket: &Rocket<Ignite>) {
    let config = rocket.config();
    let protocol = if config.tls_enabled() { "https" } else { "http" };
    info!(
        "Will serve {} routes on {protocol}://{}:{}",
        rocket.routes().count(),
        config.address,
        config.port
    );
    if rocket.state::<Config>().and_then(Config::admin_token).is_none() {
        warn!("No admin token configured, admin endpoints will reject every request");
    }
}

#[rocket::main]
async fn main() {
    // Set up logging.
    log4rs::init_file("log4rs.yaml", log4rs_dynamic_filters::default_deserializers())
        .expect("Failed to initialise logging");
    info!("Initialised logging");

    // Launch server.
    if let Err(err) = run().await {
        error!("{err}");
        error!("Critical failure, shutting down");
        std::process::exit(1)
    }
}
