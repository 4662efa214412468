#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{figment::Figment, Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod policy;
pub mod store;
pub mod workflow;

pub use config::Config;

use config::{ConfigFairing, StoreFairing};
use logging::LoggerFairing;
use store::Store;

/// The server as configured by `Rocket.toml` and the environment.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(StoreFairing)
}

/// A server over an existing store, skipping the store configuration.
pub fn rocket_for_store(figment: Figment, store: Store) -> Rocket<Build> {
    rocket::custom(figment)
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .manage(store)
}
