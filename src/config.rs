use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::mongodb::{ensure_counters_exist, ensure_indexes_exist, Coll};
use crate::store::{MongoStore, Store};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    // secrets
    admin_token: Option<String>,
}

impl Config {
    /// Bearer token granting access to the admin endpoints, without
    /// surrounding whitespace. If unset or blank, the admin endpoints reject
    /// every request.
    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        if config.admin_token().is_none() {
            warn!("No `admin_token` configured, admin endpoints are disabled");
        }

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Which [`crate::store::QuestionStore`] backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Mongodb,
    Memory,
}

/// Configuration for persistence.
#[derive(Debug, Deserialize)]
struct StoreConfig {
    // non-secrets
    #[serde(default)]
    store: StoreKind,
    db_name: Option<String>,
    // secrets
    db_uri: Option<String>,
}

/// A fairing that loads the store config, connects to the database if one is
/// configured, performs any setup necessary, and places a [`Store`] into
/// managed state.
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Question Store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<StoreConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load store config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let store = match config.store {
            StoreKind::Memory => {
                warn!("Using in-memory store, nothing will be persisted");
                Store::memory()
            }
            StoreKind::Mongodb => {
                let Some(db_uri) = config.db_uri else {
                    error!("`db_uri` must be set when using the MongoDB store");
                    return Err(rocket);
                };
                info!("Loaded database config, connecting...");
                // Construct the connection.
                let client = match MongoClient::with_uri_str(db_uri).await {
                    Ok(client) => client,
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                };
                let db_name = config.db_name.unwrap_or_else(get_database_name);
                let db = client.database(&db_name);

                // Ensure the required indexes and ID counters exist.
                if let Err(e) = ensure_indexes_exist(&db).await {
                    error!("Failed to set up database indexes: {e}");
                    return Err(rocket);
                }
                if let Err(e) = ensure_counters_exist(&Coll::from_db(&db)).await {
                    error!("Failed to set up database counters: {e}");
                    return Err(rocket);
                }
                info!("...database connection online, using '{db_name}'");

                Store::new(MongoStore::new(&db))
            }
        };

        // Manage the state.
        rocket = rocket.manage(store);
        Ok(rocket)
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
pub(crate) fn get_database_name() -> String {
    "polls".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
pub(crate) fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

/// Admin token that test servers are configured with.
#[cfg(test)]
pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";

#[cfg(test)]
mod tests {
    use rocket::{
        error::ErrorKind,
        figment::{providers::Serialized, Figment},
    };

    use super::*;

    #[test]
    fn blank_admin_token_disables_admin() {
        let config: Config = Figment::new()
            .merge(Serialized::default("admin_token", ""))
            .extract()
            .unwrap();
        assert_eq!(config.admin_token(), None);

        let config: Config = Figment::new().extract().unwrap();
        assert_eq!(config.admin_token(), None);

        let config: Config = Figment::new()
            .merge(Serialized::default("admin_token", "s3cret"))
            .extract()
            .unwrap();
        assert_eq!(config.admin_token(), Some("s3cret"));

        let config: Config = Figment::new()
            .merge(Serialized::default("admin_token", "  s3cret\n"))
            .extract()
            .unwrap();
        assert_eq!(config.admin_token(), Some("s3cret"));
    }

    #[test]
    fn store_kind_defaults_to_mongodb() {
        let config: StoreConfig = Figment::new().extract().unwrap();
        assert_eq!(config.store, StoreKind::Mongodb);
        assert_eq!(config.db_uri, None);

        let config: StoreConfig = Figment::new()
            .merge(Serialized::default("store", "memory"))
            .extract()
            .unwrap();
        assert_eq!(config.store, StoreKind::Memory);
    }

    #[rocket::async_test]
    async fn mongodb_store_requires_uri() {
        let figment = Figment::from(rocket::Config::default())
            .merge(Serialized::default("store", "mongodb"));
        let result = rocket::custom(figment).attach(StoreFairing).ignite().await;
        match result {
            Ok(_) => panic!("Ignition should fail without `db_uri`"),
            Err(e) => assert!(matches!(e.kind(), ErrorKind::FailedFairings(_))),
        }
    }

    #[rocket::async_test]
    async fn memory_store_is_managed() {
        let figment = Figment::from(rocket::Config::default())
            .merge(Serialized::default("store", "memory"));
        let rocket = rocket::custom(figment)
            .attach(StoreFairing)
            .ignite()
            .await
            .unwrap();
        assert!(rocket.state::<Store>().is_some());
    }
}
