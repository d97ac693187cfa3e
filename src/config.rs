use std::{env, fmt::Display, str::FromStr, time::Duration};

use tracing::{info, warn};

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub social_graph_url: String,
    pub post_service_url: String,
    pub interaction_service_url: String,
    pub jwt_secret: String,
    pub fanout_block: Duration,
    pub fanout_batch: usize,
    pub collaborator_timeout: Duration,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("PORT", "3005"),
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379"),
            social_graph_url: try_load("SOCIAL_GRAPH_SERVICE_URL", "http://localhost:3003"),
            post_service_url: try_load("POST_SERVICE_URL", "http://localhost:3002"),
            interaction_service_url: try_load("INTERACTION_SERVICE_URL", "http://localhost:3004"),
            jwt_secret: must_load("JWT_SECRET"),
            fanout_block: Duration::from_millis(try_load("FANOUT_BLOCK_MS", "5000")),
            fanout_batch: try_load("FANOUT_BATCH", "16"),
            collaborator_timeout: Duration::from_millis(try_load("COLLABORATOR_TIMEOUT_MS", "3000")),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

fn must_load(key: &str) -> String {
    env::var(key)
        .map_err(|_| {
            warn!("{key} must be set");
        })
        .expect("Environment misconfigured!")
}
