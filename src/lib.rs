//! # Feed Service
//!
//! Feed generation and delivery for the social network.
//!
//! ## Architecture
//!
//! Fan-out on write: publishing a post costs one timeline write per follower
//! up front, so reading a feed is a single range query instead of a scatter
//! across the follower graph.
//!
//! - the post service appends `{postId, userId, createdAt}` to the
//!   `post_events` Redis stream when a post becomes published
//! - the fan-out worker (consumer group `feed_generators`) resolves the
//!   author's followers from the social-graph service and upserts the post
//!   into the author's and every follower's timeline sorted set
//! - `GET /feed` pages a timeline back out of Redis and enriches each post
//!   with its body and like/comment counts from the post and interaction
//!   services, dropping any post that fails to enrich
//!
//! ## Delivery
//!
//! At-least-once. A stream entry is acknowledged only after the timeline
//! batch is written, so a crash mid-fan-out redelivers the event; the
//! idempotent upsert makes the replay harmless. Malformed or unresolvable
//! events are acknowledged and logged instead of poisoning the group.
//!
//! Known ceiling: fan-out is O(follower count) per event, so a very large
//! account makes the worker the bottleneck. A push/pull hybrid is the usual
//! way out and is deliberately not attempted here.
//!
//! ## Environment
//!
//! `PORT`, `REDIS_URL`, `SOCIAL_GRAPH_SERVICE_URL`, `POST_SERVICE_URL`,
//! `INTERACTION_SERVICE_URL`, `JWT_SECRET` (required), `FANOUT_BLOCK_MS`,
//! `FANOUT_BATCH`, `COLLABORATOR_TIMEOUT_MS`.

use std::time::Duration;

use anyhow::Result;
use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::get,
};
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal, sync::watch};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod clients;
pub mod config;
pub mod database;
pub mod error;
pub mod feed;
pub mod routes;
pub mod state;
pub mod stream;
pub mod worker;

#[cfg(test)]
pub(crate) mod testutil;

use routes::{feed_handler, health_handler};
use state::AppState;
use worker::{FanoutWorker, default_consumer};

/// Runs the HTTP read path with an in-process fan-out worker.
pub async fn start_server() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await?;

    state.stream.ensure_group().await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let fanout = FanoutWorker::new(
        state.stream.clone(),
        state.graph.clone(),
        state.timelines.clone(),
        default_consumer(),
    );
    let fanout_task = tokio::spawn(fanout.run(shutdown_rx));

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let app = Router::new()
        .route("/feed", get(feed_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, draining fan-out worker...");
    let _ = shutdown_tx.send(true);
    fanout_task.await??;

    Ok(())
}

/// Runs a standalone fan-out worker, for scaling the consumer group out
/// across processes.
pub async fn start_worker(consumer: Option<String>) -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await?;

    state.stream.ensure_group().await?;

    let consumer = consumer.unwrap_or_else(default_consumer);
    let fanout = FanoutWorker::new(
        state.stream.clone(),
        state.graph.clone(),
        state.timelines.clone(),
        consumer,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    fanout.run(shutdown_rx).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
