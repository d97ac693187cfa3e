use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    auth::AuthUser,
    error::AppError,
    feed::{FeedPage, build_page},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct FeedParams {
    page: Option<String>,
    limit: Option<String>,
}

impl FeedParams {
    /// Absent or unparsable values fall back to page 1, limit 20.
    pub fn normalize(&self) -> (usize, usize) {
        (
            parse_param(self.page.as_deref(), 1),
            parse_param(self.limit.as_deref(), 20),
        )
    }
}

fn parse_param(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|value| value.parse::<usize>().ok())
        .filter(|parsed| *parsed >= 1)
        .unwrap_or(default)
}

pub async fn feed_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<FeedParams>,
) -> Result<Json<FeedPage>, AppError> {
    let (page, limit) = params.normalize();
    debug!("Fetching feed for user {} (page {page}, limit {limit})", user.user_id);

    Ok(Json(build_page(&state, &user.user_id, page, limit).await?))
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "UP",
        "service": "feed-service",
    }))
}
