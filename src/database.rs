//! # Redis
//!
//! Timeline storage.
//!
//! One sorted set per user, keyed `user:{id}:feed`, member = post id,
//! score = publish timestamp in epoch millis. `ZADD` on an existing member
//! only rewrites the score, so replaying a fan-out batch lands on the exact
//! same state. Reads come back newest-first via `ZREVRANGE`; entries with
//! equal scores have no defined relative order.
//!
//! Fan-out for one event is a single pipelined round trip. The pipeline is
//! not a transaction: a crash mid-batch leaves some timelines written and
//! some not, and the redelivered event fills in the rest.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    Ok(connection_manager)
}

pub fn feed_key(owner_id: &str) -> String {
    format!("user:{owner_id}:feed")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub owner_id: String,
    pub post_id: String,
    pub score: i64,
}

impl TimelineEntry {
    pub fn new(owner_id: &str, post_id: &str, score: i64) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            post_id: post_id.to_string(),
            score,
        }
    }
}

#[async_trait]
pub trait TimelineStore: Send + Sync {
    /// Idempotent upsert of a whole fan-out batch in one round trip.
    async fn upsert_batch(&self, entries: &[TimelineEntry]) -> Result<()>;

    /// Post ids for one user, newest first. An unknown user yields an empty
    /// vec, not an error.
    async fn range(&self, owner_id: &str, offset: usize, limit: usize) -> Result<Vec<String>>;
}

pub struct RedisTimeline {
    redis: ConnectionManager,
}

impl RedisTimeline {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl TimelineStore for RedisTimeline {
    async fn upsert_batch(&self, entries: &[TimelineEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for entry in entries {
            pipe.zadd(feed_key(&entry.owner_id), &entry.post_id, entry.score)
                .ignore();
        }

        let mut conn = self.redis.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn range(&self, owner_id: &str, offset: usize, limit: usize) -> Result<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.redis.clone();
        let post_ids: Vec<String> = conn
            .zrevrange(
                feed_key(owner_id),
                offset as isize,
                (offset + limit - 1) as isize,
            )
            .await?;

        Ok(post_ids)
    }
}
