//! # Post event stream
//!
//! The post service appends one entry per published post to the `post_events`
//! stream. Entries are flat field maps `{postId, userId, createdAt}` with
//! `createdAt` in epoch millis.
//!
//! Consumption goes through the `feed_generators` consumer group, so each
//! entry is owned by exactly one consumer until it is acknowledged. Delivery
//! is at-least-once: anything this service does with an entry has to tolerate
//! seeing it twice.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use redis::{
    AsyncCommands, RedisError,
    aio::ConnectionManager,
    streams::{StreamReadOptions, StreamReadReply},
};
use tracing::{debug, info};

use crate::{config::Config, error::FanoutError};

pub const STREAM_NAME: &str = "post_events";
pub const GROUP_NAME: &str = "feed_generators";

/// A raw stream entry: delivery id plus the field map the producer wrote.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub id: String,
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostEvent {
    pub post_id: String,
    pub author_id: String,
    pub created_at: i64,
}

impl PostEvent {
    /// Parses the producer's field map. Missing fields and a non-numeric
    /// `createdAt` are permanent failures, the entry will never become valid.
    pub fn from_fields(message: &StreamMessage) -> Result<Self, FanoutError> {
        let get = |name: &str| {
            message
                .fields
                .get(name)
                .cloned()
                .ok_or_else(|| FanoutError::Malformed {
                    entry_id: message.id.clone(),
                    reason: format!("missing field `{name}`"),
                })
        };

        let post_id = get("postId")?;
        let author_id = get("userId")?;
        let raw_created_at = get("createdAt")?;
        let created_at = raw_created_at
            .parse::<i64>()
            .map_err(|_| FanoutError::Malformed {
                entry_id: message.id.clone(),
                reason: format!("createdAt `{raw_created_at}` is not epoch millis"),
            })?;

        Ok(Self {
            post_id,
            author_id,
            created_at,
        })
    }
}

#[async_trait]
pub trait EventStream: Send + Sync {
    /// Idempotently creates the consumer group, and the stream itself when
    /// absent. Any error other than "group already exists" is fatal to
    /// worker startup.
    async fn ensure_group(&self) -> Result<()>;

    /// Blocks up to the configured timeout for entries not yet delivered to
    /// the group. A timeout yields an empty batch, not an error.
    async fn read(&self, consumer: &str) -> Result<Vec<StreamMessage>>;

    async fn ack(&self, entry_id: &str) -> Result<()>;
}

pub struct RedisStream {
    redis: ConnectionManager,
    block_ms: usize,
    batch: usize,
}

impl RedisStream {
    pub fn new(redis: ConnectionManager, config: &Config) -> Self {
        Self {
            redis,
            block_ms: config.fanout_block.as_millis() as usize,
            batch: config.fanout_batch,
        }
    }
}

#[async_trait]
impl EventStream for RedisStream {
    async fn ensure_group(&self) -> Result<()> {
        let mut conn = self.redis.clone();
        let created: Result<String, RedisError> = conn
            .xgroup_create_mkstream(STREAM_NAME, GROUP_NAME, "$")
            .await;

        match created {
            Ok(_) => {
                info!("Consumer group '{GROUP_NAME}' created on '{STREAM_NAME}'");
                Ok(())
            }
            Err(e) if is_busygroup(&e) => {
                debug!("Consumer group '{GROUP_NAME}' already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, consumer: &str) -> Result<Vec<StreamMessage>> {
        let options = StreamReadOptions::default()
            .group(GROUP_NAME, consumer)
            .block(self.block_ms)
            .count(self.batch);

        let mut conn = self.redis.clone();
        let reply: StreamReadReply = conn
            .xread_options(&[STREAM_NAME], &[">"], &options)
            .await?;

        let mut messages = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                let mut fields = HashMap::with_capacity(entry.map.len());
                for (name, value) in &entry.map {
                    if let Ok(text) = redis::from_redis_value::<String>(value) {
                        fields.insert(name.clone(), text);
                    }
                }
                messages.push(StreamMessage {
                    id: entry.id,
                    fields,
                });
            }
        }

        Ok(messages)
    }

    async fn ack(&self, entry_id: &str) -> Result<()> {
        let mut conn = self.redis.clone();
        let _acked: i64 = conn.xack(STREAM_NAME, GROUP_NAME, &[entry_id]).await?;
        Ok(())
    }
}

fn is_busygroup(err: &RedisError) -> bool {
    err.code() == Some("BUSYGROUP") || err.to_string().contains("BUSYGROUP")
}
