//! # Fan-out worker
//!
//! Consumes post events and writes them into every relevant timeline before
//! acknowledging, so delivery is at-least-once and the timeline upsert
//! absorbs the duplicates.
//!
//! Per entry: parse, resolve the author's followers, pipeline one upsert per
//! member of {author} ∪ followers, ack. Transient failures (graph or store
//! unreachable) leave the entry pending and the consumer group redelivers
//! it. Permanent failures (malformed entry, author deleted) are acked anyway
//! and logged, otherwise the group would redeliver a poison entry forever.
//!
//! One worker processes entries strictly in sequence. Scaling out means more
//! processes in the same consumer group, each owning a disjoint set of
//! pending entries; no coordination between them is needed because every
//! write is an idempotent per-key upsert.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{sync::watch, time::sleep};
use tracing::{debug, error, info, warn};

use crate::{
    clients::SocialGraph,
    database::{TimelineEntry, TimelineStore},
    error::FanoutError,
    stream::{EventStream, PostEvent, StreamMessage},
};

const POLL_BACKOFF: Duration = Duration::from_secs(5);

pub fn default_consumer() -> String {
    format!("consumer-{}", std::process::id())
}

pub struct FanoutWorker {
    stream: Arc<dyn EventStream>,
    graph: Arc<dyn SocialGraph>,
    timelines: Arc<dyn TimelineStore>,
    consumer: String,
}

impl FanoutWorker {
    pub fn new(
        stream: Arc<dyn EventStream>,
        graph: Arc<dyn SocialGraph>,
        timelines: Arc<dyn TimelineStore>,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            stream,
            graph,
            timelines,
            consumer: consumer.into(),
        }
    }

    /// Poll loop. Returns when the shutdown signal fires; a poll error backs
    /// off instead of crashing the process.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("Fan-out worker '{}' started", self.consumer);

        loop {
            let polled = tokio::select! {
                _ = shutdown.changed() => {
                    info!("Fan-out worker '{}' stopping", self.consumer);
                    return Ok(());
                }
                polled = self.stream.read(&self.consumer) => polled,
            };

            match polled {
                Ok(batch) => {
                    for message in batch {
                        self.handle(message).await;
                    }
                }
                Err(e) => {
                    error!("Event stream poll failed: {e:#}");
                    tokio::select! {
                        _ = shutdown.changed() => {
                            info!("Fan-out worker '{}' stopping", self.consumer);
                            return Ok(());
                        }
                        _ = sleep(POLL_BACKOFF) => {}
                    }
                }
            }
        }
    }

    async fn handle(&self, message: StreamMessage) {
        let entry_id = message.id.clone();
        match self.process(&message).await {
            Ok(fanned_out) => {
                debug!("Fanned out entry {entry_id} to {fanned_out} timelines");
                self.ack(&entry_id).await;
            }
            Err(e) if e.is_permanent() => {
                error!("Dropping entry {entry_id}: {e:#}");
                self.ack(&entry_id).await;
            }
            Err(e) => {
                warn!("Processing entry {entry_id} failed, left pending for redelivery: {e:#}");
            }
        }
    }

    /// Fans one event out to the author plus every follower. The follower
    /// set is resolved exactly once, here; users who follow the author later
    /// never receive this post retroactively.
    async fn process(&self, message: &StreamMessage) -> Result<usize, FanoutError> {
        let event = PostEvent::from_fields(message)?;

        let followers = self
            .graph
            .followers(&event.author_id)
            .await?
            .ok_or_else(|| FanoutError::AuthorGone(event.author_id.clone()))?;

        let mut entries = Vec::with_capacity(followers.len() + 1);
        entries.push(TimelineEntry::new(
            &event.author_id,
            &event.post_id,
            event.created_at,
        ));
        for follower_id in &followers {
            entries.push(TimelineEntry::new(
                follower_id,
                &event.post_id,
                event.created_at,
            ));
        }

        self.timelines.upsert_batch(&entries).await?;
        Ok(entries.len())
    }

    async fn ack(&self, entry_id: &str) {
        if let Err(e) = self.stream.ack(entry_id).await {
            warn!("Ack of entry {entry_id} failed, it will be redelivered: {e:#}");
        }
    }
}
