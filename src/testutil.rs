//! In-memory doubles for the stream, the timeline store, and the
//! collaborators. They mirror the Redis and HTTP implementations closely
//! enough to exercise delivery and fan-out semantics without a server:
//! the stream keeps a pending list until entries are acknowledged, the
//! timeline upsert replaces scores instead of duplicating members, and the
//! collaborators can be flipped into not-found or unreachable states.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    clients::{PostDirectory, SocialGraph},
    config::Config,
    database::{TimelineEntry, TimelineStore},
    state::AppState,
    stream::{EventStream, StreamMessage},
};

pub fn test_config() -> Config {
    Config {
        port: 0,
        redis_url: "redis://127.0.0.1:6379".to_string(),
        social_graph_url: "http://localhost:3003".to_string(),
        post_service_url: "http://localhost:3002".to_string(),
        interaction_service_url: "http://localhost:3004".to_string(),
        jwt_secret: "test-secret".to_string(),
        fanout_block: Duration::from_millis(5),
        fanout_batch: 16,
        collaborator_timeout: Duration::from_millis(50),
    }
}

pub fn test_state(timelines: Arc<MemoryTimeline>, posts: Arc<MemoryDirectory>) -> AppState {
    AppState {
        config: test_config(),
        timelines,
        stream: Arc::new(MemoryStream::default()),
        graph: Arc::new(MemoryGraph::default()),
        posts,
    }
}

#[derive(Default)]
struct StreamInner {
    queue: Vec<StreamMessage>,
    pending: Vec<StreamMessage>,
    acked: Vec<String>,
}

#[derive(Default)]
pub struct MemoryStream {
    next_id: AtomicU64,
    inner: Mutex<StreamInner>,
}

impl MemoryStream {
    pub fn push(&self, fields: &[(&str, &str)]) -> String {
        let id = format!("{}-0", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let message = StreamMessage {
            id: id.clone(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        self.inner.lock().unwrap().queue.push(message);
        id
    }

    /// Puts every unacknowledged delivery back at the head of the queue, the
    /// way a restarted consumer would reclaim its pending entries.
    pub fn redeliver(&self) {
        let mut inner = self.inner.lock().unwrap();
        let mut pending = std::mem::take(&mut inner.pending);
        pending.extend(inner.queue.drain(..));
        inner.queue = pending;
    }

    pub fn acked(&self) -> Vec<String> {
        self.inner.lock().unwrap().acked.clone()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }
}

#[async_trait]
impl EventStream for MemoryStream {
    async fn ensure_group(&self) -> Result<()> {
        Ok(())
    }

    async fn read(&self, _consumer: &str) -> Result<Vec<StreamMessage>> {
        let mut inner = self.inner.lock().unwrap();
        let batch: Vec<StreamMessage> = inner.queue.drain(..).collect();
        inner.pending.extend(batch.clone());
        Ok(batch)
    }

    async fn ack(&self, entry_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.pending.retain(|message| message.id != entry_id);
        inner.acked.push(entry_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTimeline {
    entries: Mutex<HashMap<String, Vec<(String, i64)>>>,
}

impl MemoryTimeline {
    /// `(post_id, score)` pairs for one owner, newest first.
    pub fn snapshot(&self, owner_id: &str) -> Vec<(String, i64)> {
        let mut timeline = self
            .entries
            .lock()
            .unwrap()
            .get(owner_id)
            .cloned()
            .unwrap_or_default();
        timeline.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        timeline
    }
}

#[async_trait]
impl TimelineStore for MemoryTimeline {
    async fn upsert_batch(&self, entries: &[TimelineEntry]) -> Result<()> {
        let mut map = self.entries.lock().unwrap();
        for entry in entries {
            let timeline = map.entry(entry.owner_id.clone()).or_default();
            match timeline.iter_mut().find(|(post, _)| post == &entry.post_id) {
                Some(existing) => existing.1 = entry.score,
                None => timeline.push((entry.post_id.clone(), entry.score)),
            }
        }
        Ok(())
    }

    async fn range(&self, owner_id: &str, offset: usize, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .snapshot(owner_id)
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(post_id, _)| post_id)
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryGraph {
    followers: Mutex<HashMap<String, Vec<String>>>,
    unreachable: Mutex<bool>,
}

impl MemoryGraph {
    pub fn set_followers(&self, user_id: &str, follower_ids: &[&str]) {
        self.followers.lock().unwrap().insert(
            user_id.to_string(),
            follower_ids.iter().map(|id| id.to_string()).collect(),
        );
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }
}

#[async_trait]
impl SocialGraph for MemoryGraph {
    async fn followers(&self, user_id: &str) -> Result<Option<Vec<String>>> {
        if *self.unreachable.lock().unwrap() {
            return Err(anyhow!("social graph unreachable"));
        }
        Ok(self.followers.lock().unwrap().get(user_id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryDirectory {
    posts: Mutex<HashMap<String, Value>>,
    likes: Mutex<HashMap<String, u64>>,
    comments: Mutex<HashMap<String, u64>>,
    counts_unreachable: Mutex<bool>,
}

impl MemoryDirectory {
    pub fn insert_post(&self, post_id: &str, likes: u64, comments: u64) {
        self.posts.lock().unwrap().insert(
            post_id.to_string(),
            json!({"id": post_id, "content": format!("post {post_id}")}),
        );
        self.likes.lock().unwrap().insert(post_id.to_string(), likes);
        self.comments
            .lock()
            .unwrap()
            .insert(post_id.to_string(), comments);
    }

    pub fn remove_post(&self, post_id: &str) {
        self.posts.lock().unwrap().remove(post_id);
    }

    pub fn set_counts_unreachable(&self, unreachable: bool) {
        *self.counts_unreachable.lock().unwrap() = unreachable;
    }
}

#[async_trait]
impl PostDirectory for MemoryDirectory {
    async fn fetch_post(&self, post_id: &str) -> Result<Option<Value>> {
        Ok(self.posts.lock().unwrap().get(post_id).cloned())
    }

    async fn like_count(&self, post_id: &str) -> Result<u64> {
        if *self.counts_unreachable.lock().unwrap() {
            return Err(anyhow!("interaction service unreachable"));
        }
        Ok(*self.likes.lock().unwrap().get(post_id).unwrap_or(&0))
    }

    async fn comment_count(&self, post_id: &str) -> Result<u64> {
        if *self.counts_unreachable.lock().unwrap() {
            return Err(anyhow!("interaction service unreachable"));
        }
        Ok(*self.comments.lock().unwrap().get(post_id).unwrap_or(&0))
    }
}
