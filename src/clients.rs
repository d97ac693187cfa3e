//! Collaborator clients.
//!
//! Everything downstream of this service speaks HTTP JSON: the social graph
//! for follower sets, the post service for post bodies, the interaction
//! service for like and comment counts. All calls share one `reqwest`
//! client with a bounded timeout so a stalled collaborator cannot hold a
//! feed page or the worker loop open indefinitely.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Ids cross service boundaries as JSON numbers (SQL rows) or strings
/// (stream fields, JWT claims). Timeline keys need one canonical form.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
pub trait SocialGraph: Send + Sync {
    /// Follower ids for a user. `Ok(None)` means the user no longer exists.
    async fn followers(&self, user_id: &str) -> Result<Option<Vec<String>>>;
}

#[async_trait]
pub trait PostDirectory: Send + Sync {
    /// The post body. `Ok(None)` means the post is gone (deleted or never
    /// published).
    async fn fetch_post(&self, post_id: &str) -> Result<Option<Value>>;

    async fn like_count(&self, post_id: &str) -> Result<u64>;

    async fn comment_count(&self, post_id: &str) -> Result<u64>;
}

#[derive(Deserialize)]
struct FollowersEnvelope {
    followers: Vec<Value>,
}

#[derive(Deserialize)]
struct PostEnvelope {
    post: Value,
}

#[derive(Deserialize)]
struct CountEnvelope {
    count: u64,
}

pub struct HttpSocialGraph {
    client: Client,
    base_url: String,
}

impl HttpSocialGraph {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SocialGraph for HttpSocialGraph {
    async fn followers(&self, user_id: &str) -> Result<Option<Vec<String>>> {
        let url = format!("{}/api/social/users/{user_id}/followers", self.base_url);
        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let envelope: FollowersEnvelope = response.error_for_status()?.json().await?;

        let mut follower_ids = Vec::with_capacity(envelope.followers.len());
        for profile in &envelope.followers {
            match profile.get("id").and_then(id_string) {
                Some(id) => follower_ids.push(id),
                None => warn!("Follower profile without id for user {user_id}, skipped"),
            }
        }

        Ok(Some(follower_ids))
    }
}

pub struct HttpPostDirectory {
    client: Client,
    post_base_url: String,
    interaction_base_url: String,
}

impl HttpPostDirectory {
    pub fn new(client: Client, post_base_url: &str, interaction_base_url: &str) -> Self {
        Self {
            client,
            post_base_url: post_base_url.trim_end_matches('/').to_string(),
            interaction_base_url: interaction_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn count(&self, url: String) -> Result<u64> {
        let envelope: CountEnvelope = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(envelope.count)
    }
}

#[async_trait]
impl PostDirectory for HttpPostDirectory {
    async fn fetch_post(&self, post_id: &str) -> Result<Option<Value>> {
        let url = format!("{}/api/posts/{post_id}", self.post_base_url);
        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let envelope: PostEnvelope = response.error_for_status()?.json().await?;
        Ok(Some(envelope.post))
    }

    async fn like_count(&self, post_id: &str) -> Result<u64> {
        self.count(format!(
            "{}/api/likes/post/{post_id}/count",
            self.interaction_base_url
        ))
        .await
    }

    async fn comment_count(&self, post_id: &str) -> Result<u64> {
        self.count(format!(
            "{}/api/comments/post/{post_id}/count",
            self.interaction_base_url
        ))
        .await
    }
}
