use std::sync::Arc;

use anyhow::Result;

use crate::{
    clients::{HttpPostDirectory, HttpSocialGraph, PostDirectory, SocialGraph},
    config::Config,
    database::{RedisTimeline, TimelineStore, init_redis},
    stream::{EventStream, RedisStream},
};

/// Process-wide handles: one Redis connection manager behind the store and
/// the stream, one HTTP client behind both collaborators. Built once at
/// startup and injected everywhere, never reached for globally.
pub struct AppState {
    pub config: Config,
    pub timelines: Arc<dyn TimelineStore>,
    pub stream: Arc<dyn EventStream>,
    pub graph: Arc<dyn SocialGraph>,
    pub posts: Arc<dyn PostDirectory>,
}

impl AppState {
    pub async fn new() -> Result<Arc<Self>> {
        let config = Config::load();

        let redis = init_redis(&config.redis_url).await?;
        let http = reqwest::Client::builder()
            .timeout(config.collaborator_timeout)
            .build()?;

        let timelines: Arc<dyn TimelineStore> = Arc::new(RedisTimeline::new(redis.clone()));
        let stream: Arc<dyn EventStream> = Arc::new(RedisStream::new(redis, &config));
        let graph: Arc<dyn SocialGraph> =
            Arc::new(HttpSocialGraph::new(http.clone(), &config.social_graph_url));
        let posts: Arc<dyn PostDirectory> = Arc::new(HttpPostDirectory::new(
            http,
            &config.post_service_url,
            &config.interaction_service_url,
        ));

        Ok(Arc::new(Self {
            config,
            timelines,
            stream,
            graph,
            posts,
        }))
    }
}
