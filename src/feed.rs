//! Feed read path: page the timeline out of the store, then enrich every
//! post id with its body and counts from the collaborators. A post that
//! fails to enrich, deleted posts included, is dropped from the page; the
//! request itself never fails because of one post.

use futures::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::{clients::PostDirectory, error::AppError, state::AppState};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedPost {
    #[serde(flatten)]
    pub post: Map<String, Value>,
    pub likes_count: u64,
    pub comments_count: u64,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct FeedPage {
    pub success: bool,
    pub feed: Vec<EnrichedPost>,
    pub pagination: Pagination,
}

impl FeedPage {
    fn empty(page: usize, limit: usize) -> Self {
        Self {
            success: true,
            feed: Vec::new(),
            pagination: Pagination {
                page,
                limit,
                has_more: false,
            },
        }
    }
}

/// Assembles one feed page. Offset pagination over a live sorted set: a
/// concurrent fan-out can shift entries between two successive reads, which
/// is accepted here rather than switching the contract to score cursors.
pub async fn build_page(
    state: &AppState,
    user_id: &str,
    page: usize,
    limit: usize,
) -> Result<FeedPage, AppError> {
    let offset = (page - 1) * limit;
    let post_ids = state.timelines.range(user_id, offset, limit).await?;

    if post_ids.is_empty() {
        return Ok(FeedPage::empty(page, limit));
    }

    let enriched = join_all(
        post_ids
            .iter()
            .map(|post_id| enrich_post(state.posts.as_ref(), post_id)),
    )
    .await;
    let feed: Vec<EnrichedPost> = enriched.into_iter().flatten().collect();

    // Counted after enrichment, so a dropped post at a page boundary can
    // misreport whether another page exists.
    let has_more = feed.len() == limit;

    Ok(FeedPage {
        success: true,
        feed,
        pagination: Pagination {
            page,
            limit,
            has_more,
        },
    })
}

/// Joins the three collaborator calls for one post. Any failure, a 404 for a
/// deleted post included, drops this post alone.
async fn enrich_post(posts: &dyn PostDirectory, post_id: &str) -> Option<EnrichedPost> {
    let joined = tokio::try_join!(
        posts.fetch_post(post_id),
        posts.like_count(post_id),
        posts.comment_count(post_id),
    );

    let (body, likes_count, comments_count) = match joined {
        Ok(parts) => parts,
        Err(e) => {
            warn!("Failed to enrich post {post_id}, dropped from feed: {e:#}");
            return None;
        }
    };

    let Some(Value::Object(post)) = body else {
        warn!("Post {post_id} is gone, dropped from feed");
        return None;
    };

    Some(EnrichedPost {
        post,
        likes_count,
        comments_count,
    })
}
