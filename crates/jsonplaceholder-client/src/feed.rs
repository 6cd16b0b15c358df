use std::sync::Arc;
use std::time::Instant;

use feed_cache::{
    FeedConfig, MetricsSink, NetworkError, QueryHandle, QueryPipeline, RemoteFetcher, TtlCache,
};
use tracing::info;

use crate::client::{AllPosts, JsonPlaceholderClient, PostComments};
use crate::types::{Comment, Post};

/// Cached access to posts and comments, one TTL cache per resource family
pub struct SocialFeed {
    posts: Arc<TtlCache<AllPosts, Vec<Post>>>,
    comments: Arc<TtlCache<PostComments, Vec<Comment>>>,
    post_search: QueryPipeline<AllPosts, Post>,
    comment_search: QueryPipeline<PostComments, Comment>,
    metrics: Arc<dyn MetricsSink>,
}

impl SocialFeed {
    pub fn new(
        client: JsonPlaceholderClient,
        metrics: Arc<dyn MetricsSink>,
        config: &FeedConfig,
    ) -> Self {
        let client = Arc::new(client);
        Self::with_fetchers(client.clone(), client, metrics, config)
    }

    pub fn with_fetchers(
        posts_fetcher: Arc<dyn RemoteFetcher<AllPosts, Vec<Post>>>,
        comments_fetcher: Arc<dyn RemoteFetcher<PostComments, Vec<Comment>>>,
        metrics: Arc<dyn MetricsSink>,
        config: &FeedConfig,
    ) -> Self {
        let posts = Arc::new(TtlCache::new(posts_fetcher, metrics.clone(), config.ttl));
        let comments = Arc::new(TtlCache::new(comments_fetcher, metrics.clone(), config.ttl));

        info!(
            ttl_secs = config.ttl.as_secs(),
            debounce_ms = config.debounce.as_millis() as u64,
            page_limit = config.page_limit,
            "Social feed ready"
        );

        Self {
            post_search: QueryPipeline::new(posts.clone(), metrics.clone(), config),
            comment_search: QueryPipeline::new(comments.clone(), metrics.clone(), config),
            posts,
            comments,
            metrics,
        }
    }

    /// All posts, bypassing the cache when `force_refresh` is set
    pub async fn posts(&self, force_refresh: bool) -> Result<Arc<Vec<Post>>, NetworkError> {
        if force_refresh {
            self.posts.get_fresh(&AllPosts).await
        } else {
            self.posts.get(&AllPosts).await
        }
    }

    pub async fn comments(&self, post_id: u64) -> Result<Arc<Vec<Comment>>, NetworkError> {
        let started = Instant::now();
        let comments = self.comments.get(&PostComments(post_id)).await?;
        self.metrics.record_timing_ms(
            "comments.load",
            started.elapsed().as_secs_f64() * 1000.0,
        );
        Ok(comments)
    }

    /// Live search over the post collection
    pub fn search_posts(&self) -> QueryHandle<Post> {
        self.post_search.observe(AllPosts)
    }

    /// Live search over the comments of one post
    pub fn search_comments(&self, post_id: u64) -> QueryHandle<Comment> {
        self.comment_search.observe(PostComments(post_id))
    }

    pub fn invalidate_all(&self) {
        self.posts.invalidate_all();
        self.comments.invalidate_all();
    }
}
