use std::time::Duration;

use async_trait::async_trait;
use feed_cache::{NetworkError, RemoteFetcher};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::PlaceholderError;
use crate::types::{Comment, Post};

const DEFAULT_BASE_URL: &str = "https://jsonplaceholder.typicode.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cache key for the full post collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllPosts;

/// Cache key for the comments of one post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PostComments(pub u64);

/// HTTP client for a JSONPlaceholder-style collection service
pub struct JsonPlaceholderClient {
    client: Client,
    base_url: String,
}

impl JsonPlaceholderClient {
    /// Create a client for the public JSONPlaceholder service
    pub fn new() -> crate::Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> crate::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn posts(&self) -> crate::Result<Vec<Post>> {
        self.get_json("/posts").await
    }

    pub async fn comments(&self, post_id: u64) -> crate::Result<Vec<Comment>> {
        self.get_json(&format!("/posts/{post_id}/comments")).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> crate::Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Fetching collection");

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "Collection request failed");
            return Err(PlaceholderError::Status(response.status().as_u16()));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl RemoteFetcher<AllPosts, Vec<Post>> for JsonPlaceholderClient {
    async fn fetch_collection(&self, _key: &AllPosts) -> Result<Vec<Post>, NetworkError> {
        Ok(self.posts().await?)
    }
}

#[async_trait]
impl RemoteFetcher<PostComments, Vec<Comment>> for JsonPlaceholderClient {
    async fn fetch_collection(&self, key: &PostComments) -> Result<Vec<Comment>, NetworkError> {
        Ok(self.comments(key.0).await?)
    }
}
