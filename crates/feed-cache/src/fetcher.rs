//! Remote collection fetcher

use async_trait::async_trait;

use crate::error::NetworkError;

/// Performs the network call for one resource collection.
///
/// Implementations carry no retry logic; timeouts belong to the transport.
#[async_trait]
pub trait RemoteFetcher<K, V>: Send + Sync + 'static {
    async fn fetch_collection(&self, key: &K) -> Result<V, NetworkError>;
}
