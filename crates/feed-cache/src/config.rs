use std::env;
use std::time::Duration;

const DEFAULT_TTL_SECS: u64 = 60;
const DEFAULT_DEBOUNCE_MS: u64 = 300;
const DEFAULT_PAGE_LIMIT: usize = 24;

/// Cache and pipeline tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Validity window of a cached collection
    pub ttl: Duration,
    /// Quiet window before a search term settles
    pub debounce: Duration,
    /// Maximum rows surfaced per collection
    pub page_limit: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl FeedConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let ttl_secs = lookup("FEED_CACHE_TTL_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TTL_SECS);

        let debounce_ms = lookup("FEED_DEBOUNCE_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_DEBOUNCE_MS);

        let page_limit = lookup("FEED_PAGE_LIMIT")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_PAGE_LIMIT);

        Self {
            ttl: Duration::from_secs(ttl_secs),
            debounce: Duration::from_millis(debounce_ms),
            page_limit,
        }
    }
}
