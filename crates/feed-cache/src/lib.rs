//! Cache-backed data access for remote JSON collections
//!
//! A TTL cache that coalesces concurrent fetches for the same key, plus a
//! reactive query pipeline that combines a cached collection with a debounced
//! search-term stream into a live, filtered result view.

pub mod cache;
pub mod config;
pub mod debounce;
pub mod error;
pub mod fetcher;
pub mod filter;
pub mod metrics;
pub mod pipeline;

pub use cache::{CacheEvent, EntryStatus, TtlCache};
pub use config::FeedConfig;
pub use debounce::Debouncer;
pub use error::{NetworkError, Result};
pub use fetcher::RemoteFetcher;
pub use filter::{filter_rows, Searchable};
pub use metrics::{KpiRecorder, KpiSnapshot, MetricsSink, NoopMetrics, TimingSummary, TracingMetrics};
pub use pipeline::{FilteredResult, QueryHandle, QueryPipeline};
