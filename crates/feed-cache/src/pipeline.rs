//! Reactive query pipeline
//!
//! Combines the cached collection for one key with a debounced, de-duplicated
//! stream of search terms. Every change on either side recomputes the filtered
//! view and pushes it to the [`QueryHandle`].

use std::fmt::Debug;
use std::future::pending;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::cache::{CacheEvent, TtlCache};
use crate::config::FeedConfig;
use crate::debounce::Debouncer;
use crate::error::NetworkError;
use crate::filter::{filter_rows, Searchable};
use crate::metrics::MetricsSink;

type Load<R> = BoxFuture<'static, Result<Arc<Vec<R>>, NetworkError>>;

/// One emission of the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredResult<R> {
    /// Settled term the rows were filtered with
    pub term: String,
    pub rows: Vec<R>,
    /// Set when the last load failed; `rows` is then empty
    pub load_failed: bool,
}

impl<R> FilteredResult<R> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

enum Command {
    Term(String),
    Retry,
}

/// Caller side of an observed query.
///
/// Dropping the handle stops the pipeline task.
pub struct QueryHandle<R> {
    commands: mpsc::UnboundedSender<Command>,
    results: mpsc::UnboundedReceiver<FilteredResult<R>>,
    metrics: Arc<dyn MetricsSink>,
}

impl<R> QueryHandle<R> {
    /// Feed one keystroke's worth of search input
    pub fn submit_term(&self, term: impl Into<String>) {
        let started = std::time::Instant::now();
        let _ = self.commands.send(Command::Term(term.into()));
        self.metrics
            .record_timing_ms("query.input", started.elapsed().as_secs_f64() * 1000.0);
    }

    /// Invalidate the cached collection and load it again
    pub fn retry(&self) {
        let _ = self.commands.send(Command::Retry);
    }

    /// Wait for the next filtered result; `None` once the pipeline has stopped
    pub async fn next(&mut self) -> Option<FilteredResult<R>> {
        self.results.recv().await
    }

    pub fn try_next(&mut self) -> Option<FilteredResult<R>> {
        self.results.try_recv().ok()
    }
}

/// Builds live filtered views over a [`TtlCache`]
pub struct QueryPipeline<K, R> {
    cache: Arc<TtlCache<K, Vec<R>>>,
    metrics: Arc<dyn MetricsSink>,
    debounce: Duration,
    page_limit: usize,
}

impl<K, R> QueryPipeline<K, R>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    R: Searchable + Clone + Send + Sync + 'static,
{
    pub fn new(
        cache: Arc<TtlCache<K, Vec<R>>>,
        metrics: Arc<dyn MetricsSink>,
        config: &FeedConfig,
    ) -> Self {
        Self {
            cache,
            metrics,
            debounce: config.debounce,
            page_limit: config.page_limit,
        }
    }

    /// Start observing `key`. Must be called within a tokio runtime.
    ///
    /// The term stream starts out settled on the empty term, so the first
    /// emission is the unfiltered collection as soon as it is loaded.
    pub fn observe(&self, key: K) -> QueryHandle<R> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();

        let task = QueryTask {
            key,
            cache: Arc::clone(&self.cache),
            metrics: Arc::clone(&self.metrics),
            page_limit: self.page_limit,
            debouncer: Debouncer::seeded(self.debounce, ""),
            term: String::new(),
            rows: None,
            load_failed: false,
            started: Instant::now(),
            load_reported: false,
            results: result_tx,
        };
        tokio::spawn(task.run(command_rx));

        QueryHandle {
            commands: command_tx,
            results: result_rx,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

struct QueryTask<K, R> {
    key: K,
    cache: Arc<TtlCache<K, Vec<R>>>,
    metrics: Arc<dyn MetricsSink>,
    page_limit: usize,
    debouncer: Debouncer,
    term: String,
    rows: Option<Arc<Vec<R>>>,
    load_failed: bool,
    started: Instant,
    load_reported: bool,
    results: mpsc::UnboundedSender<FilteredResult<R>>,
}

impl<K, R> QueryTask<K, R>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    R: Searchable + Clone + Send + Sync + 'static,
{
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        // Subscribe before the first load so no refresh can slip past
        let mut refreshes = self.cache.subscribe();
        let mut loading = Some(self.load());

        loop {
            let deadline = self.debouncer.deadline();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Term(term)) => self.debouncer.push(term, Instant::now()),
                    Some(Command::Retry) => {
                        debug!(key = ?self.key, "Retrying load");
                        self.cache.invalidate(&self.key);
                        loading = Some(self.load());
                    }
                    None => break,
                },
                _ = wait_until(deadline) => {
                    if let Some(term) = self.debouncer.settle(Instant::now()) {
                        debug!(key = ?self.key, term = %term, "Search term settled");
                        self.term = term;
                        if !self.emit() {
                            break;
                        }
                    }
                }
                outcome = wait_for(&mut loading) => {
                    loading = None;
                    // A superseded fetch still answers its callers, so the
                    // cached value takes precedence over what it returned
                    let outcome =
                        outcome.map(|rows| self.cache.peek(&self.key).unwrap_or(rows));
                    if !self.apply(outcome) {
                        break;
                    }
                }
                event = refreshes.recv() => match event {
                    Ok(CacheEvent::Refreshed { key, value }) if key == self.key => {
                        if !self.apply(Ok(value)) {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        // One of the skipped events may have been ours; a hit
                        // picks up the current value
                        debug!(key = ?self.key, skipped, "Missed refresh events, reloading");
                        loading = Some(self.load());
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        debug!(key = ?self.key, "Query pipeline stopped");
    }

    fn load(&self) -> Load<R> {
        let cache = Arc::clone(&self.cache);
        let key = self.key.clone();
        async move { cache.get(&key).await }.boxed()
    }

    /// Take in a new collection or a failed load. Returns false once nobody
    /// is listening anymore.
    fn apply(&mut self, outcome: Result<Arc<Vec<R>>, NetworkError>) -> bool {
        match outcome {
            Ok(rows) => {
                let unchanged = !self.load_failed
                    && self
                        .rows
                        .as_ref()
                        .is_some_and(|current| Arc::ptr_eq(current, &rows));
                if unchanged {
                    return true;
                }
                self.rows = Some(rows);
                self.load_failed = false;
            }
            Err(e) => {
                warn!(key = ?self.key, error = %e, "Failed to load collection");
                self.rows = None;
                self.load_failed = true;
            }
        }

        if !self.load_reported {
            self.load_reported = true;
            let elapsed = Instant::now().duration_since(self.started);
            self.metrics
                .record_timing_ms("query.load", elapsed.as_secs_f64() * 1000.0);
        }

        self.emit()
    }

    fn emit(&self) -> bool {
        let rows = match &self.rows {
            Some(rows) => filter_rows(rows.as_slice(), &self.term, self.page_limit),
            None if self.load_failed => Vec::new(),
            // Nothing to combine the term with yet
            None => return true,
        };

        self.metrics.record_result_size(rows.len());
        debug!(
            key = ?self.key,
            term = %self.term,
            rows = rows.len(),
            load_failed = self.load_failed,
            "Emitting filtered result"
        );

        self.results
            .send(FilteredResult {
                term: self.term.clone(),
                rows,
                load_failed: self.load_failed,
            })
            .is_ok()
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn wait_for<T>(load: &mut Option<BoxFuture<'static, T>>) -> T {
    match load {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::RemoteFetcher;
    use crate::metrics::KpiRecorder;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Article {
        id: u32,
        title: String,
        body: String,
    }

    impl Searchable for Article {
        fn search_text(&self) -> String {
            format!("{} {}", self.title, self.body)
        }
    }

    fn article(id: u32, title: &str, body: &str) -> Article {
        Article {
            id,
            title: title.to_string(),
            body: body.to_string(),
        }
    }

    fn sample() -> Vec<Article> {
        vec![article(1, "Hello", "world"), article(2, "Foo", "bar")]
    }

    struct ArticleFetcher {
        rows: Mutex<Vec<Article>>,
        failures: AtomicUsize,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ArticleFetcher {
        fn new(failures: usize, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                rows: Mutex::new(sample()),
                failures: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
                delay,
            })
        }

        fn set_rows(&self, rows: Vec<Article>) {
            *self.rows.lock().unwrap() = rows;
        }
    }

    #[async_trait]
    impl RemoteFetcher<&'static str, Vec<Article>> for ArticleFetcher {
        async fn fetch_collection(&self, _key: &&'static str) -> Result<Vec<Article>, NetworkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(NetworkError::Transport("connection reset".to_string()));
            }
            Ok(self.rows.lock().unwrap().clone())
        }
    }

    struct Fixture {
        pipeline: QueryPipeline<&'static str, Article>,
        cache: Arc<TtlCache<&'static str, Vec<Article>>>,
        fetcher: Arc<ArticleFetcher>,
        kpi: Arc<KpiRecorder>,
    }

    fn fixture(fetcher: Arc<ArticleFetcher>, config: FeedConfig) -> Fixture {
        let kpi = Arc::new(KpiRecorder::new());
        let cache: Arc<TtlCache<&'static str, Vec<Article>>> =
            Arc::new(TtlCache::new(fetcher.clone(), kpi.clone(), config.ttl));
        let pipeline = QueryPipeline::new(cache.clone(), kpi.clone(), &config);
        Fixture {
            pipeline,
            cache,
            fetcher,
            kpi,
        }
    }

    fn ids(result: &FilteredResult<Article>) -> Vec<u32> {
        result.rows.iter().map(|a| a.id).collect()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_emission_is_unfiltered() {
        let fx = fixture(ArticleFetcher::new(0, Duration::ZERO), FeedConfig::default());
        let mut handle = fx.pipeline.observe("posts");

        let first = handle.next().await.unwrap();
        assert_eq!(first.term, "");
        assert_eq!(ids(&first), vec![1, 2]);
        assert!(!first.load_failed);

        settle().await;
        assert!(handle.try_next().is_none());
        assert_eq!(fx.kpi.network_calls(), 1);
        assert_eq!(fx.kpi.snapshot().render_items, 2);
        assert_eq!(fx.kpi.snapshot().timings["query.load"].samples, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_term_filters_rows() {
        let fx = fixture(ArticleFetcher::new(0, Duration::ZERO), FeedConfig::default());
        let mut handle = fx.pipeline.observe("posts");
        handle.next().await.unwrap();

        handle.submit_term("wor");
        let filtered = handle.next().await.unwrap();

        assert_eq!(filtered.term, "wor");
        assert_eq!(ids(&filtered), vec![1]);
        assert_eq!(fx.kpi.snapshot().render_items, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keystroke_burst_settles_once() {
        let fx = fixture(ArticleFetcher::new(0, Duration::ZERO), FeedConfig::default());
        let mut handle = fx.pipeline.observe("posts");
        handle.next().await.unwrap();

        handle.submit_term("a");
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.submit_term("ab");
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.submit_term("abc");

        let settled = handle.next().await.unwrap();
        assert_eq!(settled.term, "abc");

        settle().await;
        assert!(handle.try_next().is_none());
        assert_eq!(fx.kpi.result_emissions(), 2);
        assert_eq!(fx.kpi.snapshot().timings["query.input"].samples, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_settled_term_recomputes_once() {
        let fx = fixture(ArticleFetcher::new(0, Duration::ZERO), FeedConfig::default());
        let mut handle = fx.pipeline.observe("posts");
        handle.next().await.unwrap();

        handle.submit_term("wor");
        handle.next().await.unwrap();

        handle.submit_term("wor");
        settle().await;

        assert!(handle.try_next().is_none());
        assert_eq!(fx.kpi.result_emissions(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_term_typed_before_load_applies_to_first_emission() {
        let fx = fixture(
            ArticleFetcher::new(0, Duration::from_secs(2)),
            FeedConfig::default(),
        );
        let mut handle = fx.pipeline.observe("posts");
        handle.submit_term("FOO");

        let first = handle.next().await.unwrap();
        assert_eq!(first.term, "FOO");
        assert_eq!(ids(&first), vec![2]);
        assert_eq!(fx.kpi.result_emissions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_limit_truncates_collection() {
        let config = FeedConfig {
            page_limit: 1,
            ..FeedConfig::default()
        };
        let fx = fixture(ArticleFetcher::new(0, Duration::ZERO), config);
        let mut handle = fx.pipeline.observe("posts");

        assert_eq!(ids(&handle.next().await.unwrap()), vec![1]);

        handle.submit_term("bar");
        let filtered = handle.next().await.unwrap();
        assert!(filtered.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_emits_flag_and_retry_resumes() {
        let fx = fixture(ArticleFetcher::new(1, Duration::ZERO), FeedConfig::default());
        let mut handle = fx.pipeline.observe("posts");

        let failed = handle.next().await.unwrap();
        assert!(failed.load_failed);
        assert!(failed.is_empty());

        handle.retry();
        let recovered = handle.next().await.unwrap();
        assert!(!recovered.load_failed);
        assert_eq!(ids(&recovered), vec![1, 2]);

        settle().await;
        assert!(handle.try_next().is_none());
        assert_eq!(fx.kpi.network_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_term_change_while_failed_keeps_flag() {
        let fx = fixture(ArticleFetcher::new(1, Duration::ZERO), FeedConfig::default());
        let mut handle = fx.pipeline.observe("posts");
        handle.next().await.unwrap();

        handle.submit_term("wor");
        let result = handle.next().await.unwrap();
        assert_eq!(result.term, "wor");
        assert!(result.load_failed);
        assert!(result.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_by_another_caller_is_followed() {
        let fx = fixture(ArticleFetcher::new(0, Duration::ZERO), FeedConfig::default());
        let mut handle = fx.pipeline.observe("posts");
        handle.next().await.unwrap();

        fx.fetcher
            .set_rows(vec![article(3, "Brand new", "world news"), article(4, "Old", "news")]);
        fx.cache.get_fresh(&"posts").await.unwrap();

        let refreshed = handle.next().await.unwrap();
        assert_eq!(ids(&refreshed), vec![3, 4]);
        assert_eq!(fx.fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_of_other_key_is_ignored() {
        let fx = fixture(ArticleFetcher::new(0, Duration::ZERO), FeedConfig::default());
        let mut handle = fx.pipeline.observe("posts");
        handle.next().await.unwrap();

        fx.cache.get(&"drafts").await.unwrap();
        settle().await;

        assert!(handle.try_next().is_none());
    }

    /// Serves a scripted `(delay, rows)` per call, in order
    struct SequencedFetcher {
        script: Mutex<VecDeque<(Duration, Vec<Article>)>>,
    }

    #[async_trait]
    impl RemoteFetcher<&'static str, Vec<Article>> for SequencedFetcher {
        async fn fetch_collection(&self, _key: &&'static str) -> Result<Vec<Article>, NetworkError> {
            let next = self.script.lock().unwrap().pop_front();
            let (delay, rows) = next.ok_or(NetworkError::Status(404))?;
            tokio::time::sleep(delay).await;
            Ok(rows)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_load_does_not_replace_newer_view() {
        let fetcher = Arc::new(SequencedFetcher {
            script: Mutex::new(VecDeque::from([
                (Duration::from_millis(200), vec![article(1, "Stale", "old")]),
                (Duration::from_millis(10), vec![article(2, "Fresh", "new")]),
            ])),
        });
        let kpi = Arc::new(KpiRecorder::new());
        let cache: Arc<TtlCache<&'static str, Vec<Article>>> =
            Arc::new(TtlCache::new(fetcher, kpi.clone(), FeedConfig::default().ttl));
        let pipeline = QueryPipeline::new(cache.clone(), kpi.clone(), &FeedConfig::default());
        let mut handle = pipeline.observe("posts");

        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.invalidate(&"posts");
        let fresh = cache.get(&"posts").await.unwrap();
        assert_eq!(fresh[0].id, 2);

        assert_eq!(ids(&handle.next().await.unwrap()), vec![2]);

        // The first fetch resolves at 200ms with the stale rows
        settle().await;
        assert!(handle.try_next().is_none());
        assert_eq!(cache.peek(&"posts").unwrap()[0].id, 2);
        assert_eq!(kpi.network_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_refresh_events_trigger_reload() {
        let fx = fixture(ArticleFetcher::new(0, Duration::ZERO), FeedConfig::default());
        let mut handle = fx.pipeline.observe("posts");
        handle.next().await.unwrap();

        fx.fetcher
            .set_rows(vec![article(3, "Brand new", "world news"), article(4, "Old", "news")]);
        fx.cache.get_fresh(&"posts").await.unwrap();
        // Push the "posts" event out of the channel before the task runs
        for _ in 0..100 {
            fx.cache.get_fresh(&"drafts").await.unwrap();
        }

        let refreshed = handle.next().await.unwrap();
        assert_eq!(ids(&refreshed), vec![3, 4]);

        settle().await;
        assert!(handle.try_next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_observers_share_one_fetch() {
        let fx = fixture(
            ArticleFetcher::new(0, Duration::from_millis(500)),
            FeedConfig::default(),
        );
        let mut first = fx.pipeline.observe("posts");
        let mut second = fx.pipeline.observe("posts");

        assert_eq!(first.next().await.unwrap().len(), 2);
        assert_eq!(second.next().await.unwrap().len(), 2);
        assert_eq!(fx.kpi.network_calls(), 1);
    }
}
