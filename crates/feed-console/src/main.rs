//! Feed Console - terminal front-end for the cached JSONPlaceholder feed
//!
//! Lists posts and comments through the TTL cache and offers a live search
//! mode where every stdin line is treated as the current search input.

mod error;
mod render;

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use feed_cache::{FeedConfig, KpiRecorder};
use jsonplaceholder_client::{JsonPlaceholderClient, SocialFeed};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::Result;

const DEFAULT_API_URL: &str = "https://jsonplaceholder.typicode.com";

#[derive(Debug, Parser)]
#[command(name = "feed-console", version, about = "Cached JSONPlaceholder feed")]
struct Args {
    /// Collection service base URL (default: $FEED_API_URL or the public service)
    #[arg(long)]
    api_url: Option<String>,

    /// Cache validity window in seconds
    #[arg(long)]
    ttl_secs: Option<u64>,

    /// Quiet window before a search term settles, in milliseconds
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Maximum rows shown per collection
    #[arg(long)]
    page_limit: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List posts, optionally filtered
    Posts {
        #[arg(long)]
        search: Option<String>,
        /// Bypass the cache
        #[arg(long)]
        refresh: bool,
    },
    /// List the comments of one post
    Comments { post_id: u64 },
    /// Live search over posts; each stdin line is the current input
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let started = Instant::now();
    let args = Args::parse();

    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("feed_console=info".parse()?)
        .add_directive("feed_cache=info".parse()?);

    // Machine-readable output when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = load_config(&args);
    let api_url = args
        .api_url
        .clone()
        .or_else(|| std::env::var("FEED_API_URL").ok())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    info!(api_url = %api_url, "Starting feed console");

    let kpi = Arc::new(KpiRecorder::new());
    let client = JsonPlaceholderClient::with_base_url(&api_url)?;
    let feed = SocialFeed::new(client, kpi.clone(), &config);
    kpi.set_startup_ms(started.elapsed().as_secs_f64() * 1000.0);

    match args.command {
        Command::Posts { search, refresh } => list_posts(&feed, search, refresh).await?,
        Command::Comments { post_id } => list_comments(&feed, post_id).await,
        Command::Watch => watch(&feed, &kpi).await?,
    }

    eprint!("{}", render::kpis(&kpi.snapshot()));
    Ok(())
}

fn load_config(args: &Args) -> FeedConfig {
    let mut config = FeedConfig::from_env();
    if let Some(secs) = args.ttl_secs {
        config.ttl = Duration::from_secs(secs);
    }
    if let Some(ms) = args.debounce_ms {
        config.debounce = Duration::from_millis(ms);
    }
    if let Some(limit) = args.page_limit {
        config.page_limit = limit;
    }
    config
}

async fn list_posts(feed: &SocialFeed, search: Option<String>, refresh: bool) -> Result<()> {
    if refresh {
        // Prime the cache with a fresh copy; the search below then hits it
        if let Err(e) = feed.posts(true).await {
            warn!(error = %e, "Refresh failed");
        }
    }

    let wanted = search.unwrap_or_default();
    let mut query = feed.search_posts();
    if !wanted.is_empty() {
        query.submit_term(wanted.clone());
    }

    // Wait for the view that reflects the requested term
    while let Some(result) = query.next().await {
        if result.load_failed || result.term == wanted {
            print!("{}", render::posts(&result));
            break;
        }
    }
    Ok(())
}

async fn list_comments(feed: &SocialFeed, post_id: u64) {
    match feed.comments(post_id).await {
        Ok(comments) => print!("{}", render::comments(post_id, &comments)),
        Err(e) => {
            warn!(post_id, error = %e, "Failed to load comments");
            println!("{}", render::COMMENTS_FAILED);
        }
    }
}

async fn watch(feed: &SocialFeed, kpi: &KpiRecorder) -> Result<()> {
    let mut query = feed.search_posts();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Type to search posts. :retry reloads, :kpi shows counters, :reset clears them, :quit exits.");

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => match line.trim() {
                    ":quit" => break,
                    ":retry" => query.retry(),
                    ":kpi" => print!("{}", render::kpis(&kpi.snapshot())),
                    ":reset" => {
                        kpi.reset();
                        info!("KPI counters reset");
                    }
                    term => query.submit_term(term),
                },
                None => break,
            },
            result = query.next() => match result {
                Some(result) => print!("{}", render::posts(&result)),
                None => break,
            },
        }
    }

    Ok(())
}
