//! Plain-text rendering of feed results

use std::fmt::Write;

use feed_cache::{FilteredResult, KpiSnapshot};
use jsonplaceholder_client::{Comment, Post};

pub const POSTS_FAILED: &str = "Error loading posts";
pub const COMMENTS_FAILED: &str = "Error loading comments";

pub fn posts(result: &FilteredResult<Post>) -> String {
    if result.load_failed {
        return format!("{POSTS_FAILED} (type :retry to try again)\n");
    }

    let mut out = String::new();
    let _ = writeln!(out, "{} post(s) matching \"{}\"", result.len(), result.term);
    for post in &result.rows {
        let _ = writeln!(out, "  {}", post.pretty_title());
    }
    out
}

pub fn comments(post_id: u64, comments: &[Comment]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} comment(s) on post {}", comments.len(), post_id);
    for comment in comments {
        let _ = writeln!(out, "  {} <{}>", comment.name, comment.pretty_email());
        let _ = writeln!(out, "    {}", comment.body.replace('\n', " "));
    }
    out
}

pub fn kpis(snapshot: &KpiSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "network calls:    {}", snapshot.network_calls);
    let _ = writeln!(out, "pending requests: {}", snapshot.pending_requests);
    let _ = writeln!(out, "rendered items:   {}", snapshot.render_items);
    let _ = writeln!(out, "result emissions: {}", snapshot.result_emissions);
    if let Some(ms) = snapshot.startup_ms {
        let _ = writeln!(out, "startup:          {ms:.2} ms");
    }
    for (label, timing) in &snapshot.timings {
        let _ = writeln!(
            out,
            "{label}: {} sample(s), avg {:.2} ms, max {:.2} ms",
            timing.samples,
            timing.average_ms(),
            timing.max_ms
        );
    }
    out
}
