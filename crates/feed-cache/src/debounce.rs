//! Debounce and de-duplication of search terms
//!
//! A term settles once no newer term has arrived for the quiet window. A
//! settled term equal to the previously settled one is suppressed.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    pending: Option<(String, Instant)>,
    last_settled: Option<String>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
            last_settled: None,
        }
    }

    /// A debouncer whose first settled value is `initial`, with no wait
    pub fn seeded(quiet: Duration, initial: impl Into<String>) -> Self {
        Self {
            last_settled: Some(initial.into()),
            ..Self::new(quiet)
        }
    }

    /// Record a new term, superseding any term that has not settled yet
    pub fn push(&mut self, term: impl Into<String>, now: Instant) {
        self.pending = Some((term.into(), now));
    }

    /// When the pending term settles, if there is one
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at + self.quiet)
    }

    /// Take the pending term if its quiet window has elapsed and it differs
    /// from the last settled term.
    pub fn settle(&mut self, now: Instant) -> Option<String> {
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }

        let (term, _) = self.pending.take()?;
        if self.last_settled.as_deref() == Some(term.as_str()) {
            return None;
        }

        self.last_settled = Some(term.clone());
        Some(term)
    }

    pub fn last_settled(&self) -> Option<&str> {
        self.last_settled.as_deref()
    }
}
