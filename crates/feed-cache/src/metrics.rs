//! Metrics sinks
//!
//! The cache and pipeline report coarse counters and timing samples through
//! [`MetricsSink`]. Recording is fire-and-forget and never fails the caller.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

/// Receiver of scalar counters and timings
pub trait MetricsSink: Send + Sync + 'static {
    /// A fetch was actually dispatched to the remote source
    fn record_network_call(&self);

    /// A dispatched fetch is now in flight
    fn record_fetch_started(&self);

    /// An in-flight fetch settled, successfully or not
    fn record_fetch_finished(&self);

    /// A filtered result with `n` rows was emitted
    fn record_result_size(&self, n: usize);

    fn record_timing_ms(&self, label: &str, ms: f64);
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_network_call(&self) {}
    fn record_fetch_started(&self) {}
    fn record_fetch_finished(&self) {}
    fn record_result_size(&self, _n: usize) {}
    fn record_timing_ms(&self, _label: &str, _ms: f64) {}
}

/// Sink that forwards every event to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn record_network_call(&self) {
        debug!(metric = "network_call", "Recorded metric");
    }

    fn record_fetch_started(&self) {
        debug!(metric = "fetch_started", "Recorded metric");
    }

    fn record_fetch_finished(&self) {
        debug!(metric = "fetch_finished", "Recorded metric");
    }

    fn record_result_size(&self, n: usize) {
        debug!(metric = "result_size", value = n, "Recorded metric");
    }

    fn record_timing_ms(&self, label: &str, ms: f64) {
        debug!(metric = "timing", label, ms, "Recorded metric");
    }
}

/// Aggregated samples for one timing label
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimingSummary {
    pub samples: u64,
    pub total_ms: f64,
    pub max_ms: f64,
}

impl TimingSummary {
    pub fn average_ms(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.total_ms / self.samples as f64
        }
    }

    fn add(&mut self, ms: f64) {
        self.samples += 1;
        self.total_ms += ms;
        if ms > self.max_ms {
            self.max_ms = ms;
        }
    }
}

/// Point-in-time copy of a [`KpiRecorder`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KpiSnapshot {
    pub network_calls: u64,
    /// Fetches currently in flight
    pub pending_requests: usize,
    /// Row count of the most recent emission
    pub render_items: usize,
    pub result_emissions: u64,
    pub startup_ms: Option<f64>,
    pub timings: BTreeMap<String, TimingSummary>,
}

/// In-memory KPI counters
#[derive(Debug, Default)]
pub struct KpiRecorder {
    network_calls: AtomicU64,
    pending_requests: AtomicUsize,
    render_items: AtomicUsize,
    result_emissions: AtomicU64,
    startup_ms: Mutex<Option<f64>>,
    timings: Mutex<BTreeMap<String, TimingSummary>>,
}

impl KpiRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn network_calls(&self) -> u64 {
        self.network_calls.load(Ordering::Relaxed)
    }

    pub fn result_emissions(&self) -> u64 {
        self.result_emissions.load(Ordering::Relaxed)
    }

    pub fn pending_requests(&self) -> usize {
        self.pending_requests.load(Ordering::Relaxed)
    }

    /// Time from process start until the front-end was ready
    pub fn set_startup_ms(&self, ms: f64) {
        *self.startup_ms.lock().unwrap_or_else(PoisonError::into_inner) = Some(ms);
    }

    /// Zero every counter and forget all timings.
    ///
    /// Fetches still in flight keep counting as pending.
    pub fn reset(&self) {
        self.network_calls.store(0, Ordering::Relaxed);
        self.render_items.store(0, Ordering::Relaxed);
        self.result_emissions.store(0, Ordering::Relaxed);
        *self.startup_ms.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.timings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn snapshot(&self) -> KpiSnapshot {
        let timings = self
            .timings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        KpiSnapshot {
            network_calls: self.network_calls(),
            pending_requests: self.pending_requests(),
            render_items: self.render_items.load(Ordering::Relaxed),
            result_emissions: self.result_emissions(),
            startup_ms: *self.startup_ms.lock().unwrap_or_else(PoisonError::into_inner),
            timings,
        }
    }
}

impl MetricsSink for KpiRecorder {
    fn record_network_call(&self) {
        self.network_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn record_fetch_started(&self) {
        self.pending_requests.fetch_add(1, Ordering::Relaxed);
    }

    fn record_fetch_finished(&self) {
        let _ = self
            .pending_requests
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    fn record_result_size(&self, n: usize) {
        self.render_items.store(n, Ordering::Relaxed);
        self.result_emissions.fetch_add(1, Ordering::Relaxed);
    }

    fn record_timing_ms(&self, label: &str, ms: f64) {
        self.timings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(label.to_string())
            .or_default()
            .add(ms);
    }
}
