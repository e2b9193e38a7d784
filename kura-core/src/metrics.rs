//! # Metrics and Monitoring
//!
//! Lock-free metrics collection for the RPC surface and the storage engine,
//! with a Prometheus text-format encoder for the `/metrics` endpoint.
//!
//! Two metric families are mandated by the service contract:
//! - `requests_total{method,status}` counter
//! - `request_latency_seconds{method}` histogram
//!
//! Engine-level counters (WAL appends, flushes, quarantines, CDC drops) ride
//! along in the same registry.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// RPC methods tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Set,
    Get,
    Delete,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::Set, Method::Get, Method::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Set => "Set",
            Method::Get => "Get",
            Method::Delete => "Delete",
        }
    }

    fn idx(&self) -> usize {
        *self as usize
    }
}

/// Outcome label for `requests_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
    NotFound,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Success, Status::Error, Status::NotFound];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Error => "error",
            Status::NotFound => "not_found",
        }
    }

    fn idx(&self) -> usize {
        *self as usize
    }
}

/// Latency bucket boundaries in seconds.
const LATENCY_BUCKETS: [f64; 11] = [
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Metrics collector; cheap to clone and share.
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    // RPC metrics: [method][status]
    requests: [[AtomicU64; 3]; 3],
    latency: [Histogram; 3],

    // Storage metrics
    wal_appends: AtomicU64,
    wal_bytes: AtomicU64,
    memtable_flushes: AtomicU64,
    sstables_quarantined: AtomicU64,

    // CDC metrics
    cdc_published: AtomicU64,
    cdc_dropped: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished RPC.
    pub fn record_request(&self, method: Method, status: Status) {
        self.inner.requests[method.idx()][status.idx()].fetch_add(1, Ordering::Relaxed);
    }

    /// Record RPC latency in seconds.
    pub fn observe_latency(&self, method: Method, seconds: f64) {
        self.inner.latency[method.idx()].observe(seconds);
    }

    /// Record a durable WAL append.
    pub fn record_wal_append(&self, bytes: u64) {
        self.inner.wal_appends.fetch_add(1, Ordering::Relaxed);
        self.inner.wal_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a memtable flush to SSTable.
    pub fn record_flush(&self) {
        self.inner.memtable_flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a quarantined SSTable file.
    pub fn record_quarantine(&self) {
        self.inner.sstables_quarantined.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a change event handed to the sink.
    pub fn record_cdc_published(&self) {
        self.inner.cdc_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a change event dropped because the queue was full.
    pub fn record_cdc_dropped(&self) {
        self.inner.cdc_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Current value of `requests_total{method,status}` (used by tests).
    pub fn requests(&self, method: Method, status: Status) -> u64 {
        self.inner.requests[method.idx()][status.idx()].load(Ordering::Relaxed)
    }

    /// Current value of `cdc_events_dropped_total` (used by tests).
    pub fn cdc_dropped(&self) -> u64 {
        self.inner.cdc_dropped.load(Ordering::Relaxed)
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(4096);

        out.push_str("# HELP requests_total Total RPC requests by method and status.\n");
        out.push_str("# TYPE requests_total counter\n");
        for method in Method::ALL {
            for status in Status::ALL {
                let v = self.inner.requests[method.idx()][status.idx()].load(Ordering::Relaxed);
                let _ = writeln!(
                    out,
                    "requests_total{{method=\"{}\",status=\"{}\"}} {}",
                    method.as_str(),
                    status.as_str(),
                    v
                );
            }
        }

        out.push_str("# HELP request_latency_seconds RPC latency by method.\n");
        out.push_str("# TYPE request_latency_seconds histogram\n");
        for method in Method::ALL {
            self.inner.latency[method.idx()].render("request_latency_seconds", method.as_str(), &mut out);
        }

        let counters: [(&str, &str, &AtomicU64); 6] = [
            ("wal_appends_total", "Durable WAL appends.", &self.inner.wal_appends),
            ("wal_bytes_total", "Bytes appended to the WAL.", &self.inner.wal_bytes),
            (
                "memtable_flushes_total",
                "Memtable flushes to SSTable.",
                &self.inner.memtable_flushes,
            ),
            (
                "sstables_quarantined_total",
                "SSTable files quarantined at startup.",
                &self.inner.sstables_quarantined,
            ),
            (
                "cdc_events_published_total",
                "Change events handed to the CDC sink.",
                &self.inner.cdc_published,
            ),
            (
                "cdc_events_dropped_total",
                "Change events dropped on queue overflow.",
                &self.inner.cdc_dropped,
            ),
        ];
        for (name, help, counter) in counters {
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {}", counter.load(Ordering::Relaxed));
        }

        out
    }
}

/// Fixed-bucket latency histogram.
#[derive(Default)]
struct Histogram {
    // Per-bucket (non-cumulative) observation counts.
    buckets: [AtomicU64; LATENCY_BUCKETS.len()],
    overflow: AtomicU64,
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    fn observe(&self, seconds: f64) {
        self.sum_micros
            .fetch_add((seconds * 1_000_000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (boundary, bucket) in LATENCY_BUCKETS.iter().zip(&self.buckets) {
            if seconds <= *boundary {
                bucket.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        self.overflow.fetch_add(1, Ordering::Relaxed);
    }

    fn render(&self, name: &str, method: &str, out: &mut String) {
        let mut cumulative = 0u64;
        for (boundary, bucket) in LATENCY_BUCKETS.iter().zip(&self.buckets) {
            cumulative += bucket.load(Ordering::Relaxed);
            let _ = writeln!(
                out,
                "{name}_bucket{{method=\"{method}\",le=\"{boundary}\"}} {cumulative}"
            );
        }
        let count = self.count.load(Ordering::Relaxed);
        let _ = writeln!(out, "{name}_bucket{{method=\"{method}\",le=\"+Inf\"}} {count}");
        let sum = self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let _ = writeln!(out, "{name}_sum{{method=\"{method}\"}} {sum}");
        let _ = writeln!(out, "{name}_count{{method=\"{method}\"}} {count}");
    }
}
