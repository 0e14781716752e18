use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Process-wide counters, shared as `Arc<Metrics>` by the pipeline and the
/// worker pool. Relaxed ordering throughout: these are observability counters,
/// not synchronization points.
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_received: AtomicU64,
    jobs_succeeded: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_in_flight: AtomicI64,
    extractions_performed: AtomicU64,
    extraction_cache_hits: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub jobs_received: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_in_flight: i64,
    pub extractions_performed: u64,
    pub extraction_cache_hits: u64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_received(&self) {
        self.jobs_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_succeeded(&self) {
        self.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_in_flight(&self) {
        self.jobs_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_in_flight(&self) {
        self.jobs_in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn inc_extractions(&self) {
        self.extractions_performed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_hits(&self) {
        self.extraction_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_received: self.jobs_received.load(Ordering::Relaxed),
            jobs_succeeded: self.jobs_succeeded.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_in_flight: self.jobs_in_flight.load(Ordering::Relaxed),
            extractions_performed: self.extractions_performed.load(Ordering::Relaxed),
            extraction_cache_hits: self.extraction_cache_hits.load(Ordering::Relaxed),
        }
    }

    pub fn log_summary(&self) {
        let s = self.snapshot();
        tracing::info!(
            "📊 Jobs: {} received, {} succeeded, {} failed, {} in flight | Extractions: {} performed, {} cache hits",
            s.jobs_received,
            s.jobs_succeeded,
            s.jobs_failed,
            s.jobs_in_flight,
            s.extractions_performed,
            s.extraction_cache_hits
        );
    }
}
