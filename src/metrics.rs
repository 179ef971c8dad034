use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Process-lifetime counters across scan sessions
#[derive(Clone)]
pub struct Metrics {
    pub sessions_started: Arc<AtomicUsize>,
    pub sessions_completed: Arc<AtomicUsize>,
    pub sessions_cancelled: Arc<AtomicUsize>,
    pub sessions_failed: Arc<AtomicUsize>,
    pub files_processed: Arc<AtomicU64>,
    pub dirs_processed: Arc<AtomicU64>,
    pub bytes_scanned: Arc<AtomicU64>,
    pub access_errors: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            sessions_started: Arc::new(AtomicUsize::new(0)),
            sessions_completed: Arc::new(AtomicUsize::new(0)),
            sessions_cancelled: Arc::new(AtomicUsize::new(0)),
            sessions_failed: Arc::new(AtomicUsize::new(0)),
            files_processed: Arc::new(AtomicU64::new(0)),
            dirs_processed: Arc::new(AtomicU64::new(0)),
            bytes_scanned: Arc::new(AtomicU64::new(0)),
            access_errors: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_sessions_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sessions_completed(&self) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sessions_cancelled(&self) {
        self.sessions_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sessions_failed(&self) {
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session(&self, stats: &crate::types::ScanStats) {
        self.files_processed.fetch_add(stats.file_count, Ordering::Relaxed);
        self.dirs_processed.fetch_add(stats.dir_count, Ordering::Relaxed);
        self.bytes_scanned.fetch_add(stats.total_size, Ordering::Relaxed);
        self.access_errors.fetch_add(stats.error_count, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            sessions_cancelled: self.sessions_cancelled.load(Ordering::Relaxed),
            sessions_failed: self.sessions_failed.load(Ordering::Relaxed),
            files_processed: self.files_processed.load(Ordering::Relaxed),
            dirs_processed: self.dirs_processed.load(Ordering::Relaxed),
            bytes_scanned: self.bytes_scanned.load(Ordering::Relaxed),
            access_errors: self.access_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub sessions_started: usize,
    pub sessions_completed: usize,
    pub sessions_cancelled: usize,
    pub sessions_failed: usize,
    pub files_processed: u64,
    pub dirs_processed: u64,
    pub bytes_scanned: u64,
    pub access_errors: u64,
    pub uptime_seconds: u64,
}
