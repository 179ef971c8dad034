use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Nested tree produced by the in-memory sink and by refresh previews.
///
/// A node with `children` is a directory, one without is a file. Each node is
/// exclusively owned by its parent's `children` vector; the root belongs to
/// the active scan session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

/// Read-only snapshot of one scan session's counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScanStats {
    pub file_count: u64,
    pub dir_count: u64,
    pub error_count: u64,
    pub total_size: u64,
    pub cancelled: bool,
    pub paused: bool,
}

/// Live counters behind a snapshot. Mutated only by the owning controller
/// and its walker branches; everything else reads snapshots.
#[derive(Debug, Default)]
pub struct StatsInner {
    pub file_count: AtomicU64,
    pub dir_count: AtomicU64,
    pub error_count: AtomicU64,
    pub total_size: AtomicU64,
    pub cancelled: AtomicBool,
    pub paused: AtomicBool,
    /// Unix millis of the last emitted progress event; 0 before the first one.
    pub last_progress_ms: AtomicU64,
}

impl StatsInner {
    pub fn snapshot(&self) -> ScanStats {
        ScanStats {
            file_count: self.file_count.load(Ordering::Relaxed),
            dir_count: self.dir_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            total_size: self.total_size.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            paused: self.paused.load(Ordering::Relaxed),
        }
    }

    /// Resets all counters for a fresh session.
    pub fn reset(&self) {
        self.file_count.store(0, Ordering::Relaxed);
        self.dir_count.store(0, Ordering::Relaxed);
        self.error_count.store(0, Ordering::Relaxed);
        self.total_size.store(0, Ordering::Relaxed);
        self.cancelled.store(false, Ordering::Relaxed);
        self.paused.store(false, Ordering::Relaxed);
        self.last_progress_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn touch_progress(&self) {
        self.last_progress_ms.store(now_ms(), Ordering::Relaxed);
    }

    /// Derived flag: no progress for longer than `threshold`. A caller must
    /// still cancel explicitly; no timeout-based auto-cancellation exists.
    pub fn possibly_stuck(&self, threshold: Duration) -> bool {
        let last = self.last_progress_ms.load(Ordering::Relaxed);
        if last == 0 {
            return false;
        }
        now_ms().saturating_sub(last) > threshold.as_millis() as u64
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// What a sink hands back once its post-walk phase is done. The in-memory
/// variant yields the finished tree; the persistent variant yields the root
/// node id to query the store with.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub tree: Option<TreeNode>,
    pub root_node_id: Option<i64>,
}

/// Events emitted by a scan session, in broadcast order. Progress counters
/// are monotonically increasing across events; a `Refresh` preview is a
/// best-effort approximation of work completed so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    Started {
        session_id: Uuid,
        root: String,
        started_at: String,
    },
    Progress {
        dir: String,
        name: String,
        size: u64,
        file_count: u64,
        dir_count: u64,
        error_count: u64,
    },
    /// `tree` is `None` for the persistent variant: re-query the store.
    Refresh {
        #[serde(skip_serializing_if = "Option::is_none")]
        tree: Option<TreeNode>,
    },
    Complete {
        #[serde(skip_serializing_if = "Option::is_none")]
        tree: Option<TreeNode>,
        #[serde(skip_serializing_if = "Option::is_none")]
        root_node_id: Option<i64>,
        stats: ScanStats,
    },
    Error {
        message: String,
    },
}
