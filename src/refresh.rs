use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use crate::config::RefreshConfig;

/// Generic exponential-backoff task trigger, decoupled from scanning.
///
/// `check()` is probed from the walker's progress path; it fires at most once
/// per due interval and reschedules itself at `interval * multiplier`, capped
/// at `max_ms`. The cadence starts frequent and backs off as a scan runs
/// longer, so previews stay cheap on very large trees while small ones get
/// early feedback. The caller runs the refresh task whenever `check()`
/// returns true.
#[derive(Debug)]
pub struct RefreshScheduler {
    cfg: RefreshConfig,
    epoch: Instant,
    running: AtomicBool,
    interval_ms: AtomicU64,
    due_at_ms: AtomicU64,
}

impl RefreshScheduler {
    pub fn new(cfg: RefreshConfig) -> Self {
        Self {
            epoch: Instant::now(),
            running: AtomicBool::new(false),
            interval_ms: AtomicU64::new(cfg.initial_ms),
            due_at_ms: AtomicU64::new(0),
            cfg,
        }
    }

    /// Arms the trigger at the configured initial interval.
    pub fn start(&self) {
        self.schedule(self.cfg.initial_ms);
    }

    pub fn schedule(&self, interval_ms: u64) {
        let interval_ms = interval_ms.max(1);
        self.interval_ms.store(interval_ms, Ordering::Relaxed);
        self.due_at_ms.store(self.now_ms() + interval_ms, Ordering::Relaxed);
        self.running.store(true, Ordering::Release);
    }

    pub fn cancel(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Hot-path probe. At most one caller wins per expiry; the winner gets
    /// `true` and the trigger is rescheduled with backoff applied.
    pub fn check(&self) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        let now = self.now_ms();
        let due = self.due_at_ms.load(Ordering::Relaxed);
        if now < due {
            return false;
        }
        let current = self.interval_ms.load(Ordering::Relaxed);
        let next = ((current as f64 * self.cfg.multiplier) as u64).clamp(1, self.cfg.max_ms);
        if self
            .due_at_ms
            .compare_exchange(due, now + next, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            // another branch won this expiry
            return false;
        }
        self.interval_ms.store(next, Ordering::Relaxed);
        true
    }

    /// Current interval, exposed for cadence assertions.
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms.load(Ordering::Relaxed)
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}
