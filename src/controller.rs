//! Scan session lifecycle.
//!
//! The controller owns one storage handle and drives at most one walk at a
//! time through the `Idle → Scanning ⇄ Paused → terminal` state machine.
//! Terminal states (`Completed`, `Cancelled`, `Failed`) behave like `Idle`
//! for the next `start()`.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::exclude::ExclusionMatcher;
use crate::metrics::Metrics;
use crate::refresh::RefreshScheduler;
use crate::scanner::sink::NodeSink;
use crate::scanner::{self, WalkContext};
use crate::types::{ScanEvent, ScanStats, StatsInner};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl ScanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanState::Idle => "idle",
            ScanState::Scanning => "scanning",
            ScanState::Paused => "paused",
            ScanState::Completed => "completed",
            ScanState::Cancelled => "cancelled",
            ScanState::Failed => "failed",
        }
    }

    /// A new session may start from here.
    fn accepts_start(&self) -> bool {
        !matches!(self, ScanState::Scanning | ScanState::Paused)
    }
}

pub struct ScanController {
    sink: Arc<dyn NodeSink>,
    config: Arc<EngineConfig>,
    matcher: ExclusionMatcher,
    metrics: Metrics,
    stats: Arc<StatsInner>,
    state: Mutex<ScanState>,
    cancel: Mutex<CancellationToken>,
    pause_tx: watch::Sender<bool>,
    events: broadcast::Sender<ScanEvent>,
    refresh: Arc<RefreshScheduler>,
}

impl ScanController {
    pub fn new(
        sink: Arc<dyn NodeSink>,
        config: Arc<EngineConfig>,
        matcher: ExclusionMatcher,
        metrics: Metrics,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (pause_tx, _) = watch::channel(false);
        let refresh = Arc::new(RefreshScheduler::new(config.refresh.clone()));
        Self {
            sink,
            matcher,
            metrics,
            stats: Arc::new(StatsInner::default()),
            state: Mutex::new(ScanState::Idle),
            cancel: Mutex::new(CancellationToken::new()),
            pause_tx,
            events,
            refresh,
            config,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// Sender half of the event channel, for handles that subscribe later.
    pub fn event_sender(&self) -> broadcast::Sender<ScanEvent> {
        self.events.clone()
    }

    pub fn state(&self) -> ScanState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> ScanStats {
        self.stats.snapshot()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// No progress for longer than the configured threshold. Informational;
    /// ending such a session is still the caller's explicit `cancel()`.
    pub fn possibly_stuck(&self) -> bool {
        self.state() == ScanState::Scanning
            && self
                .stats
                .possibly_stuck(Duration::from_millis(self.config.walker.stuck_threshold_ms))
    }

    /// Begins a new session over `root`. Rejects while a session is active;
    /// existing state is left untouched in that case.
    pub async fn start(self: &Arc<Self>, root: PathBuf) -> EngineResult<Uuid> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.accepts_start() {
                return Err(EngineError::AlreadyRunning);
            }
            *state = ScanState::Scanning;
        }

        self.stats.reset();
        let _ = self.pause_tx.send(false);
        let cancel = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = cancel.clone();

        if let Err(e) = self.sink.reset().await {
            self.finish_state(ScanState::Failed);
            return Err(e);
        }

        let session_id = Uuid::new_v4();
        info!(%session_id, root = %root.display(), "scan session starting");
        self.metrics.inc_sessions_started();
        let _ = self.events.send(ScanEvent::Started {
            session_id,
            root: root.display().to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
        });

        let ctx = Arc::new(WalkContext::new(
            Arc::clone(&self.sink),
            self.matcher.clone(),
            Arc::clone(&self.stats),
            cancel,
            self.pause_tx.subscribe(),
            self.events.clone(),
            Arc::clone(&self.refresh),
            self.config.walker.clone(),
        ));
        self.refresh.start();

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller.drive(root, ctx).await;
        });
        Ok(session_id)
    }

    async fn drive(self: Arc<Self>, root: PathBuf, ctx: Arc<WalkContext>) {
        let walked = scanner::walk(&root, ctx).await;
        self.refresh.cancel();

        let cancelled = match walked {
            Ok(_) => false,
            Err(e) if e.is_cancelled() => true,
            Err(e) => {
                self.fail(e);
                return;
            }
        };
        if cancelled {
            self.stats.cancelled.store(true, Ordering::Relaxed);
        }
        self.stats.paused.store(false, Ordering::Relaxed);
        let stats = self.stats.snapshot();
        match self.sink.finish(&stats).await {
            Ok(outcome) => {
                self.metrics.record_session(&stats);
                if cancelled {
                    self.metrics.inc_sessions_cancelled();
                    info!(files = stats.file_count, dirs = stats.dir_count, "scan cancelled");
                } else {
                    self.metrics.inc_sessions_completed();
                    info!(files = stats.file_count, dirs = stats.dir_count,
                        bytes = stats.total_size, errors = stats.error_count, "scan complete");
                }
                let _ = self.events.send(ScanEvent::Complete {
                    tree: outcome.tree,
                    root_node_id: outcome.root_node_id,
                    stats,
                });
                self.finish_state(if cancelled {
                    ScanState::Cancelled
                } else {
                    ScanState::Completed
                });
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&self, e: EngineError) {
        error!(error = %e, "scan session failed");
        self.metrics.inc_sessions_failed();
        let _ = self.events.send(ScanEvent::Error { message: e.to_string() });
        self.finish_state(ScanState::Failed);
    }

    fn finish_state(&self, terminal: ScanState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = terminal;
    }

    /// Suspends the walk at the next checkpoint of every branch.
    pub fn pause(&self) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != ScanState::Scanning {
            return Err(EngineError::InvalidTransition { op: "pause", state: state.as_str() });
        }
        *state = ScanState::Paused;
        self.stats.paused.store(true, Ordering::Relaxed);
        let _ = self.pause_tx.send(true);
        info!("scan paused");
        Ok(())
    }

    /// Releases every branch parked on the pause checkpoint.
    pub fn resume(&self) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != ScanState::Paused {
            return Err(EngineError::InvalidTransition { op: "resume", state: state.as_str() });
        }
        *state = ScanState::Scanning;
        self.stats.paused.store(false, Ordering::Relaxed);
        let _ = self.pause_tx.send(false);
        info!("scan resumed");
        Ok(())
    }

    /// Requests termination; branches stop at their next checkpoint and
    /// accumulated counts are preserved. A paused session is unparked so its
    /// branches can observe the cancellation and unwind.
    pub fn cancel(&self) -> EngineResult<()> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !matches!(*state, ScanState::Scanning | ScanState::Paused) {
            return Err(EngineError::InvalidTransition { op: "cancel", state: state.as_str() });
        }
        drop(state);
        // Token first, then unpause: woken branches must already see the
        // cancellation when the checkpoint re-checks it.
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner).cancel();
        self.stats.paused.store(false, Ordering::Relaxed);
        let _ = self.pause_tx.send(false);
        info!("scan cancellation requested");
        Ok(())
    }
}
