//! Message-passing front for a scan session.
//!
//! The whole engine can be hosted off the caller's task stream: a dedicated
//! actor owns the controller (and, for the persistent variant, the store
//! pool), requests go in over a typed mpsc channel and events come back over
//! the controller's broadcast channel. No shared mutable state crosses the
//! boundary.

use std::path::PathBuf;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;
use uuid::Uuid;

use crate::controller::{ScanController, ScanState};
use crate::error::EngineResult;
use crate::store::subtree::{self, SubtreeNode};
use crate::types::{ScanEvent, ScanStats};

pub enum SessionRequest {
    Start { root: PathBuf, reply: oneshot::Sender<EngineResult<Uuid>> },
    Pause { reply: oneshot::Sender<EngineResult<()>> },
    Resume { reply: oneshot::Sender<EngineResult<()>> },
    Cancel { reply: oneshot::Sender<EngineResult<()>> },
    Stats { reply: oneshot::Sender<ScanStats> },
    State { reply: oneshot::Sender<ScanState> },
    PossiblyStuck { reply: oneshot::Sender<bool> },
    Subtree { node_id: i64, max_depth: u32, reply: oneshot::Sender<EngineResult<Option<SubtreeNode>>> },
    Shutdown,
}

/// Cloneable handle to the session actor. Dropping every handle shuts the
/// actor down once its mailbox drains.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionRequest>,
    events: broadcast::Sender<ScanEvent>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// Event channel as a `Stream`, for consumers that poll instead of recv.
    pub fn events(&self) -> BroadcastStream<ScanEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    /// Stops the actor after the current request. Outstanding handles keep
    /// working only for the already-queued messages.
    pub async fn shutdown(&self) {
        self.send(SessionRequest::Shutdown).await;
    }

    pub async fn start(&self, root: PathBuf) -> EngineResult<Uuid> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionRequest::Start { root, reply }).await;
        rx.await.unwrap_or(Err(crate::error::EngineError::Cancelled))
    }

    pub async fn pause(&self) -> EngineResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionRequest::Pause { reply }).await;
        rx.await.unwrap_or(Err(crate::error::EngineError::Cancelled))
    }

    pub async fn resume(&self) -> EngineResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionRequest::Resume { reply }).await;
        rx.await.unwrap_or(Err(crate::error::EngineError::Cancelled))
    }

    pub async fn cancel(&self) -> EngineResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionRequest::Cancel { reply }).await;
        rx.await.unwrap_or(Err(crate::error::EngineError::Cancelled))
    }

    pub async fn stats(&self) -> ScanStats {
        let (reply, rx) = oneshot::channel();
        self.send(SessionRequest::Stats { reply }).await;
        rx.await.unwrap_or_default()
    }

    pub async fn state(&self) -> ScanState {
        let (reply, rx) = oneshot::channel();
        self.send(SessionRequest::State { reply }).await;
        rx.await.unwrap_or(ScanState::Idle)
    }

    pub async fn possibly_stuck(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        self.send(SessionRequest::PossiblyStuck { reply }).await;
        rx.await.unwrap_or(false)
    }

    /// Persistent variant only; the in-memory session answers `None`.
    pub async fn get_subtree(
        &self,
        node_id: i64,
        max_depth: u32,
    ) -> EngineResult<Option<SubtreeNode>> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionRequest::Subtree { node_id, max_depth, reply }).await;
        rx.await.unwrap_or(Ok(None))
    }

    async fn send(&self, req: SessionRequest) {
        let _ = self.tx.send(req).await;
    }
}

/// Spawns the session actor. `pool` is the store pool for subtree queries,
/// `None` for the in-memory variant.
pub fn spawn(controller: Arc<ScanController>, pool: Option<SqlitePool>) -> SessionHandle {
    let (tx, mut rx) = mpsc::channel::<SessionRequest>(64);
    let events = controller.event_sender();
    tokio::spawn(async move {
        while let Some(req) = rx.recv().await {
            match req {
                SessionRequest::Start { root, reply } => {
                    let _ = reply.send(controller.start(root).await);
                }
                SessionRequest::Pause { reply } => {
                    let _ = reply.send(controller.pause());
                }
                SessionRequest::Resume { reply } => {
                    let _ = reply.send(controller.resume());
                }
                SessionRequest::Cancel { reply } => {
                    let _ = reply.send(controller.cancel());
                }
                SessionRequest::Stats { reply } => {
                    let _ = reply.send(controller.stats());
                }
                SessionRequest::State { reply } => {
                    let _ = reply.send(controller.state());
                }
                SessionRequest::PossiblyStuck { reply } => {
                    let _ = reply.send(controller.possibly_stuck());
                }
                SessionRequest::Subtree { node_id, max_depth, reply } => {
                    let result = match &pool {
                        Some(pool) => subtree::get_subtree(pool, node_id, max_depth).await,
                        None => Ok(None),
                    };
                    let _ = reply.send(result);
                }
                SessionRequest::Shutdown => break,
            }
        }
        debug!("session actor shut down");
    });
    SessionHandle { tx, events }
}
