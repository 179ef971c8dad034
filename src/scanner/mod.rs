//! Recursive directory traversal.
//!
//! One walker serves both storage variants through the [`sink::NodeSink`]
//! trait. Traversal is asynchronous with bounded sibling fan-out, never
//! follows symlinks, deduplicates hardlinks by `(device, inode)` identity
//! and checkpoints for pause/cancel before every unit of work.

pub mod sink;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::fs;
use tokio::sync::{broadcast, watch, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::WalkerConfig;
use crate::error::{EngineError, EngineResult};
use crate::exclude::ExclusionMatcher;
use crate::refresh::RefreshScheduler;
use crate::types::{ScanEvent, StatsInner};
use sink::NodeSink;

/// `(device, inode)` identity of an on-disk object; the scan-scoped seen-set
/// over these keys is what keeps hardlinked files from being counted twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InodeKey {
    pub device: u64,
    pub inode: u64,
}

#[cfg(unix)]
fn inode_key(md: &std::fs::Metadata) -> Option<InodeKey> {
    use std::os::unix::fs::MetadataExt;
    Some(InodeKey { device: md.dev(), inode: md.ino() })
}

#[cfg(not(unix))]
fn inode_key(_md: &std::fs::Metadata) -> Option<InodeKey> {
    // No stable inode identity to dedup on; every sighting counts.
    None
}

/// Everything one walk shares across its branches.
pub struct WalkContext {
    sink: Arc<dyn NodeSink>,
    matcher: ExclusionMatcher,
    stats: Arc<StatsInner>,
    cancel: CancellationToken,
    pause: watch::Receiver<bool>,
    events: broadcast::Sender<ScanEvent>,
    refresh: Arc<RefreshScheduler>,
    cfg: WalkerConfig,
    fanout: Arc<Semaphore>,
    seen: Mutex<HashSet<InodeKey>>,
    visited: AtomicU64,
}

impl WalkContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sink: Arc<dyn NodeSink>,
        matcher: ExclusionMatcher,
        stats: Arc<StatsInner>,
        cancel: CancellationToken,
        pause: watch::Receiver<bool>,
        events: broadcast::Sender<ScanEvent>,
        refresh: Arc<RefreshScheduler>,
        cfg: WalkerConfig,
    ) -> Self {
        let fanout = Arc::new(Semaphore::new(cfg.dir_concurrency.max(1)));
        Self {
            sink,
            matcher,
            stats,
            cancel,
            pause,
            events,
            refresh,
            cfg,
            fanout,
            seen: Mutex::new(HashSet::new()),
            visited: AtomicU64::new(0),
        }
    }

    /// Pause/cancel checkpoint. A paused branch parks here until `resume()`
    /// flips the latch; cancellation wins over everything.
    pub async fn checkpoint(&self) -> EngineResult<()> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if *self.pause.borrow() {
            let mut rx = self.pause.clone();
            let _ = rx.wait_for(|paused| !*paused).await;
            if self.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
        }
        Ok(())
    }

    /// True on first sight of this inode in the session.
    fn first_sight(&self, key: InodeKey) -> bool {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).insert(key)
    }

    fn record_access_error(&self, path: &Path, err: &std::io::Error, what: &str) {
        self.stats.error_count.fetch_add(1, Ordering::Relaxed);
        warn!(path = %path.display(), error = %err, "{}", what);
    }

    /// Progress/refresh/yield bookkeeping, once per visited entry.
    async fn tick(&self, path: &Path) {
        let visited = self.visited.fetch_add(1, Ordering::Relaxed) + 1;
        if visited % self.cfg.progress_interval == 0 {
            self.stats.touch_progress();
            let snapshot = self.stats.snapshot();
            let _ = self.events.send(ScanEvent::Progress {
                dir: path.parent().map(|p| p.display().to_string()).unwrap_or_default(),
                name: file_name_of(path),
                size: snapshot.total_size,
                file_count: snapshot.file_count,
                dir_count: snapshot.dir_count,
                error_count: snapshot.error_count,
            });
        }
        if self.refresh.check() {
            let tree = self.sink.preview().await;
            let _ = self.events.send(ScanEvent::Refresh { tree });
        }
        if visited % self.cfg.yield_interval == 0 {
            tokio::task::yield_now().await;
        }
    }
}

/// Walks the whole subtree under `root` into the sink, returning the root's
/// node id. Completes when every branch has been visited or cancellation
/// unwound them all.
pub async fn walk(root: &Path, ctx: Arc<WalkContext>) -> EngineResult<i64> {
    if ctx.matcher.is_excluded(root) {
        return Err(EngineError::ExcludedRoot(root.display().to_string()));
    }
    ctx.checkpoint().await?;
    let md = fs::symlink_metadata(root)
        .await
        .map_err(|e| EngineError::RootUnreadable { path: root.display().to_string(), source: e })?;
    if !md.is_dir() {
        // Single-file scanning is a distinct mode this engine does not offer.
        return Err(EngineError::NotADirectory(root.display().to_string()));
    }
    if let Some(key) = inode_key(&md) {
        ctx.first_sight(key);
    }
    ctx.stats.dir_count.fetch_add(1, Ordering::Relaxed);
    let name = file_name_of(root);
    let root_id = ctx.sink.insert(None, &name, 0, true, 0).await?;
    walk_dir(root.to_path_buf(), root_id, 0, ctx).await?;
    Ok(root_id)
}

fn walk_dir(
    dir: PathBuf,
    dir_id: i64,
    depth: u32,
    ctx: Arc<WalkContext>,
) -> BoxFuture<'static, EngineResult<()>> {
    async move {
        let mut rd = match fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) => {
                ctx.record_access_error(&dir, &e, "read_dir failed");
                return Ok(());
            }
        };

        let mut subdirs: Vec<PathBuf> = Vec::new();
        let mut deferred: Vec<PathBuf> = Vec::new();
        loop {
            ctx.checkpoint().await?;
            let entry = match rd.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    ctx.record_access_error(&dir, &e, "directory entry unreadable");
                    break;
                }
            };
            let path = entry.path();
            // checked before any stat on the candidate
            if ctx.matcher.is_excluded(&path) {
                continue;
            }
            match entry.file_type().await {
                Ok(ft) if ft.is_dir() => subdirs.push(path),
                Ok(ft) if ft.is_file() => visit_file(&path, dir_id, depth + 1, &ctx).await,
                Ok(ft) if ft.is_symlink() => {} // never followed
                Ok(_) => deferred.push(path),
                Err(e) => ctx.record_access_error(&path, &e, "file_type failed"),
            }
        }

        // dirents of unknown/other type are resolved one at a time
        for path in deferred {
            ctx.checkpoint().await?;
            visit_unknown(path, dir_id, depth, &ctx).await?;
        }

        // Sibling subdirectories descend with bounded fan-out. When the
        // semaphore is saturated the branch recurses inline instead of
        // waiting, so permit holders can never starve each other.
        let mut tasks: JoinSet<EngineResult<()>> = JoinSet::new();
        let mut first_err: Option<EngineError> = None;
        for path in subdirs {
            if let Err(e) = ctx.checkpoint().await {
                first_err = Some(e);
                break;
            }
            match Arc::clone(&ctx.fanout).try_acquire_owned() {
                Ok(permit) => {
                    let child_ctx = Arc::clone(&ctx);
                    tasks.spawn(async move {
                        let _permit = permit;
                        visit_dir(path, dir_id, depth, child_ctx).await
                    });
                }
                Err(_) => {
                    if let Err(e) = visit_dir(path, dir_id, depth, Arc::clone(&ctx)).await {
                        first_err = Some(e);
                        break;
                    }
                }
            }
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                Err(e) if e.is_panic() => {
                    if first_err.is_none() {
                        first_err = Some(EngineError::Panicked(e.to_string()));
                    }
                }
                Err(_) => {}
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
    .boxed()
}

/// One subdirectory: lstat, dedup, record, descend.
async fn visit_dir(
    path: PathBuf,
    parent_id: i64,
    parent_depth: u32,
    ctx: Arc<WalkContext>,
) -> EngineResult<()> {
    ctx.checkpoint().await?;
    let md = match fs::symlink_metadata(&path).await {
        Ok(md) => md,
        Err(e) => {
            ctx.record_access_error(&path, &e, "stat failed");
            return Ok(());
        }
    };
    if !md.is_dir() {
        // vanished or replaced since readdir
        return Ok(());
    }
    let depth = parent_depth + 1;
    let first_sight = match inode_key(&md) {
        Some(key) => ctx.first_sight(key),
        None => true,
    };
    ctx.stats.dir_count.fetch_add(1, Ordering::Relaxed);
    let name = file_name_of(&path);
    let id = match ctx.sink.insert(Some(parent_id), &name, 0, true, depth).await {
        Ok(id) => id,
        Err(e) => {
            ctx.stats.error_count.fetch_add(1, Ordering::Relaxed);
            warn!(path = %path.display(), error = %e, "failed to record directory node");
            return Ok(());
        }
    };
    ctx.tick(&path).await;
    if !first_sight {
        // subtree already counted through another path (bind mount or link)
        return Ok(());
    }
    walk_dir(path, id, depth, ctx).await
}

/// One regular-file candidate; all errors stay local to the entry.
async fn visit_file(path: &Path, parent_id: i64, depth: u32, ctx: &WalkContext) {
    let md = match fs::symlink_metadata(path).await {
        Ok(md) => md,
        Err(e) => {
            ctx.record_access_error(path, &e, "stat failed");
            return;
        }
    };
    if !md.is_file() {
        // sockets, FIFOs, devices, or a racing replacement: no size, no count
        return;
    }
    record_regular_file(path, &md, parent_id, depth, ctx).await;
}

async fn record_regular_file(
    path: &Path,
    md: &std::fs::Metadata,
    parent_id: i64,
    depth: u32,
    ctx: &WalkContext,
) {
    // a hardlink seen through another path contributes zero bytes
    let size = match inode_key(md) {
        Some(key) if !ctx.first_sight(key) => 0,
        _ => md.len(),
    };
    ctx.stats.file_count.fetch_add(1, Ordering::Relaxed);
    ctx.stats.total_size.fetch_add(size, Ordering::Relaxed);
    let name = file_name_of(path);
    if let Err(e) = ctx.sink.insert(Some(parent_id), &name, size, false, depth).await {
        ctx.stats.error_count.fetch_add(1, Ordering::Relaxed);
        warn!(path = %path.display(), error = %e, "failed to record file node");
    }
    ctx.tick(path).await;
}

/// Fallback for dirent types the readdir pass could not classify.
async fn visit_unknown(
    path: PathBuf,
    parent_id: i64,
    parent_depth: u32,
    ctx: &Arc<WalkContext>,
) -> EngineResult<()> {
    let md = match fs::symlink_metadata(&path).await {
        Ok(md) => md,
        Err(e) => {
            ctx.record_access_error(&path, &e, "stat failed");
            return Ok(());
        }
    };
    if md.is_file() {
        record_regular_file(&path, &md, parent_id, parent_depth + 1, ctx).await;
        Ok(())
    } else if md.is_dir() {
        visit_dir(path, parent_id, parent_depth, Arc::clone(ctx)).await
    } else {
        Ok(())
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
