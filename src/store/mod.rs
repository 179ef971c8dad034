//! Persistent node store on SQLite.
//!
//! Nodes stream in through the [`NodeSink`] trait and are buffered in memory,
//! then written in chunked bulk inserts inside one transaction per batch.
//! Indexes are created only after the bulk load, and directory sizes are
//! finalized by the aggregation pass in [`aggregate`].

pub mod aggregate;
pub mod subtree;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, error, info};

use crate::error::EngineResult;
use crate::scanner::sink::NodeSink;
use crate::types::{ScanOutcome, ScanStats, TreeNode};

/// SQLite limits one statement to 999 bound variables; six binds per row
/// keeps each INSERT at 166 rows.
const NODE_BINDS_PER_ROW: usize = 6;
const SQLITE_MAX_VARS: usize = 999;

struct PendingNode {
    id: i64,
    parent_id: Option<i64>,
    name: String,
    size: i64,
    is_dir: bool,
    depth: i64,
}

#[derive(Default)]
struct InsertBuffer {
    next_id: i64,
    rows: Vec<PendingNode>,
}

/// SQLite-backed sink for scans too large to hold as a nested tree.
///
/// Ids are assigned client-side from a session counter, so `insert` never
/// needs a database round-trip. A failed batch write is logged and dropped
/// rather than aborting the scan; only the final flush is load-bearing.
pub struct NodeStore {
    pool: SqlitePool,
    flush_threshold: usize,
    buf: tokio::sync::Mutex<InsertBuffer>,
    root_id: AtomicI64,
    dropped_batches: AtomicU64,
}

impl NodeStore {
    pub fn new(pool: SqlitePool, flush_threshold: usize) -> Self {
        Self {
            pool,
            flush_threshold: flush_threshold.max(1),
            buf: tokio::sync::Mutex::new(InsertBuffer { next_id: 1, rows: Vec::new() }),
            root_id: AtomicI64::new(0),
            dropped_batches: AtomicU64::new(0),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Batches that failed to flush and were discarded during this session.
    pub fn dropped_batches(&self) -> u64 {
        self.dropped_batches.load(Ordering::Relaxed)
    }

    /// Starts a fresh storage generation. The previous session's table and
    /// indexes are dropped wholesale; node ids never survive across sessions.
    async fn drop_and_recreate(&self) -> EngineResult<()> {
        sqlx::query("DROP INDEX IF EXISTS idx_nodes_parent").execute(&self.pool).await?;
        sqlx::query("DROP INDEX IF EXISTS idx_nodes_depth").execute(&self.pool).await?;
        sqlx::query("DROP TABLE IF EXISTS nodes").execute(&self.pool).await?;
        sqlx::query(
            r#"
            CREATE TABLE nodes (
                id INTEGER PRIMARY KEY,
                parent_id INTEGER,
                name TEXT NOT NULL,
                size INTEGER NOT NULL DEFAULT 0,
                is_dir INTEGER NOT NULL DEFAULT 0,
                depth INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Created after the bulk load so inserts never pay index maintenance.
    async fn build_indexes(&self) -> EngineResult<()> {
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_nodes_depth ON nodes(depth)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn flush_rows(&self, rows: Vec<PendingNode>) -> EngineResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let count = rows.len();
        let mut tx = self.pool.begin().await?;
        for chunk in rows.chunks(SQLITE_MAX_VARS / NODE_BINDS_PER_ROW) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT INTO nodes (id, parent_id, name, size, is_dir, depth) ");
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.id)
                    .push_bind(row.parent_id)
                    .push_bind(row.name.as_str())
                    .push_bind(row.size)
                    .push_bind(row.is_dir)
                    .push_bind(row.depth);
            });
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        debug!(rows = count, "flushed node batch");
        Ok(())
    }
}

#[async_trait]
impl NodeSink for NodeStore {
    async fn reset(&self) -> EngineResult<()> {
        self.drop_and_recreate().await?;
        let mut buf = self.buf.lock().await;
        buf.next_id = 1;
        buf.rows.clear();
        self.root_id.store(0, Ordering::Relaxed);
        self.dropped_batches.store(0, Ordering::Relaxed);
        Ok(())
    }

    async fn insert(
        &self,
        parent_id: Option<i64>,
        name: &str,
        size: u64,
        is_dir: bool,
        depth: u32,
    ) -> EngineResult<i64> {
        let mut buf = self.buf.lock().await;
        let id = buf.next_id;
        buf.next_id += 1;
        if parent_id.is_none() {
            self.root_id.store(id, Ordering::Relaxed);
        }
        buf.rows.push(PendingNode {
            id,
            parent_id,
            name: name.to_owned(),
            size: size as i64,
            is_dir,
            depth: depth as i64,
        });
        if buf.rows.len() >= self.flush_threshold {
            let rows = std::mem::take(&mut buf.rows);
            // The buffer lock is held across the flush so batches reach the
            // database in insertion order.
            if let Err(e) = self.flush_rows(rows).await {
                self.dropped_batches.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "node batch write failed, batch dropped");
            }
        }
        Ok(id)
    }

    async fn preview(&self) -> Option<TreeNode> {
        // No cheap in-memory snapshot; refresh consumers query the store.
        None
    }

    async fn finish(&self, stats: &ScanStats) -> EngineResult<ScanOutcome> {
        let rows = {
            let mut buf = self.buf.lock().await;
            std::mem::take(&mut buf.rows)
        };
        self.flush_rows(rows).await?;
        self.build_indexes().await?;
        if stats.cancelled {
            info!("scan cancelled, skipping size aggregation");
        } else {
            aggregate::compute_directory_sizes(&self.pool).await?;
        }
        let dropped = self.dropped_batches();
        if dropped > 0 {
            error!(dropped, "session finished with dropped node batches");
        }
        let root_id = self.root_id.load(Ordering::Relaxed);
        Ok(ScanOutcome {
            tree: None,
            root_node_id: (root_id > 0).then_some(root_id),
        })
    }
}
