//! Bottom-up directory size aggregation.

use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::error::EngineResult;

/// Rolls file sizes up into every directory row, deepest level first, inside
/// a single transaction.
///
/// Each level's UPDATE only reads its children, which the previous iteration
/// already finalized, so one pass per depth level suffices. Re-running the
/// pass on an already-aggregated table recomputes the same values; it is
/// safe to call twice.
pub async fn compute_directory_sizes(pool: &SqlitePool) -> EngineResult<()> {
    let row = sqlx::query("SELECT COALESCE(MAX(depth), 0) AS d FROM nodes WHERE is_dir = 1")
        .fetch_one(pool)
        .await?;
    let max_depth: i64 = row.get("d");

    let started = std::time::Instant::now();
    let mut tx = pool.begin().await?;
    let mut depth = max_depth;
    while depth >= 0 {
        let result = sqlx::query(
            r#"
            UPDATE nodes
            SET size = COALESCE(
                (SELECT SUM(c.size) FROM nodes c WHERE c.parent_id = nodes.id), 0)
            WHERE is_dir = 1 AND depth = ?
            "#,
        )
        .bind(depth)
        .execute(&mut *tx)
        .await?;
        debug!(depth, updated = result.rows_affected(), "aggregated directory level");
        depth -= 1;
    }
    tx.commit().await?;

    info!(levels = max_depth + 1, elapsed_ms = started.elapsed().as_millis() as u64,
        "directory sizes aggregated");
    Ok(())
}
