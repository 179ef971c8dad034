//! Bounded subtree views over the persistent store.
//!
//! Serves "this node plus descendants down to a relative depth" queries for
//! renderers paging through the tree. Works both after aggregation (stored
//! directory sizes are final) and mid-scan, where zero-size directories get
//! approximate sizes computed on the fly. Mid-scan reads run read-committed
//! against the walker's in-flight batches; results are previews, not
//! snapshots.

use std::collections::HashMap;

use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::error::EngineResult;

/// One node of a materialized subtree. `_nodeId` lets a caller drill further
/// down; `_parentNodeId` is set on the fetched root only, so the caller can
/// navigate one level up past the subtree boundary.
#[derive(Debug, Clone, Serialize)]
pub struct SubtreeNode {
    pub name: String,
    pub size: u64,
    #[serde(rename = "_nodeId")]
    pub node_id: i64,
    #[serde(rename = "_parentNodeId", skip_serializing_if = "Option::is_none")]
    pub parent_node_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<SubtreeNode>>,
}

struct FlatNode {
    id: i64,
    parent_id: Option<i64>,
    name: String,
    size: u64,
    is_dir: bool,
    rel_depth: u32,
}

/// Fetches `node_id` and its descendants down to `max_depth` relative levels.
/// Returns `None` when the node does not exist (e.g. a stale id from a
/// previous storage generation).
pub async fn get_subtree(
    pool: &SqlitePool,
    node_id: i64,
    max_depth: u32,
) -> EngineResult<Option<SubtreeNode>> {
    let root = sqlx::query("SELECT depth, parent_id FROM nodes WHERE id = ?")
        .bind(node_id)
        .fetch_optional(pool)
        .await?;
    let Some(root) = root else {
        return Ok(None);
    };
    let root_depth: i64 = root.get("depth");
    let root_parent: Option<i64> = root.get("parent_id");

    let rows = sqlx::query(
        r#"
        WITH RECURSIVE sub(id, parent_id, name, size, is_dir, depth) AS (
            SELECT id, parent_id, name, size, is_dir, depth FROM nodes WHERE id = ?
            UNION ALL
            SELECT n.id, n.parent_id, n.name, n.size, n.is_dir, n.depth
            FROM nodes n JOIN sub s ON n.parent_id = s.id
            WHERE n.depth <= ?
        )
        SELECT id, parent_id, name, size, is_dir, depth FROM sub ORDER BY depth, id
        "#,
    )
    .bind(node_id)
    .bind(root_depth + max_depth as i64)
    .fetch_all(pool)
    .await?;

    let mut flat: Vec<FlatNode> = Vec::with_capacity(rows.len());
    for row in rows {
        let depth: i64 = row.get("depth");
        let size: i64 = row.get("size");
        let is_dir: i64 = row.get("is_dir");
        flat.push(FlatNode {
            id: row.get("id"),
            parent_id: row.get("parent_id"),
            name: row.get("name"),
            size: size.max(0) as u64,
            is_dir: is_dir != 0,
            rel_depth: (depth - root_depth) as u32,
        });
    }

    resolve_pending_sizes(pool, &mut flat, max_depth).await?;
    Ok(Some(link(flat, root_parent)))
}

/// Mid-scan fallback for directories the aggregator has not touched yet.
///
/// Directories at the depth cutoff have no children in the slice, so each
/// gets its own recursive descendant-file sum. Shallower directories are
/// then rolled up bottom-up from the already-resolved slice, deepest level
/// first.
async fn resolve_pending_sizes(
    pool: &SqlitePool,
    flat: &mut [FlatNode],
    max_depth: u32,
) -> EngineResult<()> {
    if !flat.iter().any(|n| n.is_dir && n.size == 0) {
        return Ok(());
    }

    for node in flat.iter_mut() {
        if node.is_dir && node.size == 0 && node.rel_depth == max_depth {
            node.size = descendant_file_size(pool, node.id).await?;
        }
    }

    let mut child_sums: HashMap<i64, u64> = HashMap::new();
    for depth in (0..max_depth).rev() {
        child_sums.clear();
        for node in flat.iter() {
            if node.rel_depth == depth + 1 {
                if let Some(pid) = node.parent_id {
                    *child_sums.entry(pid).or_default() += node.size;
                }
            }
        }
        for node in flat.iter_mut() {
            if node.is_dir && node.size == 0 && node.rel_depth == depth {
                node.size = child_sums.get(&node.id).copied().unwrap_or(0);
            }
        }
    }
    Ok(())
}

/// Sum of all file sizes anywhere below (and including) `node_id`.
pub async fn descendant_file_size(pool: &SqlitePool, node_id: i64) -> EngineResult<u64> {
    let row = sqlx::query(
        r#"
        WITH RECURSIVE sub(id) AS (
            SELECT id FROM nodes WHERE id = ?
            UNION ALL
            SELECT n.id FROM nodes n JOIN sub s ON n.parent_id = s.id
        )
        SELECT COALESCE(SUM(n.size), 0) AS total
        FROM nodes n JOIN sub s ON n.id = s.id
        WHERE n.is_dir = 0
        "#,
    )
    .bind(node_id)
    .fetch_one(pool)
    .await?;
    let total: i64 = row.get("total");
    Ok(total.max(0) as u64)
}

/// Links the depth-sorted slice into a nested tree. Children always sort
/// after their parent, so a reverse sweep finalizes every child before its
/// parent collects it.
fn link(flat: Vec<FlatNode>, root_parent: Option<i64>) -> SubtreeNode {
    let n = flat.len();
    let mut index_of: HashMap<i64, usize> = HashMap::with_capacity(n);
    for (i, node) in flat.iter().enumerate() {
        index_of.insert(node.id, i);
    }

    let mut child_indexes: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, node) in flat.iter().enumerate().skip(1) {
        if let Some(&p) = node.parent_id.as_ref().and_then(|pid| index_of.get(pid)) {
            child_indexes[p].push(i);
        }
    }

    let mut built: Vec<Option<SubtreeNode>> = (0..n).map(|_| None).collect();
    for i in (0..n).rev() {
        let node = &flat[i];
        let children = if node.is_dir {
            Some(
                child_indexes[i]
                    .iter()
                    .filter_map(|&c| built[c].take())
                    .collect::<Vec<_>>(),
            )
        } else {
            None
        };
        built[i] = Some(SubtreeNode {
            name: node.name.clone(),
            size: node.size,
            node_id: node.id,
            parent_node_id: None,
            children,
        });
    }

    let mut root = built[0].take().unwrap_or(SubtreeNode {
        name: String::new(),
        size: 0,
        node_id: 0,
        parent_node_id: None,
        children: None,
    });
    root.parent_node_id = root_parent;
    root
}
