use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::types::{ScanOutcome, ScanStats, TreeNode};

/// Where the walker lands discovered nodes.
///
/// One implementation builds a nested tree in memory, the other streams rows
/// into the persistent SQLite store; the walker itself only ever talks to
/// this trait.
#[async_trait]
pub trait NodeSink: Send + Sync {
    /// Discards the previous session's storage generation. Called once at
    /// the start of every scan; no cross-session node identity survives it.
    async fn reset(&self) -> EngineResult<()>;

    /// Records one node and returns its session-unique, monotonically
    /// increasing id. The id is assigned by the sink itself, without a
    /// round-trip read. `parent_id = None` marks the root (depth 0).
    async fn insert(
        &self,
        parent_id: Option<i64>,
        name: &str,
        size: u64,
        is_dir: bool,
        depth: u32,
    ) -> EngineResult<i64>;

    /// Best-effort snapshot of the tree discovered so far. `None` means the
    /// sink has no cheap snapshot and the caller should re-query the store.
    async fn preview(&self) -> Option<TreeNode>;

    /// Post-walk phase: flush whatever is buffered, finalize directory sizes
    /// (skipped when the session was cancelled), hand back the result.
    async fn finish(&self, stats: &ScanStats) -> EngineResult<ScanOutcome>;
}

struct ArenaNode {
    name: String,
    size: u64,
    is_dir: bool,
    children: Vec<usize>,
}

#[derive(Default)]
struct Arena {
    nodes: Vec<ArenaNode>,
}

/// Builds the nested tree object directly in memory. The simple variant,
/// adequate for moderate trees; very large scans go through the persistent
/// store instead.
#[derive(Default)]
pub struct MemorySink {
    arena: Mutex<Arena>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn materialize(&self) -> Option<TreeNode> {
        let arena = self.arena.lock().unwrap_or_else(PoisonError::into_inner);
        let n = arena.nodes.len();
        if n == 0 {
            return None;
        }

        // Children are always inserted after their parent, so a reverse
        // index sweep finalizes every child before its parent reads it.
        let mut sizes = vec![0u64; n];
        for i in (0..n).rev() {
            let node = &arena.nodes[i];
            sizes[i] = if node.is_dir {
                node.children.iter().map(|&c| sizes[c]).sum()
            } else {
                node.size
            };
        }

        let mut built: Vec<Option<TreeNode>> = (0..n).map(|_| None).collect();
        for i in (0..n).rev() {
            let node = &arena.nodes[i];
            let tree = if node.is_dir {
                let children =
                    node.children.iter().map(|&c| built[c].take().unwrap_or_default()).collect();
                TreeNode { name: node.name.clone(), size: Some(sizes[i]), children: Some(children) }
            } else {
                TreeNode { name: node.name.clone(), size: Some(node.size), children: None }
            };
            built[i] = Some(tree);
        }
        built[0].take()
    }
}

#[async_trait]
impl NodeSink for MemorySink {
    async fn reset(&self) -> EngineResult<()> {
        self.arena.lock().unwrap_or_else(PoisonError::into_inner).nodes.clear();
        Ok(())
    }

    async fn insert(
        &self,
        parent_id: Option<i64>,
        name: &str,
        size: u64,
        is_dir: bool,
        _depth: u32,
    ) -> EngineResult<i64> {
        let mut arena = self.arena.lock().unwrap_or_else(PoisonError::into_inner);
        let idx = arena.nodes.len();
        if let Some(pid) = parent_id {
            if let Some(parent) = arena.nodes.get_mut((pid - 1) as usize) {
                parent.children.push(idx);
            }
        }
        arena.nodes.push(ArenaNode { name: name.to_owned(), size, is_dir, children: Vec::new() });
        Ok((idx + 1) as i64)
    }

    async fn preview(&self) -> Option<TreeNode> {
        self.materialize()
    }

    async fn finish(&self, _stats: &ScanStats) -> EngineResult<ScanOutcome> {
        Ok(ScanOutcome { tree: self.materialize(), root_node_id: None })
    }
}
