#[cfg(test)]
mod tests {
    use crate::config::WalkerConfig;
    use crate::error::EngineError;
    use crate::exclude::ExclusionMatcher;
    use crate::refresh::RefreshScheduler;
    use crate::scanner::sink::{MemorySink, NodeSink};
    use crate::scanner::{walk, WalkContext};
    use crate::types::{ScanEvent, StatsInner};
    use std::fs;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::{broadcast, watch};
    use tokio_util::sync::CancellationToken;

    struct TestRig {
        sink: Arc<MemorySink>,
        stats: Arc<StatsInner>,
        cancel: CancellationToken,
        pause: watch::Sender<bool>,
    }

    fn rig_with_matcher(matcher: ExclusionMatcher) -> (TestRig, Arc<WalkContext>) {
        let sink = Arc::new(MemorySink::new());
        let stats = Arc::new(StatsInner::default());
        stats.reset();
        let cancel = CancellationToken::new();
        let (pause, pause_rx) = watch::channel(false);
        let (events, _) = broadcast::channel(64);
        let refresh = Arc::new(RefreshScheduler::new(crate::config::RefreshConfig::default()));
        let ctx = Arc::new(WalkContext::new(
            Arc::clone(&sink) as Arc<dyn NodeSink>,
            matcher,
            Arc::clone(&stats),
            cancel.clone(),
            pause_rx,
            events,
            refresh,
            WalkerConfig::default(),
        ));
        (TestRig { sink, stats, cancel, pause }, ctx)
    }

    fn rig() -> (TestRig, Arc<WalkContext>) {
        rig_with_matcher(ExclusionMatcher::default())
    }

    fn write_file(path: PathBuf, bytes: usize) {
        let mut f = fs::File::create(path).unwrap();
        f.write_all(&vec![b'x'; bytes]).unwrap();
    }

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let base = temp.path();
        fs::create_dir_all(base.join("dir1/subdir1")).unwrap();
        fs::create_dir_all(base.join("dir2")).unwrap();
        write_file(base.join("file1.bin"), 100);
        write_file(base.join("dir1/file2.bin"), 200);
        write_file(base.join("dir1/subdir1/file3.bin"), 300);
        write_file(base.join("dir2/file4.bin"), 400);
        temp
    }

    #[tokio::test]
    async fn walk_counts_files_dirs_and_sizes() {
        let temp = create_test_tree();
        let (rig, ctx) = rig();

        let root_id = walk(temp.path(), ctx).await.unwrap();
        assert_eq!(root_id, 1);

        let stats = rig.stats.snapshot();
        assert_eq!(stats.file_count, 4);
        assert_eq!(stats.dir_count, 4); // root + dir1 + subdir1 + dir2
        assert_eq!(stats.total_size, 1000);
        assert_eq!(stats.error_count, 0);
        assert!(!stats.cancelled);

        let snapshot = crate::types::ScanStats::default();
        let outcome = rig.sink.finish(&snapshot).await.unwrap();
        let tree = outcome.tree.unwrap();
        assert_eq!(tree.size, Some(1000));
        assert_eq!(tree.children.as_ref().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn walk_empty_directory() {
        let temp = TempDir::new().unwrap();
        let (rig, ctx) = rig();

        walk(temp.path(), ctx).await.unwrap();
        let stats = rig.stats.snapshot();
        assert_eq!(stats.file_count, 0);
        assert_eq!(stats.dir_count, 1);
        assert_eq!(stats.total_size, 0);
    }

    #[tokio::test]
    async fn walk_rejects_non_directory_root() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("plain.txt");
        write_file(file.clone(), 10);
        let (_rig, ctx) = rig();

        let err = walk(&file, ctx).await.unwrap_err();
        assert!(matches!(err, EngineError::NotADirectory(_)));
    }

    #[tokio::test]
    async fn walk_rejects_missing_root() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("does-not-exist");
        let (_rig, ctx) = rig();

        let err = walk(&missing, ctx).await.unwrap_err();
        assert!(matches!(err, EngineError::RootUnreadable { .. }));
    }

    #[tokio::test]
    async fn walk_rejects_excluded_root() {
        let temp = TempDir::new().unwrap();
        let matcher =
            ExclusionMatcher::new(vec![temp.path().to_path_buf()], &[]).unwrap();
        let (_rig, ctx) = rig_with_matcher(matcher);

        let err = walk(temp.path(), ctx).await.unwrap_err();
        assert!(matches!(err, EngineError::ExcludedRoot(_)));
    }

    #[tokio::test]
    async fn excluded_subtree_is_never_entered() {
        let temp = create_test_tree();
        let matcher =
            ExclusionMatcher::new(vec![temp.path().join("dir1")], &[]).unwrap();
        let (rig, ctx) = rig_with_matcher(matcher);

        walk(temp.path(), ctx).await.unwrap();
        let stats = rig.stats.snapshot();
        // dir1 and everything below it is gone
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.dir_count, 2);
        assert_eq!(stats.total_size, 500);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hardlinked_file_counted_once_by_size() {
        let temp = TempDir::new().unwrap();
        let base = temp.path();
        write_file(base.join("a.bin"), 100);
        write_file(base.join("b.bin"), 200);
        fs::hard_link(base.join("a.bin"), base.join("a-link.bin")).unwrap();
        let (rig, ctx) = rig();

        walk(base, ctx).await.unwrap();
        let stats = rig.stats.snapshot();
        // three names, but a.bin's bytes contribute once
        assert_eq!(stats.file_count, 3);
        assert_eq!(stats.total_size, 300);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_cycle_is_not_followed() {
        let temp = TempDir::new().unwrap();
        let base = temp.path();
        fs::create_dir(base.join("inner")).unwrap();
        write_file(base.join("inner/data.bin"), 50);
        std::os::unix::fs::symlink(base, base.join("inner/loop")).unwrap();
        std::os::unix::fs::symlink(base.join("inner/data.bin"), base.join("data-link")).unwrap();
        let (rig, ctx) = rig();

        walk(base, ctx).await.unwrap();
        let stats = rig.stats.snapshot();
        assert_eq!(stats.file_count, 1);
        assert_eq!(stats.dir_count, 2);
        assert_eq!(stats.total_size, 50);
    }

    #[tokio::test]
    async fn checkpoint_parks_while_paused_and_releases_on_resume() {
        let (rig, ctx) = rig();
        rig.pause.send(true).unwrap();

        let parked = tokio::spawn({
            let ctx = Arc::clone(&ctx);
            async move { ctx.checkpoint().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!parked.is_finished());

        rig.pause.send(false).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), parked).await.unwrap();
        assert!(result.unwrap().is_ok());
    }

    #[tokio::test]
    async fn checkpoint_observes_cancellation() {
        let (rig, ctx) = rig();
        rig.cancel.cancel();
        let err = ctx.checkpoint().await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_while_paused_unwinds_parked_branch() {
        let (rig, ctx) = rig();
        rig.pause.send(true).unwrap();

        let parked = tokio::spawn({
            let ctx = Arc::clone(&ctx);
            async move { ctx.checkpoint().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // token first, then release the pause latch
        rig.cancel.cancel();
        rig.pause.send(false).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), parked).await.unwrap();
        assert!(result.unwrap().unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn progress_events_carry_monotonic_counters() {
        let temp = TempDir::new().unwrap();
        let base = temp.path();
        fs::create_dir(base.join("d")).unwrap();
        for i in 0..50 {
            write_file(base.join(format!("d/f{}.bin", i)), 10);
        }

        let sink = Arc::new(MemorySink::new());
        let stats = Arc::new(StatsInner::default());
        stats.reset();
        let (pause, pause_rx) = watch::channel(false);
        let (events, mut rx) = broadcast::channel(256);
        let refresh = Arc::new(RefreshScheduler::new(crate::config::RefreshConfig::default()));
        let cfg = WalkerConfig {
            progress_interval: 10,
            ..WalkerConfig::default()
        };
        let ctx = Arc::new(WalkContext::new(
            sink as Arc<dyn NodeSink>,
            ExclusionMatcher::default(),
            Arc::clone(&stats),
            CancellationToken::new(),
            pause_rx,
            events,
            refresh,
            cfg,
        ));
        drop(pause);

        walk(base, ctx).await.unwrap();

        let mut last_files = 0;
        let mut progress_seen = 0;
        while let Ok(event) = rx.try_recv() {
            if let ScanEvent::Progress { file_count, .. } = event {
                assert!(file_count >= last_files);
                last_files = file_count;
                progress_seen += 1;
            }
        }
        assert!(progress_seen >= 4);
    }

    #[tokio::test]
    async fn memory_sink_preview_matches_partial_tree() {
        let sink = MemorySink::new();
        let root = sink.insert(None, "root", 0, true, 0).await.unwrap();
        let dir = sink.insert(Some(root), "dir", 0, true, 1).await.unwrap();
        sink.insert(Some(dir), "a.bin", 10, false, 2).await.unwrap();
        sink.insert(Some(root), "b.bin", 5, false, 1).await.unwrap();

        let tree = sink.preview().await.unwrap();
        assert_eq!(tree.size, Some(15));
        let children = tree.children.unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].name, "dir");
        assert_eq!(children[0].size, Some(10));
    }

    #[tokio::test]
    async fn memory_sink_reset_clears_previous_session() {
        let sink = MemorySink::new();
        sink.insert(None, "root", 0, true, 0).await.unwrap();
        sink.reset().await.unwrap();
        assert!(sink.preview().await.is_none());

        let id = sink.insert(None, "root", 0, true, 0).await.unwrap();
        assert_eq!(id, 1);
    }
}
