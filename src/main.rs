use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wurzelwerk::config;
use wurzelwerk::controller::ScanController;
use wurzelwerk::db;
use wurzelwerk::exclude::ExclusionMatcher;
use wurzelwerk::metrics::Metrics;
use wurzelwerk::scanner::sink::{MemorySink, NodeSink};
use wurzelwerk::session::{self, SessionHandle};
use wurzelwerk::store::subtree::SubtreeNode;
use wurzelwerk::store::NodeStore;
use wurzelwerk::types::ScanEvent;

struct CliArgs {
    root: PathBuf,
    in_memory: bool,
    print_depth: u32,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut root: Option<PathBuf> = None;
    let mut in_memory = false;
    let mut print_depth: u32 = 2;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--in-memory" => in_memory = true,
            "--depth" => {
                let value = args.next().ok_or_else(|| anyhow::anyhow!("--depth needs a value"))?;
                print_depth = value.parse()?;
            }
            "--help" | "-h" => {
                println!("Usage: wurzelwerk [--in-memory] [--depth N] <path>");
                std::process::exit(0);
            }
            other if !other.starts_with('-') => root = Some(PathBuf::from(other)),
            other => anyhow::bail!("unknown argument: {}", other),
        }
    }
    let root = root.ok_or_else(|| anyhow::anyhow!("missing scan path, see --help"))?;
    Ok(CliArgs { root, in_memory, print_depth })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging (stdout + tägliche Datei-Rotation unter ./logs)
    std::fs::create_dir_all("logs").ok();
    let (stdout_nb, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let file_appender = tracing_appender::rolling::daily("logs", "wurzelwerk.log");
    let (file_nb, file_guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sqlx=warn".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(stdout_nb))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_nb))
        .init();
    // Guards am Leben halten (nicht fallen lassen), damit Non-Blocking Writer korrekt flushen
    let _log_guards = (stdout_guard, file_guard);

    let args = parse_args()?;
    let cfg = Arc::new(config::load()?);
    let matcher = ExclusionMatcher::with_defaults(
        std::env::var_os("HOME").map(PathBuf::from).as_deref(),
        &cfg.exclusions,
    )?;
    let metrics = Metrics::new();

    let (sink, pool): (Arc<dyn NodeSink>, _) = if args.in_memory {
        (Arc::new(MemorySink::new()), None)
    } else {
        let pool = db::connect(&cfg.database.url).await?;
        (Arc::new(NodeStore::new(pool.clone(), cfg.store.flush_threshold)), Some(pool))
    };

    let controller =
        Arc::new(ScanController::new(sink, Arc::clone(&cfg), matcher, metrics.clone()));
    let handle = session::spawn(controller, pool);

    let mut events = handle.subscribe();
    handle
        .start(args.root.clone())
        .await
        .map_err(|e| anyhow::anyhow!("scan failed to start: {}", e))?;

    run_event_loop(&handle, &mut events, args.print_depth).await;

    let snapshot = metrics.get_snapshot();
    info!(
        completed = snapshot.sessions_completed,
        cancelled = snapshot.sessions_cancelled,
        failed = snapshot.sessions_failed,
        files = snapshot.files_processed,
        bytes = snapshot.bytes_scanned,
        uptime_s = snapshot.uptime_seconds,
        "engine metrics"
    );
    Ok(())
}

async fn run_event_loop(
    handle: &SessionHandle,
    events: &mut tokio::sync::broadcast::Receiver<ScanEvent>,
    print_depth: u32,
) {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, cancelling scan");
                if let Err(e) = handle.cancel().await {
                    error!(error = %e, "cancel failed");
                }
            }
            event = events.recv() => match event {
                Ok(ScanEvent::Started { session_id, root, .. }) => {
                    info!(%session_id, root, "scanning");
                }
                Ok(ScanEvent::Progress { dir, file_count, dir_count, error_count, size, .. }) => {
                    info!(
                        files = file_count, dirs = dir_count, errors = error_count,
                        total = %format_bytes(size), current = %dir, "progress"
                    );
                }
                Ok(ScanEvent::Refresh { .. }) => {}
                Ok(ScanEvent::Complete { tree, root_node_id, stats }) => {
                    info!(
                        files = stats.file_count, dirs = stats.dir_count,
                        errors = stats.error_count, cancelled = stats.cancelled,
                        total = %format_bytes(stats.total_size), "done"
                    );
                    if let Some(tree) = tree {
                        print_tree(&tree, 0, print_depth);
                    } else if let Some(root_id) = root_node_id {
                        match handle.get_subtree(root_id, print_depth).await {
                            Ok(Some(sub)) => print_subtree(&sub, 0),
                            Ok(None) => {}
                            Err(e) => error!(error = %e, "subtree query failed"),
                        }
                    }
                    return;
                }
                Ok(ScanEvent::Error { message }) => {
                    error!(message, "scan failed");
                    return;
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    info!(skipped = n, "event consumer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    }
}

fn print_tree(node: &wurzelwerk::types::TreeNode, indent: usize, depth_left: u32) {
    println!(
        "{}{}  {}",
        "  ".repeat(indent),
        node.name,
        format_bytes(node.size.unwrap_or(0))
    );
    if depth_left == 0 {
        return;
    }
    if let Some(children) = &node.children {
        let mut sorted: Vec<_> = children.iter().collect();
        sorted.sort_by(|a, b| b.size.cmp(&a.size));
        for child in sorted {
            print_tree(child, indent + 1, depth_left - 1);
        }
    }
}

fn print_subtree(node: &SubtreeNode, indent: usize) {
    println!("{}{}  {}", "  ".repeat(indent), node.name, format_bytes(node.size));
    if let Some(children) = &node.children {
        let mut sorted: Vec<_> = children.iter().collect();
        sorted.sort_by(|a, b| b.size.cmp(&a.size));
        for child in sorted {
            print_subtree(child, indent + 1);
        }
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
