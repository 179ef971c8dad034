use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Tuning knobs for the directory walker.
#[derive(Debug, Clone, Deserialize)]
pub struct WalkerConfig {
    /// Maximum sibling subdirectories in flight at once.
    pub dir_concurrency: usize,
    /// Visited entries between progress events.
    pub progress_interval: u64,
    /// Visited entries between explicit yields to the scheduler.
    pub yield_interval: u64,
    /// Without progress for this long a session counts as possibly stuck.
    pub stuck_threshold_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Buffered rows committed per transaction.
    pub flush_threshold: usize,
}

/// Exponential-backoff cadence for preview refreshes.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    pub initial_ms: u64,
    pub multiplier: f64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ExclusionConfig {
    /// Absolute path prefixes whose subtrees are skipped without a stat.
    pub prefixes: Vec<String>,
    /// Glob patterns applied on top of the prefix exclusions.
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub walker: WalkerConfig,
    pub store: StoreConfig,
    pub refresh: RefreshConfig,
    pub exclusions: ExclusionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        let defaults: &str = include_str!("../config/default.toml");
        match ::config::Config::builder()
            .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(engine_cfg) => engine_cfg,
                Err(e) => {
                    eprintln!("FATAL: Failed to deserialize default config: {}", e);
                    panic!("Failed to deserialize default config: {}", e);
                }
            },
            Err(e) => {
                eprintln!("FATAL: Failed to parse default config: {}", e);
                panic!("Failed to parse default config: {}", e);
            }
        }
    }
}

impl Default for WalkerConfig {
    fn default() -> Self {
        // Mirror defaults from config/default.toml
        Self { dir_concurrency: 16, progress_interval: 1000, yield_interval: 5000, stuck_threshold_ms: 30_000 }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { flush_threshold: 20_000 }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { initial_ms: 500, multiplier: 2.0, max_ms: 8000 }
    }
}

pub fn load() -> anyhow::Result<EngineConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let defaults: &str = include_str!("../config/default.toml");
    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
        // Optional local file: wurzelwerk.toml (in CWD)
        .add_source(::config::File::with_name("wurzelwerk").required(false));

    if let Ok(custom_path) = std::env::var("WURZELWERK_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(::config::Environment::with_prefix("WURZELWERK").separator("__"));

    let cfg = builder.build()?;
    let engine_cfg: EngineConfig = cfg.try_deserialize()?;
    validate(&engine_cfg)?;
    Ok(engine_cfg)
}

pub fn validate(cfg: &EngineConfig) -> anyhow::Result<()> {
    if cfg.walker.dir_concurrency == 0 || cfg.walker.dir_concurrency > 256 {
        return Err(anyhow::anyhow!("walker.dir_concurrency must be in 1..=256"));
    }
    if cfg.walker.progress_interval == 0 {
        return Err(anyhow::anyhow!("walker.progress_interval must be > 0"));
    }
    if cfg.walker.yield_interval == 0 {
        return Err(anyhow::anyhow!("walker.yield_interval must be > 0"));
    }
    if cfg.walker.stuck_threshold_ms == 0 {
        return Err(anyhow::anyhow!("walker.stuck_threshold_ms must be > 0"));
    }

    if cfg.store.flush_threshold == 0 {
        return Err(anyhow::anyhow!("store.flush_threshold must be > 0"));
    }

    if cfg.refresh.initial_ms == 0 {
        return Err(anyhow::anyhow!("refresh.initial_ms must be > 0"));
    }
    if cfg.refresh.multiplier < 1.0 {
        return Err(anyhow::anyhow!("refresh.multiplier must be >= 1.0"));
    }
    if cfg.refresh.max_ms < cfg.refresh.initial_ms {
        return Err(anyhow::anyhow!("refresh.max_ms must be >= refresh.initial_ms"));
    }

    for pat in &cfg.exclusions.patterns {
        if pat.trim().is_empty() {
            continue;
        }
        if let Err(e) = globset::Glob::new(&pat.trim().replace('\\', "/")) {
            return Err(anyhow::anyhow!("invalid exclusions.patterns entry {:?}: {}", pat, e));
        }
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(url: &str) -> std::io::Result<()> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        // On Windows, handle URLs like sqlite:///C:/... by stripping the leading '/'
        #[cfg(windows)]
        let path = {
            let bytes = path.as_bytes();
            if bytes.len() >= 3 && bytes[0] == b'/' && bytes[2] == b':' && bytes[1].is_ascii_alphabetic() {
                &path[1..]
            } else {
                path
            }
        };
        let p = Path::new(path);
        if let Some(parent) = p.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
