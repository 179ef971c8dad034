#[cfg(test)]
mod tests {
    use crate::config::{self, EngineConfig};
    use tempfile::TempDir;

    #[test]
    fn embedded_defaults_parse_and_validate() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.walker.dir_concurrency, 16);
        assert_eq!(cfg.walker.progress_interval, 1000);
        assert_eq!(cfg.store.flush_threshold, 20_000);
        assert_eq!(cfg.refresh.initial_ms, 500);
        assert!((cfg.refresh.multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(cfg.refresh.max_ms, 8000);
        assert!(cfg.database.url.starts_with("sqlite://"));
        config::validate(&cfg).unwrap();
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut cfg = EngineConfig::default();
        cfg.walker.dir_concurrency = 0;
        assert!(config::validate(&cfg).is_err());
        cfg.walker.dir_concurrency = 257;
        assert!(config::validate(&cfg).is_err());
    }

    #[test]
    fn validate_rejects_zero_intervals() {
        let mut cfg = EngineConfig::default();
        cfg.walker.progress_interval = 0;
        assert!(config::validate(&cfg).is_err());

        let mut cfg = EngineConfig::default();
        cfg.walker.yield_interval = 0;
        assert!(config::validate(&cfg).is_err());

        let mut cfg = EngineConfig::default();
        cfg.store.flush_threshold = 0;
        assert!(config::validate(&cfg).is_err());
    }

    #[test]
    fn validate_checks_refresh_cadence() {
        let mut cfg = EngineConfig::default();
        cfg.refresh.multiplier = 0.5;
        assert!(config::validate(&cfg).is_err());

        let mut cfg = EngineConfig::default();
        cfg.refresh.max_ms = cfg.refresh.initial_ms - 1;
        assert!(config::validate(&cfg).is_err());
    }

    #[test]
    fn validate_checks_exclusion_patterns() {
        let mut cfg = EngineConfig::default();
        cfg.exclusions.patterns = vec!["[".to_string()];
        assert!(config::validate(&cfg).is_err());

        let mut cfg = EngineConfig::default();
        cfg.exclusions.patterns = vec!["**/node_modules".to_string(), "  ".to_string()];
        config::validate(&cfg).unwrap();
    }

    #[test]
    fn sqlite_parent_dir_is_created() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("data/deep");
        let url = format!("sqlite://{}/wurzelwerk.db", nested.display());
        config::ensure_sqlite_parent_dir(&url).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn non_sqlite_urls_are_left_alone() {
        config::ensure_sqlite_parent_dir("postgres://localhost/db").unwrap();
    }
}
