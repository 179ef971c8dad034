#[cfg(test)]
mod tests {
    use crate::config::ExclusionConfig;
    use crate::exclude::ExclusionMatcher;
    use std::path::{Path, PathBuf};

    #[test]
    fn prefix_matches_itself_and_descendants() {
        let matcher = ExclusionMatcher::new(vec![PathBuf::from("/proc")], &[]).unwrap();
        assert!(matcher.is_excluded(Path::new("/proc")));
        assert!(matcher.is_excluded(Path::new("/proc/self/status")));
        assert!(!matcher.is_excluded(Path::new("/process")));
        assert!(!matcher.is_excluded(Path::new("/home")));
    }

    #[test]
    fn cloud_sync_signatures_match_final_component() {
        let matcher = ExclusionMatcher::default();
        assert!(matcher.is_excluded(Path::new("/home/user/Dropbox")));
        assert!(matcher.is_excluded(Path::new("/mnt/data/OneDrive")));
        assert!(matcher.is_excluded(Path::new("/home/user/Google Drive")));
        // signature must be the final component, not a parent
        assert!(!matcher.is_excluded(Path::new("/home/user/Dropbox-backup")));
        assert!(!matcher.is_excluded(Path::new("/home/user/notes")));
    }

    #[test]
    fn glob_patterns_apply_to_full_path() {
        let matcher = ExclusionMatcher::new(
            vec![],
            &["**/node_modules".to_string(), "**/*.tmp".to_string()],
        )
        .unwrap();
        assert!(matcher.is_excluded(Path::new("/src/app/node_modules")));
        assert!(matcher.is_excluded(Path::new("/var/cache/x.tmp")));
        assert!(!matcher.is_excluded(Path::new("/src/app/lib")));
    }

    #[test]
    fn blank_patterns_are_ignored() {
        let matcher =
            ExclusionMatcher::new(vec![], &["".to_string(), "   ".to_string()]).unwrap();
        assert!(!matcher.is_excluded(Path::new("/anything")));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(ExclusionMatcher::new(vec![], &["[".to_string()]).is_err());
    }

    #[test]
    fn with_defaults_layers_config_on_platform_prefixes() {
        let cfg = ExclusionConfig {
            prefixes: vec!["/srv/scratch".to_string()],
            patterns: vec![],
        };
        let matcher =
            ExclusionMatcher::with_defaults(Some(Path::new("/home/user")), &cfg).unwrap();
        assert!(matcher.is_excluded(Path::new("/srv/scratch/tmp")));
        #[cfg(target_os = "linux")]
        {
            assert!(matcher.is_excluded(Path::new("/proc/cpuinfo")));
            assert!(matcher.is_excluded(Path::new("/sys/kernel")));
            assert!(matcher.is_excluded(Path::new("/home/user/.dropbox.cache/blob")));
        }
    }

    #[test]
    fn default_matcher_excludes_nothing_ordinary() {
        let matcher = ExclusionMatcher::default();
        assert!(!matcher.is_excluded(Path::new("/home/user/projects")));
        assert!(!matcher.is_excluded(Path::new("/var/log/syslog")));
    }
}
