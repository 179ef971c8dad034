use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::ExclusionConfig;
use crate::error::EngineResult;

/// Folder names used by cloud-sync clients whose placeholders can stall a
/// stat call indefinitely. Matched against the final path component.
const CLOUD_SYNC_SIGNATURES: &[&str] = &[
    "Dropbox",
    "OneDrive",
    "Google Drive",
    "iCloud Drive",
    "CloudStorage",
    "Creative Cloud Files",
];

/// Stateless predicate deciding whether a path is excluded from scanning.
///
/// Built once per scan; `is_excluded` is a pure function of the path with no
/// I/O, and the walker consults it before any filesystem call on a candidate.
#[derive(Debug, Clone, Default)]
pub struct ExclusionMatcher {
    prefixes: Vec<PathBuf>,
    patterns: GlobSet,
}

impl ExclusionMatcher {
    pub fn new(prefixes: Vec<PathBuf>, patterns: &[String]) -> EngineResult<Self> {
        Ok(Self { prefixes, patterns: build_globset(patterns)? })
    }

    /// Platform default prefixes derived from the home directory, plus
    /// whatever the configuration adds on top.
    pub fn with_defaults(home: Option<&Path>, cfg: &ExclusionConfig) -> EngineResult<Self> {
        let mut prefixes = platform_default_prefixes(home);
        prefixes.extend(cfg.prefixes.iter().map(PathBuf::from));
        Self::new(prefixes, &cfg.patterns)
    }

    /// True iff `path` equals an exclusion prefix, lies beneath one, carries
    /// a cloud-sync folder signature, or matches a configured glob.
    pub fn is_excluded(&self, path: &Path) -> bool {
        // Path::starts_with is component-wise: "/a" covers "/a" and "/a/b",
        // never "/ab".
        if self.prefixes.iter().any(|p| path.starts_with(p)) {
            return true;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if CLOUD_SYNC_SIGNATURES.contains(&name) {
                return true;
            }
        }
        if !self.patterns.is_empty() {
            let s = path.to_string_lossy().replace('\\', "/");
            if self.patterns.is_match(&s) {
                return true;
            }
        }
        false
    }
}

fn build_globset(patterns: &[String]) -> EngineResult<GlobSet> {
    let mut b = GlobSetBuilder::new();
    for p in patterns {
        if p.trim().is_empty() {
            continue;
        }
        // Normalize backslashes so patterns behave the same against the
        // slash-normalized candidate paths.
        let norm = p.trim().replace('\\', "/");
        b.add(Glob::new(&norm)?);
    }
    Ok(b.build()?)
}

fn platform_default_prefixes(home: Option<&Path>) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::new();

    #[cfg(target_os = "linux")]
    {
        out.push(PathBuf::from("/proc"));
        out.push(PathBuf::from("/sys"));
        out.push(PathBuf::from("/dev"));
        out.push(PathBuf::from("/run"));
    }

    #[cfg(target_os = "macos")]
    {
        out.push(PathBuf::from("/System/Volumes"));
        out.push(PathBuf::from("/private/var/vm"));
        out.push(PathBuf::from("/dev"));
        if let Some(home) = home {
            out.push(home.join("Library/CloudStorage"));
        }
    }

    #[cfg(windows)]
    {
        out.push(PathBuf::from(r"C:\Windows\CSC"));
        out.push(PathBuf::from(r"C:\$Recycle.Bin"));
    }

    #[cfg(not(target_os = "macos"))]
    if let Some(home) = home {
        out.push(home.join(".dropbox.cache"));
    }

    out
}
