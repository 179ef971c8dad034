use thiserror::Error;

/// The primary error type of the engine.
///
/// Per-entry filesystem failures are never surfaced here; the walker records
/// them in the session's error counter and moves on. Everything that reaches
/// this type either ends a session (fatal) or is the `Cancelled` marker,
/// which is not a true failure.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A branch observed the cancellation flag and unwound.
    #[error("scan cancelled")]
    Cancelled,
    /// The scan root exists but is not a directory.
    #[error("root path is not a directory: {0}")]
    NotADirectory(String),
    /// The scan root falls under an exclusion prefix.
    #[error("root path is excluded from scanning: {0}")]
    ExcludedRoot(String),
    /// The scan root could not be stat'd at all.
    #[error("cannot read root path {path}: {source}")]
    RootUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// A second `start()` was requested while a session is active.
    #[error("a scan is already in progress")]
    AlreadyRunning,
    /// An operation that is not legal in the controller's current state.
    #[error("{op} is not legal while the controller is {state}")]
    InvalidTransition { op: &'static str, state: &'static str },
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid exclude pattern: {0}")]
    Pattern(#[from] globset::Error),
    /// A spawned walker branch panicked; the session aborts, the host survives.
    #[error("walker task panicked: {0}")]
    Panicked(String),
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}

/// A type alias for `Result<T, EngineError>`, used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;
