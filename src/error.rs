use thiserror::Error;

/// Clipcut's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Clipcut's crate-wide error type.
///
/// Every failure the pipeline can surface maps onto one of these kinds, so
/// callers (and tests) can branch on policy without string matching. Internal
/// helpers are free to use `anyhow` with `.context(...)`; the conversion below
/// folds those into `Other` at module boundaries.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested clip range falls outside the source. Rejected before any work.
    #[error("invalid clip range [{start}, {end}) for a {duration}s source")]
    InvalidRange { start: f64, end: f64, duration: f64 },

    /// The source could not be opened or probed.
    #[error("source unreadable: {0}")]
    SourceUnreadable(String),

    /// Audio decode failed partway through extraction.
    #[error("audio decode failed: {0}")]
    DecodeFailed(String),

    /// The voice activity detector could not produce a result.
    ///
    /// This is fatal for the request: proceeding without VAD would silently
    /// disable silence trimming, so we fail loudly instead.
    #[error("voice activity analyzer unavailable: {0}")]
    AnalyzerUnavailable(String),

    /// No speech survives the clip window. Surfaced as a soft failure by the
    /// orchestrator (an `ExportResult` with `success = false`), never as a
    /// renderer invocation.
    #[error("no speech survives the clip window")]
    EmptyPlan,

    /// The audio/video duration invariant was violated before rendering.
    ///
    /// This indicates a bug in the planner, assembler, or renderer bridge and
    /// must never be swallowed.
    #[error("audio/video sync invariant violated: {0}")]
    SyncError(String),

    /// The external renderer exited unsuccessfully.
    #[error("render failed: {0}")]
    RenderFailed(String),

    /// Scratch-file or output I/O failed.
    #[error("io failure: {0}")]
    IoFailure(String),

    /// The request was cancelled. Not a failure; no `ExportResult` is produced.
    #[error("export cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Stable machine-readable kind name, reported verbatim on results and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidRange { .. } => "invalid_range",
            Error::SourceUnreadable(_) => "source_unreadable",
            Error::DecodeFailed(_) => "decode_failed",
            Error::AnalyzerUnavailable(_) => "analyzer_unavailable",
            Error::EmptyPlan => "empty_plan",
            Error::SyncError(_) => "sync_error",
            Error::RenderFailed(_) => "render_failed",
            Error::IoFailure(_) => "io_failure",
            Error::Cancelled => "cancelled",
            Error::Other(_) => "other",
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoFailure(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(err.to_string())
    }
}
