//! Unified error type for the audioforge application.
//!
//! All crates funnel their failures into [`Error`], which carries enough
//! context for the HTTP layer to derive a status code via
//! [`Error::http_status`].

/// Unified error type covering all failure modes in audioforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request data failed validation (e.g. missing multipart file field).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Admission control rejected the request before any resources were
    /// committed.
    #[error("Service overloaded: {0}")]
    Overloaded(String),

    /// The external transcoder could not be started at all (missing
    /// executable, permission denied). Distinct from a transcoding failure.
    #[error("Launch error [{tool}]: {message}")]
    Launch {
        /// Name of the tool that failed to start.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// The transcoder process ran but exited non-zero before producing any
    /// output. `detail` is a bounded excerpt of its diagnostic channel.
    #[error("Conversion failed: {detail}")]
    Transcode {
        /// Bounded excerpt of the process's stderr.
        detail: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Overloaded(_) => 503,
            Error::Launch { .. } => 500,
            Error::Transcode { .. } => 500,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::Launch`].
    pub fn launch(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Launch {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Transcode`].
    pub fn transcode(detail: impl Into<String>) -> Self {
        Error::Transcode {
            detail: detail.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
