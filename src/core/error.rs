use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Central error type for the runtime backend.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No write permission in {path:?}; choose another data directory or fix its permissions")]
    PermissionDenied { path: PathBuf },

    #[error("Not enough free disk space: available={available} required={required}")]
    InsufficientDisk { available: u64, required: u64 },

    #[error("Runtime directory is in use by a running game: {0:?}")]
    RuntimeInUse(PathBuf),

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error(
        "No download available for {tag} on {platform}-{arch}. \
         The platform may be unsupported or the network unreachable. Supported: {supported}"
    )]
    NoDownload {
        tag: String,
        platform: String,
        arch: String,
        supported: String,
    },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-256 mismatch for {path:?}: expected {expected}, got {actual}")]
    IntegrityFailure {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("No checksum available to verify the {tag} download and verification is required")]
    ChecksumUnavailable { tag: String },

    // ── Java ────────────────────────────────────────────
    #[error("Java executable not found: {0:?}")]
    ExecutableNotFound(PathBuf),

    #[error("Java at {path:?} did not answer -version within {timeout:?}")]
    ProbeTimeout { path: PathBuf, timeout: Duration },

    #[error("Java execution failed: {0}")]
    JavaExecution(String),

    #[error("Java at {path:?} is not compatible: {reason}")]
    Incompatible { path: PathBuf, reason: String },

    #[error("Invalid version string: {0:?}")]
    InvalidVersion(String),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Refusing unsafe archive entry: {0:?}")]
    UnsafeArchiveEntry(PathBuf),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl LauncherError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

// ── Serialization for host IPC ──────────────────────────
// The host shell receives errors as plain strings.
impl serde::Serialize for LauncherError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
