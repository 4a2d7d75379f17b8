//! Error types for the glb-optimize library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`OptimizeError`] — **Fatal** for the operation that returned it:
//!   unreadable settings file, bad input path, failed download, output that
//!   cannot be written. Returned as `Err(OptimizeError)`.
//!
//! * [`FileError`] — **Non-fatal**: a single queued asset failed (unreadable,
//!   rejected by the transform backend, ...) but the rest of the batch is
//!   fine. Stored on the task so callers can inspect partial success rather
//!   than losing the whole batch to one bad file.
//!
//! * [`SanitizeError`] — why an untrusted settings tree was rejected. The
//!   sanitizer never returns it outward; it is logged and the defaults are
//!   used instead. [`crate::settings::try_sanitize`] exposes it for callers
//!   that prefer to refuse an edit.
//!
//! [`BackendError`] and [`GlbError`] are raised by the transform backend and
//! the container codec; the orchestrator folds them into a [`FileError`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the glb-optimize library.
///
/// Per-file failures use [`FileError`] and are recorded on the task rather
/// than propagated here.
#[derive(Debug, Error)]
pub enum OptimizeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input path was not found.
    #[error("Input not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the path.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a usable path or URL.
    #[error("Invalid input '{input}': not a .glb file, a directory, or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Settings errors ───────────────────────────────────────────────────
    /// The settings file exists but could not be read or written.
    #[error("Settings file '{path}' is not accessible: {source}")]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A settings edit was refused because it does not fit the schema.
    #[error("Rejected settings edit: {0}")]
    InvalidSettings(#[from] SanitizeError),

    /// A settings edit was attempted while a batch run holds the settings frozen.
    #[error("Settings are frozen while a batch is processing")]
    SettingsFrozen,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A non-fatal error for a single file.
///
/// Stored on the task when a file fails. The batch continues with the next
/// pending file regardless of how many end up here.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum FileError {
    /// The file's bytes could not be obtained.
    #[error("{name}: read failed: {detail}")]
    ReadFailed { name: String, detail: String },

    /// The transform backend never became ready.
    #[error("{name}: transform backend unavailable: {detail}")]
    BackendUnavailable { name: String, detail: String },

    /// The document model or a step application raised an error.
    #[error("{name}: {step} failed: {detail}")]
    TransformFailed {
        name: String,
        step: String,
        detail: String,
    },

    /// The transformed document could not be serialised back to bytes.
    #[error("{name}: write failed: {detail}")]
    WriteFailed { name: String, detail: String },

    /// Processing stopped before an outcome was recorded (the run was
    /// dropped or the backend panicked).
    #[error("{name}: {detail}")]
    Other { name: String, detail: String },
}

/// Why an untrusted settings tree was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SanitizeError {
    /// An undefined or empty-string leaf. Voids the whole input.
    #[error("Key '{path}' holds a disallowed value ({value})")]
    DisallowedValue { path: String, value: String },

    /// A value whose shape conflicts with the schema node it lands on.
    #[error("Key '{path}' does not match the schema: expected {expected}")]
    ShapeMismatch { path: String, expected: String },

    /// The merged tree does not decode into the typed settings.
    #[error("Merged settings do not fit the schema: {0}")]
    Schema(String),
}

/// A failure inside a transform backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// One-time initialisation did not succeed.
    #[error("backend initialisation failed: {0}")]
    Init(String),

    /// The bytes are not a usable binary glTF container.
    #[error(transparent)]
    Container(#[from] GlbError),

    /// An external command exited unsuccessfully.
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// An external command did not finish in time.
    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Why a byte buffer could not be read or written as a GLB container.
#[derive(Debug, Error)]
pub enum GlbError {
    /// Header or chunk framing is wrong (magic, version, lengths).
    #[error("malformed GLB container: {0}")]
    Container(#[from] gltf::Error),

    #[error("GLB JSON chunk is invalid: {0}")]
    Json(#[from] serde_json::Error),
}
