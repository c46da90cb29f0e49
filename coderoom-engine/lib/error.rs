//! Error types for the coderoom engine.
//!
//! The engine draws a hard line between "your program failed" and "the
//! platform failed to run your program". A program that runs to completion
//! with a non-zero exit code is a successful execution carrying failed
//! output; everything in [`EngineError`] is a platform-side failure.

use std::path::PathBuf;

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Error variants of the coderoom engine.
#[derive(pretty_error_debug::Debug, Error)]
pub enum EngineError {
    /// The requested language is unknown or marked inactive.
    #[error("unsupported or inactive language: {0}")]
    UnsupportedLanguage(String),

    /// The container engine is unreachable or a base image is missing.
    #[error("container engine unavailable: {0}")]
    ContainerUnavailable(String),

    /// An execution exceeded its timeout and was force-killed. Never
    /// conflated with a non-zero exit code.
    #[error("execution timed out after {0} ms")]
    ExecutionTimeout(u64),

    /// A reused context failed its liveness probe and could not be
    /// recreated. Plain probe failure recovers transparently and never
    /// surfaces as this variant.
    #[error("execution context is stale and could not be recreated: {0}")]
    ContextStale(String),

    /// The referenced execution context no longer exists.
    #[error("no live execution context: {0}")]
    ContextNotFound(String),

    /// The language profile carries no package install command.
    #[error("package installation is not supported for language: {0}")]
    PackageInstallUnsupported(String),

    /// Membership check failed for a room join.
    #[error("room access denied for user '{user}' in room '{room}'")]
    RoomAccessDenied {
        /// The room that was joined.
        room: String,
        /// The user whose membership check failed.
        user: String,
    },

    /// The room was torn down while the operation was in flight.
    #[error("room {0} is closed")]
    RoomClosed(String),

    /// The referenced terminal session does not exist or already left.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Caller-supplied input failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Engine or language catalog configuration is invalid.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The language catalog override file could not be read or parsed.
    #[error("failed to load language catalog from {path}: {reason}")]
    CatalogLoad {
        /// Path of the override file.
        path: PathBuf,
        /// Why loading failed.
        reason: String,
    },

    /// An IO error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;
