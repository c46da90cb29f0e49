//! Request and response types for the engine's exposed operation set.
//!
//! These are the shapes that cross the boundary to the surrounding service:
//! everything here serializes, carries no handles, and stays stable while
//! the internals move.

use serde::{Deserialize, Serialize};

use crate::languages::CostTier;

//--------------------------------------------------------------------------------------------------
// Types: Languages
//--------------------------------------------------------------------------------------------------

/// Public description of one supported language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageInfo {
    /// Canonical lowercase language name.
    pub name: String,

    /// Source file extension without the dot.
    pub extension: String,

    /// Relative resource cost of running this language.
    pub cost_tier: CostTier,

    /// Memory limit in MB applied at sandbox creation.
    pub memory_limit_mb: u32,

    /// CPU share applied at sandbox creation.
    pub cpu_limit: f32,

    /// Execution timeout in milliseconds.
    pub exec_timeout_ms: u64,

    /// Maximum concurrent executions per context.
    pub concurrency_cap: u32,

    /// Whether the language profile carries a package install command.
    pub supports_package_install: bool,
}

//--------------------------------------------------------------------------------------------------
// Types: Code execution
//--------------------------------------------------------------------------------------------------

/// A one-shot code run against an execution context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    /// The source code to execute.
    pub code: String,

    /// Target filename inside the sandbox working directory. Defaults to a
    /// generated name with the profile's extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Data piped to the program's standard input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,

    /// Caller-requested timeout in milliseconds. Clamped to the profile's
    /// execution timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Captured result of a completed code run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    /// Captured standard output.
    pub stdout: String,

    /// Captured standard error.
    pub stderr: String,

    /// The program's exit code. Non-zero is a normal result, not an engine
    /// error.
    pub exit_code: i32,

    /// Files newly present in the working directory after the run.
    pub created_files: Vec<String>,
}

//--------------------------------------------------------------------------------------------------
// Types: Package installation
//--------------------------------------------------------------------------------------------------

/// Per-package result of an install batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallOutcome {
    /// The package name as requested.
    pub name: String,

    /// Whether the package is installed after this batch.
    pub ok: bool,

    /// Failure detail, or the reason the package was not attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InstallOutcome {
    /// Successful (or already satisfied) outcome.
    pub fn ok(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: true,
            error: None,
        }
    }

    /// Failed outcome with detail.
    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: false,
            error: Some(error.into()),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Types: Room output
//--------------------------------------------------------------------------------------------------

/// Which stream of the shared terminal a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStream {
    /// Standard output of the room's shell.
    Stdout,
    /// Standard error of the room's shell.
    Stderr,
    /// Engine-generated notice (joins, truncations, shutdown).
    System,
}

/// One sanitized, size-capped output chunk broadcast to every session of a
/// room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomChunk {
    /// Per-room monotonically increasing sequence number.
    pub seq: u64,

    /// Originating stream.
    pub stream: ChunkStream,

    /// Sanitized chunk text.
    pub text: String,
}

//--------------------------------------------------------------------------------------------------
// Types: Engine statistics
//--------------------------------------------------------------------------------------------------

/// Operational counters for the whole engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    /// Number of live execution contexts.
    pub contexts: usize,

    /// Number of owners holding at least one context.
    pub owners: usize,

    /// Number of live room terminals.
    pub rooms: usize,

    /// Number of attached terminal sessions across all rooms.
    pub sessions: usize,
}

/// Result of a manual or scheduled cleanup pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupStats {
    /// Contexts destroyed by the pass.
    pub contexts_destroyed: usize,

    /// Rooms destroyed by the pass.
    pub rooms_destroyed: usize,
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
