//! Container runtime abstraction for the coderoom engine.
//!
//! The engine never implements isolation itself; it drives an external
//! container engine through the [`ContainerRuntime`] trait. The production
//! implementation is [`DockerCli`], which shells out to a docker-compatible
//! binary. Tests substitute the in-memory fake from [`fake`].
//!
//! Failure semantics drawn here are load-bearing for every caller:
//! - engine unreachable or image missing → [`EngineError::ContainerUnavailable`]
//! - execution past its bound → [`EngineError::ExecutionTimeout`]
//! - a program that runs and exits non-zero → a normal [`ExecOutput`]

use std::{fmt, time::Duration};

use async_trait::async_trait;
use tokio::sync::mpsc;

use coderoom_utils::DEFAULT_EXEC_TIMEOUT_MS;

use crate::{error::EngineResult, languages::LanguageProfile};

mod docker;

#[cfg(test)]
pub mod fake;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use docker::*;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Opaque identifier of one sandbox known to the container engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SandboxId(String);

/// One awaited command execution inside a sandbox.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Shell command line to run.
    pub command: String,

    /// Data piped to the command's standard input.
    pub stdin: Option<String>,

    /// Bound after which the command is force-killed.
    pub timeout: Duration,
}

/// Captured output of a completed command execution.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Captured standard output.
    pub stdout: String,

    /// Captured standard error.
    pub stderr: String,

    /// The command's exit code.
    pub exit_code: i32,

    /// Wall time the execution took.
    pub duration: Duration,
}

/// One chunk read from an interactive shell stream.
#[derive(Debug, Clone)]
pub enum ShellChunk {
    /// Bytes from the shell's standard output.
    Stdout(Vec<u8>),
    /// Bytes from the shell's standard error.
    Stderr(Vec<u8>),
    /// The stream ended; no further chunks will arrive.
    Closed,
}

/// Handle pair of an interactive shell exec against a sandbox: a sender for
/// input bytes and a receiver of output chunks. Dropping both ends detaches
/// the stream without touching the sandbox.
#[derive(Debug)]
pub struct ShellStream {
    input_tx: mpsc::Sender<Vec<u8>>,
    output_rx: mpsc::Receiver<ShellChunk>,
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Capability to create, exec into, probe, and destroy isolated sandboxes.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create a sandbox from `profile`, applying its resource limits and a
    /// restrictive security posture at creation time. The profile's one-time
    /// setup commands run best-effort: a failing setup command is logged and
    /// never aborts creation.
    async fn create(&self, profile: &LanguageProfile, persistent: bool)
        -> EngineResult<SandboxId>;

    /// Run a command to completion, force-killing it past the bound.
    async fn exec(&self, sandbox: &SandboxId, request: ExecRequest) -> EngineResult<ExecOutput>;

    /// Open an interactive shell exec stream against the sandbox.
    async fn attach_shell(&self, sandbox: &SandboxId) -> EngineResult<ShellStream>;

    /// Stop and remove the sandbox. Failures are logged, never propagated.
    async fn destroy(&self, sandbox: &SandboxId);

    /// Cheap liveness check used to verify reuse safety.
    async fn probe(&self, sandbox: &SandboxId) -> bool;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SandboxId {
    /// Wrap an engine-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SandboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ExecRequest {
    /// A request with the default timeout and no stdin.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            stdin: None,
            timeout: Duration::from_millis(DEFAULT_EXEC_TIMEOUT_MS),
        }
    }

    /// Attach stdin data.
    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Override the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl ExecOutput {
    /// Whether the command exited zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

impl ShellStream {
    /// Assemble a stream from its channel ends.
    pub fn new(input_tx: mpsc::Sender<Vec<u8>>, output_rx: mpsc::Receiver<ShellChunk>) -> Self {
        Self {
            input_tx,
            output_rx,
        }
    }

    /// Split into the input sender and output receiver.
    pub fn split(self) -> (mpsc::Sender<Vec<u8>>, mpsc::Receiver<ShellChunk>) {
        (self.input_tx, self.output_rx)
    }
}
