//! Docker CLI implementation of the container runtime.
//!
//! Drives a docker-compatible binary through `tokio::process::Command`.
//! Resource limits (memory, swap, CPU, pids) and the security posture
//! (no privilege escalation) are applied at `run` time as a hard contract;
//! the sandbox is kept alive with a sleeping init command and all work
//! happens through `exec`.

use std::{process::Stdio, time::Instant};

use async_trait::async_trait;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    process::Command,
    sync::mpsc,
    time::Duration,
};
use uuid::Uuid;

use coderoom_utils::{
    PROBE_TIMEOUT_MS, SANDBOX_NAME_PREFIX, SANDBOX_PIDS_LIMIT, SANDBOX_WORKDIR,
};

use crate::{
    config::EngineConfig,
    error::{EngineError, EngineResult},
    languages::LanguageProfile,
};

use super::{ContainerRuntime, ExecOutput, ExecRequest, SandboxId, ShellChunk, ShellStream};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Timeout for one best-effort setup command during sandbox creation.
const SETUP_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// stderr markers that identify engine-side failures, as opposed to output
/// of the sandboxed program.
const ENGINE_FAILURE_MARKERS: [&str; 6] = [
    "Cannot connect to the Docker daemon",
    "error during connect",
    "No such container",
    "No such image",
    "Unable to find image",
    "pull access denied",
];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Container runtime backed by a docker-compatible CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    stop_grace: Duration,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DockerCli {
    /// Create a runtime driving `binary` with the given stop grace period.
    pub fn new(binary: impl Into<String>, stop_grace: Duration) -> Self {
        Self {
            binary: binary.into(),
            stop_grace,
        }
    }

    /// Create a runtime from the engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.get_engine_binary().clone(), *config.get_stop_grace())
    }

    async fn run_engine_command(&self, args: &[&str]) -> EngineResult<std::process::Output> {
        Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                EngineError::ContainerUnavailable(format!(
                    "failed to invoke {}: {}",
                    self.binary, e
                ))
            })
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn create(
        &self,
        profile: &LanguageProfile,
        persistent: bool,
    ) -> EngineResult<SandboxId> {
        let name = format!("{}-{}", SANDBOX_NAME_PREFIX, Uuid::new_v4());
        let memory = format!("{}m", profile.get_memory_limit_mb());
        let cpus = profile.get_cpu_limit().to_string();
        let pids = SANDBOX_PIDS_LIMIT.to_string();

        let mut args: Vec<&str> = vec![
            "run",
            "-d",
            "--name",
            &name,
            "--memory",
            &memory,
            "--memory-swap",
            &memory,
            "--cpus",
            &cpus,
            "--pids-limit",
            &pids,
            "--security-opt",
            "no-new-privileges",
            "--workdir",
            SANDBOX_WORKDIR,
        ];
        if !persistent {
            args.push("--rm");
        }
        args.extend([profile.get_image().as_str(), "sleep", "infinity"]);

        let output = self.run_engine_command(&args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::ContainerUnavailable(format!(
                "sandbox creation failed for image {}: {}",
                profile.get_image(),
                stderr.trim()
            )));
        }

        let sandbox = SandboxId::new(name);
        tracing::info!(
            "created sandbox {} for language {}",
            sandbox,
            profile.get_language()
        );

        // One-time setup is best-effort: a broken setup command must not
        // take down sandbox creation.
        for setup in profile.get_setup_commands() {
            let request = ExecRequest::new(setup.clone()).with_timeout(SETUP_COMMAND_TIMEOUT);
            match self.exec(&sandbox, request).await {
                Ok(result) if !result.success() => {
                    tracing::warn!(
                        "setup command '{}' exited {} in sandbox {}: {}",
                        setup,
                        result.exit_code,
                        sandbox,
                        result.stderr.trim()
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "setup command '{}' failed in sandbox {}: {}",
                        setup,
                        sandbox,
                        e
                    );
                }
                Ok(_) => {}
            }
        }

        Ok(sandbox)
    }

    async fn exec(&self, sandbox: &SandboxId, request: ExecRequest) -> EngineResult<ExecOutput> {
        let timeout_ms = request.timeout.as_millis() as u64;

        // The awaited bound below is authoritative for ExecutionTimeout; the
        // in-container bound trails it by one second so the sandboxed
        // process is reaped after the client gives up.
        let inner_secs = request.timeout.as_secs() + 1;
        let wrapped = format!(
            "cd {} && timeout -k 1 {} sh -c {}",
            SANDBOX_WORKDIR,
            inner_secs,
            shell_quote(&request.command)
        );

        let mut child = Command::new(&self.binary)
            .args(["exec", "-i", sandbox.as_str(), "sh", "-c", &wrapped])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::ContainerUnavailable(format!(
                    "failed to invoke {}: {}",
                    self.binary, e
                ))
            })?;

        let stdin_payload = request.stdin;
        let started = Instant::now();

        let completion = async move {
            if let Some(mut handle) = child.stdin.take() {
                if let Some(data) = stdin_payload {
                    let _ = handle.write_all(data.as_bytes()).await;
                }
                // Dropping the handle sends EOF either way.
            }
            child.wait_with_output().await
        };

        let output = match tokio::time::timeout(request.timeout, completion).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(EngineError::Io(e)),
            Err(_) => {
                tracing::warn!(
                    "execution in sandbox {} exceeded {} ms, force-killed",
                    sandbox,
                    timeout_ms
                );
                return Err(EngineError::ExecutionTimeout(timeout_ms));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code().unwrap_or(-1);

        // Engine-side failures must never masquerade as program output.
        if exit_code != 0 {
            if let Some(marker) = engine_failure(&stderr) {
                return Err(EngineError::ContainerUnavailable(marker));
            }
        }

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
            duration: started.elapsed(),
        })
    }

    async fn attach_shell(&self, sandbox: &SandboxId) -> EngineResult<ShellStream> {
        let mut child = Command::new(&self.binary)
            .args(["exec", "-i", sandbox.as_str(), "sh", "-i"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::ContainerUnavailable(format!(
                    "failed to attach shell to {}: {}",
                    sandbox, e
                ))
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            EngineError::ContainerUnavailable("shell exec has no stdin pipe".to_string())
        })?;
        let mut stdout = child.stdout.take().ok_or_else(|| {
            EngineError::ContainerUnavailable("shell exec has no stdout pipe".to_string())
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            EngineError::ContainerUnavailable("shell exec has no stderr pipe".to_string())
        })?;

        let (input_tx, mut input_rx) = mpsc::channel::<Vec<u8>>(64);
        let (output_tx, output_rx) = mpsc::channel::<ShellChunk>(256);

        // Writer: drain queued input into the shell.
        tokio::spawn(async move {
            while let Some(bytes) = input_rx.recv().await {
                if stdin.write_all(&bytes).await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        // stdout reader; signals Closed on EOF.
        let stdout_tx = output_tx.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if stdout_tx
                            .send(ShellChunk::Stdout(buf[..n].to_vec()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
            let _ = stdout_tx.send(ShellChunk::Closed).await;
        });

        // stderr reader.
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                match stderr.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if output_tx
                            .send(ShellChunk::Stderr(buf[..n].to_vec()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
        });

        // Reap the client process when the stream ends.
        tokio::spawn(async move {
            let _ = child.wait().await;
        });

        Ok(ShellStream::new(input_tx, output_rx))
    }

    async fn destroy(&self, sandbox: &SandboxId) {
        let grace = self.stop_grace.as_secs().to_string();

        match self
            .run_engine_command(&["stop", "-t", grace.as_str(), sandbox.as_str()])
            .await
        {
            Ok(output) if !output.status.success() => {
                tracing::warn!(
                    "failed to stop sandbox {}: {}",
                    sandbox,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => tracing::warn!("failed to stop sandbox {}: {}", sandbox, e),
            Ok(_) => {}
        }

        match self
            .run_engine_command(&["rm", "-f", sandbox.as_str()])
            .await
        {
            Ok(output) if !output.status.success() => {
                tracing::warn!(
                    "failed to remove sandbox {}: {}",
                    sandbox,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => tracing::warn!("failed to remove sandbox {}: {}", sandbox, e),
            Ok(_) => {
                tracing::info!("destroyed sandbox {}", sandbox);
            }
        }
    }

    async fn probe(&self, sandbox: &SandboxId) -> bool {
        let request =
            ExecRequest::new("true").with_timeout(Duration::from_millis(PROBE_TIMEOUT_MS));
        match self.exec(sandbox, request).await {
            Ok(output) => output.success(),
            Err(_) => false,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Single-quote `raw` for safe interpolation into a shell command line.
fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

/// Match `stderr` against the known engine-failure markers.
fn engine_failure(stderr: &str) -> Option<String> {
    ENGINE_FAILURE_MARKERS
        .iter()
        .find(|marker| stderr.contains(*marker))
        .map(|_| stderr.trim().to_string())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote_plain() {
        assert_eq!(shell_quote("echo hi"), "'echo hi'");
    }

    #[test]
    fn test_shell_quote_embedded_quote() {
        assert_eq!(shell_quote("echo 'hi'"), r"'echo '\''hi'\'''");
    }

    #[test]
    fn test_engine_failure_detection() {
        assert!(engine_failure("Cannot connect to the Docker daemon at unix:///x").is_some());
        assert!(engine_failure("Error: No such container: cr-abc").is_some());
        assert!(engine_failure("Traceback (most recent call last):").is_none());
    }
}
