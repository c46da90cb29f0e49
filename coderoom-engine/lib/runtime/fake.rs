//! In-memory container runtime used by the engine's tests.
//!
//! Records every create/exec/destroy call, lets tests queue exec results,
//! kill sandboxes under a reused context, and flip the whole engine into an
//! unavailable state. The interactive shell is a loopback that echoes input
//! back as stdout chunks, which gives room tests a deterministic output
//! source.

use std::{
    collections::{HashSet, VecDeque},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    error::{EngineError, EngineResult},
    languages::LanguageProfile,
};

use super::{ContainerRuntime, ExecOutput, ExecRequest, SandboxId, ShellChunk, ShellStream};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Scriptable in-memory [`ContainerRuntime`].
#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

#[derive(Debug, Default)]
struct FakeState {
    create_count: usize,
    alive: HashSet<String>,
    destroyed: Vec<String>,
    exec_log: Vec<(String, String)>,
    exec_results: VecDeque<EngineResult<ExecOutput>>,
    unavailable: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FakeRuntime {
    /// A fresh fake with no scripted behavior: every exec succeeds with
    /// empty output and exit code zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result returned by the next unscripted exec call.
    pub fn push_exec_result(&self, result: EngineResult<ExecOutput>) {
        self.state.lock().unwrap().exec_results.push_back(result);
    }

    /// Queue a successful exec result with the given streams and exit code.
    pub fn push_exec_output(&self, stdout: &str, stderr: &str, exit_code: i32) {
        self.push_exec_result(Ok(ExecOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
            duration: Duration::from_millis(1),
        }));
    }

    /// Mark a sandbox dead so its next probe fails.
    pub fn kill_sandbox(&self, sandbox: &SandboxId) {
        self.state.lock().unwrap().alive.remove(sandbox.as_str());
    }

    /// Flip engine availability.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Number of sandbox-create calls issued so far.
    pub fn created_count(&self) -> usize {
        self.state.lock().unwrap().create_count
    }

    /// Ids of destroyed sandboxes in destruction order.
    pub fn destroyed(&self) -> Vec<String> {
        self.state.lock().unwrap().destroyed.clone()
    }

    /// Commands issued through exec, in order.
    pub fn exec_commands(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .exec_log
            .iter()
            .map(|(_, command)| command.clone())
            .collect()
    }

    /// Whether the sandbox is currently alive.
    pub fn is_alive(&self, sandbox: &SandboxId) -> bool {
        self.state.lock().unwrap().alive.contains(sandbox.as_str())
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create(
        &self,
        profile: &LanguageProfile,
        _persistent: bool,
    ) -> EngineResult<SandboxId> {
        let mut state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(EngineError::ContainerUnavailable(
                "engine offline".to_string(),
            ));
        }

        state.create_count += 1;
        let id = format!("fake-{}-{}", profile.get_language(), state.create_count);
        state.alive.insert(id.clone());
        Ok(SandboxId::new(id))
    }

    async fn exec(&self, sandbox: &SandboxId, request: ExecRequest) -> EngineResult<ExecOutput> {
        let mut state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(EngineError::ContainerUnavailable(
                "engine offline".to_string(),
            ));
        }
        if !state.alive.contains(sandbox.as_str()) {
            return Err(EngineError::ContainerUnavailable(format!(
                "no such container: {}",
                sandbox
            )));
        }

        state
            .exec_log
            .push((sandbox.as_str().to_string(), request.command.clone()));

        state.exec_results.pop_front().unwrap_or_else(|| {
            Ok(ExecOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
                duration: Duration::from_millis(1),
            })
        })
    }

    async fn attach_shell(&self, sandbox: &SandboxId) -> EngineResult<ShellStream> {
        if !self.is_alive(sandbox) {
            return Err(EngineError::ContainerUnavailable(format!(
                "no such container: {}",
                sandbox
            )));
        }

        let (input_tx, mut input_rx) = mpsc::channel::<Vec<u8>>(64);
        let (output_tx, output_rx) = mpsc::channel::<ShellChunk>(256);

        // Loopback shell: every input line comes back as stdout.
        tokio::spawn(async move {
            while let Some(bytes) = input_rx.recv().await {
                if output_tx.send(ShellChunk::Stdout(bytes)).await.is_err() {
                    break;
                }
            }
            let _ = output_tx.send(ShellChunk::Closed).await;
        });

        Ok(ShellStream::new(input_tx, output_rx))
    }

    async fn destroy(&self, sandbox: &SandboxId) {
        let mut state = self.state.lock().unwrap();
        state.alive.remove(sandbox.as_str());
        state.destroyed.push(sandbox.as_str().to_string());
    }

    async fn probe(&self, sandbox: &SandboxId) -> bool {
        let state = self.state.lock().unwrap();
        !state.unavailable && state.alive.contains(sandbox.as_str())
    }
}
