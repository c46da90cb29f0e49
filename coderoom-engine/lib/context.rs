//! Execution context management.
//!
//! An execution context is the private sandbox bound to one
//! `(owner, language)` pair. The manager owns the registry of contexts and
//! is the only component allowed to mutate it: creation on first use,
//! probe-verified reuse, stale recovery, per-owner LRU quota eviction, and
//! idle sweeps all happen here.
//!
//! Every operation against one context serializes on that context's own
//! async lock, so concurrent `run`/`install` calls addressing the same pair
//! queue strictly while distinct contexts proceed in parallel. The sweep
//! takes the same lock before destroying anything, which is what keeps a
//! context that is mid-run from being torn down underneath its caller.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use getset::Getters;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use coderoom_utils::{Clock, SANDBOX_WORKDIR};

use crate::{
    config::EngineConfig,
    error::{EngineError, EngineResult},
    languages::{Language, LanguageRegistry},
    payload::{RunOutput, RunRequest},
    runtime::{ContainerRuntime, ExecRequest, SandboxId},
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Registry key of a context: one owner, one language.
pub type ContextKey = (String, Language);

/// Snapshot of one live execution context.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ContextState {
    /// Engine-assigned context id.
    context_id: String,

    /// The owning user.
    owner_id: String,

    /// The context's language.
    language: Language,

    /// The sandbox backing this context.
    sandbox_id: SandboxId,

    /// Working directory inside the sandbox.
    workdir: String,

    /// Packages installed into this context so far.
    installed_packages: HashSet<String>,

    /// When the context was created.
    created_at: Instant,

    /// When the context last ran code or installed a package.
    last_used_at: Instant,
}

/// One context slot: the per-key serialization lock plus the current state.
/// The slot outlives evictions; a `None` state means the slot is between
/// sandboxes (being created, or already torn down).
#[derive(Debug, Default)]
pub(crate) struct ContextSlot {
    exec_lock: AsyncMutex<()>,
    meta: Mutex<Option<ContextState>>,
}

/// Caller-facing handle to a context. Holding a handle does not keep the
/// context alive; eviction invalidates it and later operations fail with
/// [`EngineError::ContextNotFound`].
#[derive(Debug, Clone)]
pub struct ContextHandle {
    key: ContextKey,
    pub(crate) slot: Arc<ContextSlot>,
}

/// Owner of the `(owner, language) → context` registry.
pub struct ContextManager {
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<LanguageRegistry>,
    config: Arc<EngineConfig>,
    clock: Arc<dyn Clock>,
    contexts: Mutex<HashMap<ContextKey, Arc<ContextSlot>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods: ContextSlot
//--------------------------------------------------------------------------------------------------

impl ContextSlot {
    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.exec_lock.lock().await
    }

    pub(crate) fn snapshot(&self) -> Option<ContextState> {
        self.meta.lock().unwrap().clone()
    }

    pub(crate) fn last_used(&self) -> Option<Instant> {
        self.meta.lock().unwrap().as_ref().map(|s| s.last_used_at)
    }

    pub(crate) fn touch(&self, now: Instant) {
        if let Some(state) = self.meta.lock().unwrap().as_mut() {
            state.last_used_at = now;
        }
    }

    pub(crate) fn record_installed(&self, package: &str, now: Instant) {
        if let Some(state) = self.meta.lock().unwrap().as_mut() {
            state.installed_packages.insert(package.to_string());
            state.last_used_at = now;
        }
    }

    fn set(&self, state: ContextState) {
        *self.meta.lock().unwrap() = Some(state);
    }

    pub(crate) fn take_state(&self) -> Option<ContextState> {
        self.meta.lock().unwrap().take()
    }
}

//--------------------------------------------------------------------------------------------------
// Methods: ContextHandle
//--------------------------------------------------------------------------------------------------

impl ContextHandle {
    /// The owning user.
    pub fn owner_id(&self) -> &str {
        &self.key.0
    }

    /// The context's language.
    pub fn language(&self) -> Language {
        self.key.1
    }

    /// Snapshot of the live context, if it still exists.
    pub fn describe(&self) -> Option<ContextState> {
        self.slot.snapshot()
    }

    /// The backing sandbox id, if the context is still live.
    pub fn sandbox_id(&self) -> Option<SandboxId> {
        self.slot.snapshot().map(|s| s.sandbox_id)
    }
}

//--------------------------------------------------------------------------------------------------
// Methods: ContextManager
//--------------------------------------------------------------------------------------------------

impl ContextManager {
    /// Create a manager over the given runtime and language catalog.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        registry: Arc<LanguageRegistry>,
        config: Arc<EngineConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            runtime,
            registry,
            config,
            clock,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// The language catalog backing this manager.
    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// Resolve the context for `(owner, language)`, creating it when absent
    /// and transparently recreating it when the existing sandbox fails its
    /// liveness probe. At the per-owner quota, the least-recently-used
    /// context of that owner is evicted before the new one is created.
    pub async fn get_or_create(&self, owner: &str, language: Language) -> EngineResult<ContextHandle> {
        let profile = self.registry.get(language)?.clone();
        let key: ContextKey = (owner.to_string(), language);

        let (slot, victims) = {
            let mut map = self.contexts.lock().unwrap();
            match map.get(&key) {
                Some(slot) => (slot.clone(), Vec::new()),
                None => {
                    // Every map entry of this owner counts toward the quota,
                    // including slots whose sandbox is still being created.
                    let mut owned: Vec<(ContextKey, Arc<ContextSlot>, Instant)> = map
                        .iter()
                        .filter(|((entry_owner, _), _)| entry_owner == owner)
                        .filter_map(|(k, s)| s.last_used().map(|t| (k.clone(), s.clone(), t)))
                        .collect();

                    let mut victims = Vec::new();
                    let occupied = map
                        .keys()
                        .filter(|(entry_owner, _)| entry_owner == owner)
                        .count();
                    if occupied >= *self.config.get_max_contexts_per_owner() {
                        owned.sort_by_key(|(_, _, last_used)| *last_used);
                        let excess = occupied + 1 - self.config.get_max_contexts_per_owner();
                        for (victim_key, victim_slot, _) in owned.into_iter().take(excess) {
                            map.remove(&victim_key);
                            victims.push((victim_key, victim_slot));
                        }
                    }

                    let slot = Arc::new(ContextSlot::default());
                    map.insert(key.clone(), slot.clone());
                    (slot, victims)
                }
            }
        };

        for (victim_key, victim_slot) in victims {
            let _guard = victim_slot.lock().await;
            if let Some(state) = victim_slot.take_state() {
                tracing::info!(
                    "evicting least-recently-used context {} (owner {}, language {})",
                    state.context_id,
                    victim_key.0,
                    victim_key.1
                );
                self.runtime.destroy(&state.sandbox_id).await;
            }
        }

        let _guard = slot.lock().await;

        let mut was_stale = false;
        if let Some(state) = slot.snapshot() {
            if self.runtime.probe(&state.sandbox_id).await {
                slot.touch(self.clock.now());
                return Ok(ContextHandle {
                    key,
                    slot: slot.clone(),
                });
            }

            tracing::warn!(
                "context {} failed its liveness probe, recreating sandbox",
                state.context_id
            );
            was_stale = true;
            self.runtime.destroy(&state.sandbox_id).await;
            slot.take_state();
        }

        let sandbox_id = match self.runtime.create(&profile, true).await {
            Ok(id) => id,
            Err(e) if was_stale => {
                return Err(EngineError::ContextStale(format!(
                    "recreation for owner {} failed: {}",
                    owner, e
                )));
            }
            Err(e) => return Err(e),
        };

        let now = self.clock.now();
        let state = ContextState {
            context_id: format!("ctx-{}", short_id()),
            owner_id: owner.to_string(),
            language,
            sandbox_id,
            workdir: SANDBOX_WORKDIR.to_string(),
            installed_packages: HashSet::new(),
            created_at: now,
            last_used_at: now,
        };
        tracing::info!(
            "created context {} (owner {}, language {})",
            state.context_id,
            owner,
            language
        );
        slot.set(state);

        Ok(ContextHandle {
            key,
            slot: slot.clone(),
        })
    }

    /// Run one code submission inside the context: stage the source file,
    /// render the profile's run command, pipe stdin, execute within the
    /// profile's timeout, and report files the run newly created.
    pub async fn run(&self, handle: &ContextHandle, request: RunRequest) -> EngineResult<RunOutput> {
        let profile = self.registry.get(handle.language())?.clone();

        let _guard = handle.slot.lock().await;
        let state = handle
            .slot
            .snapshot()
            .ok_or_else(|| EngineError::ContextNotFound(handle.key_display()))?;

        let filename = match request.filename {
            Some(name) => {
                validate_filename(&name)?;
                name
            }
            None => format!("snippet-{}.{}", short_id(), profile.get_extension()),
        };

        let staged = self
            .runtime
            .exec(
                &state.sandbox_id,
                ExecRequest::new(format!("cat > {}", filename)).with_stdin(request.code),
            )
            .await?;
        if !staged.success() {
            return Err(EngineError::ContainerUnavailable(format!(
                "failed to stage source file {}: {}",
                filename,
                staged.stderr.trim()
            )));
        }

        let before = self.list_workdir(&state.sandbox_id).await;

        let profile_timeout = *profile.get_exec_timeout_ms();
        let timeout_ms = request
            .timeout_ms
            .unwrap_or(profile_timeout)
            .min(profile_timeout);

        let mut exec = ExecRequest::new(profile.run_command(&filename))
            .with_timeout(Duration::from_millis(timeout_ms));
        if let Some(stdin) = request.stdin {
            exec = exec.with_stdin(stdin);
        }

        let result = self.runtime.exec(&state.sandbox_id, exec).await;

        // The sandbox was used whether or not the program succeeded.
        handle.slot.touch(self.clock.now());

        let output = result?;

        let created_files = match (before, self.list_workdir(&state.sandbox_id).await) {
            (Some(before), Some(after)) => {
                let mut created: Vec<String> = after
                    .difference(&before)
                    .filter(|name| **name != filename)
                    .cloned()
                    .collect();
                created.sort();
                created
            }
            _ => Vec::new(),
        };

        Ok(RunOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            created_files,
        })
    }

    /// Destroy one context and its sandbox.
    pub async fn destroy(&self, handle: &ContextHandle) -> EngineResult<()> {
        let _guard = handle.slot.lock().await;

        let state = handle
            .slot
            .take_state()
            .ok_or_else(|| EngineError::ContextNotFound(handle.key_display()))?;

        tracing::info!("destroying context {} on request", state.context_id);
        self.runtime.destroy(&state.sandbox_id).await;
        self.remove_entry(&handle.key, &handle.slot);
        Ok(())
    }

    /// Destroy every context idle past the configured threshold. Returns the
    /// number destroyed. Contexts touched between the snapshot and the
    /// per-slot lock are spared.
    pub async fn sweep_idle(&self) -> usize {
        let threshold = *self.config.get_context_idle_timeout();
        let now = self.clock.now();

        let candidates: Vec<(ContextKey, Arc<ContextSlot>)> = {
            let map = self.contexts.lock().unwrap();
            map.iter()
                .filter(|(_, slot)| {
                    slot.last_used()
                        .map(|t| now.duration_since(t) >= threshold)
                        .unwrap_or(false)
                })
                .map(|(k, s)| (k.clone(), s.clone()))
                .collect()
        };

        let mut destroyed = 0;
        for (key, slot) in candidates {
            let _guard = slot.lock().await;

            let still_stale = slot
                .last_used()
                .map(|t| self.clock.now().duration_since(t) >= threshold)
                .unwrap_or(false);
            if !still_stale {
                continue;
            }

            if let Some(state) = slot.take_state() {
                tracing::info!(
                    "destroying idle context {} (owner {}, language {})",
                    state.context_id,
                    key.0,
                    key.1
                );
                self.runtime.destroy(&state.sandbox_id).await;
                destroyed += 1;
            }
            self.remove_entry(&key, &slot);
        }

        destroyed
    }

    /// Destroy every context. Used for graceful shutdown.
    pub async fn destroy_all(&self) -> usize {
        let entries: Vec<(ContextKey, Arc<ContextSlot>)> = {
            let mut map = self.contexts.lock().unwrap();
            map.drain().collect()
        };

        let mut destroyed = 0;
        for (_, slot) in entries {
            let _guard = slot.lock().await;
            if let Some(state) = slot.take_state() {
                self.runtime.destroy(&state.sandbox_id).await;
                destroyed += 1;
            }
        }
        destroyed
    }

    /// Live context count and distinct owner count.
    pub fn counts(&self) -> (usize, usize) {
        let map = self.contexts.lock().unwrap();
        let live: Vec<&ContextKey> = map
            .iter()
            .filter(|(_, slot)| slot.last_used().is_some())
            .map(|(k, _)| k)
            .collect();
        let owners: HashSet<&str> = live.iter().map(|(owner, _)| owner.as_str()).collect();
        (live.len(), owners.len())
    }

    async fn list_workdir(&self, sandbox: &SandboxId) -> Option<HashSet<String>> {
        let request = ExecRequest::new(format!("ls -1A {}", SANDBOX_WORKDIR));
        match self.runtime.exec(sandbox, request).await {
            Ok(output) if output.success() => Some(
                output
                    .stdout
                    .lines()
                    .map(|line| line.trim().to_string())
                    .filter(|line| !line.is_empty())
                    .collect(),
            ),
            Ok(output) => {
                tracing::debug!(
                    "working directory listing exited {}: {}",
                    output.exit_code,
                    output.stderr.trim()
                );
                None
            }
            Err(e) => {
                tracing::debug!("working directory listing failed: {}", e);
                None
            }
        }
    }

    fn remove_entry(&self, key: &ContextKey, slot: &Arc<ContextSlot>) {
        let mut map = self.contexts.lock().unwrap();
        if let Some(current) = map.get(key) {
            if Arc::ptr_eq(current, slot) {
                map.remove(key);
            }
        }
    }
}

impl ContextHandle {
    fn key_display(&self) -> String {
        format!("{}/{}", self.key.0, self.key.1)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn short_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// Reject filenames that could escape the working directory or confuse the
/// run command line.
fn validate_filename(name: &str) -> EngineResult<()> {
    if name.is_empty() {
        return Err(EngineError::InvalidInput(
            "filename cannot be empty".to_string(),
        ));
    }
    if name.len() > 128 {
        return Err(EngineError::InvalidInput(
            "filename cannot exceed 128 characters".to_string(),
        ));
    }

    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_');
    if !valid_chars {
        return Err(EngineError::InvalidInput(
            "filename can only contain alphanumeric characters, dots, hyphens, or underscores"
                .to_string(),
        ));
    }

    match name.chars().next() {
        Some(first) if first.is_ascii_alphanumeric() => Ok(()),
        _ => Err(EngineError::InvalidInput(
            "filename must start with an alphanumeric character".to_string(),
        )),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::FakeRuntime;
    use coderoom_utils::ManualClock;

    fn test_manager(runtime: Arc<FakeRuntime>, clock: Arc<ManualClock>) -> ContextManager {
        ContextManager::new(
            runtime,
            Arc::new(LanguageRegistry::builtin()),
            Arc::new(EngineConfig::default()),
            clock,
        )
    }

    fn quota_manager(
        runtime: Arc<FakeRuntime>,
        clock: Arc<ManualClock>,
        quota: usize,
    ) -> ContextManager {
        let config = EngineConfig::default().with_max_contexts_per_owner(quota);
        ContextManager::new(
            runtime,
            Arc::new(LanguageRegistry::builtin()),
            Arc::new(config),
            clock,
        )
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent_while_alive() {
        let runtime = Arc::new(FakeRuntime::new());
        let manager = test_manager(runtime.clone(), Arc::new(ManualClock::new()));

        let first = manager.get_or_create("alice", Language::Python).await.unwrap();
        let second = manager.get_or_create("alice", Language::Python).await.unwrap();

        assert_eq!(first.sandbox_id(), second.sandbox_id());
        assert_eq!(runtime.created_count(), 1);
    }

    #[tokio::test]
    async fn test_distinct_languages_get_distinct_contexts() {
        let runtime = Arc::new(FakeRuntime::new());
        let manager = test_manager(runtime.clone(), Arc::new(ManualClock::new()));

        let python = manager.get_or_create("alice", Language::Python).await.unwrap();
        let js = manager.get_or_create("alice", Language::JavaScript).await.unwrap();

        assert_ne!(python.sandbox_id(), js.sandbox_id());
        assert_eq!(runtime.created_count(), 2);
    }

    #[tokio::test]
    async fn test_stale_context_is_recreated_transparently() {
        let runtime = Arc::new(FakeRuntime::new());
        let manager = test_manager(runtime.clone(), Arc::new(ManualClock::new()));

        let first = manager.get_or_create("alice", Language::Python).await.unwrap();
        let first_sandbox = first.sandbox_id().unwrap();

        runtime.kill_sandbox(&first_sandbox);

        let second = manager.get_or_create("alice", Language::Python).await.unwrap();
        let second_sandbox = second.sandbox_id().unwrap();

        assert_ne!(first_sandbox, second_sandbox);
        assert_eq!(runtime.created_count(), 2);
        assert!(runtime.destroyed().contains(&first_sandbox.as_str().to_string()));
    }

    #[tokio::test]
    async fn test_quota_evicts_least_recently_used() {
        let runtime = Arc::new(FakeRuntime::new());
        let clock = Arc::new(ManualClock::new());
        let manager = quota_manager(runtime.clone(), clock.clone(), 2);

        let python = manager.get_or_create("alice", Language::Python).await.unwrap();
        clock.advance(Duration::from_secs(10));
        let js = manager.get_or_create("alice", Language::JavaScript).await.unwrap();
        let js_sandbox = js.sandbox_id().unwrap();

        // Touch python so javascript becomes the LRU.
        clock.advance(Duration::from_secs(10));
        manager.get_or_create("alice", Language::Python).await.unwrap();
        assert_eq!(runtime.created_count(), 2);

        clock.advance(Duration::from_secs(10));
        let ts = manager.get_or_create("alice", Language::TypeScript).await.unwrap();

        assert!(ts.sandbox_id().is_some());
        assert_eq!(runtime.created_count(), 3);
        assert!(runtime.destroyed().contains(&js_sandbox.as_str().to_string()));
        assert!(python.sandbox_id().is_some());
        assert!(js.sandbox_id().is_none());
    }

    #[tokio::test]
    async fn test_quota_is_per_owner() {
        let runtime = Arc::new(FakeRuntime::new());
        let clock = Arc::new(ManualClock::new());
        let manager = quota_manager(runtime.clone(), clock, 1);

        manager.get_or_create("alice", Language::Python).await.unwrap();
        manager.get_or_create("bob", Language::Python).await.unwrap();

        assert_eq!(runtime.created_count(), 2);
        assert!(runtime.destroyed().is_empty());
    }

    #[tokio::test]
    async fn test_run_stages_file_and_executes() {
        let runtime = Arc::new(FakeRuntime::new());
        let manager = test_manager(runtime.clone(), Arc::new(ManualClock::new()));

        let handle = manager.get_or_create("alice", Language::Python).await.unwrap();

        runtime.push_exec_output("", "", 0); // cat > main.py
        runtime.push_exec_output("main.py\n", "", 0); // listing before
        runtime.push_exec_output("hello\n", "", 0); // the run itself
        runtime.push_exec_output("main.py\nresult.txt\n", "", 0); // listing after

        let output = manager
            .run(
                &handle,
                RunRequest {
                    code: "print('hello')".to_string(),
                    filename: Some("main.py".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.created_files, vec!["result.txt".to_string()]);

        let commands = runtime.exec_commands();
        assert!(commands.iter().any(|c| c == "cat > main.py"));
        assert!(commands.iter().any(|c| c == "python3 -u main.py"));
    }

    #[tokio::test]
    async fn test_run_nonzero_exit_is_a_normal_result() {
        let runtime = Arc::new(FakeRuntime::new());
        let manager = test_manager(runtime.clone(), Arc::new(ManualClock::new()));

        let handle = manager.get_or_create("alice", Language::Python).await.unwrap();

        runtime.push_exec_output("", "", 0);
        runtime.push_exec_output("", "", 0);
        runtime.push_exec_output("", "ZeroDivisionError: division by zero\n", 1);
        runtime.push_exec_output("", "", 0);

        let output = manager
            .run(
                &handle,
                RunRequest {
                    code: "raise ZeroDivisionError".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(output.exit_code, 1);
        assert!(!output.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_run_timeout_surfaces_as_distinct_error() {
        let runtime = Arc::new(FakeRuntime::new());
        let manager = test_manager(runtime.clone(), Arc::new(ManualClock::new()));

        let handle = manager.get_or_create("alice", Language::Python).await.unwrap();

        runtime.push_exec_output("", "", 0);
        runtime.push_exec_output("", "", 0);
        runtime.push_exec_result(Err(EngineError::ExecutionTimeout(100)));

        let result = manager
            .run(
                &handle,
                RunRequest {
                    code: "while True: pass".to_string(),
                    timeout_ms: Some(100),
                    ..Default::default()
                },
            )
            .await;

        assert!(matches!(result, Err(EngineError::ExecutionTimeout(100))));
    }

    #[tokio::test]
    async fn test_run_rejects_traversal_filenames() {
        let runtime = Arc::new(FakeRuntime::new());
        let manager = test_manager(runtime.clone(), Arc::new(ManualClock::new()));

        let handle = manager.get_or_create("alice", Language::Python).await.unwrap();

        let result = manager
            .run(
                &handle,
                RunRequest {
                    code: "print(1)".to_string(),
                    filename: Some("../../etc/passwd".to_string()),
                    ..Default::default()
                },
            )
            .await;

        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_destroy_invalidates_handle() {
        let runtime = Arc::new(FakeRuntime::new());
        let manager = test_manager(runtime.clone(), Arc::new(ManualClock::new()));

        let handle = manager.get_or_create("alice", Language::Python).await.unwrap();
        manager.destroy(&handle).await.unwrap();

        let result = manager
            .run(
                &handle,
                RunRequest {
                    code: "print(1)".to_string(),
                    ..Default::default()
                },
            )
            .await;

        assert!(matches!(result, Err(EngineError::ContextNotFound(_))));
        assert_eq!(runtime.destroyed().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_destroys_idle_spares_fresh() {
        let runtime = Arc::new(FakeRuntime::new());
        let clock = Arc::new(ManualClock::new());
        let manager = test_manager(runtime.clone(), clock.clone());

        manager.get_or_create("alice", Language::Python).await.unwrap();
        clock.advance(Duration::from_secs(1700));
        manager.get_or_create("bob", Language::Python).await.unwrap();

        // alice idle 1800s+ now, bob only 101s.
        clock.advance(Duration::from_secs(101));
        let destroyed = manager.sweep_idle().await;

        assert_eq!(destroyed, 1);
        let (live, owners) = manager.counts();
        assert_eq!(live, 1);
        assert_eq!(owners, 1);
    }

    #[tokio::test]
    async fn test_counts_reports_live_contexts_and_owners() {
        let runtime = Arc::new(FakeRuntime::new());
        let manager = test_manager(runtime, Arc::new(ManualClock::new()));

        manager.get_or_create("alice", Language::Python).await.unwrap();
        manager.get_or_create("alice", Language::JavaScript).await.unwrap();
        manager.get_or_create("bob", Language::Python).await.unwrap();

        assert_eq!(manager.counts(), (3, 2));
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("main.py").is_ok());
        assert!(validate_filename("my_script-2.js").is_ok());
        assert!(validate_filename("").is_err());
        assert!(validate_filename("../escape.py").is_err());
        assert!(validate_filename("dir/file.py").is_err());
        assert!(validate_filename("-rf.py").is_err());
        assert!(validate_filename("has space.py").is_err());
    }
}
