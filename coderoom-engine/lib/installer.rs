//! Idempotent per-context package installation.
//!
//! Installs are tracked against the owning execution context: names already
//! installed are never re-issued, duplicates within one batch collapse to a
//! single command, and the first failing install aborts the rest of the
//! batch while keeping everything that already succeeded. Results are
//! reported per package.

use std::{collections::HashSet, sync::Arc, time::Duration};

use coderoom_utils::{Clock, DEFAULT_INSTALL_TIMEOUT_MS, HEAVY_INSTALL_TIMEOUT_MULTIPLIER};

use crate::{
    context::ContextHandle,
    error::{EngineError, EngineResult},
    languages::LanguageRegistry,
    payload::InstallOutcome,
    runtime::{ContainerRuntime, ExecRequest},
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Installs packages into execution contexts.
pub struct PackageInstaller {
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<LanguageRegistry>,
    clock: Arc<dyn Clock>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PackageInstaller {
    /// Create an installer over the given runtime and catalog.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        registry: Arc<LanguageRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            runtime,
            registry,
            clock,
        }
    }

    /// Install `names` into the context, one command per not-yet-installed
    /// package, aborting the remainder of the batch on the first failure.
    /// Runs under the context's serialization lock, so installs never
    /// interleave with code runs on the same context.
    pub async fn install(
        &self,
        handle: &ContextHandle,
        names: &[String],
    ) -> EngineResult<Vec<InstallOutcome>> {
        let profile = self.registry.get(handle.language())?.clone();

        if profile.get_install_template().is_none() {
            return Err(EngineError::PackageInstallUnsupported(
                handle.language().to_string(),
            ));
        }

        let _guard = handle.slot.lock().await;
        let state = handle.slot.snapshot().ok_or_else(|| {
            EngineError::ContextNotFound(format!("{}/{}", handle.owner_id(), handle.language()))
        })?;

        let mut outcomes = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut aborted = false;

        for name in names {
            // Duplicates within one batch collapse to a single entry.
            if !seen.insert(name.as_str()) {
                continue;
            }

            if aborted {
                outcomes.push(InstallOutcome::failed(
                    name.clone(),
                    "not attempted: an earlier package in the batch failed",
                ));
                continue;
            }

            if state.get_installed_packages().contains(name) {
                tracing::debug!(
                    "package {} already installed in context {}",
                    name,
                    state.get_context_id()
                );
                outcomes.push(InstallOutcome::ok(name.clone()));
                continue;
            }

            validate_package_name(name)?;

            // install_command is Some for this profile, checked above.
            let Some(command) = profile.install_command(name) else {
                continue;
            };

            let mut timeout = Duration::from_millis(DEFAULT_INSTALL_TIMEOUT_MS);
            if profile.is_build_heavy(name) {
                timeout *= HEAVY_INSTALL_TIMEOUT_MULTIPLIER;
            }

            let result = self
                .runtime
                .exec(
                    state.get_sandbox_id(),
                    ExecRequest::new(command).with_timeout(timeout),
                )
                .await;

            match result {
                Ok(output) if output.success() => {
                    tracing::info!(
                        "installed package {} into context {}",
                        name,
                        state.get_context_id()
                    );
                    handle.slot.record_installed(name, self.clock.now());
                    outcomes.push(InstallOutcome::ok(name.clone()));
                }
                Ok(output) => {
                    tracing::warn!(
                        "package {} failed to install in context {}: {}",
                        name,
                        state.get_context_id(),
                        output.stderr.trim()
                    );
                    outcomes.push(InstallOutcome::failed(
                        name.clone(),
                        first_line(&output.stderr),
                    ));
                    aborted = true;
                }
                Err(e) => {
                    tracing::warn!(
                        "package {} install errored in context {}: {}",
                        name,
                        state.get_context_id(),
                        e
                    );
                    outcomes.push(InstallOutcome::failed(name.clone(), e.to_string()));
                    aborted = true;
                }
            }
        }

        handle.slot.touch(self.clock.now());
        Ok(outcomes)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn first_line(text: &str) -> String {
    let line = text.lines().next().unwrap_or("install command failed");
    if line.trim().is_empty() {
        "install command failed".to_string()
    } else {
        line.trim().to_string()
    }
}

/// Package names reach a shell command line, so the charset is tight.
fn validate_package_name(name: &str) -> EngineResult<()> {
    if name.is_empty() || name.len() > 128 {
        return Err(EngineError::InvalidInput(
            "package name must be between 1 and 128 characters".to_string(),
        ));
    }

    let valid_chars = name.chars().all(|c| {
        c.is_ascii_alphanumeric()
            || c == '-'
            || c == '_'
            || c == '.'
            || c == '@'
            || c == '/'
            || c == '='
    });
    if !valid_chars {
        return Err(EngineError::InvalidInput(format!(
            "package name '{}' contains invalid characters",
            name
        )));
    }

    match name.chars().next() {
        Some(first) if first.is_ascii_alphanumeric() || first == '@' => Ok(()),
        _ => Err(EngineError::InvalidInput(format!(
            "package name '{}' must start with an alphanumeric character",
            name
        ))),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
