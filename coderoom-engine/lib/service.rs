//! The assembled engine surface.
//!
//! [`CodeRoomService`] wires the language catalog, container runtime,
//! context manager, package installer, room manager, and cleanup scheduler
//! together and exposes the operation set the surrounding platform calls.
//! Everything behind it stays crate-internal state owned by the managers.

use std::sync::Arc;

use getset::Getters;
use tokio::task::JoinHandle;

use coderoom_utils::{Clock, SystemClock};

use crate::{
    cleanup::CleanupScheduler,
    config::EngineConfig,
    context::{ContextHandle, ContextManager},
    error::EngineResult,
    installer::PackageInstaller,
    languages::LanguageRegistry,
    membership::MembershipAuthority,
    payload::{CleanupStats, EngineStats, InstallOutcome, LanguageInfo, RunOutput, RunRequest},
    room::{RoomManager, SessionHandle},
    runtime::{ContainerRuntime, DockerCli},
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The engine facade handed to the surrounding service.
#[derive(Getters)]
#[getset(get = "pub with_prefix")]
pub struct CodeRoomService {
    /// The engine configuration.
    config: Arc<EngineConfig>,

    /// The validated language catalog.
    registry: Arc<LanguageRegistry>,

    /// The execution context manager.
    contexts: Arc<ContextManager>,

    /// The package installer.
    installer: Arc<PackageInstaller>,

    /// The room manager.
    rooms: Arc<RoomManager>,

    /// The cleanup scheduler.
    cleanup: Arc<CleanupScheduler>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl CodeRoomService {
    /// Assemble the engine with the production container runtime and the
    /// system clock. The language catalog is the built-in one, merged with
    /// the override file when the configuration names one.
    pub fn new(
        config: EngineConfig,
        membership: Arc<dyn MembershipAuthority>,
    ) -> EngineResult<Self> {
        let runtime = Arc::new(DockerCli::from_config(&config));
        Self::with_runtime(config, membership, runtime, Arc::new(SystemClock))
    }

    /// Assemble the engine over an explicit runtime and clock. This is the
    /// seam tests and alternative engines plug into.
    pub fn with_runtime(
        config: EngineConfig,
        membership: Arc<dyn MembershipAuthority>,
        runtime: Arc<dyn ContainerRuntime>,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let mut registry = LanguageRegistry::builtin();
        if let Some(path) = config.get_language_catalog_path() {
            registry = registry.with_overrides_file(path)?;
        }
        let registry = Arc::new(registry);
        let config = Arc::new(config);

        let contexts = Arc::new(ContextManager::new(
            runtime.clone(),
            registry.clone(),
            config.clone(),
            clock.clone(),
        ));
        let installer = Arc::new(PackageInstaller::new(
            runtime.clone(),
            registry.clone(),
            clock.clone(),
        ));
        let rooms = Arc::new(RoomManager::new(
            runtime,
            registry.clone(),
            membership,
            config.clone(),
            clock,
        ));
        let cleanup = Arc::new(CleanupScheduler::new(
            contexts.clone(),
            rooms.clone(),
            config.clone(),
        ));

        Ok(Self {
            config,
            registry,
            contexts,
            installer,
            rooms,
            cleanup,
        })
    }

    /// The active language catalog.
    pub fn list_languages(&self) -> Vec<LanguageInfo> {
        self.registry.language_infos()
    }

    /// Resolve (or create) the private context for `(owner, language)`.
    pub async fn get_or_create_context(
        &self,
        owner_id: &str,
        language: &str,
    ) -> EngineResult<ContextHandle> {
        let profile = self.registry.lookup(language)?;
        self.contexts
            .get_or_create(owner_id, *profile.get_language())
            .await
    }

    /// Run code inside a context.
    pub async fn run_code(
        &self,
        handle: &ContextHandle,
        request: RunRequest,
    ) -> EngineResult<RunOutput> {
        self.contexts.run(handle, request).await
    }

    /// Install packages into a context.
    pub async fn install_packages(
        &self,
        handle: &ContextHandle,
        names: &[String],
    ) -> EngineResult<Vec<InstallOutcome>> {
        self.installer.install(handle, names).await
    }

    /// Destroy a context on request.
    pub async fn destroy_context(&self, handle: &ContextHandle) -> EngineResult<()> {
        self.contexts.destroy(handle).await
    }

    /// Join a collaboration room, creating its shared sandbox on first join.
    pub async fn join_room(&self, room_id: &str, owner_id: &str) -> EngineResult<SessionHandle> {
        self.rooms.join(room_id, owner_id).await
    }

    /// Send input bytes to a room's shared terminal.
    pub async fn send_room_input(
        &self,
        session: &SessionHandle,
        bytes: Vec<u8>,
    ) -> EngineResult<()> {
        session.send_input(bytes).await
    }

    /// Detach a session from its room.
    pub async fn leave_room(&self, session: &SessionHandle) -> EngineResult<()> {
        self.rooms.leave(session).await
    }

    /// Start the background cleanup sweeps.
    pub fn start_cleanup(&self) -> (JoinHandle<()>, JoinHandle<()>) {
        self.cleanup.start()
    }

    /// Run both sweeps once, immediately.
    pub async fn sweep_now(&self) -> CleanupStats {
        self.cleanup.sweep_now().await
    }

    /// Operational counters.
    pub fn stats(&self) -> EngineStats {
        let (contexts, owners) = self.contexts.counts();
        let (rooms, sessions) = self.rooms.counts();
        EngineStats {
            contexts,
            owners,
            rooms,
            sessions,
        }
    }

    /// Destroy every context and room.
    pub async fn shutdown(&self) -> CleanupStats {
        self.cleanup.shutdown().await
    }
}
