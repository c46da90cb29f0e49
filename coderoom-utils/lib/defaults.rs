//! Default tunables for the coderoom engine.
//!
//! These are the values the engine falls back to when the corresponding
//! environment variable (see [`crate::env`]) is unset or malformed.

//--------------------------------------------------------------------------------------------------
// Constants: Contexts
//--------------------------------------------------------------------------------------------------

/// Maximum number of live execution contexts one owner may hold before the
/// least-recently-used one is evicted.
pub const DEFAULT_MAX_CONTEXTS_PER_OWNER: usize = 3;

/// Seconds an execution context may sit unused before the idle sweep
/// destroys it.
pub const DEFAULT_CONTEXT_IDLE_TIMEOUT_SECS: u64 = 1800;

/// Interval of the context idle sweep in seconds.
pub const DEFAULT_CONTEXT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Fallback execution timeout in milliseconds when a language profile does
/// not narrow it further.
pub const DEFAULT_EXEC_TIMEOUT_MS: u64 = 10_000;

/// Timeout in milliseconds for a single package installation.
pub const DEFAULT_INSTALL_TIMEOUT_MS: u64 = 120_000;

/// Multiplier applied to the install timeout for packages that need extra
/// build tooling.
pub const HEAVY_INSTALL_TIMEOUT_MULTIPLIER: u32 = 3;

//--------------------------------------------------------------------------------------------------
// Constants: Rooms
//--------------------------------------------------------------------------------------------------

/// Seconds a room terminal may sit without activity before the room sweep
/// destroys it. Rooms with attached sessions are never destroyed.
pub const DEFAULT_ROOM_IDLE_TIMEOUT_SECS: u64 = 3600;

/// Interval of the room idle sweep in seconds.
pub const DEFAULT_ROOM_SWEEP_INTERVAL_SECS: u64 = 600;

/// Maximum size of a single broadcast output chunk in bytes. Larger chunks
/// are truncated with [`TRUNCATION_MARKER`].
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 64 * 1024;

/// Number of recent output chunks replayed to a session joining an already
/// active room.
pub const DEFAULT_ROOM_HISTORY_CHUNKS: usize = 200;

/// Marker appended to output chunks that exceeded the size cap.
pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

//--------------------------------------------------------------------------------------------------
// Constants: Container engine
//--------------------------------------------------------------------------------------------------

/// Name of the container engine binary driven by the runtime.
pub const DEFAULT_ENGINE_BINARY: &str = "docker";

/// Grace period in seconds given to a sandbox between stop and remove.
pub const DEFAULT_STOP_GRACE_SECS: u64 = 3;

/// Timeout in milliseconds for the liveness probe exec.
pub const PROBE_TIMEOUT_MS: u64 = 2_000;

/// Working directory inside every sandbox.
pub const SANDBOX_WORKDIR: &str = "/workspace";

/// Prefix of the container names the engine creates.
pub const SANDBOX_NAME_PREFIX: &str = "coderoom";

/// Hard cap on the number of processes a sandbox may spawn.
pub const SANDBOX_PIDS_LIMIT: u32 = 128;
