//! Environment variable names and typed readers for the coderoom engine.
//!
//! Readers never fail: a missing variable yields the provided default, and a
//! malformed value yields the default with a warning, so a bad deployment
//! environment degrades loudly instead of aborting startup.

//--------------------------------------------------------------------------------------------------
// Constants: Variable names
//--------------------------------------------------------------------------------------------------

/// Per-owner live context quota.
pub const MAX_CONTEXTS_PER_OWNER_ENV_VAR: &str = "CODEROOM_MAX_CONTEXTS_PER_OWNER";

/// Context idle threshold in seconds.
pub const CONTEXT_IDLE_TIMEOUT_ENV_VAR: &str = "CODEROOM_CONTEXT_IDLE_TIMEOUT_SECS";

/// Context sweep interval in seconds.
pub const CONTEXT_SWEEP_INTERVAL_ENV_VAR: &str = "CODEROOM_CONTEXT_SWEEP_INTERVAL_SECS";

/// Room idle threshold in seconds.
pub const ROOM_IDLE_TIMEOUT_ENV_VAR: &str = "CODEROOM_ROOM_IDLE_TIMEOUT_SECS";

/// Room sweep interval in seconds.
pub const ROOM_SWEEP_INTERVAL_ENV_VAR: &str = "CODEROOM_ROOM_SWEEP_INTERVAL_SECS";

/// Broadcast chunk size cap in bytes.
pub const MAX_CHUNK_BYTES_ENV_VAR: &str = "CODEROOM_MAX_CHUNK_BYTES";

/// Replay history depth for late joiners.
pub const ROOM_HISTORY_CHUNKS_ENV_VAR: &str = "CODEROOM_ROOM_HISTORY_CHUNKS";

/// Language whose profile backs shared room sandboxes.
pub const ROOM_LANGUAGE_ENV_VAR: &str = "CODEROOM_ROOM_LANGUAGE";

/// Container engine binary name.
pub const ENGINE_BINARY_ENV_VAR: &str = "CODEROOM_ENGINE_BINARY";

/// Stop-to-remove grace period in seconds.
pub const STOP_GRACE_ENV_VAR: &str = "CODEROOM_STOP_GRACE_SECS";

/// Optional path to a language catalog override file.
pub const LANGUAGE_CATALOG_ENV_VAR: &str = "CODEROOM_LANGUAGE_CATALOG";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Read a string environment variable, falling back to `default` when unset.
pub fn get_env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Read an optional string environment variable.
pub fn get_env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Read a `u64` environment variable, falling back to `default` when unset
/// or malformed.
pub fn get_env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(
                    "ignoring malformed value '{}' for {}, using default {}",
                    raw,
                    name,
                    default
                );
                default
            }
        },
        Err(_) => default,
    }
}

/// Read a `usize` environment variable, falling back to `default` when unset
/// or malformed.
pub fn get_env_usize(name: &str, default: usize) -> usize {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<usize>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(
                    "ignoring malformed value '{}' for {}, using default {}",
                    raw,
                    name,
                    default
                );
                default
            }
        },
        Err(_) => default,
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
