//! Configuration for the coderoom engine.
//!
//! All tunables load from environment variables with validated defaults, so
//! the engine can be embedded without any mandatory configuration. The
//! values here are hard contracts: quotas and thresholds are enforced, not
//! advisory.

use std::{path::PathBuf, str::FromStr, time::Duration};

use getset::Getters;

use coderoom_utils::{
    get_env_opt, get_env_string, get_env_u64, get_env_usize, CONTEXT_IDLE_TIMEOUT_ENV_VAR,
    CONTEXT_SWEEP_INTERVAL_ENV_VAR, DEFAULT_CONTEXT_IDLE_TIMEOUT_SECS,
    DEFAULT_CONTEXT_SWEEP_INTERVAL_SECS, DEFAULT_ENGINE_BINARY, DEFAULT_MAX_CHUNK_BYTES,
    DEFAULT_MAX_CONTEXTS_PER_OWNER, DEFAULT_ROOM_HISTORY_CHUNKS, DEFAULT_ROOM_IDLE_TIMEOUT_SECS,
    DEFAULT_ROOM_SWEEP_INTERVAL_SECS, DEFAULT_STOP_GRACE_SECS, ENGINE_BINARY_ENV_VAR,
    LANGUAGE_CATALOG_ENV_VAR, MAX_CHUNK_BYTES_ENV_VAR, MAX_CONTEXTS_PER_OWNER_ENV_VAR,
    ROOM_HISTORY_CHUNKS_ENV_VAR, ROOM_IDLE_TIMEOUT_ENV_VAR, ROOM_LANGUAGE_ENV_VAR,
    ROOM_SWEEP_INTERVAL_ENV_VAR, STOP_GRACE_ENV_VAR,
};

use crate::{
    error::{EngineError, EngineResult},
    languages::Language,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Engine configuration loaded from the environment.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct EngineConfig {
    /// Per-owner live context quota; the LRU context is evicted at the cap.
    max_contexts_per_owner: usize,

    /// Idle threshold after which a context is destroyed by the sweep.
    context_idle_timeout: Duration,

    /// Interval of the context sweep.
    context_sweep_interval: Duration,

    /// Idle threshold after which an empty room is destroyed by the sweep.
    room_idle_timeout: Duration,

    /// Interval of the room sweep.
    room_sweep_interval: Duration,

    /// Size cap in bytes for one broadcast output chunk.
    max_chunk_bytes: usize,

    /// Number of recent chunks replayed to late joiners.
    room_history_chunks: usize,

    /// Language whose profile backs shared room sandboxes.
    room_language: Language,

    /// Container engine binary the runtime drives.
    engine_binary: String,

    /// Grace period between sandbox stop and remove.
    stop_grace: Duration,

    /// Optional language catalog override file.
    language_catalog_path: Option<PathBuf>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl EngineConfig {
    /// Load configuration from environment variables, falling back to the
    /// documented defaults, then validate.
    pub fn from_env() -> EngineResult<Self> {
        let room_language_raw = get_env_string(ROOM_LANGUAGE_ENV_VAR, "python");
        let room_language = Language::from_str(&room_language_raw).map_err(|_| {
            EngineError::ConfigError(format!(
                "unknown room language '{}' in {}",
                room_language_raw, ROOM_LANGUAGE_ENV_VAR
            ))
        })?;

        let config = Self {
            max_contexts_per_owner: get_env_usize(
                MAX_CONTEXTS_PER_OWNER_ENV_VAR,
                DEFAULT_MAX_CONTEXTS_PER_OWNER,
            ),
            context_idle_timeout: Duration::from_secs(get_env_u64(
                CONTEXT_IDLE_TIMEOUT_ENV_VAR,
                DEFAULT_CONTEXT_IDLE_TIMEOUT_SECS,
            )),
            context_sweep_interval: Duration::from_secs(get_env_u64(
                CONTEXT_SWEEP_INTERVAL_ENV_VAR,
                DEFAULT_CONTEXT_SWEEP_INTERVAL_SECS,
            )),
            room_idle_timeout: Duration::from_secs(get_env_u64(
                ROOM_IDLE_TIMEOUT_ENV_VAR,
                DEFAULT_ROOM_IDLE_TIMEOUT_SECS,
            )),
            room_sweep_interval: Duration::from_secs(get_env_u64(
                ROOM_SWEEP_INTERVAL_ENV_VAR,
                DEFAULT_ROOM_SWEEP_INTERVAL_SECS,
            )),
            max_chunk_bytes: get_env_usize(MAX_CHUNK_BYTES_ENV_VAR, DEFAULT_MAX_CHUNK_BYTES),
            room_history_chunks: get_env_usize(
                ROOM_HISTORY_CHUNKS_ENV_VAR,
                DEFAULT_ROOM_HISTORY_CHUNKS,
            ),
            room_language,
            engine_binary: get_env_string(ENGINE_BINARY_ENV_VAR, DEFAULT_ENGINE_BINARY),
            stop_grace: Duration::from_secs(get_env_u64(
                STOP_GRACE_ENV_VAR,
                DEFAULT_STOP_GRACE_SECS,
            )),
            language_catalog_path: get_env_opt(LANGUAGE_CATALOG_ENV_VAR).map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    /// Override the per-owner context quota.
    pub fn with_max_contexts_per_owner(mut self, quota: usize) -> Self {
        self.max_contexts_per_owner = quota;
        self
    }

    /// Override the context idle threshold.
    pub fn with_context_idle_timeout(mut self, timeout: Duration) -> Self {
        self.context_idle_timeout = timeout;
        self
    }

    /// Override the context sweep interval.
    pub fn with_context_sweep_interval(mut self, interval: Duration) -> Self {
        self.context_sweep_interval = interval;
        self
    }

    /// Override the room idle threshold.
    pub fn with_room_idle_timeout(mut self, timeout: Duration) -> Self {
        self.room_idle_timeout = timeout;
        self
    }

    /// Override the room sweep interval.
    pub fn with_room_sweep_interval(mut self, interval: Duration) -> Self {
        self.room_sweep_interval = interval;
        self
    }

    /// Override the broadcast chunk size cap.
    pub fn with_max_chunk_bytes(mut self, cap: usize) -> Self {
        self.max_chunk_bytes = cap;
        self
    }

    /// Override the replay history depth.
    pub fn with_room_history_chunks(mut self, chunks: usize) -> Self {
        self.room_history_chunks = chunks;
        self
    }

    /// Override the room sandbox language.
    pub fn with_room_language(mut self, language: Language) -> Self {
        self.room_language = language;
        self
    }

    /// Validate hard bounds on the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.max_contexts_per_owner == 0 {
            return Err(EngineError::ConfigError(
                "per-owner context quota must be at least 1".to_string(),
            ));
        }
        if self.context_idle_timeout < Duration::from_secs(10) {
            return Err(EngineError::ConfigError(
                "context idle timeout must be at least 10 seconds".to_string(),
            ));
        }
        if self.context_sweep_interval < Duration::from_secs(1) {
            return Err(EngineError::ConfigError(
                "context sweep interval must be at least 1 second".to_string(),
            ));
        }
        if self.room_idle_timeout < self.context_idle_timeout {
            return Err(EngineError::ConfigError(
                "room idle timeout must not be shorter than the context idle timeout".to_string(),
            ));
        }
        if self.room_sweep_interval < Duration::from_secs(1) {
            return Err(EngineError::ConfigError(
                "room sweep interval must be at least 1 second".to_string(),
            ));
        }
        if self.max_chunk_bytes < 1024 {
            return Err(EngineError::ConfigError(
                "broadcast chunk cap must be at least 1024 bytes".to_string(),
            ));
        }
        if self.engine_binary.trim().is_empty() {
            return Err(EngineError::ConfigError(
                "container engine binary name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_contexts_per_owner: DEFAULT_MAX_CONTEXTS_PER_OWNER,
            context_idle_timeout: Duration::from_secs(DEFAULT_CONTEXT_IDLE_TIMEOUT_SECS),
            context_sweep_interval: Duration::from_secs(DEFAULT_CONTEXT_SWEEP_INTERVAL_SECS),
            room_idle_timeout: Duration::from_secs(DEFAULT_ROOM_IDLE_TIMEOUT_SECS),
            room_sweep_interval: Duration::from_secs(DEFAULT_ROOM_SWEEP_INTERVAL_SECS),
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            room_history_chunks: DEFAULT_ROOM_HISTORY_CHUNKS,
            room_language: Language::Python,
            engine_binary: DEFAULT_ENGINE_BINARY.to_string(),
            stop_grace: Duration::from_secs(DEFAULT_STOP_GRACE_SECS),
            language_catalog_path: None,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_quota_rejected() {
        let mut config = EngineConfig::default();
        config.max_contexts_per_owner = 0;
        assert!(matches!(
            config.validate(),
            Err(EngineError::ConfigError(_))
        ));
    }

    #[test]
    fn test_room_timeout_must_cover_context_timeout() {
        let mut config = EngineConfig::default();
        config.room_idle_timeout = Duration::from_secs(30);
        config.context_idle_timeout = Duration::from_secs(120);
        assert!(matches!(
            config.validate(),
            Err(EngineError::ConfigError(_))
        ));
    }

    #[test]
    fn test_tiny_chunk_cap_rejected() {
        let mut config = EngineConfig::default();
        config.max_chunk_bytes = 16;
        assert!(matches!(
            config.validate(),
            Err(EngineError::ConfigError(_))
        ));
    }
}
