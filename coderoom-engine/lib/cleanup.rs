//! Periodic reclamation of idle contexts and rooms.
//!
//! Two independent sweeps run on their own intervals: the context sweep
//! (shorter interval, shorter idle threshold) and the room sweep (longer
//! both). Candidate selection is a registry snapshot; anything touched
//! between snapshot and destruction is spared by the owning manager's
//! re-check. All timing goes through the injectable clock, so tests drive
//! eviction without wall-clock waits.

use std::sync::Arc;

use tokio::{task::JoinHandle, time::interval};

use crate::{config::EngineConfig, context::ContextManager, payload::CleanupStats, room::RoomManager};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Drives the context and room sweeps.
pub struct CleanupScheduler {
    contexts: Arc<ContextManager>,
    rooms: Arc<RoomManager>,
    config: Arc<EngineConfig>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl CleanupScheduler {
    /// Create a scheduler over the two registries.
    pub fn new(
        contexts: Arc<ContextManager>,
        rooms: Arc<RoomManager>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            contexts,
            rooms,
            config,
        }
    }

    /// Start both background sweeps. Returns the task handles; aborting them
    /// stops the sweeps without touching live contexts or rooms.
    pub fn start(&self) -> (JoinHandle<()>, JoinHandle<()>) {
        let contexts = self.contexts.clone();
        let context_interval = *self.config.get_context_sweep_interval();
        let context_handle = tokio::spawn(async move {
            let mut ticker = interval(context_interval);
            // The first tick fires immediately; skip it so a fresh engine
            // does not sweep at startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let destroyed = contexts.sweep_idle().await;
                if destroyed > 0 {
                    tracing::info!("context sweep destroyed {} idle contexts", destroyed);
                }
            }
        });

        let rooms = self.rooms.clone();
        let room_interval = *self.config.get_room_sweep_interval();
        let room_handle = tokio::spawn(async move {
            let mut ticker = interval(room_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let destroyed = rooms.sweep_idle().await;
                if destroyed > 0 {
                    tracing::info!("room sweep destroyed {} idle rooms", destroyed);
                }
            }
        });

        (context_handle, room_handle)
    }

    /// Run both sweeps once, immediately.
    pub async fn sweep_now(&self) -> CleanupStats {
        CleanupStats {
            contexts_destroyed: self.contexts.sweep_idle().await,
            rooms_destroyed: self.rooms.sweep_idle().await,
        }
    }

    /// Destroy every context and room. Used for graceful shutdown.
    pub async fn shutdown(&self) -> CleanupStats {
        let stats = CleanupStats {
            contexts_destroyed: self.contexts.destroy_all().await,
            rooms_destroyed: self.rooms.destroy_all().await,
        };
        tracing::info!(
            "shutdown destroyed {} contexts and {} rooms",
            stats.contexts_destroyed,
            stats.rooms_destroyed
        );
        stats
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
