//! Collaborator contracts for room membership and persistence.
//!
//! The engine never stores who belongs to a room; it asks the surrounding
//! platform through [`MembershipAuthority`]. The same authority receives the
//! durable room-to-sandbox binding so a restarted service can find the
//! sandbox that backed a room.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::{error::EngineResult, runtime::SandboxId};

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Authority over room membership, implemented by the surrounding platform.
#[async_trait]
pub trait MembershipAuthority: Send + Sync {
    /// Whether `owner_id` may join `room_id`. Checked before any sandbox
    /// mutation.
    async fn verify_membership(&self, room_id: &str, owner_id: &str) -> bool;

    /// Users currently registered in the room.
    async fn room_users(&self, room_id: &str) -> Vec<String>;

    /// Record which sandbox backs the room. Best-effort: callers log
    /// failures and continue.
    async fn persist_room_binding(&self, room_id: &str, sandbox_id: &SandboxId)
        -> EngineResult<()>;
}

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Fixed membership table. Useful for embedding the engine without a
/// directory service and for tests.
#[derive(Debug, Default)]
pub struct StaticMembership {
    rooms: HashMap<String, HashSet<String>>,
    allow_all: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl StaticMembership {
    /// An empty table that denies everyone.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table that admits every user to every room.
    pub fn allow_all() -> Self {
        Self {
            rooms: HashMap::new(),
            allow_all: true,
        }
    }

    /// Register `owner_id` as a member of `room_id`.
    pub fn add_member(mut self, room_id: &str, owner_id: &str) -> Self {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(owner_id.to_string());
        self
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl MembershipAuthority for StaticMembership {
    async fn verify_membership(&self, room_id: &str, owner_id: &str) -> bool {
        if self.allow_all {
            return true;
        }
        self.rooms
            .get(room_id)
            .map(|members| members.contains(owner_id))
            .unwrap_or(false)
    }

    async fn room_users(&self, room_id: &str) -> Vec<String> {
        self.rooms
            .get(room_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn persist_room_binding(
        &self,
        room_id: &str,
        sandbox_id: &SandboxId,
    ) -> EngineResult<()> {
        tracing::debug!("room {} bound to sandbox {}", room_id, sandbox_id);
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
