//! Shared terminal rooms.
//!
//! A room terminal is one sandbox shared by every member of a collaboration
//! room. Rooms are created lazily on first join, fan their shell output out
//! to all attached sessions in emission order, and are destroyed only by the
//! idle sweep once no sessions remain.
//!
//! The manager owns the room-id registry; each room's state lives in its own
//! actor task reached through message passing.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::{broadcast, mpsc, oneshot};

use coderoom_utils::Clock;

use crate::{
    config::EngineConfig,
    error::{EngineError, EngineResult},
    languages::LanguageRegistry,
    membership::MembershipAuthority,
    payload::RoomChunk,
    runtime::{ContainerRuntime, SandboxId},
};

mod output;
mod terminal;

use terminal::{RoomEvent, RoomShared, RoomTerminal};

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use output::{cap_text, sanitize_chunk};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A live attachment to a room terminal. Holds the broadcast receiver for
/// the room's output and the address of the room actor for input and leave.
/// Dropping the handle without leaving keeps the session registered until
/// the caller leaves explicitly or the room is reaped.
pub struct SessionHandle {
    session_id: String,
    room_id: String,
    owner_id: String,
    sandbox_id: SandboxId,
    replay: Vec<RoomChunk>,
    receiver: broadcast::Receiver<RoomChunk>,
    events_tx: mpsc::Sender<RoomEvent>,
}

struct RoomEntry {
    events_tx: mpsc::Sender<RoomEvent>,
    shared: Arc<RoomShared>,
}

/// Owner of the room registry.
pub struct RoomManager {
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<LanguageRegistry>,
    membership: Arc<dyn MembershipAuthority>,
    config: Arc<EngineConfig>,
    clock: Arc<dyn Clock>,
    rooms: Mutex<HashMap<String, Arc<RoomEntry>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods: SessionHandle
//--------------------------------------------------------------------------------------------------

impl SessionHandle {
    pub(crate) fn new(
        session_id: String,
        room_id: String,
        owner_id: String,
        sandbox_id: SandboxId,
        replay: Vec<RoomChunk>,
        receiver: broadcast::Receiver<RoomChunk>,
        events_tx: mpsc::Sender<RoomEvent>,
    ) -> Self {
        Self {
            session_id,
            room_id,
            owner_id,
            sandbox_id,
            replay,
            receiver,
            events_tx,
        }
    }

    /// The session's id.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The room this session is attached to.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// The user behind this session.
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// The sandbox backing the room. The session references it; it never
    /// owns it.
    pub fn sandbox_id(&self) -> &SandboxId {
        &self.sandbox_id
    }

    /// Recent room output captured before this session joined. Consumes the
    /// buffer; subsequent calls return nothing.
    pub fn take_replay(&mut self) -> Vec<RoomChunk> {
        std::mem::take(&mut self.replay)
    }

    /// Send input bytes to the room's shared terminal. Fire-and-forget: the
    /// resulting output arrives through the broadcast stream.
    pub async fn send_input(&self, bytes: Vec<u8>) -> EngineResult<()> {
        self.events_tx
            .send(RoomEvent::Input {
                session_id: self.session_id.clone(),
                bytes,
            })
            .await
            .map_err(|_| EngineError::RoomClosed(self.room_id.clone()))
    }

    /// The next broadcast chunk, or `None` once the room is gone. A slow
    /// consumer that misses chunks resumes with the oldest retained one.
    pub async fn next_chunk(&mut self) -> Option<RoomChunk> {
        loop {
            match self.receiver.recv().await {
                Ok(chunk) => return Some(chunk),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(
                        "session {} lagged {} chunks behind room {}",
                        self.session_id,
                        missed,
                        self.room_id
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Methods: RoomManager
//--------------------------------------------------------------------------------------------------

impl RoomManager {
    /// Create a manager over the given runtime, catalog, and membership
    /// authority.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        registry: Arc<LanguageRegistry>,
        membership: Arc<dyn MembershipAuthority>,
        config: Arc<EngineConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            runtime,
            registry,
            membership,
            config,
            clock,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Join `owner_id` into `room_id`. Membership is verified before any
    /// sandbox is touched; the first joiner creates the room's shared
    /// sandbox.
    pub async fn join(&self, room_id: &str, owner_id: &str) -> EngineResult<SessionHandle> {
        validate_room_id(room_id)?;

        if !self.membership.verify_membership(room_id, owner_id).await {
            tracing::warn!("denied join for user {} in room {}", owner_id, room_id);
            return Err(EngineError::RoomAccessDenied {
                room: room_id.to_string(),
                user: owner_id.to_string(),
            });
        }

        let registered = self.membership.room_users(room_id).await.len();
        tracing::debug!(
            "user {} joining room {} ({} registered members)",
            owner_id,
            room_id,
            registered
        );

        // A room reaped between lookup and join answers with a closed
        // channel; one retry spawns its replacement.
        for _ in 0..2 {
            let entry = self.get_or_spawn(room_id)?;

            let (reply_tx, reply_rx) = oneshot::channel();
            let sent = entry
                .events_tx
                .send(RoomEvent::Join {
                    owner_id: owner_id.to_string(),
                    reply: reply_tx,
                })
                .await;

            if sent.is_err() {
                self.remove_entry(room_id, &entry);
                continue;
            }

            return match reply_rx.await {
                Ok(result) => result,
                Err(_) => {
                    self.remove_entry(room_id, &entry);
                    continue;
                }
            };
        }

        Err(EngineError::RoomClosed(room_id.to_string()))
    }

    /// Detach a session from its room. The shared sandbox always survives.
    pub async fn leave(&self, session: &SessionHandle) -> EngineResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        session
            .events_tx
            .send(RoomEvent::Leave {
                session_id: session.session_id.clone(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::RoomClosed(session.room_id.clone()))?;

        reply_rx
            .await
            .map_err(|_| EngineError::RoomClosed(session.room_id.clone()))?
    }

    /// Destroy rooms that are idle past the threshold AND have no attached
    /// sessions. Returns the number destroyed. A room that gains a session
    /// between snapshot and shutdown refuses and survives.
    pub async fn sweep_idle(&self) -> usize {
        let threshold = *self.config.get_room_idle_timeout();
        let now = self.clock.now();

        let candidates: Vec<(String, Arc<RoomEntry>)> = {
            let rooms = self.rooms.lock().unwrap();
            rooms
                .iter()
                .filter(|(_, entry)| {
                    let meta = entry.shared.snapshot();
                    !meta.closed
                        && meta.session_count == 0
                        && now.duration_since(meta.last_activity_at) >= threshold
                })
                .map(|(id, entry)| (id.clone(), entry.clone()))
                .collect()
        };

        let mut destroyed = 0;
        for (room_id, entry) in candidates {
            if self.shutdown_room(&entry, true).await {
                tracing::info!("destroyed idle room {}", room_id);
                self.remove_entry(&room_id, &entry);
                destroyed += 1;
            }
        }
        destroyed
    }

    /// Destroy every room regardless of occupancy. Used for graceful
    /// shutdown; rooms tear down concurrently.
    pub async fn destroy_all(&self) -> usize {
        let entries: Vec<(String, Arc<RoomEntry>)> = {
            let mut rooms = self.rooms.lock().unwrap();
            rooms.drain().collect()
        };

        let results = futures::future::join_all(entries.iter().map(|(room_id, entry)| async move {
            let destroyed = self.shutdown_room(entry, false).await;
            if destroyed {
                tracing::info!("destroyed room {} during shutdown", room_id);
            }
            destroyed
        }))
        .await;

        results.into_iter().filter(|destroyed| *destroyed).count()
    }

    /// Live room count and total attached session count.
    pub fn counts(&self) -> (usize, usize) {
        let rooms = self.rooms.lock().unwrap();
        let mut live = 0;
        let mut sessions = 0;
        for entry in rooms.values() {
            let meta = entry.shared.snapshot();
            if !meta.closed {
                live += 1;
                sessions += meta.session_count;
            }
        }
        (live, sessions)
    }

    fn get_or_spawn(&self, room_id: &str) -> EngineResult<Arc<RoomEntry>> {
        let mut rooms = self.rooms.lock().unwrap();

        if let Some(entry) = rooms.get(room_id) {
            if !entry.shared.snapshot().closed {
                return Ok(entry.clone());
            }
            rooms.remove(room_id);
        }

        let profile = self
            .registry
            .get(*self.config.get_room_language())?
            .clone();

        let (events_tx, events_rx) = mpsc::channel(256);
        let shared = Arc::new(RoomShared::new(self.clock.now()));

        let terminal = RoomTerminal::new(
            room_id.to_string(),
            self.runtime.clone(),
            self.membership.clone(),
            profile,
            self.config.clone(),
            self.clock.clone(),
            shared.clone(),
            events_tx.clone(),
        );
        tokio::spawn(terminal.run(events_rx));

        tracing::info!("created room terminal {}", room_id);

        let entry = Arc::new(RoomEntry { events_tx, shared });
        rooms.insert(room_id.to_string(), entry.clone());
        Ok(entry)
    }

    async fn shutdown_room(&self, entry: &Arc<RoomEntry>, only_if_empty: bool) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = entry
            .events_tx
            .send(RoomEvent::Shutdown {
                only_if_empty,
                reply: reply_tx,
            })
            .await;

        if sent.is_err() {
            // Actor already gone; nothing left to destroy.
            return true;
        }

        reply_rx.await.unwrap_or(true)
    }

    fn remove_entry(&self, room_id: &str, entry: &Arc<RoomEntry>) {
        let mut rooms = self.rooms.lock().unwrap();
        if let Some(current) = rooms.get(room_id) {
            if Arc::ptr_eq(current, entry) {
                rooms.remove(room_id);
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn validate_room_id(room_id: &str) -> EngineResult<()> {
    if room_id.is_empty() {
        return Err(EngineError::InvalidInput(
            "room id cannot be empty".to_string(),
        ));
    }
    if room_id.len() > 64 {
        return Err(EngineError::InvalidInput(
            "room id cannot exceed 64 characters".to_string(),
        ));
    }

    let valid_chars = room_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid_chars {
        return Err(EngineError::InvalidInput(
            "room id can only contain alphanumeric characters, hyphens, or underscores"
                .to_string(),
        ));
    }

    match room_id.chars().next() {
        Some(first) if first.is_ascii_alphanumeric() => Ok(()),
        _ => Err(EngineError::InvalidInput(
            "room id must start with an alphanumeric character".to_string(),
        )),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{membership::StaticMembership, payload::ChunkStream, runtime::fake::FakeRuntime};
    use coderoom_utils::ManualClock;
    use std::time::Duration;

    struct Fixture {
        runtime: Arc<FakeRuntime>,
        clock: Arc<ManualClock>,
        manager: RoomManager,
    }

    fn fixture_with(membership: StaticMembership, config: EngineConfig) -> Fixture {
        let runtime = Arc::new(FakeRuntime::new());
        let clock = Arc::new(ManualClock::new());
        let manager = RoomManager::new(
            runtime.clone(),
            Arc::new(LanguageRegistry::builtin()),
            Arc::new(membership),
            Arc::new(config),
            clock.clone(),
        );
        Fixture {
            runtime,
            clock,
            manager,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(StaticMembership::allow_all(), EngineConfig::default())
    }

    /// Wait for a chunk from the given stream, skipping system notices.
    async fn next_output(session: &mut SessionHandle) -> RoomChunk {
        loop {
            let chunk = tokio::time::timeout(Duration::from_secs(5), session.next_chunk())
                .await
                .expect("timed out waiting for room output")
                .expect("room closed while waiting for output");
            if chunk.stream != ChunkStream::System {
                return chunk;
            }
        }
    }

    #[tokio::test]
    async fn test_join_denied_creates_no_sandbox() {
        let fx = fixture_with(
            StaticMembership::new().add_member("room-1", "alice"),
            EngineConfig::default(),
        );

        let result = fx.manager.join("room-1", "mallory").await;

        assert!(matches!(result, Err(EngineError::RoomAccessDenied { .. })));
        assert_eq!(fx.runtime.created_count(), 0);
    }

    #[tokio::test]
    async fn test_first_join_creates_shared_sandbox_once() {
        let fx = fixture();

        let first = fx.manager.join("room-1", "alice").await.unwrap();
        let second = fx.manager.join("room-1", "bob").await.unwrap();

        assert_eq!(fx.runtime.created_count(), 1);
        assert_eq!(first.sandbox_id(), second.sandbox_id());
        assert_eq!(fx.manager.counts(), (1, 2));
    }

    #[tokio::test]
    async fn test_both_sessions_see_identical_ordered_output() {
        let fx = fixture();

        let alice = fx.manager.join("room-1", "alice").await.unwrap();
        let mut bob = fx.manager.join("room-1", "bob").await.unwrap();
        let mut carol = fx.manager.join("room-1", "carol").await.unwrap();

        // The fake shell echoes input back as stdout.
        alice.send_input(b"echo one\n".to_vec()).await.unwrap();
        alice.send_input(b"echo two\n".to_vec()).await.unwrap();

        let bob_first = next_output(&mut bob).await;
        let bob_second = next_output(&mut bob).await;
        let carol_first = next_output(&mut carol).await;
        let carol_second = next_output(&mut carol).await;

        assert_eq!(bob_first.text, carol_first.text);
        assert_eq!(bob_second.text, carol_second.text);
        assert_eq!(bob_first.seq, carol_first.seq);
        assert_eq!(bob_second.seq, carol_second.seq);
        assert!(bob_first.seq < bob_second.seq);
    }

    #[tokio::test]
    async fn test_leave_never_destroys_sandbox() {
        let fx = fixture();

        let alice = fx.manager.join("room-1", "alice").await.unwrap();
        let bob = fx.manager.join("room-1", "bob").await.unwrap();

        fx.manager.leave(&alice).await.unwrap();
        fx.manager.leave(&bob).await.unwrap();

        assert!(fx.runtime.destroyed().is_empty());
        assert_eq!(fx.manager.counts(), (1, 0));
    }

    #[tokio::test]
    async fn test_leave_twice_reports_session_not_found() {
        let fx = fixture();

        let alice = fx.manager.join("room-1", "alice").await.unwrap();
        fx.manager.leave(&alice).await.unwrap();

        let result = fx.manager.leave(&alice).await;
        assert!(matches!(result, Err(EngineError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_sweep_spares_occupied_rooms() {
        let fx = fixture();

        let _alice = fx.manager.join("room-1", "alice").await.unwrap();
        fx.clock.advance(Duration::from_secs(7200));

        let destroyed = fx.manager.sweep_idle().await;

        assert_eq!(destroyed, 0);
        assert!(fx.runtime.destroyed().is_empty());
        assert_eq!(fx.manager.counts(), (1, 1));
    }

    #[tokio::test]
    async fn test_sweep_destroys_idle_empty_rooms() {
        let fx = fixture();

        let alice = fx.manager.join("room-1", "alice").await.unwrap();
        let sandbox = alice.sandbox_id().clone();
        fx.manager.leave(&alice).await.unwrap();

        // Not yet idle past the threshold.
        assert_eq!(fx.manager.sweep_idle().await, 0);

        fx.clock.advance(Duration::from_secs(3601));
        assert_eq!(fx.manager.sweep_idle().await, 1);

        assert!(fx.runtime.destroyed().contains(&sandbox.as_str().to_string()));
        assert_eq!(fx.manager.counts(), (0, 0));
    }

    #[tokio::test]
    async fn test_room_recreated_after_destruction() {
        let fx = fixture();

        let alice = fx.manager.join("room-1", "alice").await.unwrap();
        fx.manager.leave(&alice).await.unwrap();
        fx.clock.advance(Duration::from_secs(3601));
        fx.manager.sweep_idle().await;

        let again = fx.manager.join("room-1", "alice").await.unwrap();
        assert_eq!(fx.runtime.created_count(), 2);
        assert!(fx.runtime.is_alive(again.sandbox_id()));
    }

    #[tokio::test]
    async fn test_late_joiner_receives_replay() {
        let config = EngineConfig::default().with_room_history_chunks(10);
        let fx = fixture_with(StaticMembership::allow_all(), config);

        let alice = fx.manager.join("room-1", "alice").await.unwrap();
        let mut alice_rx = fx.manager.join("room-1", "alice-watcher").await.unwrap();

        alice.send_input(b"hello\n".to_vec()).await.unwrap();
        next_output(&mut alice_rx).await;

        let mut late = fx.manager.join("room-1", "bob").await.unwrap();
        let replay = late.take_replay();

        assert!(replay.iter().any(|c| c.text.contains("hello")));
        assert!(late.take_replay().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_room_id_rejected() {
        let fx = fixture();
        let result = fx.manager.join("../etc", "alice").await;
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_destroy_all_tears_down_occupied_rooms() {
        let fx = fixture();

        let _alice = fx.manager.join("room-1", "alice").await.unwrap();
        let _bob = fx.manager.join("room-2", "bob").await.unwrap();

        let destroyed = fx.manager.destroy_all().await;
        assert_eq!(destroyed, 2);
        assert_eq!(fx.runtime.destroyed().len(), 2);
        assert_eq!(fx.manager.counts(), (0, 0));
    }
}
