//! The room terminal actor.
//!
//! Each room terminal is a spawned task that owns the room's entire state
//! (sandbox, session map, shell stream, replay history) and is reached only
//! through its event channel. Because one task processes join, input,
//! leave, and shell output strictly in arrival order, every session attached
//! to the room observes the same ordered chunk sequence without any locking
//! on the hot path.
//!
//! Room lifecycle: spawned on first join, it serves sessions until a
//! shutdown event. The sweep sends a conditional shutdown that the actor
//! refuses while sessions are attached — a room passes through the empty
//! state before it can be destroyed.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Instant,
};

use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use coderoom_utils::Clock;

use crate::{
    config::EngineConfig,
    error::{EngineError, EngineResult},
    languages::LanguageProfile,
    membership::MembershipAuthority,
    payload::{ChunkStream, RoomChunk},
    room::output::sanitize_chunk,
    room::SessionHandle,
    runtime::{ContainerRuntime, SandboxId, ShellChunk},
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Events a room terminal processes, in strict arrival order.
pub(crate) enum RoomEvent {
    /// A membership-verified user joins the room.
    Join {
        /// The joining user.
        owner_id: String,
        /// Reply channel carrying the session handle.
        reply: oneshot::Sender<EngineResult<SessionHandle>>,
    },
    /// Input bytes from one session, forwarded to the shared shell.
    Input {
        /// The originating session.
        session_id: String,
        /// Raw input bytes.
        bytes: Vec<u8>,
    },
    /// A session detaches. Never destroys the sandbox.
    Leave {
        /// The leaving session.
        session_id: String,
        /// Reply channel.
        reply: oneshot::Sender<EngineResult<()>>,
    },
    /// Output read from the shared shell stream.
    ShellOutput(ShellChunk),
    /// Tear the room down. With `only_if_empty`, the actor refuses while
    /// sessions are attached; the reply says whether it shut down.
    Shutdown {
        /// Refuse when sessions are attached.
        only_if_empty: bool,
        /// Whether the room actually shut down.
        reply: oneshot::Sender<bool>,
    },
}

/// Recency and occupancy snapshot shared with the room manager for sweep
/// candidate selection.
#[derive(Debug)]
pub(crate) struct RoomShared {
    pub(crate) meta: Mutex<RoomMeta>,
}

/// Mutable part of the shared snapshot.
#[derive(Debug, Clone)]
pub(crate) struct RoomMeta {
    pub(crate) session_count: usize,
    pub(crate) last_activity_at: Instant,
    pub(crate) created_at: Instant,
    pub(crate) sandbox_id: Option<SandboxId>,
    pub(crate) closed: bool,
}

struct SessionEntry {
    owner_id: String,
}

/// The actor state. Constructed by the manager, consumed by [`RoomTerminal::run`].
pub(crate) struct RoomTerminal {
    room_id: String,
    runtime: Arc<dyn ContainerRuntime>,
    membership: Arc<dyn MembershipAuthority>,
    profile: LanguageProfile,
    config: Arc<EngineConfig>,
    clock: Arc<dyn Clock>,
    shared: Arc<RoomShared>,
    events_tx: mpsc::Sender<RoomEvent>,
    broadcast_tx: broadcast::Sender<RoomChunk>,
    sandbox: Option<SandboxId>,
    shell_input: Option<mpsc::Sender<Vec<u8>>>,
    sessions: HashMap<String, SessionEntry>,
    history: VecDeque<RoomChunk>,
    next_seq: u64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RoomShared {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            meta: Mutex::new(RoomMeta {
                session_count: 0,
                last_activity_at: now,
                created_at: now,
                sandbox_id: None,
                closed: false,
            }),
        }
    }

    pub(crate) fn snapshot(&self) -> RoomMeta {
        self.meta.lock().unwrap().clone()
    }
}

impl RoomTerminal {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        room_id: String,
        runtime: Arc<dyn ContainerRuntime>,
        membership: Arc<dyn MembershipAuthority>,
        profile: LanguageProfile,
        config: Arc<EngineConfig>,
        clock: Arc<dyn Clock>,
        shared: Arc<RoomShared>,
        events_tx: mpsc::Sender<RoomEvent>,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);
        Self {
            room_id,
            runtime,
            membership,
            profile,
            config,
            clock,
            shared,
            events_tx,
            broadcast_tx,
            sandbox: None,
            shell_input: None,
            sessions: HashMap::new(),
            history: VecDeque::new(),
            next_seq: 0,
        }
    }

    /// Process events until shutdown.
    pub(crate) async fn run(mut self, mut events_rx: mpsc::Receiver<RoomEvent>) {
        while let Some(event) = events_rx.recv().await {
            match event {
                RoomEvent::Join { owner_id, reply } => {
                    let result = self.handle_join(owner_id).await;
                    let _ = reply.send(result);
                }
                RoomEvent::Input { session_id, bytes } => {
                    self.handle_input(&session_id, bytes).await;
                }
                RoomEvent::Leave { session_id, reply } => {
                    let result = self.handle_leave(&session_id);
                    let _ = reply.send(result);
                }
                RoomEvent::ShellOutput(chunk) => {
                    self.handle_shell_output(chunk);
                }
                RoomEvent::Shutdown {
                    only_if_empty,
                    reply,
                } => {
                    if only_if_empty && !self.sessions.is_empty() {
                        let _ = reply.send(false);
                        continue;
                    }
                    self.teardown().await;
                    let _ = reply.send(true);
                    break;
                }
            }
        }
    }

    async fn handle_join(&mut self, owner_id: String) -> EngineResult<SessionHandle> {
        // First joiner creates the shared sandbox.
        if self.sandbox.is_none() {
            let sandbox = self.runtime.create(&self.profile, true).await?;
            tracing::info!("room {} backed by sandbox {}", self.room_id, sandbox);

            if let Err(e) = self
                .membership
                .persist_room_binding(&self.room_id, &sandbox)
                .await
            {
                tracing::warn!(
                    "failed to persist sandbox binding for room {}: {}",
                    self.room_id,
                    e
                );
            }

            self.shared.meta.lock().unwrap().sandbox_id = Some(sandbox.clone());
            self.sandbox = Some(sandbox);
        }

        let sandbox_id = match &self.sandbox {
            Some(id) => id.clone(),
            None => return Err(EngineError::RoomClosed(self.room_id.clone())),
        };

        let session_id = format!("sess-{}", &Uuid::new_v4().simple().to_string()[..12]);
        self.sessions.insert(
            session_id.clone(),
            SessionEntry {
                owner_id: owner_id.clone(),
            },
        );

        // Subscribe before snapshotting history: the actor is the only
        // broadcaster, so nothing can slip between the two.
        let receiver = self.broadcast_tx.subscribe();
        let replay: Vec<RoomChunk> = self.history.iter().cloned().collect();

        self.touch();
        self.broadcast_system(format!("{} joined the room", owner_id));

        tracing::info!(
            "session {} joined room {} (owner {}, {} sessions attached)",
            session_id,
            self.room_id,
            owner_id,
            self.sessions.len()
        );

        Ok(SessionHandle::new(
            session_id,
            self.room_id.clone(),
            owner_id,
            sandbox_id,
            replay,
            receiver,
            self.events_tx.clone(),
        ))
    }

    async fn handle_input(&mut self, session_id: &str, bytes: Vec<u8>) {
        if !self.sessions.contains_key(session_id) {
            tracing::warn!(
                "dropping input from unknown session {} in room {}",
                session_id,
                self.room_id
            );
            return;
        }

        let Some(sandbox) = self.sandbox.clone() else {
            return;
        };

        // First interactive input opens the shell stream.
        if self.shell_input.is_none() {
            match self.runtime.attach_shell(&sandbox).await {
                Ok(stream) => {
                    let (input_tx, mut output_rx) = stream.split();
                    self.shell_input = Some(input_tx);

                    // Pump shell output back into the event queue so chunks
                    // interleave with joins and leaves in one order.
                    let events_tx = self.events_tx.clone();
                    tokio::spawn(async move {
                        while let Some(chunk) = output_rx.recv().await {
                            if events_tx.send(RoomEvent::ShellOutput(chunk)).await.is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        "failed to attach shell for room {}: {}",
                        self.room_id,
                        e
                    );
                    self.broadcast_system("terminal is unavailable".to_string());
                    return;
                }
            }
        }

        if let Some(input_tx) = self.shell_input.clone() {
            if input_tx.send(bytes).await.is_err() {
                tracing::warn!("shell stream for room {} is gone, detaching", self.room_id);
                self.shell_input = None;
            }
        }

        self.touch();
    }

    fn handle_leave(&mut self, session_id: &str) -> EngineResult<()> {
        let entry = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        self.touch();
        self.broadcast_system(format!("{} left the room", entry.owner_id));

        tracing::info!(
            "session {} left room {} ({} sessions remain)",
            session_id,
            self.room_id,
            self.sessions.len()
        );
        Ok(())
    }

    fn handle_shell_output(&mut self, chunk: ShellChunk) {
        let (stream, bytes) = match chunk {
            ShellChunk::Stdout(bytes) => (ChunkStream::Stdout, bytes),
            ShellChunk::Stderr(bytes) => (ChunkStream::Stderr, bytes),
            ShellChunk::Closed => {
                self.shell_input = None;
                self.broadcast_system("terminal stream closed".to_string());
                return;
            }
        };

        let text = sanitize_chunk(&bytes, *self.config.get_max_chunk_bytes());
        if text.is_empty() {
            return;
        }

        self.touch();
        self.broadcast(stream, text);
    }

    async fn teardown(&mut self) {
        if let Some(sandbox) = self.sandbox.take() {
            tracing::info!("destroying room {} and sandbox {}", self.room_id, sandbox);
            self.runtime.destroy(&sandbox).await;
        }

        let mut meta = self.shared.meta.lock().unwrap();
        meta.closed = true;
        meta.sandbox_id = None;
        meta.session_count = 0;
    }

    fn broadcast_system(&mut self, text: String) {
        self.broadcast(ChunkStream::System, text);
    }

    fn broadcast(&mut self, stream: ChunkStream, text: String) {
        self.next_seq += 1;
        let chunk = RoomChunk {
            seq: self.next_seq,
            stream,
            text,
        };

        self.history.push_back(chunk.clone());
        while self.history.len() > *self.config.get_room_history_chunks() {
            self.history.pop_front();
        }

        // No receivers is fine; history still records the chunk.
        let _ = self.broadcast_tx.send(chunk);
    }

    fn touch(&self) {
        let mut meta = self.shared.meta.lock().unwrap();
        meta.session_count = self.sessions.len();
        meta.last_activity_at = self.clock.now();
    }
}
