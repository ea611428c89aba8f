//! Per-session state and the registry that owns it.
//!
//! Every browser visit gets one [`SessionState`] behind its own async mutex. Handlers look the
//! session up by id, lock it for the duration of one interaction and never touch another
//! session's state. Sessions that go unused for longer than the configured idle timeout are
//! dropped by a background sweep, since a closing browser tab cannot be relied on to say goodbye.

use crate::chat::ChatPhase;
use crate::engine::QueryEngine;
use crate::models::{FileKey, Message, NodeWithScore, SessionId, UploadedFile};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const SWEEP_PERIOD: Duration = Duration::from_secs(60);

pub type SessionHandle = Arc<Mutex<SessionState>>;

pub struct SessionState {
    id: SessionId,
    pub(crate) file_cache: HashMap<FileKey, Arc<QueryEngine>>,
    pub(crate) messages: Vec<Message>,
    pub(crate) uploaded_file: Option<UploadedFile>,
    pub(crate) active_file: Option<FileKey>,
    pub(crate) context: Option<Vec<NodeWithScore>>,
    pub(crate) phase: ChatPhase,
}

impl SessionState {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            file_cache: HashMap::new(),
            messages: Vec::new(),
            uploaded_file: None,
            active_file: None,
            context: None,
            phase: ChatPhase::Idle,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn uploaded_file(&self) -> Option<&UploadedFile> {
        self.uploaded_file.as_ref()
    }

    pub fn active_file(&self) -> Option<&FileKey> {
        self.active_file.as_ref()
    }

    pub fn context(&self) -> Option<&[NodeWithScore]> {
        self.context.as_deref()
    }

    pub fn phase(&self) -> ChatPhase {
        self.phase
    }

    pub fn is_cached(&self, key: &FileKey) -> bool {
        self.file_cache.contains_key(key)
    }

    pub fn cached_engine(&self, key: &FileKey) -> Option<Arc<QueryEngine>> {
        self.file_cache.get(key).cloned()
    }

    pub fn cache_len(&self) -> usize {
        self.file_cache.len()
    }

    pub fn active_engine(&self) -> Option<Arc<QueryEngine>> {
        self.active_file
            .as_ref()
            .and_then(|key| self.cached_engine(key))
    }
}

struct SessionEntry {
    handle: SessionHandle,
    last_seen: Instant,
}

impl SessionEntry {
    fn new(id: SessionId) -> Self {
        Self {
            handle: Arc::new(Mutex::new(SessionState::new(id))),
            last_seen: Instant::now(),
        }
    }

    fn touch(&mut self) -> SessionHandle {
        self.last_seen = Instant::now();
        self.handle.clone()
    }

    /// Busy sessions are never idle, however long ago they were last looked up.
    fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        let busy = match self.handle.try_lock() {
            Ok(state) => state.phase() == ChatPhase::Streaming,
            Err(_) => true,
        };
        !busy && now.saturating_duration_since(self.last_seen) >= ttl
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing session for `id`, or starts a fresh one.
    pub async fn open(&self, id: Option<SessionId>) -> (SessionId, SessionHandle) {
        let id = id.unwrap_or_default();
        let mut sessions = self.sessions.write().await;
        let handle = sessions
            .entry(id)
            .or_insert_with(|| {
                tracing::info!(session_id = %id, "session started");
                SessionEntry::new(id)
            })
            .touch();
        (id, handle)
    }

    pub async fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions
            .write()
            .await
            .get_mut(&id)
            .map(SessionEntry::touch)
    }

    pub async fn close(&self, id: SessionId) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            tracing::info!(session_id = %id, "session ended");
        }
        removed
    }

    /// Drops every session not looked up within `ttl`. Returns how many were dropped.
    pub async fn expire_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let idle = entry.is_idle(now, ttl);
            if idle {
                tracing::info!(session_id = %id, "session expired");
            }
            !idle
        });
        before - sessions.len()
    }

    /// Sweeps idle sessions every minute, or every `ttl` when that is shorter, until the
    /// returned task is aborted.
    pub fn spawn_expiry(self: Arc<Self>, ttl: Duration) -> JoinHandle<()> {
        let period = ttl.clamp(Duration::from_secs(1), SWEEP_PERIOD);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let expired = self.expire_idle(ttl).await;
                if expired > 0 {
                    tracing::debug!(expired, "idle sessions swept");
                }
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
