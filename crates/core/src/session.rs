// Session transport multiplexer: tracks live sessions by id

use crate::error::{ToolgateError, ToolgateResult};
use crate::types::SessionId;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Transport handle owned by a session
pub trait SessionTransport: Send + Sync + 'static {
    /// Release the transport. Called exactly once, when the session closes.
    fn close(&self);
}

/// Lifecycle state of a registered session
///
/// Sessions that have not finished their handshake are never registered, so
/// there is no stored "uninitialized" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Closed,
}

/// A live client session
pub struct Session<T> {
    id: SessionId,
    transport: T,
    created_at: DateTime<Utc>,
    closed: AtomicBool,
}

impl<T: SessionTransport> Session<T> {
    fn new(id: SessionId, transport: T) -> Self {
        Self {
            id,
            transport,
            created_at: Utc::now(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        if self.closed.load(Ordering::SeqCst) {
            SessionState::Closed
        } else {
            SessionState::Active
        }
    }

    /// Returns false if the session was already closed
    fn mark_closed(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.transport.close();
        true
    }
}

struct SessionTable<T> {
    live: HashMap<SessionId, Arc<Session<T>>>,
    // Ids of closed sessions; a retired id is never registered again
    retired: HashSet<SessionId>,
}

impl<T: SessionTransport> SessionTable<T> {
    fn retire(&mut self, id: &SessionId) -> Option<Arc<Session<T>>> {
        let session = self.live.remove(id)?;
        self.retired.insert(*id);
        Some(session)
    }
}

/// Maps session ids to their transports
pub struct SessionMultiplexer<T> {
    sessions: RwLock<SessionTable<T>>,
}

impl<T: SessionTransport> SessionMultiplexer<T> {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(SessionTable {
                live: HashMap::new(),
                retired: HashSet::new(),
            }),
        }
    }

    /// Register a new session once its transport has completed the handshake
    ///
    /// `handshake` allocates the session id and builds the transport. Nothing
    /// is stored if it fails, so a half-initialized session is never visible.
    pub async fn initialize<F, Fut>(&self, handshake: F) -> ToolgateResult<Arc<Session<T>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ToolgateResult<(SessionId, T)>>,
    {
        let (id, transport) = handshake().await?;
        let session = Arc::new(Session::new(id, transport));

        let mut sessions = self.sessions.write().await;
        if sessions.live.contains_key(&id) || sessions.retired.contains(&id) {
            // The rejected transport is released before reporting the clash
            session.mark_closed();
            return Err(ToolgateError::Internal(format!(
                "Session id {} is already in use",
                id
            )));
        }
        sessions.live.insert(id, session.clone());
        drop(sessions);

        tracing::info!(session_id = %id, "Session initialized");
        Ok(session)
    }

    /// Find the live session for a raw header value
    pub async fn resolve(&self, raw_id: Option<&str>) -> ToolgateResult<Arc<Session<T>>> {
        let id = parse_session_id(raw_id)?;
        let session = self
            .sessions
            .read()
            .await
            .live
            .get(&id)
            .cloned()
            .ok_or(ToolgateError::InvalidSession)?;

        match session.state() {
            SessionState::Active => Ok(session),
            SessionState::Closed => Err(ToolgateError::InvalidSession),
        }
    }

    /// Explicitly terminate a session
    pub async fn close(&self, raw_id: Option<&str>) -> ToolgateResult<()> {
        let id = parse_session_id(raw_id)?;
        match self.remove(&id).await {
            Some(session) => {
                tracing::info!(
                    session_id = %id,
                    lifetime_secs = (Utc::now() - session.created_at()).num_seconds(),
                    "Session terminated by client"
                );
                Ok(())
            }
            None => Err(ToolgateError::InvalidSession),
        }
    }

    /// Handle a close reported by the transport itself. Idempotent.
    pub async fn transport_closed(&self, id: &SessionId) -> bool {
        match self.remove(id).await {
            Some(session) => {
                tracing::info!(
                    session_id = %id,
                    lifetime_secs = (Utc::now() - session.created_at()).num_seconds(),
                    "Session closed by transport"
                );
                true
            }
            None => false,
        }
    }

    /// Close every session, used at shutdown
    pub async fn close_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<_> = sessions.live.keys().copied().collect();
            ids.iter().filter_map(|id| sessions.retire(id)).collect()
        };
        for session in &drained {
            session.mark_closed();
        }
        if !drained.is_empty() {
            tracing::info!("Closed {} sessions", drained.len());
        }
        drained.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.live.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.live.is_empty()
    }

    /// Removes the entry under the write lock, then releases the transport once
    async fn remove(&self, id: &SessionId) -> Option<Arc<Session<T>>> {
        let removed = self.sessions.write().await.retire(id)?;
        removed.mark_closed().then_some(removed)
    }
}

impl<T: SessionTransport> Default for SessionMultiplexer<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_session_id(raw_id: Option<&str>) -> ToolgateResult<SessionId> {
    raw_id
        .ok_or(ToolgateError::InvalidSession)?
        .parse()
        .map_err(|_| ToolgateError::InvalidSession)
}
