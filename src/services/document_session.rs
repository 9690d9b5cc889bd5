//! Document session cache — uploaded PDFs plus a running transcript.
//!
//! DESIGN
//! ======
//! A session is created once per document analysis and addressed by a random
//! v4 UUID. Its document set never changes after creation; follow-up turns
//! only append to the transcript.
//!
//! Storage sits behind [`SessionStore`]. Each session lives behind its own
//! async mutex so a continuation can hold it across the LLM call: turns of one
//! session are serialised, different sessions run in parallel.
//!
//! TRADE-OFFS
//! ==========
//! Sessions are process-local and lost on restart. Idle sessions are evicted
//! after a TTL measured from the last turn; a session that is locked by an
//! in-flight continuation is never evicted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::llm::types::Role;

const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

// =============================================================================
// TYPES
// =============================================================================

/// Where a session's documents came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSource {
    Upload,
    SecureFolder,
}

impl DocumentSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::SecureFolder => "secure_folder",
        }
    }
}

/// One document held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub filename: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

impl StoredDocument {
    #[must_use]
    pub fn pdf(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self { filename: filename.into(), media_type: PDF_MEDIA_TYPE.to_owned(), data }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn info(&self) -> DocumentInfo {
        DocumentInfo { filename: self.filename.clone(), size: self.size() }
    }
}

/// Filename and size, as reported to clients and stored in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    pub filename: String,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    /// `User: …` / `Assistant: …` line used when replaying the transcript.
    #[must_use]
    pub fn render(&self) -> String {
        match self.role {
            Role::User => format!("User: {}", self.text),
            Role::Assistant => format!("Assistant: {}", self.text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentSession {
    session_id: Uuid,
    documents: Arc<[StoredDocument]>,
    transcript: Vec<Turn>,
    owner_user_id: Option<i64>,
    source: DocumentSource,
    last_active: OffsetDateTime,
}

impl DocumentSession {
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    #[must_use]
    pub fn documents(&self) -> &[StoredDocument] {
        &self.documents
    }

    #[must_use]
    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    #[must_use]
    pub fn owner_user_id(&self) -> Option<i64> {
        self.owner_user_id
    }

    #[must_use]
    pub fn source(&self) -> DocumentSource {
        self.source
    }

    /// Whether `caller` may continue this session. Anonymous sessions are
    /// open to any token holder; owned sessions only to their owner.
    #[must_use]
    pub fn is_continuable_by(&self, caller: Option<i64>) -> bool {
        self.owner_user_id.is_none() || self.owner_user_id == caller
    }

    pub fn push_turn(&mut self, role: Role, text: impl Into<String>) {
        self.push_turn_at(role, text, OffsetDateTime::now_utc());
    }

    fn push_turn_at(&mut self, role: Role, text: impl Into<String>, now: OffsetDateTime) {
        self.transcript.push(Turn { role, text: text.into() });
        self.last_active = now;
    }

    fn is_idle(&self, now: OffsetDateTime, ttl: Duration) -> bool {
        now - self.last_active > ttl
    }
}

/// Input to [`DocumentSessionCache::create`].
#[derive(Debug, Clone)]
pub struct NewSession {
    pub documents: Vec<StoredDocument>,
    pub initial_prompt: String,
    pub initial_response: String,
    pub owner_user_id: Option<i64>,
    pub source: DocumentSource,
}

pub type SessionHandle = Arc<tokio::sync::Mutex<DocumentSession>>;

// =============================================================================
// STORE
// =============================================================================

/// Keyed storage for document sessions.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: DocumentSession);

    async fn handle(&self, session_id: Uuid) -> Option<SessionHandle>;

    /// Drop every session for which `evict` returns true. Sessions that are
    /// currently locked are skipped. Returns how many were dropped.
    async fn evict_where(&self, evict: &(dyn for<'a> Fn(&'a DocumentSession) -> bool + Send + Sync)) -> usize;

    async fn len(&self) -> usize;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<Uuid, SessionHandle>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: DocumentSession) {
        let mut map = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        map.insert(session.session_id, Arc::new(tokio::sync::Mutex::new(session)));
    }

    async fn handle(&self, session_id: Uuid) -> Option<SessionHandle> {
        let map = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(&session_id).cloned()
    }

    async fn evict_where(&self, evict: &(dyn for<'a> Fn(&'a DocumentSession) -> bool + Send + Sync)) -> usize {
        let mut map = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let before = map.len();
        map.retain(|_, handle| match handle.try_lock() {
            Ok(session) => !evict(&session),
            Err(_) => true,
        });
        before - map.len()
    }

    async fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

// =============================================================================
// CACHE
// =============================================================================

#[derive(Clone)]
pub struct DocumentSessionCache {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl DocumentSessionCache {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// In-memory cache with `DOC_SESSION_TTL_SECS` (default 24h) idle TTL.
    #[must_use]
    pub fn from_env() -> Self {
        let ttl_secs = std::env::var("DOC_SESSION_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SESSION_TTL_SECS);
        Self::new(Arc::new(InMemorySessionStore::new()), Duration::from_secs(ttl_secs))
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a new session seeded with its first user/assistant turn pair.
    pub async fn create(&self, new: NewSession) -> Uuid {
        self.create_at(new, OffsetDateTime::now_utc()).await
    }

    async fn create_at(&self, new: NewSession, now: OffsetDateTime) -> Uuid {
        let session_id = Uuid::new_v4();
        let session = DocumentSession {
            session_id,
            documents: new.documents.into(),
            transcript: vec![
                Turn { role: Role::User, text: new.initial_prompt },
                Turn { role: Role::Assistant, text: new.initial_response },
            ],
            owner_user_id: new.owner_user_id,
            source: new.source,
            last_active: now,
        };
        self.store.insert(session).await;
        tracing::info!(%session_id, owner = ?new.owner_user_id, source = new.source.as_str(), "document session created");
        session_id
    }

    pub async fn exists(&self, session_id: Uuid) -> bool {
        self.store.handle(session_id).await.is_some()
    }

    /// Snapshot of the session. Waits for any in-flight continuation.
    pub async fn get(&self, session_id: Uuid) -> Option<DocumentSession> {
        let handle = self.store.handle(session_id).await?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    /// Append a turn. Unknown sessions are ignored.
    pub async fn append_turn(&self, session_id: Uuid, role: Role, text: impl Into<String>) {
        if let Some(handle) = self.store.handle(session_id).await {
            handle.lock().await.push_turn(role, text);
        }
    }

    /// Exclusive access for a whole continuation (context read, LLM call,
    /// transcript append).
    /// `None` when the session is unknown, or was evicted while waiting for
    /// the lock.
    pub async fn lock(&self, session_id: Uuid) -> Option<OwnedMutexGuard<DocumentSession>> {
        let handle = self.store.handle(session_id).await?;
        let guard = handle.clone().lock_owned().await;
        // Eviction skips locked sessions, so a hit here stays stored until the guard drops.
        match self.store.handle(session_id).await {
            Some(current) if Arc::ptr_eq(&current, &handle) => Some(guard),
            _ => None,
        }
    }

    /// Drop sessions idle for longer than the TTL.
    pub async fn evict_idle(&self) -> usize {
        self.evict_idle_at(OffsetDateTime::now_utc()).await
    }

    async fn evict_idle_at(&self, now: OffsetDateTime) -> usize {
        let ttl = self.ttl;
        self.store.evict_where(&move |s: &DocumentSession| s.is_idle(now, ttl)).await
    }

    pub async fn len(&self) -> usize {
        self.store.len().await
    }
}

impl Default for DocumentSessionCache {
    fn default() -> Self {
        Self::new(Arc::new(InMemorySessionStore::new()), Duration::from_secs(DEFAULT_SESSION_TTL_SECS))
    }
}

#[cfg(test)]
#[path = "document_session_test.rs"]
mod tests;
