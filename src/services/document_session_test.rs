use super::*;

fn t0() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
}

fn new_session(owner: Option<i64>) -> NewSession {
    NewSession {
        documents: vec![StoredDocument::pdf("a.pdf", b"%PDF-a".to_vec()), StoredDocument::pdf("b.pdf", b"%PDF-b".to_vec())],
        initial_prompt: "Summarize".into(),
        initial_response: "Two CVs.".into(),
        owner_user_id: owner,
        source: DocumentSource::Upload,
    }
}

fn cache_with_ttl(secs: u64) -> DocumentSessionCache {
    DocumentSessionCache::new(Arc::new(InMemorySessionStore::new()), Duration::from_secs(secs))
}

#[tokio::test]
async fn create_seeds_first_turn_pair() {
    let cache = DocumentSessionCache::default();
    let id = cache.create(new_session(None)).await;

    assert!(cache.exists(id).await);
    let session = cache.get(id).await.unwrap();
    assert_eq!(session.session_id(), id);
    assert_eq!(session.documents().len(), 2);
    assert_eq!(session.documents()[0].filename, "a.pdf");
    assert_eq!(session.source(), DocumentSource::Upload);
    let lines: Vec<_> = session.transcript().iter().map(Turn::render).collect();
    assert_eq!(lines, vec!["User: Summarize", "Assistant: Two CVs."]);
}

#[tokio::test]
async fn session_ids_are_unique_v4() {
    let cache = DocumentSessionCache::default();
    let a = cache.create(new_session(None)).await;
    let b = cache.create(new_session(None)).await;
    assert_ne!(a, b);
    assert_eq!(a.get_version_num(), 4);
    assert_eq!(cache.len().await, 2);
}

#[tokio::test]
async fn append_turn_keeps_order() {
    let cache = DocumentSessionCache::default();
    let id = cache.create(new_session(None)).await;
    cache.append_turn(id, Role::User, "What about experience?").await;
    cache.append_turn(id, Role::Assistant, "Five years.").await;

    let session = cache.get(id).await.unwrap();
    let lines: Vec<_> = session.transcript().iter().map(Turn::render).collect();
    assert_eq!(
        lines,
        vec!["User: Summarize", "Assistant: Two CVs.", "User: What about experience?", "Assistant: Five years."]
    );
}

#[tokio::test]
async fn append_turn_on_unknown_session_is_ignored() {
    let cache = DocumentSessionCache::default();
    let unknown = Uuid::new_v4();
    cache.append_turn(unknown, Role::User, "hello").await;
    assert!(!cache.exists(unknown).await);
    assert!(cache.get(unknown).await.is_none());
}

#[tokio::test]
async fn continuation_rules_follow_owner() {
    let cache = DocumentSessionCache::default();
    let anon = cache.get(cache.create(new_session(None)).await).await.unwrap();
    assert!(anon.is_continuable_by(None));
    assert!(anon.is_continuable_by(Some(7)));

    let owned = cache.get(cache.create(new_session(Some(7))).await).await.unwrap();
    assert!(owned.is_continuable_by(Some(7)));
    assert!(!owned.is_continuable_by(Some(8)));
    assert!(!owned.is_continuable_by(None));
}

#[tokio::test]
async fn lock_serialises_continuations() {
    let cache = DocumentSessionCache::default();
    let id = cache.create(new_session(None)).await;

    let mut guard = cache.lock(id).await.unwrap();
    let other = cache.clone();
    let waiter = tokio::spawn(async move { other.get(id).await.map(|s| s.transcript().len()) });

    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());
    guard.push_turn(Role::User, "q");
    guard.push_turn(Role::Assistant, "a");
    drop(guard);

    assert_eq!(waiter.await.unwrap(), Some(4));
}

#[tokio::test]
async fn idle_sessions_are_evicted_after_ttl() {
    let cache = cache_with_ttl(60);
    let stale = cache.create_at(new_session(None), t0()).await;
    let fresh = cache.create_at(new_session(None), t0() + Duration::from_secs(50)).await;

    assert_eq!(cache.evict_idle_at(t0() + Duration::from_secs(61)).await, 1);
    assert!(!cache.exists(stale).await);
    assert!(cache.exists(fresh).await);
}

#[tokio::test]
async fn locked_sessions_survive_eviction() {
    let cache = cache_with_ttl(1);
    let id = cache.create_at(new_session(None), t0()).await;
    let guard = cache.lock(id).await.unwrap();

    assert_eq!(cache.evict_idle_at(t0() + Duration::from_secs(3600)).await, 0);
    drop(guard);
    assert_eq!(cache.evict_idle_at(t0() + Duration::from_secs(3600)).await, 1);
}

/// Store whose lookups race with the janitor: every handle it hands out has
/// already been evicted by the time the caller gets to lock it.
#[derive(Default)]
struct RacingStore {
    inner: InMemorySessionStore,
}

#[async_trait::async_trait]
impl SessionStore for RacingStore {
    async fn insert(&self, session: DocumentSession) {
        self.inner.insert(session).await;
    }

    async fn handle(&self, session_id: Uuid) -> Option<SessionHandle> {
        let handle = self.inner.handle(session_id).await;
        self.inner.evict_where(&|_: &DocumentSession| true).await;
        handle
    }

    async fn evict_where(&self, evict: &(dyn for<'a> Fn(&'a DocumentSession) -> bool + Send + Sync)) -> usize {
        self.inner.evict_where(evict).await
    }

    async fn len(&self) -> usize {
        self.inner.len().await
    }
}

#[tokio::test]
async fn lock_on_session_evicted_mid_lookup_is_none() {
    let cache = DocumentSessionCache::new(Arc::new(RacingStore::default()), Duration::from_secs(60));
    let id = cache.create(new_session(None)).await;

    assert!(cache.lock(id).await.is_none());
    assert_eq!(cache.len().await, 0);
}

#[test]
fn source_labels() {
    assert_eq!(DocumentSource::Upload.as_str(), "upload");
    assert_eq!(DocumentSource::SecureFolder.as_str(), "secure_folder");
}
