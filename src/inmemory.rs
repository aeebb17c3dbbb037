use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};

use crate::error::{not_found, SessionResult};
use crate::model::{SessionId, SessionMap};
use crate::store::SessionStore;

const CLEANUP_INTERVAL: Duration = Duration::seconds(60);

struct Entry {
    state: SessionMap,
    touched_at: OffsetDateTime,
}

impl Entry {
    fn is_expired(&self, now: OffsetDateTime, idle_ttl: Option<Duration>) -> bool {
        match idle_ttl {
            Some(ttl) => now - self.touched_at >= ttl,
            None => false,
        }
    }
}

/// In-memory implementation backed by a concurrent hash map.
pub struct InMemorySessionStore {
    entries: DashMap<SessionId, Entry>,
    idle_ttl: Option<Duration>,
    cleanup_hint: Mutex<OffsetDateTime>,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            idle_ttl: None,
            cleanup_hint: Mutex::new(OffsetDateTime::now_utc()),
        }
    }
}

impl InMemorySessionStore {
    /// Constructs a store whose entries never expire.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops entries that have not been updated for `ttl`. Expiration is
    /// handled lazily on access.
    pub fn with_idle_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.idle_ttl = Some(Duration::try_from(ttl).unwrap_or(Duration::MAX));
        self
    }

    /// Number of stored sessions, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn maybe_cleanup(&self, now: OffsetDateTime) {
        if self.idle_ttl.is_none() {
            return;
        }
        let mut guard = self.cleanup_hint.lock();
        if now - *guard < CLEANUP_INTERVAL {
            return;
        }

        self.entries
            .retain(|_, entry| !entry.is_expired(now, self.idle_ttl));

        *guard = now;
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn backend_name(&self) -> &'static str {
        "in-memory"
    }

    async fn load(&self, id: &SessionId) -> SessionResult<SessionMap> {
        let now = Self::now();
        self.maybe_cleanup(now);
        if let Some(entry) = self.entries.get(id) {
            if entry.is_expired(now, self.idle_ttl) {
                drop(entry);
                self.entries.remove(id);
                return Err(not_found(id));
            }
            return Ok(entry.state.clone());
        }
        Err(not_found(id))
    }

    async fn update(&self, id: &SessionId, changes: &SessionMap) -> SessionResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let now = Self::now();
        self.maybe_cleanup(now);

        let mut entry = self.entries.entry(id.clone()).or_insert_with(|| Entry {
            state: SessionMap::new(),
            touched_at: now,
        });
        if entry.is_expired(now, self.idle_ttl) {
            entry.state.clear();
        }
        entry
            .state
            .extend(changes.iter().map(|(k, v)| (k.clone(), v.clone())));
        entry.touched_at = now;
        Ok(())
    }

    async fn reset(&self, id: &SessionId) -> SessionResult<()> {
        self.entries.remove(id);
        Ok(())
    }
}
