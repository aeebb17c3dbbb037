use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{serde_error, SessionResult};
use crate::model::{SessionId, SessionMap};

/// Request-scoped view of one session.
///
/// Reads are served from the snapshot loaded when the request arrived; writes
/// are buffered and committed once the request completes. A read after a
/// write in the same request still returns the snapshot value.
///
/// Handlers obtain it from the request extensions:
///
/// ```ignore
/// let session = request.extensions().get::<Session>().cloned().expect("session layer");
/// let visits = session.get_as::<u64>("visits")?.unwrap_or(0);
/// session.set("visits", visits + 1);
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    id: SessionId,
    is_new: bool,
    snapshot: SessionMap,
    changes: Mutex<SessionMap>,
    reset: AtomicBool,
}

impl Session {
    pub(crate) fn new(id: SessionId, snapshot: SessionMap, is_new: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                is_new,
                snapshot,
                changes: Mutex::new(SessionMap::new()),
                reset: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    /// True when the identifier was minted for this request.
    pub fn is_new(&self) -> bool {
        self.inner.is_new
    }

    /// Reads from the snapshot.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.snapshot.get(key)
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> SessionResult<Option<T>> {
        self.get(key)
            .map(|value| T::deserialize(value).map_err(serde_error))
            .transpose()
    }

    pub fn snapshot(&self) -> &SessionMap {
        &self.inner.snapshot
    }

    /// Buffers a write; the store is only touched when the request completes.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.changes.lock().insert(key.into(), value.into());
    }

    pub fn insert<T: Serialize>(&self, key: impl Into<String>, value: &T) -> SessionResult<()> {
        let value = serde_json::to_value(value).map_err(serde_error)?;
        self.set(key, value);
        Ok(())
    }

    /// Copy of the writes buffered so far.
    pub fn pending(&self) -> SessionMap {
        self.inner.changes.lock().clone()
    }

    pub fn has_changes(&self) -> bool {
        !self.inner.changes.lock().is_empty()
    }

    /// Drops all persisted state for this session when the request completes.
    /// Writes buffered in the same request are applied after the reset.
    pub fn invalidate(&self) {
        self.inner.reset.store(true, Ordering::SeqCst);
    }

    pub fn is_invalidated(&self) -> bool {
        self.inner.reset.load(Ordering::SeqCst)
    }

    pub(crate) fn take_changes(&self) -> SessionMap {
        std::mem::take(&mut *self.inner.changes.lock())
    }

    pub(crate) fn take_reset(&self) -> bool {
        self.inner.reset.swap(false, Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id.fingerprint())
            .field("is_new", &self.inner.is_new)
            .field("snapshot_keys", &self.inner.snapshot.len())
            .finish_non_exhaustive()
    }
}
