use async_trait::async_trait;

use crate::error::SessionResult;
use crate::model::{SessionId, SessionMap};

/// Persistent session storage used by the session middleware.
///
/// One instance is shared by every in-flight request, so implementations must
/// be safe for concurrent calls. Concurrent updates to the same identifier may
/// resolve last-write-wins per key.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Short backend name used in logs.
    fn backend_name(&self) -> &'static str;

    /// Returns the persisted state for the identifier.
    ///
    /// Fails with [`SessionError::NotFound`](crate::SessionError::NotFound)
    /// when no state has been written for it yet.
    async fn load(&self, id: &SessionId) -> SessionResult<SessionMap>;

    /// Upserts each key of `changes` into the persisted state. Keys absent from
    /// `changes` are left untouched; an empty change set is a no-op.
    async fn update(&self, id: &SessionId, changes: &SessionMap) -> SessionResult<()>;

    /// Deletes all persisted state for the identifier. Resetting an unknown
    /// identifier succeeds.
    async fn reset(&self, id: &SessionId) -> SessionResult<()>;
}
