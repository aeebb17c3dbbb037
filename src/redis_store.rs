use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{configuration, not_found, redis_error, serde_error, SessionResult};
use crate::model::{SessionId, SessionMap};
use crate::store::SessionStore;

pub const DEFAULT_NAMESPACE: &str = "cookie-session";

/// Redis-backed session store keeping one hash per session.
///
/// Each session key is a hash field holding the JSON encoding of its value.
/// Constructors accept connection URLs only; no Redis client types appear in
/// the public API.
pub struct RedisSessionStore {
    conn: MultiplexedConnection,
    namespace: String,
    ttl: Option<Duration>,
}

impl RedisSessionStore {
    /// Connects using a Redis URL and the default namespace prefix.
    pub async fn from_url(url: impl AsRef<str>) -> SessionResult<Self> {
        Self::from_url_with_namespace(url, DEFAULT_NAMESPACE).await
    }

    /// Connects using a Redis URL and a custom namespace prefix.
    ///
    /// An unreachable server is a configuration error so that startup fails
    /// instead of every request.
    pub async fn from_url_with_namespace(
        url: impl AsRef<str>,
        namespace: impl Into<String>,
    ) -> SessionResult<Self> {
        let client = Client::open(url.as_ref())
            .map_err(|err| configuration(format!("invalid redis url: {err}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| configuration(format!("redis unreachable: {err}")))?;
        let namespace = namespace.into();
        info!(namespace = %namespace, "connected redis session store");
        Ok(Self {
            conn,
            namespace,
            ttl: None,
        })
    }

    /// Expires a session hash `ttl` after its last update.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn session_entry_key(&self, id: &SessionId) -> String {
        format!("{}:session:{}", self.namespace, id.as_str())
    }

    fn serialize(changes: &SessionMap) -> SessionResult<Vec<(String, String)>> {
        changes
            .iter()
            .map(|(key, value)| Ok((key.clone(), serde_json::to_string(value).map_err(serde_error)?)))
            .collect()
    }

    // Fields written by other clients may hold bare strings rather than JSON.
    fn deserialize(raw: HashMap<String, String>) -> SessionMap {
        raw.into_iter()
            .map(|(key, payload)| {
                let value = serde_json::from_str(&payload).unwrap_or(Value::String(payload));
                (key, value)
            })
            .collect()
    }

    fn ttl_millis(ttl: Duration) -> i64 {
        let ttl_ms = ttl.as_millis().max(1);
        if ttl_ms > i64::MAX as u128 {
            i64::MAX
        } else {
            ttl_ms as i64
        }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn load(&self, id: &SessionId) -> SessionResult<SessionMap> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn
            .hgetall(self.session_entry_key(id))
            .await
            .map_err(redis_error)?;
        if raw.is_empty() {
            return Err(not_found(id));
        }
        Ok(Self::deserialize(raw))
    }

    async fn update(&self, id: &SessionId, changes: &SessionMap) -> SessionResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let items = Self::serialize(changes)?;
        let entry_key = self.session_entry_key(id);

        let mut pipe = redis::pipe();
        pipe.atomic().hset_multiple(&entry_key, items.as_slice()).ignore();
        if let Some(ttl) = self.ttl {
            pipe.pexpire(&entry_key, Self::ttl_millis(ttl)).ignore();
        }
        let mut conn = self.conn.clone();
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(redis_error)?;
        debug!(session = %id.fingerprint(), fields = items.len(), "redis session updated");
        Ok(())
    }

    async fn reset(&self, id: &SessionId) -> SessionResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.session_entry_key(id))
            .await
            .map_err(redis_error)
    }
}
