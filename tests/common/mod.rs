#![allow(dead_code)]

use async_trait::async_trait;
use cookie_session::inmemory::InMemorySessionStore;
use cookie_session::{
    FailureReporter, SessionClaims, SessionConfig, SessionError, SessionId, SessionMap,
    SessionResult, SessionStore, TokenCodec,
};
use http::header::{COOKIE, SET_COOKIE};
use http::{Request, Response};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const KEY: &str = "test-signing-key-0123456789abcdef";

pub fn config() -> SessionConfig {
    SessionConfig::new(KEY)
}

pub fn request(cookie: Option<&str>) -> Request<String> {
    let mut builder = Request::builder().uri("/");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(String::new()).expect("request builds")
}

/// `name=value` of the response's session cookie, ready for a `Cookie` header.
pub fn session_cookie(response: &Response<String>) -> Option<String> {
    let header = response.headers().get(SET_COOKIE)?;
    let parsed = cookie::Cookie::parse(header.to_str().ok()?.to_owned()).ok()?;
    Some(format!("{}={}", parsed.name(), parsed.value()))
}

/// `Cookie` header value carrying a valid token for `id`.
pub fn cookie_for(id: &SessionId) -> String {
    let codec = TokenCodec::from_config(&config()).expect("codec");
    let claims = SessionClaims::issue(id.clone(), time::OffsetDateTime::now_utc(), None);
    format!("session={}", codec.sign(&claims).expect("sign"))
}

pub fn token_of(cookie_pair: &str) -> &str {
    cookie_pair
        .split_once('=')
        .map(|(_, value)| value)
        .expect("cookie pair")
}

/// Wraps the in-memory store and counts calls per operation.
#[derive(Default)]
pub struct CountingStore {
    pub inner: InMemorySessionStore,
    pub loads: AtomicUsize,
    pub updates: AtomicUsize,
    pub resets: AtomicUsize,
}

impl CountingStore {
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for CountingStore {
    fn backend_name(&self) -> &'static str {
        "counting"
    }

    async fn load(&self, id: &SessionId) -> SessionResult<SessionMap> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(id).await
    }

    async fn update(&self, id: &SessionId, changes: &SessionMap) -> SessionResult<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(id, changes).await
    }

    async fn reset(&self, id: &SessionId) -> SessionResult<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.inner.reset(id).await
    }
}

/// Every call fails with a transient I/O error.
pub struct UnavailableStore;

#[async_trait]
impl SessionStore for UnavailableStore {
    fn backend_name(&self) -> &'static str {
        "unavailable"
    }

    async fn load(&self, _id: &SessionId) -> SessionResult<SessionMap> {
        Err(SessionError::StoreIo("connection reset by peer".into()))
    }

    async fn update(&self, _id: &SessionId, _changes: &SessionMap) -> SessionResult<()> {
        Err(SessionError::StoreIo("connection reset by peer".into()))
    }

    async fn reset(&self, _id: &SessionId) -> SessionResult<()> {
        Err(SessionError::StoreIo("connection reset by peer".into()))
    }
}

/// Loads hang for `delay`; writes succeed immediately.
pub struct SlowStore {
    pub delay: Duration,
}

#[async_trait]
impl SessionStore for SlowStore {
    fn backend_name(&self) -> &'static str {
        "slow"
    }

    async fn load(&self, _id: &SessionId) -> SessionResult<SessionMap> {
        tokio::time::sleep(self.delay).await;
        Ok(SessionMap::new())
    }

    async fn update(&self, _id: &SessionId, _changes: &SessionMap) -> SessionResult<()> {
        Ok(())
    }

    async fn reset(&self, _id: &SessionId) -> SessionResult<()> {
        Ok(())
    }
}

/// Writes take `delay` before reaching the in-memory store.
pub struct SlowWriteStore {
    pub inner: InMemorySessionStore,
    pub delay: Duration,
    pub started: AtomicUsize,
    pub finished: AtomicUsize,
}

impl SlowWriteStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemorySessionStore::new(),
            delay,
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SessionStore for SlowWriteStore {
    fn backend_name(&self) -> &'static str {
        "slow-write"
    }

    async fn load(&self, id: &SessionId) -> SessionResult<SessionMap> {
        self.inner.load(id).await
    }

    async fn update(&self, id: &SessionId, changes: &SessionMap) -> SessionResult<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.update(id, changes).await?;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reset(&self, id: &SessionId) -> SessionResult<()> {
        self.inner.reset(id).await
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    pub failures: Mutex<Vec<(SessionId, String)>>,
}

impl FailureReporter for RecordingReporter {
    fn flush_failed(&self, session: &SessionId, error: &SessionError) {
        self.failures.lock().push((session.clone(), error.to_string()));
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
