//! Tower integration.
//!
//! [`SessionLayer`] wraps any `http` service. Per request it resolves the
//! session, inserts a [`Session`] into the request extensions, runs the inner
//! service and then commits the buffered writes. The commit runs on every exit
//! path: normal return, error return, panic (re-raised after the commit) and
//! cancellation (the commit is spawned onto the current runtime). A commit
//! that has started runs to completion even if the request is dropped.
//!
//! A session minted for this request only reaches the client through the
//! `Set-Cookie` header of a successful response. When the handler fails,
//! panics or is cancelled, writes to such a session are discarded.

use futures::FutureExt;
use http::header::SET_COOKIE;
use http::{Request, Response};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::context::Session;
use crate::manager::SessionManager;

#[derive(Clone, Debug)]
pub struct SessionLayer {
    manager: Arc<SessionManager>,
}

impl SessionLayer {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }
}

impl<S> Layer<S> for SessionLayer {
    type Service = SessionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionService {
            inner,
            manager: self.manager.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionService<S> {
    inner: S,
    manager: Arc<SessionManager>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for SessionService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        // The ready service is the one that must handle this request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let manager = self.manager.clone();

        Box::pin(async move {
            let resolved = manager.resolve(req.headers()).await;
            req.extensions_mut().insert(resolved.session.clone());

            let minted = resolved.session.is_new();
            let guard = CommitGuard::new(manager, resolved.session);
            let outcome = AssertUnwindSafe(inner.call(req)).catch_unwind().await;
            if minted && !matches!(outcome, Ok(Ok(_))) {
                guard.discard();
            } else {
                guard.commit().await;
            }

            let mut response = match outcome {
                Ok(result) => result?,
                Err(payload) => panic::resume_unwind(payload),
            };
            if let Some(cookie) = resolved.set_cookie {
                response.headers_mut().append(SET_COOKIE, cookie);
            }
            Ok(response)
        })
    }
}

/// Commits the session exactly once, spawning the commit if dropped early.
struct CommitGuard {
    manager: Arc<SessionManager>,
    session: Option<Session>,
}

impl CommitGuard {
    fn new(manager: Arc<SessionManager>, session: Session) -> Self {
        Self {
            manager,
            session: Some(session),
        }
    }

    /// Runs the commit on its own task so that dropping the request future
    /// mid-write does not abandon it.
    async fn commit(mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let manager = self.manager.clone();
                let task = handle.spawn(async move {
                    manager.commit(&session).await;
                });
                if let Err(err) = task.await {
                    warn!(error = %err, "session commit task failed");
                }
            }
            Err(_) => self.manager.commit(&session).await,
        }
    }

    fn discard(mut self) {
        if let Some(session) = self.session.take() {
            if session.has_changes() || session.is_invalidated() {
                debug!(
                    session = %session.id().fingerprint(),
                    "minted session never reached the client, changes dropped"
                );
            }
        }
    }
}

impl Drop for CommitGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if session.is_new() {
            debug!(
                session = %session.id().fingerprint(),
                "request cancelled before the minted cookie was sent, changes dropped"
            );
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let manager = self.manager.clone();
                handle.spawn(async move {
                    manager.commit(&session).await;
                });
            }
            Err(_) => warn!(
                session = %session.id().fingerprint(),
                "request dropped outside a tokio runtime, session changes lost"
            ),
        }
    }
}
