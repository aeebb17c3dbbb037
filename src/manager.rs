use cookie::Cookie;
use http::header::{HeaderMap, HeaderValue, COOKIE};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, error, warn};

use crate::config::SessionConfig;
use crate::context::Session;
use crate::error::{SessionError, SessionResult};
use crate::layer::SessionLayer;
use crate::model::{SessionId, SessionMap};
use crate::report::{FailureReporter, TracingReporter};
use crate::store::SessionStore;
use crate::token::{SessionClaims, TokenCodec};

/// Why a fresh identifier was minted for a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MintReason {
    NoCookie,
    InvalidToken,
    LoadFailed,
}

/// Outcome of resolving the session for an inbound request.
pub(crate) struct Resolved {
    pub(crate) session: Session,
    /// `Set-Cookie` value to attach to the response when a session was minted.
    pub(crate) set_cookie: Option<HeaderValue>,
}

/// Owns the store, the token codec and the configuration shared by all
/// requests passing through a [`SessionLayer`].
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    codec: TokenCodec,
    config: SessionConfig,
    reporter: Arc<dyn FailureReporter>,
}

impl SessionManager {
    /// Validates `config` and builds the codec; errors here are fatal at startup.
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> SessionResult<Self> {
        config.validate()?;
        let codec = TokenCodec::from_config(&config)?;
        Ok(Self {
            store,
            codec,
            config,
            reporter: Arc::new(TracingReporter),
        })
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn FailureReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn layer(self) -> SessionLayer {
        SessionLayer::new(Arc::new(self))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Deletes all persisted state for `id` outside of a request.
    pub async fn reset(&self, id: &SessionId) -> SessionResult<()> {
        self.with_timeout(self.store.reset(id)).await
    }

    async fn with_timeout<T>(
        &self,
        call: impl std::future::Future<Output = SessionResult<T>>,
    ) -> SessionResult<T> {
        let timeout = self.config.store_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::StoreIo(format!(
                "{} store call timed out after {timeout:?}",
                self.store.backend_name()
            ))),
        }
    }

    fn read_token(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| Cookie::split_parse(value).filter_map(Result::ok))
            .find(|cookie| cookie.name() == self.config.cookie_name)
            .map(|cookie| cookie.value_trimmed().to_owned())
    }

    pub(crate) async fn resolve(&self, headers: &HeaderMap) -> Resolved {
        let Some(token) = self.read_token(headers) else {
            return self.mint(MintReason::NoCookie);
        };

        let claims = match self.codec.verify(&token) {
            Ok(claims) => claims,
            Err(err) => {
                debug!(error = %err, "session token rejected");
                return self.mint(MintReason::InvalidToken);
            }
        };

        let id = claims.session_id;
        match self.with_timeout(self.store.load(&id)).await {
            Ok(snapshot) => {
                debug!(session = %id.fingerprint(), keys = snapshot.len(), "session loaded");
                Resolved {
                    session: Session::new(id, snapshot, false),
                    set_cookie: None,
                }
            }
            // Issued here but nothing written yet; the identifier is kept.
            Err(SessionError::NotFound(_)) => {
                debug!(session = %id.fingerprint(), "session has no stored state yet");
                Resolved {
                    session: Session::new(id, SessionMap::new(), false),
                    set_cookie: None,
                }
            }
            Err(err) => {
                warn!(
                    session = %id.fingerprint(),
                    backend = self.store.backend_name(),
                    error = %err,
                    "session load failed, starting a fresh session"
                );
                self.mint(MintReason::LoadFailed)
            }
        }
    }

    fn mint(&self, reason: MintReason) -> Resolved {
        let id = SessionId::generate();
        let now = OffsetDateTime::now_utc();
        let claims = SessionClaims::issue(id.clone(), now, self.config.session_duration());
        debug!(session = %id.fingerprint(), reason = ?reason, "minted session");

        let set_cookie = match self.issue_cookie(&claims, now) {
            Ok(value) => Some(value),
            Err(err) => {
                error!(session = %id.fingerprint(), error = %err, "failed to issue session cookie");
                None
            }
        };
        Resolved {
            session: Session::new(id, SessionMap::new(), true),
            set_cookie,
        }
    }

    /// Builds the `Set-Cookie` value carrying a freshly signed token.
    pub fn issue_cookie(
        &self,
        claims: &SessionClaims,
        now: OffsetDateTime,
    ) -> SessionResult<HeaderValue> {
        let token = self.codec.sign(claims)?;
        let mut cookie = Cookie::build((self.config.cookie_name.clone(), token))
            .path(self.config.cookie_path.clone())
            .http_only(self.config.http_only)
            .secure(self.config.secure);
        if self.config.session_ttl_secs > 0 {
            let ttl = time::Duration::seconds(
                i64::try_from(self.config.session_ttl_secs).unwrap_or(i64::MAX),
            );
            cookie = cookie.max_age(ttl).expires(now + ttl);
        }
        HeaderValue::from_str(&cookie.build().to_string())
            .map_err(|err| SessionError::Encode(format!("cookie is not a valid header: {err}")))
    }

    /// Applies a pending reset and the buffered writes. Runs once per request.
    pub(crate) async fn commit(&self, session: &Session) {
        let id = session.id();
        if session.take_reset() {
            match self.with_timeout(self.store.reset(id)).await {
                Ok(()) => debug!(session = %id.fingerprint(), "session reset"),
                Err(err) => self.reporter.flush_failed(id, &err),
            }
        }

        let changes = session.take_changes();
        if changes.is_empty() {
            return;
        }
        match self.with_timeout(self.store.update(id, &changes)).await {
            Ok(()) => debug!(session = %id.fingerprint(), keys = changes.len(), "session committed"),
            Err(err) => self.reporter.flush_failed(id, &err),
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("backend", &self.store.backend_name())
            .field("codec", &self.codec)
            .field("cookie_name", &self.config.cookie_name)
            .finish_non_exhaustive()
    }
}
