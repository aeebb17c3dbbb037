use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use crate::error::{configuration, SessionResult};
use crate::token::{SigningAlgorithm, SigningKey, EXPIRY_CLAIM, ISSUED_AT_CLAIM};

pub const DEFAULT_COOKIE_NAME: &str = "session";
pub const DEFAULT_COOKIE_PATH: &str = "/";
pub const DEFAULT_CLAIM_NAME: &str = "sid";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

/// Middleware configuration.
///
/// `session_ttl_secs == 0` is the non-expiring sentinel: tokens carry no `exp`
/// claim and the cookie is a browser-session cookie.
#[derive(Clone, Debug, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct SessionConfig {
    #[cfg_attr(feature = "schema", schemars(with = "String"))]
    pub signing_key: SigningKey,
    pub algorithm: SigningAlgorithm,
    pub cookie_name: String,
    pub cookie_path: String,
    pub session_ttl_secs: u64,
    pub claim_name: String,
    pub http_only: bool,
    pub secure: bool,
    pub store_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signing_key: SigningKey::default(),
            algorithm: SigningAlgorithm::default(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_path: DEFAULT_COOKIE_PATH.to_string(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            claim_name: DEFAULT_CLAIM_NAME.to_string(),
            http_only: true,
            secure: false,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
        }
    }
}

impl SessionConfig {
    pub fn new(signing_key: impl Into<SigningKey>) -> Self {
        Self {
            signing_key: signing_key.into(),
            ..Self::default()
        }
    }

    pub fn with_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = path.into();
        self
    }

    /// Sets the token and cookie lifetime. Sub-second precision is dropped.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.session_ttl_secs = duration.as_secs();
        self
    }

    pub fn non_expiring(mut self) -> Self {
        self.session_ttl_secs = 0;
        self
    }

    pub fn with_claim_name(mut self, name: impl Into<String>) -> Self {
        self.claim_name = name.into();
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// `None` for non-expiring sessions.
    pub fn session_duration(&self) -> Option<Duration> {
        match self.session_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Checks the configuration before any traffic is served.
    pub fn validate(&self) -> SessionResult<()> {
        if self.signing_key.is_empty() {
            return Err(configuration("signing key must not be empty"));
        }
        if self.signing_key.len() < self.algorithm.recommended_key_len() {
            warn!(
                algorithm = ?self.algorithm,
                key_len = self.signing_key.len(),
                "session signing key is shorter than the digest size"
            );
        }
        if self.cookie_name.is_empty() || !self.cookie_name.bytes().all(is_cookie_name_byte) {
            return Err(configuration(format!(
                "invalid cookie name `{}`",
                self.cookie_name
            )));
        }
        if !self.cookie_path.starts_with('/')
            || self.cookie_path.contains(';')
            || self.cookie_path.chars().any(char::is_control)
        {
            return Err(configuration(format!(
                "cookie path `{}` must start with `/` and hold no `;` or control characters",
                self.cookie_path.escape_debug()
            )));
        }
        if self.claim_name.is_empty() {
            return Err(configuration("session claim name must not be empty"));
        }
        if self.claim_name == ISSUED_AT_CLAIM || self.claim_name == EXPIRY_CLAIM {
            return Err(configuration(format!(
                "session claim name `{}` collides with a reserved claim",
                self.claim_name
            )));
        }
        if self.store_timeout_ms == 0 {
            return Err(configuration("store timeout must be greater than zero"));
        }
        Ok(())
    }
}

// RFC 6265 cookie-name (an RFC 2616 token).
fn is_cookie_name_byte(b: u8) -> bool {
    b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;

    fn valid() -> SessionConfig {
        SessionConfig::new("0123456789abcdef0123456789abcdef")
    }

    #[test]
    fn defaults_validate_once_a_key_is_set() {
        let config = valid();
        config.validate().expect("valid");
        assert_eq!(config.cookie_name, "session");
        assert_eq!(config.cookie_path, "/");
        assert_eq!(config.claim_name, "sid");
        assert_eq!(config.session_duration(), Some(Duration::from_secs(1800)));
        assert_eq!(config.store_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn zero_ttl_is_non_expiring() {
        assert_eq!(valid().non_expiring().session_duration(), None);
        assert_eq!(
            valid().with_duration(Duration::ZERO).session_duration(),
            None
        );
    }

    #[test]
    fn rejects_bad_settings() {
        let cases = [
            SessionConfig::default(),
            valid().with_cookie_name(""),
            valid().with_cookie_name("bad name"),
            valid().with_cookie_name("a=b"),
            valid().with_cookie_path("relative"),
            valid().with_cookie_path("/a;b"),
            valid().with_cookie_path("/line\nbreak"),
            valid().with_claim_name(""),
            valid().with_claim_name("exp"),
            valid().with_claim_name("iat"),
            valid().with_store_timeout(Duration::ZERO),
        ];
        for config in cases {
            let err = config.validate().expect_err("must be rejected");
            assert!(matches!(err, SessionError::Configuration(_)), "{err:?}");
        }
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: SessionConfig = serde_json::from_value(serde_json::json!({
            "signing_key": "from-env-secret",
            "cookie_name": "app.sid",
            "session_ttl_secs": 0,
            "algorithm": "HS512"
        }))
        .expect("deserialize");
        assert_eq!(config.signing_key.as_bytes(), b"from-env-secret");
        assert_eq!(config.cookie_name, "app.sid");
        assert_eq!(config.algorithm, SigningAlgorithm::HS512);
        assert_eq!(config.cookie_path, "/");
        assert_eq!(config.session_duration(), None);
        assert!(config.http_only);
    }
}
