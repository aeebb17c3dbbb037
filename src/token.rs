//! Signed session tokens.
//!
//! A token is a compact HMAC-signed JWT whose claims are a flat map:
//! `{"<claim_name>": "<session id>", "iat": <unix secs>, "exp": <unix secs>}`.
//! `exp` is omitted for non-expiring sessions; a stored `exp` of `0` is read
//! the same way.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use time::OffsetDateTime;

use crate::config::SessionConfig;
use crate::error::{configuration, SessionError, SessionResult};
use crate::model::SessionId;

pub const ISSUED_AT_CLAIM: &str = "iat";
pub const EXPIRY_CLAIM: &str = "exp";

/// Symmetric signing algorithms accepted for session tokens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub enum SigningAlgorithm {
    #[default]
    HS256,
    HS384,
    HS512,
}

impl SigningAlgorithm {
    fn as_jwt(self) -> Algorithm {
        match self {
            SigningAlgorithm::HS256 => Algorithm::HS256,
            SigningAlgorithm::HS384 => Algorithm::HS384,
            SigningAlgorithm::HS512 => Algorithm::HS512,
        }
    }

    /// Digest output size in bytes; keys shorter than this are weak.
    pub fn recommended_key_len(self) -> usize {
        match self {
            SigningAlgorithm::HS256 => 32,
            SigningAlgorithm::HS384 => 48,
            SigningAlgorithm::HS512 => 64,
        }
    }
}

/// HMAC key material. Deserializes from a plain string and never prints itself.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey(<{} bytes redacted>)", self.0.len())
    }
}

impl From<String> for SigningKey {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl From<&str> for SigningKey {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for SigningKey {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for SigningKey {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

/// Claims carried by a session token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionClaims {
    pub session_id: SessionId,
    /// Unix seconds.
    pub issued_at: i64,
    /// Unix seconds; `None` means the token never expires.
    pub expires_at: Option<i64>,
}

impl SessionClaims {
    /// Builds claims issued at `now`, expiring after `ttl` when one is given.
    pub fn issue(session_id: SessionId, now: OffsetDateTime, ttl: Option<Duration>) -> Self {
        let issued_at = now.unix_timestamp();
        let expires_at = ttl
            .map(|ttl| issued_at.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)));
        Self {
            session_id,
            issued_at,
            expires_at,
        }
    }

    /// `now` is at or past the expiry.
    pub fn is_expired_at(&self, now: i64) -> bool {
        match self.expires_at {
            Some(exp) => now >= exp,
            None => false,
        }
    }

    fn to_map(&self, claim_name: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(
            claim_name.to_owned(),
            Value::String(self.session_id.as_str().to_owned()),
        );
        map.insert(ISSUED_AT_CLAIM.to_owned(), Value::from(self.issued_at));
        if let Some(exp) = self.expires_at.filter(|exp| *exp != 0) {
            map.insert(EXPIRY_CLAIM.to_owned(), Value::from(exp));
        }
        map
    }

    fn from_map(map: &Map<String, Value>, claim_name: &str) -> SessionResult<Self> {
        let session_id = map
            .get(claim_name)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SessionError::Decode(format!("missing `{claim_name}` claim")))?;
        let issued_at = map
            .get(ISSUED_AT_CLAIM)
            .and_then(Value::as_i64)
            .ok_or_else(|| SessionError::Decode("missing or non-integer `iat` claim".into()))?;
        let expires_at = match map.get(EXPIRY_CLAIM) {
            None | Some(Value::Null) => None,
            Some(value) => match value.as_i64() {
                Some(0) => None,
                Some(exp) => Some(exp),
                None => return Err(SessionError::Decode("non-integer `exp` claim".into())),
            },
        };
        Ok(Self {
            session_id: SessionId::from(session_id),
            issued_at,
            expires_at,
        })
    }
}

/// Signs and verifies session tokens with one configured key and algorithm.
pub struct TokenCodec {
    algorithm: SigningAlgorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    claim_name: String,
}

impl TokenCodec {
    pub fn new(
        key: &SigningKey,
        algorithm: SigningAlgorithm,
        claim_name: impl Into<String>,
    ) -> SessionResult<Self> {
        if key.is_empty() {
            return Err(configuration("signing key must not be empty"));
        }
        let claim_name = claim_name.into();
        if claim_name.is_empty() {
            return Err(configuration("session claim name must not be empty"));
        }

        // Only the configured algorithm is accepted; expiry is checked by hand
        // so that `exp == now` counts as expired and `exp` may be absent.
        let mut validation = Validation::new(algorithm.as_jwt());
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims.clear();

        Ok(Self {
            algorithm,
            encoding: EncodingKey::from_secret(key.as_bytes()),
            decoding: DecodingKey::from_secret(key.as_bytes()),
            validation,
            claim_name,
        })
    }

    pub fn from_config(config: &SessionConfig) -> SessionResult<Self> {
        Self::new(&config.signing_key, config.algorithm, config.claim_name.clone())
    }

    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    pub fn claim_name(&self) -> &str {
        &self.claim_name
    }

    pub fn sign(&self, claims: &SessionClaims) -> SessionResult<String> {
        let header = Header::new(self.algorithm.as_jwt());
        jsonwebtoken::encode(&header, &claims.to_map(&self.claim_name), &self.encoding)
            .map_err(|err| SessionError::Encode(format!("failed to sign token: {err}")))
    }

    /// Verifies against the current wall clock.
    pub fn verify(&self, token: &str) -> SessionResult<SessionClaims> {
        self.verify_at(token, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Verifies the signature, the declared algorithm and expiry relative to `now`.
    pub fn verify_at(&self, token: &str, now: i64) -> SessionResult<SessionClaims> {
        let data = jsonwebtoken::decode::<Map<String, Value>>(token, &self.decoding, &self.validation)
            .map_err(|err| match err.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::MissingAlgorithm => SessionError::Signature,
                ErrorKind::ExpiredSignature => SessionError::Expired,
                _ => SessionError::Decode(err.to_string()),
            })?;
        let claims = SessionClaims::from_map(&data.claims, &self.claim_name)?;
        if claims.is_expired_at(now) {
            return Err(SessionError::Expired);
        }
        Ok(claims)
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("claim_name", &self.claim_name)
            .finish_non_exhaustive()
    }
}
