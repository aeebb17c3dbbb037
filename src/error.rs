use thiserror::Error;

use crate::model::SessionId;

/// Errors produced by the token codec, the store backends and configuration.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The token is not a well-formed signed envelope.
    #[error("malformed session token: {0}")]
    Decode(String),

    /// Signature verification failed or the token declares another algorithm.
    #[error("session token signature is invalid")]
    Signature,

    #[error("session token has expired")]
    Expired,

    /// An outbound token or `Set-Cookie` value could not be produced.
    #[error("session cookie could not be issued: {0}")]
    Encode(String),

    /// The backend has no record for the identifier (carries its fingerprint).
    #[error("session not found: {0}")]
    NotFound(String),

    /// Transient backend failure. Store calls that time out land here too.
    #[error("session store unavailable: {0}")]
    StoreIo(String),

    #[error("session store rejected the operation: {0}")]
    Permanent(String),

    #[error("session value could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Fatal startup misconfiguration.
    #[error("invalid session configuration: {0}")]
    Configuration(String),
}

impl SessionError {
    /// Returns true when retrying the same store call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionError::StoreIo(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::NotFound(_))
    }

    /// Returns true for the failures raised while verifying a token.
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            SessionError::Decode(_) | SessionError::Signature | SessionError::Expired
        )
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

pub(crate) fn not_found(id: &SessionId) -> SessionError {
    SessionError::NotFound(id.fingerprint())
}

pub(crate) fn configuration(message: impl Into<String>) -> SessionError {
    SessionError::Configuration(message.into())
}

pub(crate) fn serde_error(err: serde_json::Error) -> SessionError {
    SessionError::Serialization(err)
}

#[cfg(feature = "redis")]
pub(crate) fn redis_error(err: redis::RedisError) -> SessionError {
    if err.is_io_error()
        || err.is_timeout()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
    {
        SessionError::StoreIo(err.to_string())
    } else {
        SessionError::Permanent(err.to_string())
    }
}

#[cfg(feature = "dynamodb")]
pub(crate) fn dynamodb_error<E>(
    err: aws_sdk_dynamodb::error::SdkError<E, aws_sdk_dynamodb::config::http::HttpResponse>,
) -> SessionError
where
    E: std::error::Error + aws_sdk_dynamodb::error::ProvideErrorMetadata + Send + Sync + 'static,
{
    use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};

    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(service) => {
            let code = service.err().code();
            let status = service.raw().status().as_u16();
            if dynamodb_transient(code, status) {
                SessionError::StoreIo(message)
            } else {
                SessionError::Permanent(message)
            }
        }
        _ => SessionError::StoreIo(message),
    }
}

/// Throttling, capacity and server-side faults are worth retrying.
#[cfg(feature = "dynamodb")]
fn dynamodb_transient(code: Option<&str>, status: u16) -> bool {
    let retryable_code = matches!(
        code,
        Some(
            "ProvisionedThroughputExceededException"
                | "ThrottlingException"
                | "RequestLimitExceeded"
                | "InternalServerError"
                | "ServiceUnavailable"
                | "TransactionInProgressException"
        )
    );
    retryable_code || status == 429 || (500..600).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(SessionError::StoreIo("reset by peer".into()).is_transient());
        assert!(!SessionError::Permanent("denied".into()).is_transient());
        assert!(SessionError::NotFound("abc".into()).is_not_found());
        assert!(SessionError::Expired.is_token_error());
        assert!(SessionError::Signature.is_token_error());
        assert!(!SessionError::Configuration("x".into()).is_token_error());
        assert!(!SessionError::Encode("bad header".into()).is_token_error());
        assert!(!SessionError::Encode("bad header".into()).is_transient());
    }

    #[cfg(feature = "dynamodb")]
    #[test]
    fn dynamodb_throttling_and_server_faults_are_transient() {
        assert!(dynamodb_transient(Some("ProvisionedThroughputExceededException"), 400));
        assert!(dynamodb_transient(Some("ThrottlingException"), 400));
        assert!(dynamodb_transient(None, 503));
        assert!(dynamodb_transient(None, 429));
        assert!(!dynamodb_transient(Some("ResourceNotFoundException"), 400));
        assert!(!dynamodb_transient(Some("ValidationException"), 400));
    }
}
