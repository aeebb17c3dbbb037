#![forbid(unsafe_code)]
//! Server-side sessions for tower services.
//!
//! A signed token in a cookie carries the session identifier; the session
//! state lives in a pluggable [`SessionStore`]. Each request sees the state
//! loaded when it arrived and buffers its writes, which are committed once
//! when the request completes.

pub mod config;
pub mod context;
#[cfg(feature = "dynamodb")]
pub mod dynamodb_store;
pub mod error;
pub mod inmemory;
pub mod layer;
pub mod manager;
pub mod model;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod report;
pub mod store;
pub mod token;

use std::sync::Arc;

pub use config::SessionConfig;
pub use context::Session;
pub use error::{SessionError, SessionResult};
pub use layer::{SessionLayer, SessionService};
pub use manager::{MintReason, SessionManager};
pub use model::{SessionId, SessionMap};
pub use report::{FailureReporter, TracingReporter};
pub use store::SessionStore;
pub use token::{SessionClaims, SigningAlgorithm, SigningKey, TokenCodec};

/// Store backend selection, resolved once at startup.
#[derive(Clone, Debug)]
pub enum SessionBackendConfig {
    InMemory,
    #[cfg(feature = "redis")]
    RedisUrl(String),
    #[cfg(feature = "redis")]
    Redis {
        url: String,
        namespace: String,
        ttl: Option<std::time::Duration>,
    },
    #[cfg(feature = "dynamodb")]
    DynamoDb(dynamodb_store::DynamoDbConfig),
}

/// Builds the configured backend. Connection failures surface here as
/// [`SessionError::Configuration`].
pub async fn create_session_store(
    config: SessionBackendConfig,
) -> SessionResult<Arc<dyn SessionStore>> {
    match config {
        SessionBackendConfig::InMemory => Ok(Arc::new(inmemory::InMemorySessionStore::new())),
        #[cfg(feature = "redis")]
        SessionBackendConfig::RedisUrl(url) => {
            let store = redis_store::RedisSessionStore::from_url(url).await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "redis")]
        SessionBackendConfig::Redis {
            url,
            namespace,
            ttl,
        } => {
            let mut store =
                redis_store::RedisSessionStore::from_url_with_namespace(url, namespace).await?;
            if let Some(ttl) = ttl {
                store = store.with_ttl(ttl);
            }
            Ok(Arc::new(store))
        }
        #[cfg(feature = "dynamodb")]
        SessionBackendConfig::DynamoDb(config) => {
            let store = dynamodb_store::DynamoDbSessionStore::connect(config).await?;
            Ok(Arc::new(store))
        }
    }
}
