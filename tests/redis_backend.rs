#![cfg(feature = "redis")]

use cookie_session::redis_store::RedisSessionStore;
use cookie_session::{SessionId, SessionMap, SessionStore};
use serde_json::json;
use std::time::Duration;

fn redis_url(test: &str) -> Option<String> {
    match std::env::var("REDIS_URL") {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!("skipping {test}: REDIS_URL not set");
            None
        }
    }
}

async fn store(url: &str) -> RedisSessionStore {
    let namespace = format!("cookie-session-test-{}", uuid::Uuid::new_v4());
    RedisSessionStore::from_url_with_namespace(url, namespace)
        .await
        .expect("connect redis store")
}

#[tokio::test]
async fn redis_backend_crud_when_url_provided() {
    let Some(url) = redis_url("redis_backend_crud_when_url_provided") else {
        return;
    };
    let store = store(&url).await;
    let id = SessionId::generate();

    assert!(store.load(&id).await.expect_err("absent").is_not_found());

    store
        .update(
            &id,
            &SessionMap::from([
                ("cart_count".to_string(), json!(3)),
                ("user".to_string(), json!({"name": "ada"})),
            ]),
        )
        .await
        .expect("update");
    store
        .update(&id, &SessionMap::from([("cart_count".to_string(), json!(4))]))
        .await
        .expect("merge");

    let state = store.load(&id).await.expect("load");
    assert_eq!(state["cart_count"], json!(4));
    assert_eq!(state["user"], json!({"name": "ada"}));

    store.reset(&id).await.expect("reset");
    assert!(store.load(&id).await.expect_err("reset").is_not_found());
}

#[tokio::test]
async fn redis_backend_expires_idle_sessions() {
    let Some(url) = redis_url("redis_backend_expires_idle_sessions") else {
        return;
    };
    let store = store(&url).await.with_ttl(Duration::from_millis(200));
    let id = SessionId::generate();
    store
        .update(&id, &SessionMap::from([("k".to_string(), json!("v"))]))
        .await
        .expect("update");
    assert!(store.load(&id).await.is_ok());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(store.load(&id).await.expect_err("expired").is_not_found());
}

#[tokio::test]
async fn redis_unreachable_is_a_configuration_error() {
    // Port 1 is reserved and never serves redis.
    let err = match RedisSessionStore::from_url("redis://127.0.0.1:1/").await {
        Ok(_) => panic!("connection must fail"),
        Err(err) => err,
    };
    assert!(
        matches!(err, cookie_session::SessionError::Configuration(_)),
        "{err:?}"
    );
}
