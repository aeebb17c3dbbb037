use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};

use cookie_session::inmemory::InMemorySessionStore;
use cookie_session::{
    SessionClaims, SessionId, SessionMap, SessionStore, SigningAlgorithm, SigningKey, TokenCodec,
};
use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;
use time::OffsetDateTime;
use tokio::runtime::Runtime;

const KEY: &str = "bench-signing-key-0123456789abcdef";

fn codec_benches(c: &mut Criterion) {
    for algorithm in [SigningAlgorithm::HS256, SigningAlgorithm::HS512] {
        let codec = TokenCodec::new(&SigningKey::from(KEY), algorithm, "sid").expect("codec");
        let claims = SessionClaims::issue(
            SessionId::generate(),
            OffsetDateTime::now_utc(),
            Some(std::time::Duration::from_secs(1800)),
        );
        let token = codec.sign(&claims).expect("sign");

        c.bench_function(&format!("token_sign_{algorithm:?}"), |b| {
            b.iter(|| black_box(codec.sign(black_box(&claims)).expect("sign")));
        });
        c.bench_function(&format!("token_verify_{algorithm:?}"), |b| {
            b.iter(|| black_box(codec.verify(black_box(&token)).expect("verify")));
        });
    }
}

fn inmemory_benches(c: &mut Criterion) {
    let runtime = Runtime::new().expect("tokio runtime");
    let store = InMemorySessionStore::new();

    c.bench_function("inmemory_update", |b| {
        let counter = AtomicU64::new(0);
        b.to_async(&runtime).iter(|| {
            let seq = counter.fetch_add(1, Ordering::Relaxed);
            let id = SessionId::from(format!("bench-update-{}", seq % 16));
            let changes = SessionMap::from([("seq".to_string(), json!(seq))]);
            let store = &store;
            async move { store.update(&id, &changes).await.expect("update") }
        });
    });

    let id = SessionId::from("bench-load");
    let seed = SessionMap::from([
        ("cart_count".to_string(), json!(3)),
        ("user".to_string(), json!({"name": "bench", "roles": ["a", "b"]})),
    ]);
    runtime
        .block_on(store.update(&id, &seed))
        .expect("seed for load");

    c.bench_function("inmemory_load", |b| {
        b.to_async(&runtime)
            .iter(|| async { black_box(store.load(&id).await.expect("load")) });
    });
}

criterion_group!(benches, codec_benches, inmemory_benches);
criterion_main!(benches);
