//! Runs two requests through the session layer: the first mints a session
//! and stores a value, the second presents the cookie and reads it back.

use cookie_session::inmemory::InMemorySessionStore;
use cookie_session::{Session, SessionConfig, SessionManager, SessionResult};
use http::header::{COOKIE, SET_COOKIE};
use http::{Request, Response};
use std::convert::Infallible;
use std::sync::Arc;
use tower::{service_fn, Layer, ServiceExt};
use tracing_subscriber::EnvFilter;

async fn visits(req: Request<String>) -> Result<Response<String>, Infallible> {
    let Some(session) = req.extensions().get::<Session>().cloned() else {
        return Ok(Response::new("no session layer".into()));
    };
    let seen = session.get_as::<u64>("visits").ok().flatten().unwrap_or(0);
    session.set("visits", seen + 1);
    Ok(Response::new(format!("visit #{}", seen + 1)))
}

#[tokio::main]
async fn main() -> SessionResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cookie_session=debug")),
        )
        .init();

    let secret = std::env::var("SESSION_SECRET")
        .unwrap_or_else(|_| "quickstart-secret-0123456789abcdef".to_string());
    let config = SessionConfig::new(secret).with_cookie_name("quickstart.sid");
    let store = Arc::new(InMemorySessionStore::new());
    let layer = SessionManager::new(store, config)?.layer();
    let svc = layer.layer(service_fn(visits));

    let first = svc
        .clone()
        .oneshot(Request::new(String::new()))
        .await
        .unwrap_or_else(|never| match never {});
    let set_cookie = first
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    println!("first response: {} (Set-Cookie: {set_cookie})", first.body());

    let pair = set_cookie.split(';').next().unwrap_or_default().to_owned();
    let mut second = Request::new(String::new());
    if let Ok(value) = pair.parse() {
        second.headers_mut().insert(COOKIE, value);
    }
    let second = svc
        .oneshot(second)
        .await
        .unwrap_or_else(|never| match never {});
    println!("second response: {}", second.body());

    Ok(())
}
