// Shared helpers for the HTTP-level session tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use actix_web::dev::ServiceResponse;
use actix_web::http::header;
use actix_web::test::TestRequest;
use easy_session::{
    InMemoryStore, SessionCoordinator, SessionData, SessionOptions, SessionStore, StoreError,
};

/// Signed identifiers valid for one second
pub fn signed_options() -> SessionOptions {
    SessionOptions {
        key: Some("test".to_string()),
        expires_in: Some(Duration::from_millis(1000)),
        ..Default::default()
    }
}

pub fn coordinator(
    options: SessionOptions,
    store: Arc<dyn SessionStore>,
) -> Arc<SessionCoordinator> {
    Arc::new(SessionCoordinator::new(options, store).expect("valid session options"))
}

/// Demo app wrapped in the session middleware for `coordinator`
macro_rules! init_app {
    ($coordinator:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(easy_session::EasySession::new($coordinator))
                .configure(easy_session::handlers::configure_services),
        )
        .await
    };
}

pub fn get(uri: &str) -> TestRequest {
    TestRequest::get().uri(uri)
}

/// GET `uri` presenting `cookie` (a `name=value` pair)
pub fn get_with_cookie(uri: &str, cookie: &str) -> TestRequest {
    TestRequest::get()
        .uri(uri)
        .insert_header((header::COOKIE, cookie.to_string()))
}

/// Every `Set-Cookie` header on the response
pub fn set_cookies<B>(res: &ServiceResponse<B>) -> Vec<String> {
    res.headers()
        .get_all(header::SET_COOKIE)
        .map(|value| value.to_str().expect("ascii Set-Cookie").to_string())
        .collect()
}

/// The `name=value` part of a `Set-Cookie` header
pub fn cookie_pair(set_cookie: &str) -> String {
    set_cookie
        .split(';')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// The value part of a `Set-Cookie` header
pub fn cookie_value(set_cookie: &str) -> String {
    cookie_pair(set_cookie)
        .split_once('=')
        .map(|(_, value)| value.to_string())
        .unwrap_or_default()
}

/// Store whose every call fails with a backend error
#[derive(Debug, Default)]
pub struct BrokenStore;

#[async_trait::async_trait]
impl SessionStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<SessionData>, StoreError> {
        Err(anyhow::anyhow!("connection refused").into())
    }

    async fn set(&self, _key: &str, _data: &SessionData, _ttl: Duration) -> Result<(), StoreError> {
        Err(anyhow::anyhow!("connection refused").into())
    }
}

pub fn memory_store() -> (InMemoryStore, Arc<dyn SessionStore>) {
    let store = InMemoryStore::new();
    let shared: Arc<dyn SessionStore> = Arc::new(store.clone());
    (store, shared)
}
