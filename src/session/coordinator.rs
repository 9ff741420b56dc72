//! Session Coordinator
//!
//! Drives the per-request session flow through two hooks the host pipeline calls in
//! order:
//!
//! - [`SessionCoordinator::on_request_start`] runs before the handler. It decides whether
//!   the path is exempt, validates the incoming identifier and loads its data from the
//!   store.
//! - [`SessionCoordinator::on_request_end`] runs before the response is sent. It issues
//!   an identifier for new sessions and writes the session data back.
//!
//! All per-request state lives in a [`RequestContext`] owned by the caller. The
//! coordinator itself is read-only after construction and can be shared across
//! workers.
//!
//! Invalid, expired or malformed identifiers are never reported as errors: the
//! request continues with a fresh, empty session. Only store failures (503) and
//! identifier generation failures (500) reach the client.

use std::sync::Arc;

use actix_web::http::header::InvalidHeaderValue;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use crate::session::config::{ConfigError, SessionConfig, SessionOptions};
use crate::session::cookie::CookieFactory;
use crate::session::id::{IdGenerationError, SessionIdCodec};
use crate::session::store::{SessionData, SessionStore, StoreError};
use crate::utils::logging::SessionLogger;
use crate::utils::responses::ResponseBuilder;

// =============================================================================
// Types and Error Handling
// =============================================================================

/// Errors that abort a request
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session store is unavailable")]
    StoreUnavailable(#[source] StoreError),

    #[error("Failed to generate a session identifier")]
    IdGeneration(#[from] IdGenerationError),

    #[error("Failed to encode the session cookie")]
    Cookie(#[from] InvalidHeaderValue),
}

impl ResponseError for SessionError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::IdGeneration(_) | Self::Cookie(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            Self::StoreUnavailable(_) => ResponseBuilder::service_unavailable()
                .with_error_code("session_store_unavailable")
                .with_message("Session storage is temporarily unavailable")
                .build(),
            Self::IdGeneration(_) | Self::Cookie(_) => {
                ResponseBuilder::internal_server_error().build()
            }
        }
    }
}

/// What the host should do with the session cookie on the way out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieAction {
    /// Send the given identifier as the session cookie
    Set(String),
    /// Tell the client to drop its session cookie
    Clear,
}

/// Per-request session state, owned by the host pipeline
#[derive(Debug, Default)]
pub struct RequestContext {
    path: String,
    incoming_id: Option<String>,
    ignored: bool,
    session_id: Option<String>,
    session: Option<SessionData>,
    cookie: Option<CookieAction>,
}

impl RequestContext {
    /// Context for a request to `path` carrying `incoming_id` as its session cookie
    #[must_use]
    pub fn new(path: impl Into<String>, incoming_id: Option<String>) -> Self {
        Self {
            path: path.into(),
            incoming_id,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn incoming_id(&self) -> Option<&str> {
        self.incoming_id.as_deref()
    }

    /// Whether the request was exempted from session handling
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    /// Identifier the session is stored under, once known
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    #[must_use]
    pub fn session(&self) -> Option<&SessionData> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut SessionData> {
        self.session.as_mut()
    }

    /// Detach the session data, e.g. to hand it to a handler
    pub fn take_session(&mut self) -> Option<SessionData> {
        self.session.take()
    }

    pub fn set_session(&mut self, data: SessionData) {
        self.session = Some(data);
    }

    /// Cookie instruction accumulated by the hooks
    #[must_use]
    pub fn cookie_action(&self) -> Option<&CookieAction> {
        self.cookie.as_ref()
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Orchestrates identifier verification and store access around a request
#[derive(Debug)]
pub struct SessionCoordinator {
    config: SessionConfig,
    codec: SessionIdCodec,
    cookies: CookieFactory,
    store: Arc<dyn SessionStore>,
    log: SessionLogger,
}

impl SessionCoordinator {
    /// Validate `options` and build a coordinator backed by `store`
    ///
    /// # Errors
    ///
    /// Returns an error if the options are inconsistent, e.g. `expires_in`
    /// without a `key`
    pub fn new(options: SessionOptions, store: Arc<dyn SessionStore>) -> Result<Self, ConfigError> {
        let config = SessionConfig::try_from(options)?;
        let codec = SessionIdCodec::new(&config);
        let cookies = CookieFactory::new(config.cookie_name(), config.cookie().clone());
        Ok(Self {
            config,
            codec,
            cookies,
            store,
            log: SessionLogger::default(),
        })
    }

    /// Use `log` for diagnostics instead of the silent default
    #[must_use]
    pub fn with_logger(mut self, log: SessionLogger) -> Self {
        self.log = log;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn codec(&self) -> &SessionIdCodec {
        &self.codec
    }

    #[must_use]
    pub fn cookies(&self) -> &CookieFactory {
        &self.cookies
    }

    /// Pre-authentication hook
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::StoreUnavailable`] if the store cannot be read. No
    /// session data is attached in that case.
    pub async fn on_request_start(&self, ctx: &mut RequestContext) -> Result<(), SessionError> {
        if self.config.ignore_paths().should_ignore(&ctx.path) {
            self.log.trace(format_args!("ignoring path: {}", ctx.path));
            ctx.ignored = true;
            return Ok(());
        }

        let Some(incoming) = ctx.incoming_id.clone() else {
            self.log.trace(format_args!("no session cookie, starting a new session"));
            ctx.session = Some(SessionData::new());
            return Ok(());
        };

        if let Err(rejection) = self.codec.verify(&incoming) {
            self.log.debug(format_args!("discarding session cookie: {rejection}"));
            ctx.cookie = Some(CookieAction::Clear);
            ctx.session = Some(SessionData::new());
            return Ok(());
        }

        ctx.session_id = Some(incoming.clone());
        let data = self.store.get(&incoming).await.map_err(|err| {
            self.log.warn(format_args!("could not load session from store: {err}"));
            SessionError::StoreUnavailable(err)
        })?;

        self.log.trace(format_args!(
            "session loaded from store (cache {})",
            if data.is_some() { "hit" } else { "miss" }
        ));
        ctx.session = Some(data.unwrap_or_default());
        Ok(())
    }

    /// Pre-response hook
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::IdGeneration`] if a new identifier cannot be built,
    /// before the store is touched, and [`SessionError::StoreUnavailable`] if the
    /// write fails.
    pub async fn on_request_end(&self, ctx: &mut RequestContext) -> Result<(), SessionError> {
        if ctx.ignored {
            return Ok(());
        }

        let session_id = match &ctx.session_id {
            Some(id) => id.clone(),
            None => {
                let id = self.codec.build(None, None).map_err(|err| {
                    self.log.warn(format_args!("could not generate session id: {err}"));
                    SessionError::IdGeneration(err)
                })?;
                self.log.trace(format_args!("issuing new session cookie"));
                ctx.cookie = Some(CookieAction::Set(id.clone()));
                ctx.session_id = Some(id.clone());
                id
            }
        };

        let empty = SessionData::new();
        let data = ctx.session.as_ref().unwrap_or(&empty);
        self.store
            .set(&session_id, data, self.config.cache_expires_in())
            .await
            .map_err(|err| {
                self.log.warn(format_args!("could not save session to store: {err}"));
                SessionError::StoreUnavailable(err)
            })?;

        self.log.trace(format_args!("session saved ({} keys)", data.len()));
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::id::{encode, now_millis};
    use crate::session::ignore::{IgnorePath, IgnorePaths};
    use crate::session::store::InMemoryStore;
    use crate::utils::logging::tests::CapturingLogger;
    use serde_json::json;
    use std::time::Duration;

    fn signed_options() -> SessionOptions {
        SessionOptions {
            key: Some("test".to_string()),
            expires_in: Some(Duration::from_millis(1000)),
            ..Default::default()
        }
    }

    fn coordinator(options: SessionOptions) -> (SessionCoordinator, InMemoryStore) {
        let store = InMemoryStore::new();
        let coordinator = SessionCoordinator::new(options, Arc::new(store.clone())).unwrap();
        (coordinator, store)
    }

    /// Run one request through both hooks, letting `handler` mutate the session
    async fn round_trip(
        coordinator: &SessionCoordinator,
        cookie: Option<String>,
        handler: impl FnOnce(&mut SessionData),
    ) -> RequestContext {
        let mut ctx = RequestContext::new("/", cookie);
        coordinator.on_request_start(&mut ctx).await.unwrap();
        if let Some(session) = ctx.session_mut() {
            handler(session);
        }
        coordinator.on_request_end(&mut ctx).await.unwrap();
        ctx
    }

    fn issued_id(ctx: &RequestContext) -> String {
        match ctx.cookie_action() {
            Some(CookieAction::Set(id)) => id.clone(),
            other => panic!("expected a new cookie, got {other:?}"),
        }
    }

    #[test]
    fn test_construction_requires_key_with_expiry() {
        let options = SessionOptions {
            expires_in: Some(Duration::from_millis(1000)),
            ..Default::default()
        };
        let result = SessionCoordinator::new(options, Arc::new(InMemoryStore::new()));
        assert!(matches!(result, Err(ConfigError::ExpiresInRequiresKey)));
    }

    #[actix_web::test]
    async fn test_new_session_is_issued_and_persisted() {
        let (coordinator, store) = coordinator(signed_options());
        let ctx = round_trip(&coordinator, None, |session| {
            session.insert("test".to_string(), json!("1"));
        })
        .await;

        let id = issued_id(&ctx);
        assert!(coordinator.codec().is_valid(&id));
        assert_eq!(ctx.session_id(), Some(id.as_str()));
        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored["test"], json!("1"));
    }

    #[actix_web::test]
    async fn test_existing_session_is_loaded_without_new_cookie() {
        let (coordinator, _store) = coordinator(signed_options());
        let first = round_trip(&coordinator, None, |session| {
            session.insert("test".to_string(), json!("1"));
        })
        .await;
        let id = issued_id(&first);

        let mut ctx = RequestContext::new("/", Some(id.clone()));
        coordinator.on_request_start(&mut ctx).await.unwrap();
        assert_eq!(ctx.session().unwrap()["test"], json!("1"));
        assert_eq!(ctx.session_id(), Some(id.as_str()));

        ctx.session_mut()
            .unwrap()
            .insert("test".to_string(), json!("2"));
        coordinator.on_request_end(&mut ctx).await.unwrap();
        assert!(ctx.cookie_action().is_none());

        let third = round_trip(&coordinator, Some(id), |_| {}).await;
        assert_eq!(third.session().unwrap()["test"], json!("2"));
    }

    #[actix_web::test]
    async fn test_cache_miss_yields_empty_session() {
        let (coordinator, _store) = coordinator(signed_options());
        let id = coordinator.codec().build(None, None).unwrap();

        let mut ctx = RequestContext::new("/", Some(id.clone()));
        coordinator.on_request_start(&mut ctx).await.unwrap();
        assert_eq!(ctx.session(), Some(&SessionData::new()));
        assert_eq!(ctx.session_id(), Some(id.as_str()));
        assert!(ctx.cookie_action().is_none());
    }

    #[actix_web::test]
    async fn test_expired_cache_entry_yields_empty_session() {
        let (coordinator, _store) = coordinator(SessionOptions {
            cache_expires_in: Some(Duration::from_millis(1)),
            ..signed_options()
        });
        let first = round_trip(&coordinator, None, |session| {
            session.insert("test".to_string(), json!("1"));
        })
        .await;
        actix_web::rt::time::sleep(Duration::from_millis(20)).await;

        let mut ctx = RequestContext::new("/", Some(issued_id(&first)));
        coordinator.on_request_start(&mut ctx).await.unwrap();
        assert_eq!(ctx.session(), Some(&SessionData::new()));
    }

    #[actix_web::test]
    async fn test_invalid_cookie_is_cleared_then_replaced() {
        let (coordinator, store) = coordinator(SessionOptions::default());
        let mut ctx = RequestContext::new("/", Some("abcd".to_string()));
        coordinator.on_request_start(&mut ctx).await.unwrap();
        assert_eq!(ctx.cookie_action(), Some(&CookieAction::Clear));
        assert_eq!(ctx.session(), Some(&SessionData::new()));
        assert!(ctx.session_id().is_none());

        coordinator.on_request_end(&mut ctx).await.unwrap();
        let id = issued_id(&ctx);
        assert_ne!(id, "abcd");
        assert_eq!(store.len().await, 1);
    }

    #[actix_web::test]
    async fn test_expired_identifier_starts_fresh_session() {
        let (coordinator, store) = coordinator(signed_options());
        let expired = coordinator
            .codec()
            .build(Some(&[3u8; 16]), Some(now_millis() - 1.0))
            .unwrap();
        let mut data = SessionData::new();
        data.insert("test".to_string(), json!("stale"));
        store
            .set(&expired, &data, Duration::from_secs(60))
            .await
            .unwrap();

        let mut ctx = RequestContext::new("/", Some(expired));
        coordinator.on_request_start(&mut ctx).await.unwrap();
        assert_eq!(ctx.cookie_action(), Some(&CookieAction::Clear));
        assert_eq!(ctx.session(), Some(&SessionData::new()));
    }

    #[actix_web::test]
    async fn test_forged_identifier_is_not_looked_up() {
        let (coordinator, store) = coordinator(signed_options());
        let forged = encode(&[0u8; 16 + 8 + 32]);
        store.disconnect();

        // Would be a 503 if the forged id reached the store
        let mut ctx = RequestContext::new("/", Some(forged));
        coordinator.on_request_start(&mut ctx).await.unwrap();
        assert_eq!(ctx.cookie_action(), Some(&CookieAction::Clear));
    }

    #[actix_web::test]
    async fn test_ignored_paths_skip_everything() {
        let (coordinator, store) = coordinator(SessionOptions {
            ignore_paths: IgnorePaths::new()
                .with("/foo")
                .with(IgnorePath::pattern(r"^/static/").unwrap()),
            ..signed_options()
        });

        for path in ["/foo", "/static/app.js"] {
            let mut ctx = RequestContext::new(path, Some("garbage".to_string()));
            coordinator.on_request_start(&mut ctx).await.unwrap();
            assert!(ctx.is_ignored());
            assert!(ctx.session().is_none());
            coordinator.on_request_end(&mut ctx).await.unwrap();
            assert!(ctx.cookie_action().is_none());
            assert!(ctx.session_id().is_none());
        }
        assert!(store.is_empty().await);
    }

    #[actix_web::test]
    async fn test_store_read_failure_is_unavailable() {
        let (coordinator, store) = coordinator(signed_options());
        let first = round_trip(&coordinator, None, |_| {}).await;
        store.disconnect();

        let mut ctx = RequestContext::new("/", Some(issued_id(&first)));
        let err = coordinator.on_request_start(&mut ctx).await.unwrap_err();
        assert!(matches!(err, SessionError::StoreUnavailable(StoreError::Unavailable)));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(ctx.session().is_none());
    }

    #[actix_web::test]
    async fn test_store_write_failure_is_unavailable() {
        let (coordinator, store) = coordinator(signed_options());
        let mut ctx = RequestContext::new("/", None);
        coordinator.on_request_start(&mut ctx).await.unwrap();
        store.disconnect();

        let err = coordinator.on_request_end(&mut ctx).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        store.reconnect();
        assert!(store.is_empty().await);
    }

    #[actix_web::test]
    async fn test_missing_session_data_is_stored_empty() {
        let (coordinator, store) = coordinator(signed_options());
        let mut ctx = RequestContext::new("/", None);
        coordinator.on_request_start(&mut ctx).await.unwrap();
        ctx.take_session();

        coordinator.on_request_end(&mut ctx).await.unwrap();
        let id = issued_id(&ctx);
        assert_eq!(store.get(&id).await.unwrap(), Some(SessionData::new()));
    }

    #[test]
    fn test_generation_error_is_internal() {
        let err = SessionError::IdGeneration(IdGenerationError::Entropy("no entropy".to_string()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[actix_web::test]
    async fn test_logger_is_injected() {
        let capture = Arc::new(CapturingLogger::default());
        let (coordinator, _store) = coordinator(SessionOptions {
            ignore_paths: IgnorePaths::new().with("/foo"),
            ..Default::default()
        });
        let coordinator = coordinator.with_logger(SessionLogger::new(capture.clone()));

        let mut ctx = RequestContext::new("/foo", None);
        coordinator.on_request_start(&mut ctx).await.unwrap();

        let messages = capture.messages.lock().unwrap();
        assert!(messages
            .iter()
            .any(|(_, message)| message == "ignoring path: /foo"));
    }
}
