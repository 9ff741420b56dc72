//! actix-web binding for the session coordinator
//!
//! Wrap an app or scope with [`EasySession`] and take a [`Session`] in handlers:
//!
//! ```no_run
//! use std::sync::Arc;
//! use actix_web::{web, App, HttpResponse};
//! use easy_session::{EasySession, InMemoryStore, Session, SessionCoordinator, SessionOptions};
//!
//! async fn index(session: Session) -> actix_web::Result<HttpResponse> {
//!     session.insert("visited", true)?;
//!     Ok(HttpResponse::Ok().finish())
//! }
//!
//! let coordinator = Arc::new(
//!     SessionCoordinator::new(SessionOptions::default(), Arc::new(InMemoryStore::new())).unwrap(),
//! );
//! let app = App::new()
//!     .wrap(EasySession::new(coordinator))
//!     .route("/", web::get().to(index));
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::error::InternalError;
use actix_web::{FromRequest, HttpMessage, HttpRequest, ResponseError};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::session::coordinator::{RequestContext, SessionCoordinator, SessionError};
use crate::session::store::SessionData;
use crate::utils::responses::ResponseBuilder;

/// Middleware factory running every request through a [`SessionCoordinator`]
#[derive(Clone)]
pub struct EasySession {
    coordinator: Arc<SessionCoordinator>,
}

impl EasySession {
    #[must_use]
    pub fn new(coordinator: Arc<SessionCoordinator>) -> Self {
        Self { coordinator }
    }
}

impl<S, B> Transform<S, ServiceRequest> for EasySession
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Transform = EasySessionMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(EasySessionMiddleware {
            service: Rc::new(service),
            coordinator: Arc::clone(&self.coordinator),
        }))
    }
}

pub struct EasySessionMiddleware<S> {
    service: Rc<S>,
    coordinator: Arc<SessionCoordinator>,
}

impl<S, B> Service<ServiceRequest> for EasySessionMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let coordinator = Arc::clone(&self.coordinator);

        Box::pin(async move {
            let incoming = coordinator.cookies().incoming_value(req.headers());
            let mut ctx = RequestContext::new(req.path(), incoming);

            if let Err(err) = coordinator.on_request_start(&mut ctx).await {
                return Ok(req.error_response(err).map_into_right_body());
            }
            if ctx.is_ignored() {
                return service.call(req).await.map(ServiceResponse::map_into_left_body);
            }

            let session = Session::attach(&req, ctx.take_session().unwrap_or_default());
            let mut res = service.call(req).await?;
            ctx.set_session(session.detach(res.request()));

            if let Err(err) = finish(&coordinator, &mut ctx, &mut res).await {
                let (req, _) = res.into_parts();
                return Ok(ServiceResponse::new(req, err.error_response()).map_into_right_body());
            }
            Ok(res.map_into_left_body())
        })
    }
}

async fn finish<B>(
    coordinator: &SessionCoordinator,
    ctx: &mut RequestContext,
    res: &mut ServiceResponse<B>,
) -> Result<(), SessionError> {
    coordinator.on_request_end(ctx).await?;
    if let Some(action) = ctx.cookie_action() {
        coordinator.cookies().apply(action, res.headers_mut())?;
    }
    Ok(())
}

/// Handle on the current request's session data
///
/// Cloning is cheap and every clone sees the same data. Changes are written to
/// the store once the handler returns.
#[derive(Clone)]
pub struct Session(Rc<RefCell<SessionData>>);

impl Session {
    fn attach(req: &ServiceRequest, data: SessionData) -> Self {
        let session = Self(Rc::new(RefCell::new(data)));
        req.extensions_mut().insert(session.clone());
        session
    }

    fn detach(self, req: &HttpRequest) -> SessionData {
        req.extensions_mut().remove::<Self>();
        match Rc::try_unwrap(self.0) {
            Ok(cell) => cell.into_inner(),
            // A handler kept a clone alive past the response
            Err(shared) => shared.borrow().clone(),
        }
    }

    /// Deserialize the value stored under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the stored value does not deserialize into `T`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.0
            .borrow()
            .get(key)
            .cloned()
            .map(serde_json::from_value)
            .transpose()
    }

    /// Store `value` under `key`, replacing any previous value
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be serialized to JSON
    pub fn insert<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: T,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.0.borrow_mut().insert(key.into(), value);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.0.borrow_mut().remove(key)
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    /// Snapshot of all session data
    #[must_use]
    pub fn entries(&self) -> SessionData {
        self.0.borrow().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl FromRequest for Session {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(req.extensions().get::<Self>().cloned().ok_or_else(|| {
            InternalError::from_response(
                "no session attached to request",
                ResponseBuilder::internal_server_error()
                    .with_error_code("session_missing")
                    .build(),
            )
            .into()
        }))
    }
}
