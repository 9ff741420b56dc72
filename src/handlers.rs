//! Demo endpoints for the bundled server
//!
//! - `GET /` stores the `test` query parameter in the session (when given) and
//!   responds with the session's current `test` value
//! - `GET /foo` responds with `foo` and is meant to be listed in the ignore paths

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::session::Session;

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    pub test: Option<String>,
}

/// # Errors
///
/// Returns an error if the stored `test` value is not a string
pub async fn index(
    session: Session,
    query: web::Query<IndexQuery>,
) -> actix_web::Result<HttpResponse> {
    if let Some(test) = &query.test {
        session.insert("test", test)?;
    }
    let value = session.get::<String>("test")?;
    Ok(HttpResponse::Ok().body(value.unwrap_or_default()))
}

pub async fn foo(session: Option<Session>) -> HttpResponse {
    if session.is_some() {
        log::debug!("/foo served with a session attached");
    }
    HttpResponse::Ok().body("foo")
}

/// Register the demo routes
pub fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/foo", web::get().to(foo));
}
