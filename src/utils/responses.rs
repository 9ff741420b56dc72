//! HTTP error responses produced by the session layer
//!
//! Bodies follow a single JSON shape, `{"error": ..., "error_description": ...}`.
//! The default 500 body is serialized once and reused.

use actix_web::{http::header, http::StatusCode, HttpResponse};
use serde_json::json;

static CACHED_RESPONSES: std::sync::LazyLock<CachedResponses> =
    std::sync::LazyLock::new(CachedResponses::new);

/// Pre-serialized body for the default 500 response
struct CachedResponses {
    server_error: String,
}

impl CachedResponses {
    fn new() -> Self {
        Self {
            server_error: create_json(
                ErrorType::InternalServerError.default_code(),
                ErrorType::InternalServerError.default_message(),
            ),
        }
    }
}

fn create_json(error: &str, description: &str) -> String {
    json!({
        "error": error,
        "error_description": description
    })
    .to_string()
}

/// Entry point for building error responses
pub struct ResponseBuilder;

impl ResponseBuilder {
    /// `InternalServerError` (500)
    #[must_use]
    pub fn internal_server_error() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(ErrorType::InternalServerError)
    }

    /// `ServiceUnavailable` (503)
    #[must_use]
    pub fn service_unavailable() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(ErrorType::ServiceUnavailable)
    }
}

#[derive(Clone, Copy)]
enum ErrorType {
    InternalServerError,
    ServiceUnavailable,
}

impl ErrorType {
    fn status(self) -> StatusCode {
        match self {
            Self::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn default_code(self) -> &'static str {
        match self {
            Self::InternalServerError => "server_error",
            Self::ServiceUnavailable => "service_unavailable",
        }
    }

    fn default_message(self) -> &'static str {
        match self {
            Self::InternalServerError => "An internal server error occurred",
            Self::ServiceUnavailable => "The service is temporarily unavailable",
        }
    }
}

/// Builder for error responses with fluent interface
pub struct ErrorResponseBuilder {
    error_type: ErrorType,
    error_code: Option<String>,
    message: Option<String>,
}

impl ErrorResponseBuilder {
    fn new(error_type: ErrorType) -> Self {
        Self {
            error_type,
            error_code: None,
            message: None,
        }
    }

    /// Set a custom error code (e.g., "`session_store_unavailable`")
    #[must_use]
    pub fn with_error_code(mut self, code: &str) -> Self {
        self.error_code = Some(code.to_string());
        self
    }

    /// Set a custom error message
    #[must_use]
    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    /// Build the final `HttpResponse`
    #[must_use]
    pub fn build(self) -> HttpResponse {
        let uncustomized = self.error_code.is_none() && self.message.is_none();
        let body = if uncustomized && matches!(self.error_type, ErrorType::InternalServerError) {
            CACHED_RESPONSES.server_error.clone()
        } else {
            create_json(
                self.error_code
                    .as_deref()
                    .unwrap_or(self.error_type.default_code()),
                self.message
                    .as_deref()
                    .unwrap_or(self.error_type.default_message()),
            )
        };

        HttpResponse::build(self.error_type.status())
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .body(body)
    }
}
