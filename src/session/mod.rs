//! Session Management Module
//!
//! Tamper-evident session identifiers carried in a cookie, with the session data
//! itself kept in a server-side store.
//!
//! # Modules
//!
//! - [`config`] - Options, validated configuration and MAC algorithms
//! - [`id`] - Identifier encoding, generation and verification
//! - [`ignore`] - Paths exempt from session handling
//! - [`store`] - Store trait and the in-memory store
//! - [`cookie`] - Reading and writing the session cookie
//! - [`coordinator`] - Request-start and request-end hooks
//! - [`middleware`] - actix-web middleware and the `Session` extractor

pub mod config;
pub mod cookie;
pub mod coordinator;
pub mod id;
pub mod ignore;
pub mod middleware;
pub mod store;

// Re-export commonly used items for convenience
pub use config::{ConfigError, MacAlgorithm, SessionConfig, SessionOptions};
pub use cookie::{CookieFactory, CookieOptions};
pub use coordinator::{CookieAction, RequestContext, SessionCoordinator, SessionError};
pub use id::SessionIdCodec;
pub use ignore::{IgnorePath, IgnorePaths};
pub use middleware::{EasySession, Session};
pub use store::{InMemoryStore, SessionData, SessionStore, StoreError};
