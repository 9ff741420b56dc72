#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the easy-session crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod handlers;
pub mod session;
pub mod settings;
pub mod utils;

/// Re-export commonly used items
pub use session::{
    ConfigError, CookieAction, CookieOptions, EasySession, IgnorePath, IgnorePaths,
    InMemoryStore, MacAlgorithm, RequestContext, Session, SessionConfig, SessionCoordinator,
    SessionData, SessionError, SessionIdCodec, SessionOptions, SessionStore, StoreError,
};
pub use settings::EasySessionSettings;
