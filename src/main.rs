#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware::Logger, App, HttpServer};
use easy_session::{
    handlers::configure_services, settings::EasySessionSettings, utils::logging::SessionLogger,
    EasySession, InMemoryStore, SessionCoordinator,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = EasySessionSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;

    let options = settings
        .to_session_options()
        .map_err(|e| std::io::Error::other(format!("Invalid session settings: {e}")))?;
    let store = InMemoryStore::new();
    spawn_store_sweeper(store.clone());
    let coordinator = SessionCoordinator::new(options, Arc::new(store))
        .map_err(|e| std::io::Error::other(format!("Invalid session settings: {e}")))?
        .with_logger(SessionLogger::global());

    start_server(Arc::new(coordinator), &settings).await
}

/// Purge stale sessions from `store` once a minute
fn spawn_store_sweeper(store: InMemoryStore) {
    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let purged = store.delete_expired().await;
            if purged > 0 {
                log::debug!("purged {purged} stale sessions");
            }
        }
    });
}

/// Start the demo server
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(
    coordinator: Arc<SessionCoordinator>,
    settings: &EasySessionSettings,
) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, &coordinator);

    HttpServer::new(move || {
        App::new()
            .wrap(EasySession::new(Arc::clone(&coordinator)))
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str, coordinator: &SessionCoordinator) {
    let config = coordinator.config();
    println!("Starting easy-session demo on http://{bind_address}");
    println!(
        "Session cookie: {} (signed: {}, expires: {})",
        config.cookie_name(),
        config.key().is_some(),
        config
            .expires_in()
            .map_or_else(|| "never".to_string(), |ttl| format!("{}ms", ttl.as_millis()))
    );
    println!("Cache TTL: {}ms", config.cache_expires_in().as_millis());
    println!();
    println!("Endpoints:");
    println!("  GET /?test=<value> - Store <value> in the session and echo it");
    println!("  GET /              - Echo the stored value");
    println!("  GET /foo           - Plain response (add to ignore_paths to bypass sessions)");
}
