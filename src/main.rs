//! # Voice Intake - Main Application Entry Point
//!
//! HTTP front door for voice-call audio. Events from the streaming channel
//! (phone-call chunks) and from upload notifications (app recordings) are
//! normalized into a single audio record before any speech processing.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (defaults, config.toml, environment)
//! - **error**: domain error taxonomy and HTTP error responses
//! - **codec**: structured values to and from the document-store wire format
//! - **audio**: formats, validation, duration estimates, chunk reassembly
//! - **ingest**: event detection, the two extractors and the orchestrator
//! - **storage**: object/document store interfaces and their backends
//! - **context**: per-caller profile and conversation history
//! - **state**, **health**, **middleware**, **handlers**: the HTTP service

mod audio;
mod codec;
mod config;
mod context;
mod error;
mod handlers;
mod health;
mod ingest;
mod middleware;
mod state;
mod storage;

use crate::config::AppConfig;
use crate::context::UserContextService;
use crate::ingest::Orchestrator;
use crate::state::AppState;
use crate::storage::{FsObjectStore, MemoryDocumentStore, ObjectStore, RetryPolicy, RetryingObjectStore};
use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// ## Startup Order:
/// 1. **.env** is loaded so it can feed both logging and configuration
/// 2. **Configuration** is loaded and validated
/// 3. **Tracing** is initialized from `RUST_LOG` or the configured filter
/// 4. **Storage and services** are wired into the shared state
/// 5. **HTTP server** runs until it fails or a shutdown signal arrives
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    init_tracing(&config)?;

    info!("Starting voice-intake v{}", env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.server.host,
        port = config.server.port,
        object_root = %config.storage.object_root,
        "Configuration loaded"
    );

    let app_state = build_state(&config);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Payloads up to the 10 MiB audio ceiling, base64-inflated
            .app_data(web::JsonConfig::default().limit(16 * 1024 * 1024))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::RequestTelemetry)
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config))
                    .route("/events", web::post().to(handlers::ingest_event))
                    .route("/users", web::post().to(handlers::create_user))
                    .route("/users/{phone}", web::get().to(handlers::get_user))
                    .route("/users/{phone}", web::delete().to(handlers::delete_user))
                    .route(
                        "/users/{phone}/conversations",
                        web::post().to(handlers::add_conversation),
                    )
                    .route("/users/{phone}/session", web::post().to(handlers::open_session)),
            )
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Wire storage backends and domain services into the shared state.
///
/// Object downloads go through the retry decorator. User context lives in
/// an in-process document store keyed on the caller's phone number.
fn build_state(config: &AppConfig) -> AppState {
    let objects: Arc<dyn ObjectStore> = Arc::new(RetryingObjectStore::new(
        Arc::new(FsObjectStore::new(&config.storage.object_root)),
        RetryPolicy::from(&config.retry),
    ));
    let documents = Arc::new(MemoryDocumentStore::new(context::service::PARTITION_KEY));

    let orchestrator = Arc::new(Orchestrator::new(objects));
    let user_contexts = Arc::new(UserContextService::new(
        documents,
        config.storage.user_context_table.clone(),
        config.context.clone(),
    ));

    AppState::new(config.clone(), orchestrator, user_contexts)
}

/// Initialize tracing.
///
/// `RUST_LOG` wins when set; otherwise `logging.filter` from the config is
/// used. `logging.json` switches the output to JSON lines.
fn init_tracing(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .context("Invalid log filter")?;

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }

    Ok(())
}

/// Resolve on Ctrl+C or, on unix, SIGTERM. A handler that cannot be
/// installed is logged and that signal is simply not awaited.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received SIGINT");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
