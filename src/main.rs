//! # STT Bridge Backend
//!
//! Bridges browser microphone audio to a realtime speech-to-text service over
//! WebSockets and streams partial and final transcripts back to the browser.
//!
//! ## Endpoints:
//! - `GET /ws/transcribe`: bridge session (binary PCM16 in, JSON transcripts out)
//! - `GET /healthz`, `GET /api/v1/health`: health checks
//! - `GET /api/v1/config`: effective configuration (credential redacted)
//! - `/debug/*`: observability snapshots and reset

mod bridge;
mod config;
mod cors;
mod error;
mod handlers;
mod health;
mod observability;
mod state;
mod websocket;

use actix_web::{web, App, HttpRequest, HttpServer};
use anyhow::Result;
use config::AppConfig;
use cors::OriginPolicy;
use error::AppError;
use state::AppState;
use tracing::{debug, error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    // .ok() means "ignore errors" - it's fine if there's no .env file
    dotenv::dotenv().ok();

    init_tracing()?;
    install_crypto_provider();

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting stt-bridge-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        upstream = %config.upstream.url,
        model = %config.upstream.transcribe_model,
        language = %config.upstream.language,
        "Configuration loaded: {}:{}",
        config.server.host,
        config.server.port
    );
    if config.upstream.credential().is_none() {
        warn!("OPENAI_API_KEY is not set; every session will end with a configuration error");
    }

    let app_state = AppState::new(config.clone());
    let origins = OriginPolicy::new(&config.cors.allowed_origins);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Middleware executes in reverse order for responses
            .wrap(origins.to_cors())
            .wrap(TracingLogger::default())
            .route("/healthz", web::get().to(health::liveness))
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/config", web::get().to(handlers::get_config)),
            )
            .configure(handlers::configure_debug_routes)
            .route("/ws/transcribe", web::get().to(websocket::transcribe_websocket))
            .default_service(web::to(not_found))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // Whichever finishes first wins: the server erroring out or a shutdown signal
    tokio::select! {
        result = server_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
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

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stt_bridge_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// rustls needs a process-wide crypto provider before the first `wss://` connect.
fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }
}

async fn not_found(req: HttpRequest) -> Result<actix_web::HttpResponse, AppError> {
    Err(AppError::NotFound(format!("no route for {} {}", req.method(), req.path())))
}

/// Resolves on SIGINT or SIGTERM (Ctrl+C only on non-unix targets).
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Failed to install signal handlers: {}", e);
                    std::future::pending::<()>().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C");
    }
}
