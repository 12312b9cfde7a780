//! # Health Check Endpoints
//!
//! - `GET /healthz`: liveness probe for load balancers, always `{"status":"ok"}`
//! - `GET /api/v1/health`: status for humans and dashboards (uptime, live
//!   sessions, whether the upstream credential is configured)

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn liveness() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let config = &state.config;
    let credential_configured = config.upstream.credential().is_some();

    HttpResponse::Ok().json(json!({
        "status": if credential_configured { "healthy" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "sessions": {
            "active": state.active_sessions()
        },
        "upstream": {
            "credential_configured": credential_configured,
            "transcribe_model": config.upstream.transcribe_model,
            "language": config.upstream.language
        }
    }))
}
