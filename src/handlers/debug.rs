//! Debug endpoints exposing the observability store.
//!
//! Read-only snapshots of what flowed through the bridge recently, plus a
//! reset. Nothing here touches live sessions.

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::state::AppState;

/// GET /debug/frontend-chunks
///
/// Audio frames received from browser clients: `{"count": n, "recent_sizes": [...]}`.
pub async fn frontend_chunks(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.observability.frontend_chunks())
}

/// GET /debug/openai-chunks
///
/// Audio frames forwarded upstream, same shape as `/debug/frontend-chunks`.
pub async fn upstream_chunks(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.observability.upstream_chunks())
}

/// GET /debug/openai-text
pub async fn upstream_text(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.observability.upstream_text())
}

/// GET /debug/frontend-text
///
/// Events sent to clients interleaved with `{"etype": ...}` markers for each
/// upstream event seen.
pub async fn frontend_events(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.observability.frontend_events())
}

/// POST /debug/reset
pub async fn reset(state: web::Data<AppState>) -> HttpResponse {
    state.observability.reset();
    tracing::info!("Observability store reset");
    HttpResponse::Ok().json(json!({ "ok": true }))
}

/// Configuration for debug routes
pub fn configure_debug_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/debug")
            .route("/frontend-chunks", web::get().to(frontend_chunks))
            .route("/openai-chunks", web::get().to(upstream_chunks))
            .route("/openai-text", web::get().to(upstream_text))
            .route("/frontend-text", web::get().to(frontend_events))
            .route("/reset", web::post().to(reset)),
    );
}
