//! Health check handler

use actix_web::{web, HttpResponse};
use serde_json::json;

/// Liveness probe
///
/// GET /health
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "reach-messaging",
    }))
}

/// Configure the health route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health));
}
