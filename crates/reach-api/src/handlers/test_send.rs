//! Test send handlers
//!
//! HTTP handlers for quota-limited test sends.

use crate::dto::{TestSendCreateRequest, TestSendResponse};
use crate::AppDispatcher;
use actix_web::{web, HttpResponse};
use reach_core::AppError;
use tracing::{instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Send a single test message to the caller's own phone
///
/// POST /api/v1/accounts/{account_id}/test-sends
#[instrument(skip(dispatcher, req))]
pub async fn create(
    dispatcher: web::Data<AppDispatcher>,
    account_id: web::Path<Uuid>,
    req: web::Json<TestSendCreateRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Test send validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let outcome = dispatcher
        .test_send(&req.to_request(account_id.into_inner()))
        .await?;

    Ok(HttpResponse::Created().json(TestSendResponse {
        ok: outcome.succeeded,
        tracking_id: outcome.tracking_id,
    }))
}

/// Configure test send routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/accounts/{account_id}/test-sends").route("", web::post().to(create)),
    );
}
