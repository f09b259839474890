//! Campaign handlers
//!
//! HTTP handlers for campaign estimate, dispatch, scheduling and listing.

use crate::dto::{
    CampaignCreateRequest, CampaignDetailResponse, CampaignResponse, CancelResponse,
    MessageResponse, PaginationParams, RunRequest, ScheduleRequest, ScheduleResponse,
};
use crate::AppDispatcher;
use actix_web::{web, HttpResponse};
use reach_core::{
    traits::{CampaignRepository, MessageRepository},
    AppError,
};
use reach_db::{PgCampaignRepository, PgMessageRepository};
use sqlx::PgPool;
use tracing::{debug, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Messages included in a campaign detail response
const DETAIL_MESSAGE_LIMIT: i64 = 100;

/// Price a campaign without dispatching it
///
/// GET /api/v1/accounts/{account_id}/campaigns/estimate
#[instrument(skip(dispatcher, req))]
pub async fn estimate(
    dispatcher: web::Data<AppDispatcher>,
    account_id: web::Path<Uuid>,
    req: web::Json<CampaignCreateRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Estimate validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let estimate = dispatcher
        .estimate(&req.to_request(account_id.into_inner()))
        .await?;

    Ok(HttpResponse::Ok().json(estimate))
}

/// Dispatch a campaign immediately
///
/// POST /api/v1/accounts/{account_id}/campaigns
#[instrument(skip(dispatcher, req))]
pub async fn dispatch(
    dispatcher: web::Data<AppDispatcher>,
    account_id: web::Path<Uuid>,
    req: web::Json<CampaignCreateRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Dispatch validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    debug!(title = %req.title, channel = %req.channel, "Dispatching campaign");

    let outcome = dispatcher
        .dispatch_now(&req.to_request(account_id.into_inner()))
        .await?;

    Ok(HttpResponse::Created().json(outcome))
}

/// Schedule a campaign for later
///
/// POST /api/v1/accounts/{account_id}/campaigns/schedule
#[instrument(skip(dispatcher, req))]
pub async fn schedule(
    dispatcher: web::Data<AppDispatcher>,
    account_id: web::Path<Uuid>,
    req: web::Json<ScheduleRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Schedule validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let campaign = dispatcher
        .schedule(
            &req.campaign.to_request(account_id.into_inner()),
            req.scheduled_at,
        )
        .await?;

    Ok(HttpResponse::Created().json(ScheduleResponse {
        campaign_id: campaign.id,
        scheduled_at: req.scheduled_at,
    }))
}

/// Run a scheduled campaign; the external scheduler's entry point
///
/// POST /api/v1/accounts/{account_id}/campaigns/{id}/run
#[instrument(skip(dispatcher, req))]
pub async fn run(
    dispatcher: web::Data<AppDispatcher>,
    path: web::Path<(Uuid, Uuid)>,
    req: Option<web::Json<RunRequest>>,
) -> Result<HttpResponse, AppError> {
    let (account_id, campaign_id) = path.into_inner();
    let store_ids = req.map(|r| r.store_ids.clone()).unwrap_or_default();

    let outcome = dispatcher
        .run_scheduled(account_id, campaign_id, &store_ids)
        .await?;

    Ok(HttpResponse::Ok().json(outcome))
}

/// Cancel a scheduled campaign and release its reservation
///
/// POST /api/v1/accounts/{account_id}/campaigns/{id}/cancel
#[instrument(skip(dispatcher))]
pub async fn cancel(
    dispatcher: web::Data<AppDispatcher>,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
    let (account_id, campaign_id) = path.into_inner();

    let released = dispatcher.cancel(account_id, campaign_id).await?;

    Ok(HttpResponse::Ok().json(CancelResponse {
        campaign_id,
        released,
    }))
}

/// List campaigns for an account, newest first
///
/// GET /api/v1/accounts/{account_id}/campaigns
#[instrument(skip(pool))]
pub async fn list(
    pool: web::Data<PgPool>,
    account_id: web::Path<Uuid>,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("Pagination validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let repo = PgCampaignRepository::new(pool.get_ref().clone());
    let campaigns = repo
        .list_by_account(account_id.into_inner(), query.limit(), query.offset())
        .await?;

    let data: Vec<CampaignResponse> = campaigns.into_iter().map(Into::into).collect();

    Ok(HttpResponse::Ok().json(query.paginate(data)))
}

/// Campaign detail: aggregate plus recent messages
///
/// GET /api/v1/accounts/{account_id}/campaigns/{id}
#[instrument(skip(pool))]
pub async fn detail(
    pool: web::Data<PgPool>,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
    let (account_id, campaign_id) = path.into_inner();

    let campaigns = PgCampaignRepository::new(pool.get_ref().clone());
    let campaign = campaigns
        .find_by_id(campaign_id)
        .await?
        .filter(|c| c.account_id == account_id)
        .ok_or_else(|| AppError::CampaignNotFound(campaign_id.to_string()))?;

    let messages = PgMessageRepository::new(pool.get_ref().clone())
        .list_by_campaign(campaign_id, DETAIL_MESSAGE_LIMIT)
        .await?;

    Ok(HttpResponse::Ok().json(CampaignDetailResponse {
        campaign: campaign.into(),
        messages: messages.into_iter().map(MessageResponse::from).collect(),
    }))
}

/// Configure campaign routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/accounts/{account_id}/campaigns")
            .route("/estimate", web::get().to(estimate))
            .route("/schedule", web::post().to(schedule))
            .route("", web::post().to(dispatch))
            .route("", web::get().to(list))
            .route("/{id}/run", web::post().to(run))
            .route("/{id}/cancel", web::post().to(cancel))
            .route("/{id}", web::get().to(detail)),
    );
}
