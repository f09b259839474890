//! Reach messaging server
//!
//! Audience-targeted campaign dispatch over SMS and brand messaging
//! channels, with wallet-backed cost control and delivery reconciliation.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use reach_api::{configure_campaigns, configure_health, configure_test_sends, AppDispatcher};
use reach_core::AppConfig;
use reach_db::{
    create_pool, PgCampaignRepository, PgCreditLedger, PgCustomerDirectory, PgMessageRepository,
    PgPool, PgTestSendLog,
};
use reach_gateway::{GatewaySettings, RestGateway};
use reach_services::{
    AmbiguousPolicy, AudienceResolver, CampaignDispatcher, DeliveryReconciler, DispatcherSettings,
    PgWalletLedger, SendWindow, TestSendQuota,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Configure API routes
fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(configure_campaigns)
            .configure(configure_test_sends),
    );
}

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "reach_messaging={},reach_api={},reach_services={},reach_db={},reach_gateway={},actix_web=info,sqlx=warn",
            log_level, log_level, log_level, log_level, log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

/// Wire the dispatcher from its database, gateway and policy pieces
fn build_dispatcher(
    config: &AppConfig,
    pool: PgPool,
    gateway: Arc<RestGateway>,
    window: SendWindow,
) -> AppDispatcher {
    CampaignDispatcher::new(
        AudienceResolver::new(Arc::new(PgCustomerDirectory::new(pool.clone()))),
        Arc::new(PgCampaignRepository::new(pool.clone())),
        Arc::new(PgMessageRepository::new(pool.clone())),
        Arc::new(PgWalletLedger::new(Arc::new(pool.clone()))),
        Arc::new(PgCreditLedger::new(
            pool.clone(),
            config.dispatch.monthly_free_credits,
        )),
        TestSendQuota::new(
            Arc::new(PgTestSendLog::new(pool)),
            config.dispatch.test_send_daily_limit,
        ),
        gateway,
        DeliveryReconciler::new(
            Duration::from_secs(config.dispatch.poll_delay_secs),
            AmbiguousPolicy::AssumeSent,
        ),
        window,
        DispatcherSettings {
            sender_id: config.gateway.sender_id.clone(),
            business_channel_id: config.gateway.business_channel_id.clone(),
            max_in_flight: config.dispatch.max_in_flight,
        },
    )
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting Reach messaging v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().expect("Failed to load configuration");

    info!("Connecting to database...");
    let pool = create_pool(&config.database.url, Some(config.database.max_connections))
        .await
        .expect("Failed to create database pool");
    info!(
        "Database connection established with {} max connections",
        config.database.max_connections
    );

    let gateway = Arc::new(
        RestGateway::new(GatewaySettings {
            base_url: config.gateway.base_url.clone(),
            api_key: config.gateway.api_key.clone(),
            api_secret: config.gateway.api_secret.clone(),
            timeout: Duration::from_millis(config.gateway.timeout_ms),
        })
        .expect("Failed to build gateway client"),
    );

    let window = SendWindow::from_name(&config.dispatch.send_window_tz)
        .expect("dispatch.send_window_tz must be a valid IANA timezone");

    let dispatcher = web::Data::new(build_dispatcher(&config, pool.clone(), gateway, window));

    let cors_origins =
        env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string());

    let bind_addr = config.server_addr();
    let workers = config.server.workers;
    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, workers
    );

    HttpServer::new(move || {
        let cors_origins_inner = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                let origins: Vec<&str> = cors_origins_inner.split(',').collect();
                if let Ok(origin_str) = origin.to_str() {
                    origins.iter().any(|o| o.trim() == origin_str)
                } else {
                    false
                }
            })
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
            ])
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(dispatcher.clone())
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                let error_message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "error": "invalid_query",
                        "message": error_message
                    })),
                )
                .into()
            }))
            .wrap(cors)
            .wrap(tracing_actix_web::TracingLogger::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(configure_health)
            .configure(configure_routes)
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await
}
