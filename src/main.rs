mod handlers;
mod middleware;
mod models;
mod services;
mod utils;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use std::env;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    handlers::{
        admin, auth, files, inspections, jobs, notifications, plans, uploads, verification,
    },
    middleware::auth::auth_middleware,
    services::{analyzer::AnthropicAnalyzer, processor::SharedAnalyzer},
    utils::database::create_pool,
};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub jwt_secret: String,
    pub upload_dir: String,
    pub analyzer: SharedAnalyzer,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "inspection_manager_backend=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");
    let anthropic_api_key = env::var("ANTHROPIC_API_KEY").expect("ANTHROPIC_API_KEY must be set");
    let upload_dir = env::var("UPLOAD_DIR").unwrap_or_else(|_| "./storage/uploads".to_string());

    if let Err(e) = std::fs::create_dir_all(&upload_dir) {
        tracing::warn!("Failed to create upload directory {}: {}", upload_dir, e);
    }

    let db = create_pool(&database_url).await?;

    sqlx::migrate!("./migrations").run(&db).await?;

    let analyzer: SharedAnalyzer = Arc::new(AnthropicAnalyzer::new(anthropic_api_key));

    let state = AppState {
        db,
        jwt_secret,
        upload_dir,
        analyzer,
    };

    let cors_origin =
        env::var("CORS_ALLOWED_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());

    let cors = if cors_origin == "*" {
        CorsLayer::new()
            .allow_origin(axum::http::header::HeaderValue::from_static("*"))
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
            ])
    } else {
        CorsLayer::new()
            .allow_origin(cors_origin.parse::<HeaderValue>()?)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
            ])
    };

    let protected_routes = Router::new()
        .route("/inspections/upload", post(uploads::upload_inspection))
        .route("/inspections", get(inspections::list_inspections))
        .route("/inspections/:id", get(inspections::get_inspection))
        .route("/inspections/:id/tracker", get(inspections::get_tracker))
        .route("/inspections/:id/report", get(inspections::get_completed_report))
        .route("/inspections/:id/cancel", post(inspections::cancel_inspection))
        .route("/inspections/:id/plan", put(plans::save_plan))
        .route("/inspections/:id/approve", post(plans::approve_plan))
        .route(
            "/inspections/:id/verification/start",
            post(verification::start_verification),
        )
        .route(
            "/inspections/:id/verification",
            put(verification::save_verification),
        )
        .route(
            "/inspections/:id/verification/items/:item_id/evidence",
            post(verification::upload_evidence),
        )
        .route(
            "/inspections/:id/verification/finish",
            post(verification::finish_verification),
        )
        .route("/jobs/:id", get(jobs::get_job))
        .route("/establishments", get(admin::list_establishments))
        .route("/admin/establishments", post(admin::create_establishment))
        .route(
            "/admin/establishments/:id/consultants",
            post(admin::assign_consultant),
        )
        .route("/admin/analytics", get(admin::get_analytics))
        .route("/admin/register", post(auth::register_user_admin))
        .route(
            "/admin/notifications/trigger",
            post(notifications::trigger_notifications),
        )
        .route(
            "/notifications/stale",
            get(notifications::get_stale_inspections),
        )
        .route("/files/:filename", get(files::serve_file))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/download/:filename", get(files::serve_file_with_token))
        .merge(protected_routes)
        .layer(cors)
        .layer(DefaultBodyLimit::max(
            env::var("MAX_REQUEST_BODY_MB")
                .unwrap_or_else(|_| "50".to_string())
                .parse::<usize>()
                .unwrap_or(50)
                * 1024
                * 1024,
        ))
        .with_state(state.clone());

    // Daily sweep for inspections stuck in review or verification.
    let notification_db = state.db.clone();
    tokio::spawn(async move {
        use crate::services::notification::NotificationService;
        use tokio_cron_scheduler::{Job, JobScheduler};

        let sched = JobScheduler::new()
            .await
            .expect("Failed to create scheduler");

        let job = Job::new_async("0 0 9 * * *", move |_uuid, _l| {
            let db = notification_db.clone();
            Box::pin(async move {
                let notification_service = NotificationService::new(db);
                if let Err(e) = notification_service.process_stale_notifications().await {
                    tracing::error!("Failed to process notifications: {}", e);
                } else {
                    tracing::info!("Daily stale-inspection sweep completed");
                }
            })
        })
        .expect("Failed to create notification job");

        sched.add(job).await.expect("Failed to add job");
        sched.start().await.expect("Failed to start scheduler");

        tracing::info!("Notification scheduler started - running daily at 9 AM");

        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
    tracing::info!("Server running on http://0.0.0.0:8000");

    axum::serve(listener, app).await?;

    Ok(())
}
