//! # Server Configuration
//!
//! This module contains the application state, router wiring, OpenAPI
//! documentation, and the server/reconciler lifecycle for the Cogni
//! Scheduler. Components receive their collaborators through constructors
//! here; nothing resolves dependencies from ambient globals.

use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use uuid::Uuid;
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth;
use crate::config::AppConfig;
use crate::db;
use crate::error::SchedulerError;
use crate::handlers;
use crate::queue::{HttpJobQueue, JobQueue, MeteredQueue};
use crate::reconciler::ScheduleReconciler;
use crate::repositories::{GrantRepository, RunRepository, ScheduleRepository};
use crate::schedules::ScheduleService;
use crate::telemetry;
use migration::{Migrator, MigratorTrait};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub schedules: Arc<ScheduleService>,
    pub grants: Arc<GrantRepository>,
    pub runs: Arc<RunRepository>,
}

impl AppState {
    /// Wire repositories and services over one connection pool.
    pub fn new(config: Arc<AppConfig>, db: DatabaseConnection) -> Self {
        let schedules = Arc::new(ScheduleService::new(
            db.clone(),
            ScheduleRepository::new(db.clone()),
            GrantRepository::new(db.clone()),
        ));
        let grants = Arc::new(GrantRepository::new(db.clone()));
        let runs = Arc::new(RunRepository::new(db.clone()));

        Self {
            config,
            db,
            schedules,
            grants,
            runs,
        }
    }
}

/// Attach a correlation trace ID to the request and make it available to
/// error responses through task-local storage.
async fn trace_context_middleware(mut request: Request, next: Next) -> Response {
    let trace_id = format!("req-{}", &Uuid::new_v4().to_string()[..8]);
    let context = telemetry::TraceContext {
        trace_id: trace_id.clone(),
    };
    request.extensions_mut().insert(context.clone());
    telemetry::with_trace_context(context, next.run(request)).await
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/api/v1/schedules",
            post(handlers::schedules::create_schedule).get(handlers::schedules::list_schedules),
        )
        .route(
            "/api/v1/schedules/{schedule_id}",
            get(handlers::schedules::get_schedule)
                .patch(handlers::schedules::update_schedule)
                .delete(handlers::schedules::disable_schedule),
        )
        .route(
            "/api/v1/schedules/{schedule_id}/runs",
            get(handlers::schedules::list_runs),
        )
        .route(
            "/api/v1/runs/{run_id}/started",
            post(handlers::runs::mark_run_started),
        )
        .route(
            "/api/v1/runs/{run_id}/completed",
            post(handlers::runs::mark_run_completed),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(protected)
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Build the job-queue port from configuration: the HTTP adapter wrapped in
/// the metrics stage.
pub fn build_queue(config: &AppConfig) -> Result<Arc<dyn JobQueue>, SchedulerError> {
    Ok(Arc::new(MeteredQueue::new(HttpJobQueue::new(
        &config.queue,
    )?)))
}

/// Starts the server and the reconciliation sweep with the given
/// configuration, shutting both down cleanly on Ctrl-C.
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing(&config)?;

    let db = db::init_pool(&config).await?;
    Migrator::up(&db, None).await?;

    let config = Arc::new(config);
    let state = AppState::new(Arc::clone(&config), db.clone());

    let queue = build_queue(&config)?;
    let reconciler = ScheduleReconciler::new(Arc::clone(&config), db, queue);

    let shutdown = CancellationToken::new();
    let reconciler_handle = tokio::spawn(reconciler.run(shutdown.clone()));

    let app = create_app(state);

    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile = %config.profile, "Server listening");

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
            serve_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(err) = reconciler_handle.await {
        tracing::error!(error = ?err, "Reconciler task join failed");
    }

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::schedules::create_schedule,
        crate::handlers::schedules::list_schedules,
        crate::handlers::schedules::get_schedule,
        crate::handlers::schedules::update_schedule,
        crate::handlers::schedules::disable_schedule,
        crate::handlers::schedules::list_runs,
        crate::handlers::runs::mark_run_started,
        crate::handlers::runs::mark_run_completed,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::schedules::CreateScheduleBody,
            crate::handlers::schedules::UpdateScheduleBody,
            crate::handlers::schedules::ScheduleInfo,
            crate::handlers::schedules::SchedulesResponse,
            crate::handlers::schedules::DisableScheduleResponse,
            crate::handlers::schedules::RunsResponse,
            crate::handlers::runs::RunInfo,
            crate::handlers::runs::RunOutcomeParam,
            crate::handlers::runs::CompleteRunBody,
            crate::error::ApiError,
        )
    ),
    info(
        title = "Cogni Scheduler API",
        description = "Internal API for schedules, execution grants, and the run ledger",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
