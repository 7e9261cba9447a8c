use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::jwt::JwtConfig;
use crate::notify::{LogNotifier, Notifier};
use crate::routes::{accounts, auth, dashboard, health, programs, rbac, reports};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig) -> Self {
        Self::with_notifier(pool, jwt, Arc::new(LogNotifier))
    }

    pub fn with_notifier(pool: SqlitePool, jwt: JwtConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            notifier,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let state = AppState::new(pool, jwt_config);
    Ok(build_router(state))
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    let account_routes = Router::new()
        .route("/sub", post(accounts::create_sub_account))
        .route("/:id/custom-role", put(accounts::assign_custom_role))
        .route("/:id", delete(accounts::deactivate_account));

    let rbac_routes = Router::new()
        .route("/permissions", get(rbac::list_permissions))
        .route("/permissions", post(rbac::create_permission))
        .route("/permissions/seed", post(rbac::seed_permissions))
        .route("/roles", get(rbac::list_roles))
        .route("/roles", post(rbac::create_role))
        .route("/roles/:role_id", get(rbac::get_role))
        .route("/roles/:role_id", put(rbac::update_role))
        .route("/roles/:role_id", delete(rbac::delete_role));

    let program_routes = Router::new()
        .route("/", get(programs::list_programs))
        .route("/", post(programs::create_program))
        .route("/:id", get(programs::get_program))
        .route("/:id", put(programs::update_program));

    // Report creation and listing are scoped to a program; lifecycle actions
    // address the report directly.
    let program_report_routes = Router::new()
        .route("/", get(reports::list_reports))
        .route("/", post(reports::create_report));

    let report_routes = Router::new()
        .route("/:id", get(reports::get_report))
        .route("/:id/submit", post(reports::submit_report))
        .route("/:id/transition", post(reports::transition_report))
        .route("/:id/payout", post(reports::payout_report));

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/accounts", account_routes)
        .nest("/rbac", rbac_routes)
        .nest("/programs", program_routes)
        .nest("/programs/:program_id/reports", program_report_routes)
        .nest("/reports", report_routes)
        .route("/dashboard/sla-metrics", get(dashboard::sla_metrics))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
