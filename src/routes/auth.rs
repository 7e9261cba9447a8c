use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::AccountRole;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::account::{Account, AuthResponse, DbAccount, LoginRequest, RegisterRequest};
use crate::utils::{hash_password, utc_now, verify_password};

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    message: String,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account registered", body = AuthResponse),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    // Self-registration only covers the marketplace-facing roles; triagers and
    // admins are provisioned by a super admin.
    if !matches!(payload.role, AccountRole::Researcher | AccountRole::CompanyAdmin) {
        return Err(AppError::bad_request("role must be researcher or company_admin"));
    }

    ensure_email_available(&state.pool, &payload.email).await?;

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let account_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO accounts (id, name, email, password_hash, role, is_active, is_verified, created_at, updated_at) VALUES (?, ?, ?, ?, ?, 1, 0, ?, ?)",
    )
    .bind(account_id.to_string())
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(password_hash)
    .bind(payload.role.as_str())
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let account = fetch_account_by_id(&state.pool, account_id).await?.try_into()?;
    let token = state.jwt.encode(account_id)?;

    Ok((StatusCode::CREATED, Json(AuthResponse { token, account })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_account = sqlx::query_as::<_, DbAccount>(
        "SELECT id, name, email, password_hash, role, parent_id, custom_role_id, is_active, is_verified, created_at, updated_at FROM accounts WHERE email = ?",
    )
    .bind(&payload.email)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if db_account.is_active == 0 {
        return Err(AppError::unauthorized("account is disabled"));
    }

    let password_ok = verify_password(&payload.password, &db_account.password_hash)?;
    if !password_ok {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let account: Account = db_account.try_into()?;
    let token = state.jwt.encode(account.id)?;

    Ok(Json(AuthResponse { token, account }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current account", body = Account)),
    security(("bearerAuth" = []))
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Account>> {
    let account = fetch_account_by_id(&state.pool, auth.account_id).await?.try_into()?;
    Ok(Json(account))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged")),
    security(("bearerAuth" = []))
)]
pub async fn logout(_auth: AuthUser) -> AppResult<Json<MessageResponse>> {
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

pub(crate) async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM accounts WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}

pub(crate) async fn fetch_account_by_id(pool: &SqlitePool, account_id: Uuid) -> AppResult<DbAccount> {
    sqlx::query_as::<_, DbAccount>(
        "SELECT id, name, email, password_hash, role, parent_id, custom_role_id, is_active, is_verified, created_at, updated_at FROM accounts WHERE id = ?",
    )
    .bind(account_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("account not found"))
}
