use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{self, load_principal};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::program::{DbProgram, Program, ProgramCreateRequest, ProgramUpdateRequest};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/programs",
    tag = "Programs",
    responses((status = 200, description = "Programs owned by the caller's company", body = Vec<Program>)),
    security(("bearerAuth" = []))
)]
pub async fn list_programs(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Program>>> {
    let principal = load_principal(&state.pool, auth.account_id).await?;
    authz::require(&principal, authz::permissions::COMPANY_PROGRAMS)?;

    let company_id = principal.parent_id.unwrap_or(auth.account_id);
    let rows = sqlx::query_as::<_, DbProgram>(
        "SELECT id, company_id, name, status, sla_first_response, sla_triage, sla_resolution, budget_total, budget_spent, budget_alert_level, created_at, updated_at FROM programs WHERE company_id = ? ORDER BY name",
    )
    .bind(company_id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let programs = rows.into_iter().map(Program::try_from).collect::<Result<_, _>>()?;
    Ok(Json(programs))
}

#[utoipa::path(
    post,
    path = "/programs",
    tag = "Programs",
    request_body = ProgramCreateRequest,
    responses((status = 201, description = "Program created", body = Program)),
    security(("bearerAuth" = []))
)]
pub async fn create_program(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ProgramCreateRequest>,
) -> AppResult<(StatusCode, Json<Program>)> {
    let principal = load_principal(&state.pool, auth.account_id).await?;
    authz::require(&principal, authz::permissions::COMPANY_PROGRAMS)?;

    validate_sla_hours(payload.sla_first_response)?;
    validate_sla_hours(payload.sla_triage)?;
    validate_sla_hours(payload.sla_resolution)?;
    if matches!(payload.budget_total, Some(total) if total <= 0.0) {
        return Err(AppError::bad_request("budget_total must be positive"));
    }

    // programs belong to the root company account even when created by an
    // employee
    let company_id = principal.parent_id.unwrap_or(auth.account_id);
    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO programs (id, company_id, name, status, sla_first_response, sla_triage, sla_resolution, budget_total, budget_spent, budget_alert_level, created_at, updated_at) VALUES (?, ?, ?, 'active', ?, ?, ?, ?, 0, 0, ?, ?)",
    )
    .bind(id.to_string())
    .bind(company_id.to_string())
    .bind(&payload.name)
    .bind(payload.sla_first_response)
    .bind(payload.sla_triage)
    .bind(payload.sla_resolution)
    .bind(payload.budget_total)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let program = fetch_program(&state.pool, id).await?.try_into()?;
    Ok((StatusCode::CREATED, Json(program)))
}

#[utoipa::path(
    get,
    path = "/programs/{id}",
    tag = "Programs",
    params(("id" = Uuid, Path, description = "Program id")),
    responses(
        (status = 200, description = "Program detail", body = Program),
        (status = 404, description = "Program not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_program(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Program>> {
    let _principal = load_principal(&state.pool, auth.account_id).await?;
    let program = fetch_program(&state.pool, id).await?.try_into()?;
    Ok(Json(program))
}

#[utoipa::path(
    put,
    path = "/programs/{id}",
    tag = "Programs",
    params(("id" = Uuid, Path, description = "Program id")),
    request_body = ProgramUpdateRequest,
    responses(
        (status = 200, description = "Program updated", body = Program),
        (status = 404, description = "Program not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_program(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProgramUpdateRequest>,
) -> AppResult<Json<Program>> {
    let principal = load_principal(&state.pool, auth.account_id).await?;
    authz::require(&principal, authz::permissions::COMPANY_PROGRAMS)?;

    let existing: Program = fetch_program(&state.pool, id).await?.try_into()?;
    let company_id = principal.parent_id.unwrap_or(auth.account_id);
    if existing.company_id != company_id && !principal.is_super_admin() {
        return Err(AppError::not_found("program not found"));
    }

    validate_sla_hours(payload.sla_first_response.flatten())?;
    validate_sla_hours(payload.sla_triage.flatten())?;
    validate_sla_hours(payload.sla_resolution.flatten())?;

    let name = payload.name.unwrap_or(existing.name);
    let status = payload.status.unwrap_or(existing.status);
    // absent keeps the stored value, explicit null clears it
    let sla_first_response = payload.sla_first_response.unwrap_or(existing.sla_first_response);
    let sla_triage = payload.sla_triage.unwrap_or(existing.sla_triage);
    let sla_resolution = payload.sla_resolution.unwrap_or(existing.sla_resolution);
    let budget_total = payload.budget_total.unwrap_or(existing.budget_total);
    let now = utc_now();

    sqlx::query(
        "UPDATE programs SET name = ?, status = ?, sla_first_response = ?, sla_triage = ?, sla_resolution = ?, budget_total = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&name)
    .bind(status.as_str())
    .bind(sla_first_response)
    .bind(sla_triage)
    .bind(sla_resolution)
    .bind(budget_total)
    .bind(now)
    .bind(id.to_string())
    .execute(&state.pool)
    .await?;

    let program = fetch_program(&state.pool, id).await?.try_into()?;
    Ok(Json(program))
}

fn validate_sla_hours(hours: Option<i64>) -> AppResult<()> {
    if matches!(hours, Some(h) if h < 0) {
        return Err(AppError::bad_request("SLA targets must be non-negative hours"));
    }
    Ok(())
}

pub(crate) async fn fetch_program(pool: &SqlitePool, id: Uuid) -> AppResult<DbProgram> {
    sqlx::query_as::<_, DbProgram>(
        "SELECT id, company_id, name, status, sla_first_response, sla_triage, sla_resolution, budget_total, budget_spent, budget_alert_level, created_at, updated_at FROM programs WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("program not found"))
}
