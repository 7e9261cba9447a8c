//! Report lifecycle endpoints: draft creation, submission, triage transitions
//! and bounty payout.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::audit::{self, AuditEntry, RequestContext};
use crate::authz::{self, load_principal, DefaultPolicyEvaluator, PolicyEvaluator, Principal};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::program::{apply_payout, Program, ProgramStatus};
use crate::models::report::{
    stamp_transition, DbReport, PayoutRequest, Report, ReportCreateRequest, ReportStatus,
    ReportTransitionRequest,
};
use crate::notify::{send_quietly, Notification};
use crate::routes::programs::fetch_program;
use crate::utils::utc_now;

#[utoipa::path(
    post,
    path = "/programs/{program_id}/reports",
    tag = "Reports",
    params(("program_id" = Uuid, Path, description = "Program id")),
    request_body = ReportCreateRequest,
    responses((status = 201, description = "Draft report created", body = Report)),
    security(("bearerAuth" = []))
)]
pub async fn create_report(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(program_id): Path<Uuid>,
    Json(payload): Json<ReportCreateRequest>,
) -> AppResult<(StatusCode, Json<Report>)> {
    let principal = load_principal(&state.pool, auth.account_id).await?;
    authz::require(&principal, authz::permissions::RESEARCHER_REPORTS)?;

    // drafts may be opened against any known program; the submit gate checks
    // program status and budget
    let _program = fetch_program(&state.pool, program_id).await?;

    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO reports (id, program_id, researcher_id, title, severity, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, 'draft', ?, ?)",
    )
    .bind(id.to_string())
    .bind(program_id.to_string())
    .bind(auth.account_id.to_string())
    .bind(&payload.title)
    .bind(&payload.severity)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let report = fetch_report(&state.pool, id).await?.try_into()?;
    Ok((StatusCode::CREATED, Json(report)))
}

#[utoipa::path(
    get,
    path = "/programs/{program_id}/reports",
    tag = "Reports",
    params(("program_id" = Uuid, Path, description = "Program id")),
    responses((status = 200, description = "Reports for the program", body = Vec<Report>)),
    security(("bearerAuth" = []))
)]
pub async fn list_reports(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(program_id): Path<Uuid>,
) -> AppResult<Json<Vec<Report>>> {
    let principal = load_principal(&state.pool, auth.account_id).await?;
    let program: Program = fetch_program(&state.pool, program_id).await?.try_into()?;
    ensure_triage_access(&principal, &program)?;

    let rows = sqlx::query_as::<_, DbReport>(
        "SELECT id, program_id, researcher_id, title, severity, status, submitted_at, first_responded_at, triaged_at, resolved_at, created_at, updated_at FROM reports WHERE program_id = ? ORDER BY created_at DESC",
    )
    .bind(program_id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let reports = rows.into_iter().map(Report::try_from).collect::<Result<_, _>>()?;
    Ok(Json(reports))
}

#[utoipa::path(
    get,
    path = "/reports/{id}",
    tag = "Reports",
    params(("id" = Uuid, Path, description = "Report id")),
    responses(
        (status = 200, description = "Report detail", body = Report),
        (status = 404, description = "Report not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_report(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Report>> {
    let principal = load_principal(&state.pool, auth.account_id).await?;
    let report: Report = fetch_report(&state.pool, id).await?.try_into()?;

    if report.researcher_id != auth.account_id {
        let program: Program = fetch_program(&state.pool, report.program_id).await?.try_into()?;
        ensure_triage_access(&principal, &program)?;
    }

    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/reports/{id}/submit",
    tag = "Reports",
    params(("id" = Uuid, Path, description = "Report id")),
    responses(
        (status = 200, description = "Report submitted", body = Report),
        (status = 409, description = "Program not accepting submissions")
    ),
    security(("bearerAuth" = []))
)]
pub async fn submit_report(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Report>> {
    let principal = load_principal(&state.pool, auth.account_id).await?;
    authz::require(&principal, authz::permissions::RESEARCHER_REPORTS)?;

    let report: Report = fetch_report(&state.pool, id).await?.try_into()?;
    if report.researcher_id != auth.account_id {
        return Err(AppError::forbidden("only the reporting researcher can submit"));
    }
    if !ReportStatus::can_transition(report.status, ReportStatus::Submitted) {
        return Err(AppError::conflict(format!(
            "cannot submit a report in status {}",
            report.status.as_str()
        )));
    }

    let program: Program = fetch_program(&state.pool, report.program_id).await?.try_into()?;
    if program.status != ProgramStatus::Active {
        return Err(AppError::conflict("program is not accepting submissions"));
    }
    if let Some(total) = program.budget_total {
        if program.budget_spent >= total {
            return Err(AppError::conflict("program budget is exhausted"));
        }
    }

    let now = utc_now();
    sqlx::query(
        "UPDATE reports SET status = 'submitted', submitted_at = COALESCE(submitted_at, ?), updated_at = ? WHERE id = ?",
    )
    .bind(now)
    .bind(now)
    .bind(id.to_string())
    .execute(&state.pool)
    .await?;

    let report = fetch_report(&state.pool, id).await?.try_into()?;
    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/reports/{id}/transition",
    tag = "Reports",
    params(("id" = Uuid, Path, description = "Report id")),
    request_body = ReportTransitionRequest,
    responses(
        (status = 200, description = "Status updated", body = Report),
        (status = 409, description = "Transition not allowed from the current status")
    ),
    security(("bearerAuth" = []))
)]
pub async fn transition_report(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReportTransitionRequest>,
) -> AppResult<Json<Report>> {
    let principal = load_principal(&state.pool, auth.account_id).await?;
    let report: Report = fetch_report(&state.pool, id).await?.try_into()?;
    let program: Program = fetch_program(&state.pool, report.program_id).await?.try_into()?;
    ensure_triage_access(&principal, &program)?;

    let to = payload.status;
    if matches!(to, ReportStatus::Submitted) {
        return Err(AppError::bad_request("submission goes through the submit endpoint"));
    }
    if matches!(to, ReportStatus::Paid) {
        return Err(AppError::bad_request("payment goes through the payout endpoint"));
    }
    if !ReportStatus::can_transition(report.status, to) {
        return Err(AppError::conflict(format!(
            "cannot transition {} -> {}",
            report.status.as_str(),
            to.as_str()
        )));
    }

    let now = utc_now();
    let mut times = report.times();
    stamp_transition(report.status, to, &mut times, now);

    sqlx::query(
        r#"
        UPDATE reports
        SET status = ?,
            first_responded_at = COALESCE(first_responded_at, ?),
            triaged_at = COALESCE(triaged_at, ?),
            resolved_at = COALESCE(resolved_at, ?),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(to.as_str())
    .bind(times.first_responded_at)
    .bind(times.triaged_at)
    .bind(times.resolved_at)
    .bind(now)
    .bind(id.to_string())
    .execute(&state.pool)
    .await?;

    let ctx = RequestContext::from_headers(&headers);
    audit::record(
        &state.pool,
        &AuditEntry::new("REPORT_STATUS_CHANGED")
            .actor(auth.account_id)
            .report(id)
            .details(format!("{} -> {}", report.status.as_str(), to.as_str()))
            .ip(ctx.ip),
    )
    .await?;

    let report = fetch_report(&state.pool, id).await?.try_into()?;
    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/reports/{id}/payout",
    tag = "Reports",
    params(("id" = Uuid, Path, description = "Report id")),
    request_body = PayoutRequest,
    responses(
        (status = 200, description = "Bounty paid", body = Report),
        (status = 409, description = "Budget exceeded or report not payable")
    ),
    security(("bearerAuth" = []))
)]
pub async fn payout_report(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<PayoutRequest>,
) -> AppResult<Json<Report>> {
    let principal = load_principal(&state.pool, auth.account_id).await?;
    authz::require(&principal, authz::permissions::COMPANY_PAYMENTS)?;

    let report: Report = fetch_report(&state.pool, id).await?.try_into()?;
    let program: Program = fetch_program(&state.pool, report.program_id).await?.try_into()?;

    let company_id = principal.parent_id.unwrap_or(auth.account_id);
    if program.company_id != company_id && !principal.is_super_admin() {
        return Err(AppError::forbidden("program belongs to another company"));
    }
    if !ReportStatus::can_transition(report.status, ReportStatus::Paid) {
        return Err(AppError::conflict(format!(
            "cannot pay a report in status {}",
            report.status.as_str()
        )));
    }

    let now = utc_now();
    let mut times = report.times();
    stamp_transition(report.status, ReportStatus::Paid, &mut times, now);

    // budget read, decision and both writes share one transaction so racing
    // payouts serialize on the program row
    let mut tx = state.pool.begin().await?;

    let row: (Option<f64>, f64, i64) = sqlx::query_as(
        "SELECT budget_total, budget_spent, budget_alert_level FROM programs WHERE id = ?",
    )
    .bind(program.id.to_string())
    .fetch_one(&mut *tx)
    .await?;

    let outcome = apply_payout(row.0, row.1, row.2, payload.amount)?;

    let new_status = if outcome.pause_program {
        ProgramStatus::Paused
    } else {
        program.status
    };

    sqlx::query(
        "UPDATE programs SET budget_spent = ?, budget_alert_level = ?, status = ?, updated_at = ? WHERE id = ?",
    )
    .bind(outcome.new_spent)
    .bind(outcome.new_alert_level)
    .bind(new_status.as_str())
    .bind(now)
    .bind(program.id.to_string())
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE reports SET status = 'paid', resolved_at = COALESCE(resolved_at, ?), updated_at = ? WHERE id = ?",
    )
    .bind(times.resolved_at)
    .bind(now)
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let ctx = RequestContext::from_headers(&headers);
    audit::record(
        &state.pool,
        &AuditEntry::new("BOUNTY_PAID")
            .actor(auth.account_id)
            .report(id)
            .details(format!("amount {}", payload.amount))
            .ip(ctx.ip),
    )
    .await?;

    // alerts go out after the commit; delivery failure never unwinds the payout
    for threshold in outcome.crossed_thresholds {
        send_quietly(
            state.notifier.as_ref(),
            Notification::BudgetThreshold {
                program_id: program.id,
                threshold_percent: threshold as u8,
            },
        )
        .await;
    }

    let report = fetch_report(&state.pool, id).await?.try_into()?;
    Ok(Json(report))
}

/// Triage-side access: platform triagers and admins see every program; company
/// principals only their own programs.
fn ensure_triage_access(principal: &Principal, program: &Program) -> AppResult<()> {
    let evaluator = DefaultPolicyEvaluator::new();

    if evaluator.can(principal, authz::permissions::TRIAGE_REPORTS)
        || evaluator.can(principal, authz::permissions::ADMIN_PROGRAMS)
    {
        return Ok(());
    }

    if evaluator.can(principal, authz::permissions::COMPANY_REPORTS) {
        let company_id = principal.parent_id.unwrap_or(principal.account_id);
        if program.company_id == company_id {
            return Ok(());
        }
    }

    Err(AppError::forbidden("no triage access to this program"))
}

pub(crate) async fn fetch_report(pool: &SqlitePool, id: Uuid) -> AppResult<DbReport> {
    sqlx::query_as::<_, DbReport>(
        "SELECT id, program_id, researcher_id, title, severity, status, submitted_at, first_responded_at, triaged_at, resolved_at, created_at, updated_at FROM reports WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("report not found"))
}
