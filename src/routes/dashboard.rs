use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::app::AppState;
use crate::authz::{self, load_principal, DefaultPolicyEvaluator, PolicyEvaluator};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::sla::{calculate_metrics, ReportTimes, SlaConfig, SlaMetrics};
use crate::utils::utc_now;

#[derive(Debug, FromRow)]
struct MetricsRow {
    sla_first_response: Option<i64>,
    sla_triage: Option<i64>,
    sla_resolution: Option<i64>,
    submitted_at: Option<DateTime<Utc>>,
    first_responded_at: Option<DateTime<Utc>>,
    triaged_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
}

const METRICS_SQL: &str = r#"
    SELECT p.sla_first_response, p.sla_triage, p.sla_resolution,
           r.submitted_at, r.first_responded_at, r.triaged_at, r.resolved_at
    FROM reports r
    JOIN programs p ON p.id = r.program_id
    WHERE r.submitted_at IS NOT NULL
"#;

#[utoipa::path(
    get,
    path = "/dashboard/sla-metrics",
    tag = "Dashboard",
    responses((status = 200, description = "SLA compliance rollup", body = SlaMetrics)),
    security(("bearerAuth" = []))
)]
pub async fn sla_metrics(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<SlaMetrics>> {
    let principal = load_principal(&state.pool, auth.account_id).await?;
    let evaluator = DefaultPolicyEvaluator::new();

    // platform staff get the global rollup; company principals their own programs
    let rows: Vec<MetricsRow> = if evaluator.can(&principal, authz::permissions::ADMIN_PROGRAMS)
        || evaluator.can(&principal, authz::permissions::TRIAGE_QUEUE)
    {
        sqlx::query_as(METRICS_SQL).fetch_all(&state.pool).await?
    } else if evaluator.can(&principal, authz::permissions::COMPANY_REPORTS) {
        let company_id = principal.parent_id.unwrap_or(auth.account_id);
        sqlx::query_as(&format!("{METRICS_SQL} AND p.company_id = ?"))
            .bind(company_id.to_string())
            .fetch_all(&state.pool)
            .await?
    } else {
        return Err(AppError::forbidden("no access to SLA metrics"));
    };

    let inputs: Vec<(SlaConfig, ReportTimes)> = rows
        .into_iter()
        .map(|row| {
            (
                SlaConfig {
                    first_response_hours: row.sla_first_response,
                    triage_hours: row.sla_triage,
                    resolution_hours: row.sla_resolution,
                },
                ReportTimes {
                    submitted_at: row.submitted_at,
                    first_responded_at: row.first_responded_at,
                    triaged_at: row.triaged_at,
                    resolved_at: row.resolved_at,
                },
            )
        })
        .collect();

    Ok(Json(calculate_metrics(&inputs, utc_now())))
}
