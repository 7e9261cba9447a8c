mod common;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;

use triagehub::errors::AppError;
use triagehub::jwt::AuthUser;
use triagehub::models::report::{ReportStatus, ReportTransitionRequest};
use triagehub::routes::reports;

#[tokio::test]
async fn submit_sets_submitted_at_and_status() -> anyhow::Result<()> {
    let (_dir, state) = common::setup().await?;
    let pool = state.pool.clone();

    let company = common::create_account(&pool, "company_admin", None).await?;
    let researcher = common::create_account(&pool, "researcher", None).await?;
    let program = common::create_program(&pool, company, None).await?;
    let report = common::create_report(&pool, program, researcher, "draft", None).await?;

    let auth = AuthUser { account_id: researcher };
    let Json(submitted) = reports::submit_report(State(state.clone()), auth, Path(report)).await?;

    assert_eq!(submitted.status, ReportStatus::Submitted);
    assert!(submitted.submitted_at.is_some());
    assert!(submitted.first_responded_at.is_none());

    Ok(())
}

#[tokio::test]
async fn submit_rejected_when_program_paused() -> anyhow::Result<()> {
    let (_dir, state) = common::setup().await?;
    let pool = state.pool.clone();

    let company = common::create_account(&pool, "company_admin", None).await?;
    let researcher = common::create_account(&pool, "researcher", None).await?;
    let program = common::create_program(&pool, company, None).await?;
    let report = common::create_report(&pool, program, researcher, "draft", None).await?;

    sqlx::query("UPDATE programs SET status = 'paused' WHERE id = ?")
        .bind(program.to_string())
        .execute(&pool)
        .await?;

    let auth = AuthUser { account_id: researcher };
    let result = reports::submit_report(State(state.clone()), auth, Path(report)).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    Ok(())
}

#[tokio::test]
async fn submit_rejected_when_budget_exhausted() -> anyhow::Result<()> {
    let (_dir, state) = common::setup().await?;
    let pool = state.pool.clone();

    let company = common::create_account(&pool, "company_admin", None).await?;
    let researcher = common::create_account(&pool, "researcher", None).await?;
    let program = common::create_program(&pool, company, Some(100.0)).await?;
    let report = common::create_report(&pool, program, researcher, "draft", None).await?;

    sqlx::query("UPDATE programs SET budget_spent = 100 WHERE id = ?")
        .bind(program.to_string())
        .execute(&pool)
        .await?;

    let auth = AuthUser { account_id: researcher };
    let result = reports::submit_report(State(state.clone()), auth, Path(report)).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    Ok(())
}

#[tokio::test]
async fn only_the_reporting_researcher_can_submit() -> anyhow::Result<()> {
    let (_dir, state) = common::setup().await?;
    let pool = state.pool.clone();

    let company = common::create_account(&pool, "company_admin", None).await?;
    let researcher = common::create_account(&pool, "researcher", None).await?;
    let other = common::create_account(&pool, "researcher", None).await?;
    let program = common::create_program(&pool, company, None).await?;
    let report = common::create_report(&pool, program, researcher, "draft", None).await?;

    let auth = AuthUser { account_id: other };
    let result = reports::submit_report(State(state.clone()), auth, Path(report)).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    Ok(())
}

#[tokio::test]
async fn triage_transition_stamps_first_response_once() -> anyhow::Result<()> {
    let (_dir, state) = common::setup().await?;
    let pool = state.pool.clone();

    let company = common::create_account(&pool, "company_admin", None).await?;
    let researcher = common::create_account(&pool, "researcher", None).await?;
    let triager = common::create_account(&pool, "triager", None).await?;
    let program = common::create_program(&pool, company, None).await?;
    let report =
        common::create_report(&pool, program, researcher, "submitted", Some(chrono::Utc::now())).await?;

    let auth = AuthUser { account_id: triager };
    let Json(triaging) = reports::transition_report(
        State(state.clone()),
        auth.clone(),
        HeaderMap::new(),
        Path(report),
        Json(ReportTransitionRequest { status: ReportStatus::Triaging }),
    )
    .await?;

    assert_eq!(triaging.status, ReportStatus::Triaging);
    let first_response = triaging.first_responded_at.expect("stamped on leaving submitted");
    assert!(triaging.triaged_at.is_some());

    let Json(accepted) = reports::transition_report(
        State(state.clone()),
        auth,
        HeaderMap::new(),
        Path(report),
        Json(ReportTransitionRequest { status: ReportStatus::Accepted }),
    )
    .await?;

    assert_eq!(accepted.status, ReportStatus::Accepted);
    // markers never move after the first stamp
    assert_eq!(accepted.first_responded_at, Some(first_response));
    assert_eq!(accepted.triaged_at, triaging.triaged_at);

    Ok(())
}

#[tokio::test]
async fn invalid_transition_is_conflict() -> anyhow::Result<()> {
    let (_dir, state) = common::setup().await?;
    let pool = state.pool.clone();

    let company = common::create_account(&pool, "company_admin", None).await?;
    let researcher = common::create_account(&pool, "researcher", None).await?;
    let triager = common::create_account(&pool, "triager", None).await?;
    let program = common::create_program(&pool, company, None).await?;
    let report =
        common::create_report(&pool, program, researcher, "submitted", Some(chrono::Utc::now())).await?;

    let auth = AuthUser { account_id: triager };
    let result = reports::transition_report(
        State(state.clone()),
        auth,
        HeaderMap::new(),
        Path(report),
        Json(ReportTransitionRequest { status: ReportStatus::Resolved }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));

    Ok(())
}

#[tokio::test]
async fn closed_absorbs_and_is_audited() -> anyhow::Result<()> {
    let (_dir, state) = common::setup().await?;
    let pool = state.pool.clone();

    let company = common::create_account(&pool, "company_admin", None).await?;
    let researcher = common::create_account(&pool, "researcher", None).await?;
    let triager = common::create_account(&pool, "triager", None).await?;
    let program = common::create_program(&pool, company, None).await?;
    let report =
        common::create_report(&pool, program, researcher, "rejected", Some(chrono::Utc::now())).await?;

    let auth = AuthUser { account_id: triager };
    let Json(closed) = reports::transition_report(
        State(state.clone()),
        auth.clone(),
        HeaderMap::new(),
        Path(report),
        Json(ReportTransitionRequest { status: ReportStatus::Closed }),
    )
    .await?;
    assert_eq!(closed.status, ReportStatus::Closed);
    assert_eq!(common::audit_count(&pool, report, "REPORT_STATUS_CHANGED").await?, 1);

    // closed is never left
    let result = reports::transition_report(
        State(state.clone()),
        auth,
        HeaderMap::new(),
        Path(report),
        Json(ReportTransitionRequest { status: ReportStatus::Triaging }),
    )
    .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    Ok(())
}
