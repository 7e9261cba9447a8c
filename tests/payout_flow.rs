mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;

use triagehub::app::AppState;
use triagehub::errors::AppError;
use triagehub::jwt::AuthUser;
use triagehub::models::report::{PayoutRequest, ReportStatus};
use triagehub::notify::{Notification, Notifier};
use triagehub::routes::reports;

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

fn thresholds(notifier: &RecordingNotifier) -> Vec<u8> {
    notifier
        .sent
        .lock()
        .unwrap()
        .iter()
        .filter_map(|n| match n {
            Notification::BudgetThreshold { threshold_percent, .. } => Some(*threshold_percent),
            _ => None,
        })
        .collect()
}

async fn setup_payable(
    state: &AppState,
    budget_total: Option<f64>,
) -> anyhow::Result<(uuid::Uuid, uuid::Uuid, uuid::Uuid)> {
    let pool = &state.pool;
    let company = common::create_account(pool, "company_admin", None).await?;
    let researcher = common::create_account(pool, "researcher", None).await?;
    let program = common::create_program(pool, company, budget_total).await?;
    let report = common::create_report(
        pool,
        program,
        researcher,
        "ready_for_payout",
        Some(chrono::Utc::now()),
    )
    .await?;
    Ok((company, program, report))
}

#[tokio::test]
async fn payout_over_budget_rejected_without_mutation() -> anyhow::Result<()> {
    let (_dir, base) = common::setup().await?;
    let state = base.clone();
    let (company, program, report) = setup_payable(&state, Some(100.0)).await?;

    let auth = AuthUser { account_id: company };

    // $40 lands, the next $70 would overshoot
    reports::payout_report(
        State(state.clone()),
        auth.clone(),
        HeaderMap::new(),
        Path(report),
        Json(PayoutRequest { amount: 40.0 }),
    )
    .await?;

    let researcher = common::create_account(&state.pool, "researcher", None).await?;
    let second = common::create_report(
        &state.pool,
        program,
        researcher,
        "ready_for_payout",
        Some(chrono::Utc::now()),
    )
    .await?;

    let result = reports::payout_report(
        State(state.clone()),
        auth,
        HeaderMap::new(),
        Path(second),
        Json(PayoutRequest { amount: 70.0 }),
    )
    .await;
    assert!(matches!(result, Err(AppError::BudgetExceeded(_))));

    // the failed payout left no trace
    let (spent, status): (f64, String) =
        sqlx::query_as("SELECT budget_spent, status FROM programs WHERE id = ?")
            .bind(program.to_string())
            .fetch_one(&state.pool)
            .await?;
    assert_eq!(spent, 40.0);
    assert_eq!(status, "active");

    let report_status: String = sqlx::query_scalar("SELECT status FROM reports WHERE id = ?")
        .bind(second.to_string())
        .fetch_one(&state.pool)
        .await?;
    assert_eq!(report_status, "ready_for_payout");

    Ok(())
}

#[tokio::test]
async fn exact_exhaustion_pauses_and_alerts_all_thresholds() -> anyhow::Result<()> {
    let (_dir, base) = common::setup().await?;
    let notifier = Arc::new(RecordingNotifier::default());
    let state = AppState::with_notifier(
        base.pool.clone(),
        triagehub::jwt::JwtConfig {
            secret: Arc::new(b"test-secret".to_vec()),
            exp_hours: 24,
        },
        notifier.clone(),
    );
    let (company, program, report) = setup_payable(&state, Some(100.0)).await?;

    let auth = AuthUser { account_id: company };
    let Json(paid) = reports::payout_report(
        State(state.clone()),
        auth,
        HeaderMap::new(),
        Path(report),
        Json(PayoutRequest { amount: 100.0 }),
    )
    .await?;

    assert_eq!(paid.status, ReportStatus::Paid);
    assert!(paid.resolved_at.is_some());

    let (spent, level, status): (f64, i64, String) = sqlx::query_as(
        "SELECT budget_spent, budget_alert_level, status FROM programs WHERE id = ?",
    )
    .bind(program.to_string())
    .fetch_one(&state.pool)
    .await?;
    assert_eq!(spent, 100.0);
    assert_eq!(level, 100);
    assert_eq!(status, "paused");

    assert_eq!(thresholds(&notifier), vec![75, 90, 100]);
    assert_eq!(common::audit_count(&state.pool, report, "BOUNTY_PAID").await?, 1);

    Ok(())
}

#[tokio::test]
async fn thresholds_alert_once_across_payouts() -> anyhow::Result<()> {
    let (_dir, base) = common::setup().await?;
    let notifier = Arc::new(RecordingNotifier::default());
    let state = AppState::with_notifier(
        base.pool.clone(),
        triagehub::jwt::JwtConfig {
            secret: Arc::new(b"test-secret".to_vec()),
            exp_hours: 24,
        },
        notifier.clone(),
    );
    let (company, program, report) = setup_payable(&state, Some(100.0)).await?;

    let auth = AuthUser { account_id: company };
    reports::payout_report(
        State(state.clone()),
        auth.clone(),
        HeaderMap::new(),
        Path(report),
        Json(PayoutRequest { amount: 80.0 }),
    )
    .await?;
    assert_eq!(thresholds(&notifier), vec![75]);

    let researcher = common::create_account(&state.pool, "researcher", None).await?;
    let second = common::create_report(
        &state.pool,
        program,
        researcher,
        "ready_for_payout",
        Some(chrono::Utc::now()),
    )
    .await?;

    reports::payout_report(
        State(state.clone()),
        auth,
        HeaderMap::new(),
        Path(second),
        Json(PayoutRequest { amount: 15.0 }),
    )
    .await?;

    // 75 does not repeat; only 90 is newly crossed
    assert_eq!(thresholds(&notifier), vec![75, 90]);

    Ok(())
}

#[tokio::test]
async fn payout_requires_payable_status() -> anyhow::Result<()> {
    let (_dir, state) = common::setup().await?;
    let pool = state.pool.clone();

    let company = common::create_account(&pool, "company_admin", None).await?;
    let researcher = common::create_account(&pool, "researcher", None).await?;
    let program = common::create_program(&pool, company, Some(100.0)).await?;
    let report =
        common::create_report(&pool, program, researcher, "triaging", Some(chrono::Utc::now())).await?;

    let auth = AuthUser { account_id: company };
    let result = reports::payout_report(
        State(state.clone()),
        auth,
        HeaderMap::new(),
        Path(report),
        Json(PayoutRequest { amount: 10.0 }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));

    Ok(())
}
