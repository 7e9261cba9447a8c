use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt; // for `oneshot`

use triagehub::create_app;

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }

    let req = builder.body(match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    })?;

    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

#[tokio::test]
async fn full_api_flow() -> Result<()> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;

    // company registers and opens a program
    let (status, company) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "name": "Acme",
            "email": "acme@example.com",
            "password": "password123",
            "role": "company_admin"
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let company_token = company["token"].as_str().context("missing token")?.to_string();

    let (status, program) = send(
        &app,
        "POST",
        "/programs",
        Some(&company_token),
        Some(json!({
            "name": "Acme Web",
            "sla_first_response": 24,
            "budget_total": 1000.0
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let program_id = program["id"].as_str().context("missing program id")?.to_string();

    // researcher registers, drafts and submits a report
    let (status, researcher) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "name": "Ada",
            "email": "ada@example.com",
            "password": "password123",
            "role": "researcher"
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let researcher_token = researcher["token"].as_str().context("missing token")?.to_string();

    let (status, report) = send(
        &app,
        "POST",
        &format!("/programs/{program_id}/reports"),
        Some(&researcher_token),
        Some(json!({"title": "Stored XSS", "severity": "high"})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(report["status"], "draft");
    let report_id = report["id"].as_str().context("missing report id")?.to_string();

    let (status, submitted) = send(
        &app,
        "POST",
        &format!("/reports/{report_id}/submit"),
        Some(&researcher_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(submitted["status"], "submitted");

    // the company triages it through to payout
    for next in ["triaging", "accepted", "ready_for_payout"] {
        let (status, body) = send(
            &app,
            "POST",
            &format!("/reports/{report_id}/transition"),
            Some(&company_token),
            Some(json!({"status": next})),
        )
        .await?;
        assert_eq!(status, StatusCode::OK, "transition to {next}: {body}");
        assert_eq!(body["status"], next);
    }

    let (status, paid) = send(
        &app,
        "POST",
        &format!("/reports/{report_id}/payout"),
        Some(&company_token),
        Some(json!({"amount": 800.0})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"], "paid");
    assert!(paid["resolved_at"].is_string());

    // 800 of 1000 crossed the 75% threshold
    let level: i64 = sqlx::query_scalar("SELECT budget_alert_level FROM programs WHERE id = ?")
        .bind(&program_id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(level, 75);

    let (status, metrics) = send(
        &app,
        "GET",
        "/dashboard/sla-metrics",
        Some(&company_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["total_sla_eligible"], 1);
    assert_eq!(metrics["breached_count"], 0);

    // a researcher gets no metrics, and no token no entry
    let (status, _) = send(&app, "GET", "/dashboard/sla-metrics", Some(&researcher_token), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "GET", &format!("/reports/{report_id}"), None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}
