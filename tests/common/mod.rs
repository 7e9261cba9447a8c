#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

use triagehub::app::AppState;
use triagehub::jwt::JwtConfig;
use triagehub::utils::utc_now;

/// File-backed SQLite with the real schema applied. The TempDir must outlive
/// the pool.
pub async fn setup() -> anyhow::Result<(TempDir, AppState)> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("test.sqlite");
    std::fs::File::create(&db_path)?;

    let pool = SqlitePool::connect(&format!("sqlite://{}", db_path.display())).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let jwt = JwtConfig {
        secret: Arc::new(b"test-secret".to_vec()),
        exp_hours: 24,
    };

    Ok((dir, AppState::new(pool, jwt)))
}

pub async fn create_account(
    pool: &SqlitePool,
    role: &str,
    parent_id: Option<Uuid>,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO accounts (id, name, email, password_hash, role, parent_id, is_active, is_verified, created_at, updated_at) VALUES (?, ?, ?, 'x', ?, ?, 1, 0, ?, ?)",
    )
    .bind(id.to_string())
    .bind(format!("account-{id}"))
    .bind(format!("{id}@example.com"))
    .bind(role)
    .bind(parent_id.map(|p| p.to_string()))
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn create_program(
    pool: &SqlitePool,
    company_id: Uuid,
    budget_total: Option<f64>,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO programs (id, company_id, name, status, budget_total, budget_spent, budget_alert_level, created_at, updated_at) VALUES (?, ?, 'P', 'active', ?, 0, 0, ?, ?)",
    )
    .bind(id.to_string())
    .bind(company_id.to_string())
    .bind(budget_total)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn set_program_sla(
    pool: &SqlitePool,
    program_id: Uuid,
    first_response: Option<i64>,
    triage: Option<i64>,
    resolution: Option<i64>,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE programs SET sla_first_response = ?, sla_triage = ?, sla_resolution = ? WHERE id = ?",
    )
    .bind(first_response)
    .bind(triage)
    .bind(resolution)
    .bind(program_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_report(
    pool: &SqlitePool,
    program_id: Uuid,
    researcher_id: Uuid,
    status: &str,
    submitted_at: Option<DateTime<Utc>>,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO reports (id, program_id, researcher_id, title, status, submitted_at, created_at, updated_at) VALUES (?, ?, ?, 'R', ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(program_id.to_string())
    .bind(researcher_id.to_string())
    .bind(status)
    .bind(submitted_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn create_permission(
    pool: &SqlitePool,
    key: &str,
    category: &str,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();

    sqlx::query("INSERT INTO permissions (id, key, name, category, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(key)
        .bind(key)
        .bind(category)
        .bind(utc_now())
        .execute(pool)
        .await?;

    Ok(id)
}

pub async fn audit_count(pool: &SqlitePool, report_id: Uuid, action: &str) -> anyhow::Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM audit_log WHERE report_id = ? AND action = ?")
            .bind(report_id.to_string())
            .bind(action)
            .fetch_one(pool)
            .await?;
    Ok(count)
}
