//! Append-only audit trail.
//!
//! Doubles as the idempotency guard for SLA notifications: a unique index on
//! `(report_id, action)` for `SLA_*` actions makes "insert the audit row" the
//! single arbiter of whether a notification may be sent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::AppResult;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub action: String,
    pub user_id: Option<Uuid>,
    pub report_id: Option<Uuid>,
    pub details: Option<String>,
    pub ip_address: Option<String>,
}

impl AuditEntry {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            user_id: None,
            report_id: None,
            details: None,
            ip_address: None,
        }
    }

    pub fn actor(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn report(mut self, report_id: Uuid) -> Self {
        self.report_id = Some(report_id);
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn ip(mut self, ip: Option<String>) -> Self {
        self.ip_address = ip;
        self
    }
}

/// Append an entry to the trail.
pub async fn record(pool: &SqlitePool, entry: &AuditEntry) -> AppResult<()> {
    insert(pool, entry).await?;
    Ok(())
}

/// Append an entry guarded by the `(report_id, action)` uniqueness rule.
/// Returns `false` when an identical entry already exists -- the caller must
/// then skip the side effect the entry guards.
pub async fn record_once(pool: &SqlitePool, entry: &AuditEntry) -> AppResult<bool> {
    match insert(pool, entry).await {
        Ok(()) => Ok(true),
        Err(sqlx::Error::Database(db)) if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) => {
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

/// Whether an entry for `(report_id, action)` is already on the trail.
pub async fn exists(pool: &SqlitePool, report_id: Uuid, action: &str) -> AppResult<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM audit_log WHERE report_id = ? AND action = ?")
            .bind(report_id.to_string())
            .bind(action)
            .fetch_one(pool)
            .await?;

    Ok(count > 0)
}

async fn insert(pool: &SqlitePool, entry: &AuditEntry) -> Result<(), sqlx::Error> {
    let now: DateTime<Utc> = Utc::now();

    sqlx::query(
        "INSERT INTO audit_log (id, action, user_id, report_id, details, ip_address, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&entry.action)
    .bind(entry.user_id.map(|u| u.to_string()))
    .bind(entry.report_id.map(|u| u.to_string()))
    .bind(&entry.details)
    .bind(&entry.ip_address)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Request context captured alongside privileged mutations (IP, User-Agent).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Extract context from Axum request headers
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}
