//! Periodic SLA breach/escalation sweep.
//!
//! Timer-driven background task. Each tick walks open reports, derives breach
//! status and sends at most one breach and one escalation notification per
//! (report, target), guarded by the audit trail's uniqueness rule. Delivery is
//! at-least-once: the audit row is written only after a successful send, so a
//! failed delivery is retried on the next tick, and under concurrent sweeps
//! the unique audit index keeps the trail to a single row.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::engine::{
    calculate_deadline, is_breached_at, ReportTimes, SlaConfig, SlaTarget, ESCALATION_GRACE_HOURS,
};
use crate::audit::{self, AuditEntry};
use crate::errors::{AppError, AppResult};
use crate::notify::{Notification, Notifier};

struct OpenReport {
    report_id: Uuid,
    program_id: Uuid,
    sla: SlaConfig,
    times: ReportTimes,
}

/// Spawned from `main`; ticks forever.
pub async fn run(pool: SqlitePool, notifier: Arc<dyn Notifier>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    tracing::info!(interval_secs, "SLA sweep started");

    loop {
        interval.tick().await;
        match run_once(&pool, notifier.as_ref()).await {
            Ok(sent) if sent > 0 => tracing::info!(sent, "SLA sweep sent notifications"),
            Ok(_) => {}
            Err(err) => tracing::error!(error = %err, "SLA sweep failed"),
        }
    }
}

/// One sweep pass. Returns the number of notifications sent.
pub async fn run_once(pool: &SqlitePool, notifier: &dyn Notifier) -> AppResult<u32> {
    let now = Utc::now();
    let mut sent = 0u32;

    for report in load_open_reports(pool).await? {
        for target in SlaTarget::ALL {
            if !is_breached_at(&report.sla, &report.times, target, now) {
                continue;
            }

            if notify_once(pool, notifier, &report, target, Stage::Breach).await? {
                sent += 1;
            }

            // submitted_at and the deadline are both present when breached
            let deadline = report
                .times
                .submitted_at
                .and_then(|s| calculate_deadline(s, target_hours(&report.sla, target)));
            let escalate = matches!(
                deadline,
                Some(d) if now > d + chrono::Duration::hours(ESCALATION_GRACE_HOURS)
            );

            if escalate && notify_once(pool, notifier, &report, target, Stage::Escalation).await? {
                sent += 1;
            }
        }
    }

    Ok(sent)
}

enum Stage {
    Breach,
    Escalation,
}

async fn notify_once(
    pool: &SqlitePool,
    notifier: &dyn Notifier,
    report: &OpenReport,
    target: SlaTarget,
    stage: Stage,
) -> AppResult<bool> {
    let action = match stage {
        Stage::Breach => target.breach_action(),
        Stage::Escalation => target.escalation_action(),
    };

    if audit::exists(pool, report.report_id, action).await? {
        return Ok(false);
    }

    let notification = match stage {
        Stage::Breach => Notification::SlaBreach {
            report_id: report.report_id,
            program_id: report.program_id,
            target: action,
        },
        Stage::Escalation => Notification::SlaEscalation {
            report_id: report.report_id,
            program_id: report.program_id,
            target: action,
        },
    };

    // deliver before recording: a failed send leaves no audit row, so the next
    // tick retries it
    if let Err(err) = notifier.send(notification).await {
        tracing::warn!(error = %err, action, report_id = %report.report_id, "notification failed");
        return Ok(false);
    }

    let entry = AuditEntry::new(action)
        .report(report.report_id)
        .details(format!("program {}", report.program_id));

    // concurrent sweeps may both deliver; the unique index keeps one audit row
    audit::record_once(pool, &entry).await?;

    Ok(true)
}

fn parse_uuid(value: &str) -> AppResult<Uuid> {
    Uuid::parse_str(value).map_err(|err| AppError::internal(format!("malformed uuid column: {err}")))
}

fn target_hours(sla: &SlaConfig, target: SlaTarget) -> Option<i64> {
    match target {
        SlaTarget::FirstResponse => sla.first_response_hours,
        SlaTarget::Triage => sla.triage_hours,
        SlaTarget::Resolution => sla.resolution_hours,
    }
}

async fn load_open_reports(pool: &SqlitePool) -> AppResult<Vec<OpenReport>> {
    let rows = sqlx::query(
        r#"
        SELECT r.id, r.program_id, r.submitted_at, r.first_responded_at, r.triaged_at, r.resolved_at,
               p.sla_first_response, p.sla_triage, p.sla_resolution
        FROM reports r
        INNER JOIN programs p ON p.id = r.program_id
        WHERE r.status NOT IN ('resolved', 'paid', 'closed')
          AND r.submitted_at IS NOT NULL
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut reports = Vec::with_capacity(rows.len());
    for row in rows {
        let report_id = parse_uuid(row.get("id"))?;
        let program_id = parse_uuid(row.get("program_id"))?;

        reports.push(OpenReport {
            report_id,
            program_id,
            sla: SlaConfig {
                first_response_hours: row.get("sla_first_response"),
                triage_hours: row.get("sla_triage"),
                resolution_hours: row.get("sla_resolution"),
            },
            times: ReportTimes {
                submitted_at: row.get::<Option<DateTime<Utc>>, _>("submitted_at"),
                first_responded_at: row.get::<Option<DateTime<Utc>>, _>("first_responded_at"),
                triaged_at: row.get::<Option<DateTime<Utc>>, _>("triaged_at"),
                resolved_at: row.get::<Option<DateTime<Utc>>, _>("resolved_at"),
            },
        });
    }

    Ok(reports)
}
