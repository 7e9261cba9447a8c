//! Notification collaborator. Delivery is fire-and-forget: failures are
//! logged, never propagated into the transaction that triggered them.

use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum Notification {
    SlaBreach {
        report_id: Uuid,
        program_id: Uuid,
        target: &'static str,
    },
    SlaEscalation {
        report_id: Uuid,
        program_id: Uuid,
        target: &'static str,
    },
    BudgetThreshold {
        program_id: Uuid,
        threshold_percent: u8,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Default notifier backed by structured logs. A mail/webhook sender slots in
/// behind the same trait.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> anyhow::Result<()> {
        match notification {
            Notification::SlaBreach { report_id, program_id, target } => {
                tracing::info!(%report_id, %program_id, target, "SLA breach notification");
            }
            Notification::SlaEscalation { report_id, program_id, target } => {
                tracing::info!(%report_id, %program_id, target, "SLA escalation notification");
            }
            Notification::BudgetThreshold { program_id, threshold_percent } => {
                tracing::info!(%program_id, threshold_percent, "budget threshold alert");
            }
        }
        Ok(())
    }
}

/// Deliver without letting a failure bubble into the caller's control flow.
pub async fn send_quietly(notifier: &dyn Notifier, notification: Notification) {
    if let Err(err) = notifier.send(notification).await {
        tracing::error!(error = %err, "notification delivery failed");
    }
}
