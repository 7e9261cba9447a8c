//! SLA module - deadline math, breach detection, compliance metrics and the
//! periodic breach-notification sweep.
//!
//! Breach status is a derived property, recomputed against the wall clock on
//! every call; only the notification audit trail is persisted.

mod engine;
pub mod sweep;

pub use engine::{
    calculate_deadline, calculate_metrics, is_breached_at, ReportTimes, SlaConfig, SlaMetrics,
    SlaTarget, ESCALATION_GRACE_HOURS,
};
