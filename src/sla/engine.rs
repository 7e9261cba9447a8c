use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Hours past a breached deadline before an escalation notification fires.
pub const ESCALATION_GRACE_HOURS: i64 = 24;

/// The three report lifecycle milestones a program can put a deadline on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaTarget {
    FirstResponse,
    Triage,
    Resolution,
}

impl SlaTarget {
    pub const ALL: [SlaTarget; 3] = [SlaTarget::FirstResponse, SlaTarget::Triage, SlaTarget::Resolution];

    /// Audit action recording that a breach notification went out.
    pub fn breach_action(&self) -> &'static str {
        match self {
            SlaTarget::FirstResponse => "SLA_BREACH_FIRST_RESPONSE",
            SlaTarget::Triage => "SLA_BREACH_TRIAGE",
            SlaTarget::Resolution => "SLA_BREACH_RESOLUTION",
        }
    }

    /// Audit action recording that an escalation notification went out.
    pub fn escalation_action(&self) -> &'static str {
        match self {
            SlaTarget::FirstResponse => "SLA_ESCALATED_FIRST_RESPONSE",
            SlaTarget::Triage => "SLA_ESCALATED_TRIAGE",
            SlaTarget::Resolution => "SLA_ESCALATED_RESOLUTION",
        }
    }
}

/// A program's SLA targets, in wall-clock hours. `None` means the milestone is
/// not tracked.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlaConfig {
    pub first_response_hours: Option<i64>,
    pub triage_hours: Option<i64>,
    pub resolution_hours: Option<i64>,
}

impl SlaConfig {
    fn target_hours(&self, target: SlaTarget) -> Option<i64> {
        match target {
            SlaTarget::FirstResponse => self.first_response_hours,
            SlaTarget::Triage => self.triage_hours,
            SlaTarget::Resolution => self.resolution_hours,
        }
    }
}

/// A report's lifecycle timestamps. Each is a first-occurrence marker, never
/// cleared or moved earlier once set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportTimes {
    pub submitted_at: Option<DateTime<Utc>>,
    pub first_responded_at: Option<DateTime<Utc>>,
    pub triaged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ReportTimes {
    fn action_time(&self, target: SlaTarget) -> Option<DateTime<Utc>> {
        match target {
            SlaTarget::FirstResponse => self.first_responded_at,
            SlaTarget::Triage => self.triaged_at,
            SlaTarget::Resolution => self.resolved_at,
        }
    }
}

/// Deadline for a milestone: `None` when the target is unset (or zero),
/// otherwise exactly `start + hours` -- wall-clock, no business-hours calendar.
pub fn calculate_deadline(start: DateTime<Utc>, target_hours: Option<i64>) -> Option<DateTime<Utc>> {
    match target_hours {
        None | Some(0) => None,
        Some(hours) => Some(start + Duration::hours(hours)),
    }
}

/// Whether the milestone's deadline has passed without (or before) the action
/// being recorded, evaluated at `now`.
///
/// While the action is pending this compares the deadline against `now`, so a
/// report can flip to breached purely by elapsed time. Once breached it stays
/// breached: a late action timestamp is compared against the same fixed
/// deadline.
pub fn is_breached_at(sla: &SlaConfig, times: &ReportTimes, target: SlaTarget, now: DateTime<Utc>) -> bool {
    let Some(submitted_at) = times.submitted_at else {
        return false;
    };
    let Some(deadline) = calculate_deadline(submitted_at, sla.target_hours(target)) else {
        return false;
    };

    times.action_time(target).unwrap_or(now) > deadline
}

/// Aggregate first-response compliance rollup for dashboards.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SlaMetrics {
    pub total_sla_eligible: i64,
    pub breached_count: i64,
    /// Percentage, rounded to the nearest integer. 100 when nothing is eligible.
    pub compliance_rate: i64,
    /// Mean hours from submission to first response over responded reports,
    /// rounded to 2 decimals. 0 when no report has responded yet.
    pub avg_response_time: f64,
}

/// Compute the rollup over reports. A report is eligible when its program
/// tracks a first-response SLA; the response-time average runs over reports
/// that have actually responded, regardless of eligibility count.
pub fn calculate_metrics(reports: &[(SlaConfig, ReportTimes)], now: DateTime<Utc>) -> SlaMetrics {
    let mut eligible = 0i64;
    let mut breached = 0i64;
    let mut responded = 0i64;
    let mut response_hours_sum = 0f64;

    for (sla, times) in reports {
        if sla.first_response_hours.is_some() {
            eligible += 1;
            if is_breached_at(sla, times, SlaTarget::FirstResponse, now) {
                breached += 1;
            }
        }

        if let (Some(submitted), Some(responded_at)) = (times.submitted_at, times.first_responded_at) {
            responded += 1;
            response_hours_sum += (responded_at - submitted).num_seconds() as f64 / 3600.0;
        }
    }

    let compliance_rate = if eligible == 0 {
        100
    } else {
        (100.0 * (eligible - breached) as f64 / eligible as f64).round() as i64
    };

    let avg_response_time = if responded == 0 {
        0.0
    } else {
        (response_hours_sum / responded as f64 * 100.0).round() / 100.0
    };

    SlaMetrics {
        total_sla_eligible: eligible,
        breached_count: breached,
        compliance_rate,
        avg_response_time,
    }
}
