use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::sla::ReportTimes;

/// Report lifecycle. `closed` is the administrative absorbing state; `resolved`
/// and `paid` are terminal for ordinary flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Draft,
    Submitted,
    Triaging,
    Accepted,
    Rejected,
    Duplicate,
    ReadyForPayout,
    Resolved,
    Paid,
    Closed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Draft => "draft",
            ReportStatus::Submitted => "submitted",
            ReportStatus::Triaging => "triaging",
            ReportStatus::Accepted => "accepted",
            ReportStatus::Rejected => "rejected",
            ReportStatus::Duplicate => "duplicate",
            ReportStatus::ReadyForPayout => "ready_for_payout",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Paid => "paid",
            ReportStatus::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "draft" => Ok(ReportStatus::Draft),
            "submitted" => Ok(ReportStatus::Submitted),
            "triaging" => Ok(ReportStatus::Triaging),
            "accepted" => Ok(ReportStatus::Accepted),
            "rejected" => Ok(ReportStatus::Rejected),
            "duplicate" => Ok(ReportStatus::Duplicate),
            "ready_for_payout" => Ok(ReportStatus::ReadyForPayout),
            "resolved" => Ok(ReportStatus::Resolved),
            "paid" => Ok(ReportStatus::Paid),
            "closed" => Ok(ReportStatus::Closed),
            other => Err(AppError::internal(format!("unknown report status: {other}"))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Resolved | ReportStatus::Paid | ReportStatus::Closed)
    }

    /// Allowed forward transitions. `closed` is reachable administratively
    /// from any non-closed state and absorbs everything.
    pub fn can_transition(from: ReportStatus, to: ReportStatus) -> bool {
        use ReportStatus::*;

        if to == Closed {
            return from != Closed;
        }

        matches!(
            (from, to),
            (Draft, Submitted)
                | (Submitted, Triaging)
                | (Triaging, Accepted)
                | (Triaging, Rejected)
                | (Triaging, Duplicate)
                | (Accepted, ReadyForPayout)
                | (Accepted, Resolved)
                | (ReadyForPayout, Paid)
                | (ReadyForPayout, Resolved)
        )
    }
}

/// Stamp lifecycle timestamps for a `from -> to` transition. Each marker is
/// set on first occurrence only and never moved afterwards.
pub fn stamp_transition(
    from: ReportStatus,
    to: ReportStatus,
    times: &mut ReportTimes,
    now: DateTime<Utc>,
) {
    use ReportStatus::*;

    if from == Submitted && to != Submitted && times.first_responded_at.is_none() {
        times.first_responded_at = Some(now);
    }

    if matches!(to, Triaging | Accepted | Rejected | Duplicate | ReadyForPayout)
        && times.triaged_at.is_none()
    {
        times.triaged_at = Some(now);
    }

    if matches!(to, Resolved | Paid) && times.resolved_at.is_none() {
        times.resolved_at = Some(now);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Report {
    pub id: Uuid,
    pub program_id: Uuid,
    pub researcher_id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    pub status: ReportStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub first_responded_at: Option<DateTime<Utc>>,
    pub triaged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    pub fn times(&self) -> ReportTimes {
        ReportTimes {
            submitted_at: self.submitted_at,
            first_responded_at: self.first_responded_at,
            triaged_at: self.triaged_at,
            resolved_at: self.resolved_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbReport {
    pub id: String,
    pub program_id: String,
    pub researcher_id: String,
    pub title: String,
    pub severity: Option<String>,
    pub status: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub first_responded_at: Option<DateTime<Utc>>,
    pub triaged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbReport> for Report {
    type Error = AppError;

    fn try_from(value: DbReport) -> Result<Self, Self::Error> {
        let parse = |s: &str| {
            Uuid::parse_str(s).map_err(|err| AppError::internal(format!("malformed uuid column: {err}")))
        };
        Ok(Report {
            id: parse(&value.id)?,
            program_id: parse(&value.program_id)?,
            researcher_id: parse(&value.researcher_id)?,
            title: value.title,
            severity: value.severity,
            status: ReportStatus::parse(&value.status)?,
            submitted_at: value.submitted_at,
            first_responded_at: value.first_responded_at,
            triaged_at: value.triaged_at,
            resolved_at: value.resolved_at,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReportCreateRequest {
    #[schema(example = "Stored XSS in profile bio")]
    pub title: String,
    pub severity: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReportTransitionRequest {
    pub status: ReportStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PayoutRequest {
    #[schema(example = 500.0)]
    pub amount: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn transition_table() {
        use ReportStatus::*;

        assert!(ReportStatus::can_transition(Draft, Submitted));
        assert!(ReportStatus::can_transition(Submitted, Triaging));
        assert!(ReportStatus::can_transition(Triaging, Accepted));
        assert!(ReportStatus::can_transition(Triaging, Rejected));
        assert!(ReportStatus::can_transition(Triaging, Duplicate));
        assert!(ReportStatus::can_transition(Accepted, ReadyForPayout));
        assert!(ReportStatus::can_transition(ReadyForPayout, Paid));

        assert!(!ReportStatus::can_transition(Draft, Triaging));
        assert!(!ReportStatus::can_transition(Submitted, Paid));
        assert!(!ReportStatus::can_transition(Rejected, Accepted));
        assert!(!ReportStatus::can_transition(Paid, Submitted));

        // closed absorbs everything and is never left
        assert!(ReportStatus::can_transition(Draft, Closed));
        assert!(ReportStatus::can_transition(Paid, Closed));
        assert!(!ReportStatus::can_transition(Closed, Closed));
        assert!(!ReportStatus::can_transition(Closed, Submitted));
    }

    #[test]
    fn terminal_statuses() {
        use ReportStatus::*;

        for status in [Resolved, Paid, Closed] {
            assert!(status.is_terminal());
        }
        for status in [Draft, Submitted, Triaging, Accepted, Rejected, Duplicate, ReadyForPayout] {
            assert!(!status.is_terminal());
        }
    }

    #[test]
    fn leaving_submitted_stamps_first_response_once() {
        let now = Utc::now();
        let mut times = ReportTimes::default();

        stamp_transition(ReportStatus::Submitted, ReportStatus::Triaging, &mut times, now);
        assert_eq!(times.first_responded_at, Some(now));
        assert_eq!(times.triaged_at, Some(now));

        // later transitions never move the markers
        let later = now + Duration::hours(5);
        stamp_transition(ReportStatus::Triaging, ReportStatus::Accepted, &mut times, later);
        assert_eq!(times.first_responded_at, Some(now));
        assert_eq!(times.triaged_at, Some(now));
    }

    #[test]
    fn resolution_states_stamp_resolved_at() {
        let now = Utc::now();
        let mut times = ReportTimes::default();

        stamp_transition(ReportStatus::ReadyForPayout, ReportStatus::Paid, &mut times, now);
        assert_eq!(times.resolved_at, Some(now));

        let later = now + Duration::hours(1);
        stamp_transition(ReportStatus::Paid, ReportStatus::Closed, &mut times, later);
        assert_eq!(times.resolved_at, Some(now));
    }

    #[test]
    fn draft_to_submitted_stamps_nothing() {
        let now = Utc::now();
        let mut times = ReportTimes::default();

        stamp_transition(ReportStatus::Draft, ReportStatus::Submitted, &mut times, now);
        assert_eq!(times.first_responded_at, None);
        assert_eq!(times.triaged_at, None);
        assert_eq!(times.resolved_at, None);
    }
}
