use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProgramStatus {
    Active,
    Paused,
    Closed,
}

impl ProgramStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramStatus::Active => "active",
            ProgramStatus::Paused => "paused",
            ProgramStatus::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "active" => Ok(ProgramStatus::Active),
            "paused" => Ok(ProgramStatus::Paused),
            "closed" => Ok(ProgramStatus::Closed),
            other => Err(AppError::internal(format!("unknown program status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Program {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub status: ProgramStatus,
    /// SLA targets in wall-clock hours; absent means the milestone is untracked
    pub sla_first_response: Option<i64>,
    pub sla_triage: Option<i64>,
    pub sla_resolution: Option<i64>,
    pub budget_total: Option<f64>,
    pub budget_spent: f64,
    /// Highest budget usage threshold already alerted on (0, 75, 90, 100)
    pub budget_alert_level: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbProgram {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub status: String,
    pub sla_first_response: Option<i64>,
    pub sla_triage: Option<i64>,
    pub sla_resolution: Option<i64>,
    pub budget_total: Option<f64>,
    pub budget_spent: f64,
    pub budget_alert_level: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbProgram> for Program {
    type Error = AppError;

    fn try_from(value: DbProgram) -> Result<Self, Self::Error> {
        let parse = |s: &str| {
            Uuid::parse_str(s).map_err(|err| AppError::internal(format!("malformed uuid column: {err}")))
        };
        Ok(Program {
            id: parse(&value.id)?,
            company_id: parse(&value.company_id)?,
            name: value.name,
            status: ProgramStatus::parse(&value.status)?,
            sla_first_response: value.sla_first_response,
            sla_triage: value.sla_triage,
            sla_resolution: value.sla_resolution,
            budget_total: value.budget_total,
            budget_spent: value.budget_spent,
            budget_alert_level: value.budget_alert_level,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProgramCreateRequest {
    #[schema(example = "Acme Web Bounty")]
    pub name: String,
    pub sla_first_response: Option<i64>,
    pub sla_triage: Option<i64>,
    pub sla_resolution: Option<i64>,
    pub budget_total: Option<f64>,
}

/// Partial update. For the nullable fields an absent key keeps the stored
/// value and an explicit `null` clears it (SLA target untracked, budget
/// unbounded).
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProgramUpdateRequest {
    pub name: Option<String>,
    pub status: Option<ProgramStatus>,
    #[serde(default, deserialize_with = "crate::utils::nullable_patch")]
    #[schema(value_type = Option<i64>)]
    pub sla_first_response: Option<Option<i64>>,
    #[serde(default, deserialize_with = "crate::utils::nullable_patch")]
    #[schema(value_type = Option<i64>)]
    pub sla_triage: Option<Option<i64>>,
    #[serde(default, deserialize_with = "crate::utils::nullable_patch")]
    #[schema(value_type = Option<i64>)]
    pub sla_resolution: Option<Option<i64>>,
    #[serde(default, deserialize_with = "crate::utils::nullable_patch")]
    #[schema(value_type = Option<f64>)]
    pub budget_total: Option<Option<f64>>,
}

/// Budget usage alert thresholds, in percent, ascending.
pub const BUDGET_THRESHOLDS: [i64; 3] = [75, 90, 100];

/// Outcome of applying a payout against a program budget.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutOutcome {
    pub new_spent: f64,
    /// Thresholds crossed by this payout that have not been alerted on before
    pub crossed_thresholds: Vec<i64>,
    pub new_alert_level: i64,
    /// True when usage reached 100%: the program auto-pauses
    pub pause_program: bool,
}

/// Pure budget arithmetic for a payout. Rejects amounts that would push spend
/// strictly above the configured total; with no total configured, spend is
/// unbounded and no thresholds apply.
pub fn apply_payout(
    budget_total: Option<f64>,
    budget_spent: f64,
    budget_alert_level: i64,
    amount: f64,
) -> Result<PayoutOutcome, AppError> {
    if amount <= 0.0 {
        return Err(AppError::bad_request("payout amount must be positive"));
    }

    let new_spent = budget_spent + amount;

    let Some(total) = budget_total else {
        return Ok(PayoutOutcome {
            new_spent,
            crossed_thresholds: Vec::new(),
            new_alert_level: budget_alert_level,
            pause_program: false,
        });
    };

    if new_spent > total {
        return Err(AppError::budget_exceeded(format!(
            "payout of {amount} would raise spend to {new_spent} over budget {total}"
        )));
    }

    let usage_percent = new_spent / total * 100.0;
    let crossed_thresholds: Vec<i64> = BUDGET_THRESHOLDS
        .iter()
        .copied()
        .filter(|t| *t > budget_alert_level && usage_percent >= *t as f64)
        .collect();

    let new_alert_level = crossed_thresholds.last().copied().unwrap_or(budget_alert_level);

    Ok(PayoutOutcome {
        new_spent,
        crossed_thresholds,
        new_alert_level,
        pause_program: usage_percent >= 100.0,
    })
}
