//! Authorization module - permission resolver for the marketplace roles.
//!
//! Three layers of grants, resolved per request:
//! - super admin bypass
//! - custom-role permission sets (supersede base-role grants entirely)
//! - base-role namespace prefix for root accounts and employees without a
//!   custom role

mod evaluator;
mod principal;

pub use evaluator::{DefaultPolicyEvaluator, PolicyEvaluator};
pub use principal::{load_principal, Principal};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::{AppError, AppResult};

/// Platform account roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Researcher,
    CompanyAdmin,
    Triager,
    Admin,
    SuperAdmin,
}

impl AccountRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountRole::Researcher => "researcher",
            AccountRole::CompanyAdmin => "company_admin",
            AccountRole::Triager => "triager",
            AccountRole::Admin => "admin",
            AccountRole::SuperAdmin => "super_admin",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "researcher" => Ok(AccountRole::Researcher),
            "company_admin" => Ok(AccountRole::CompanyAdmin),
            "triager" => Ok(AccountRole::Triager),
            "admin" => Ok(AccountRole::Admin),
            "super_admin" => Ok(AccountRole::SuperAdmin),
            other => Err(AppError::internal(format!("unknown account role: {other}"))),
        }
    }

    /// Permission key namespace implied by the base role. Super admins have no
    /// namespace of their own; they bypass permission checks entirely.
    pub fn namespace(&self) -> Option<&'static str> {
        match self {
            AccountRole::Researcher => Some("researcher:"),
            AccountRole::CompanyAdmin => Some("company:"),
            AccountRole::Triager => Some("triage:"),
            AccountRole::Admin => Some("admin:"),
            AccountRole::SuperAdmin => None,
        }
    }
}

/// Permission catalog categories. A custom role's permission set is always
/// homogeneous in category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PermissionCategory {
    Admin,
    Company,
    Researcher,
}

impl PermissionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionCategory::Admin => "admin",
            PermissionCategory::Company => "company",
            PermissionCategory::Researcher => "researcher",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "admin" => Ok(PermissionCategory::Admin),
            "company" => Ok(PermissionCategory::Company),
            "researcher" => Ok(PermissionCategory::Researcher),
            other => Err(AppError::internal(format!("unknown permission category: {other}"))),
        }
    }

    /// Category of permissions a root account of the given role may grant to
    /// its custom roles. Triagers and super admins own no custom roles.
    pub fn for_owner(role: AccountRole) -> Option<Self> {
        match role {
            AccountRole::Admin => Some(PermissionCategory::Admin),
            AccountRole::CompanyAdmin => Some(PermissionCategory::Company),
            AccountRole::Researcher => Some(PermissionCategory::Researcher),
            AccountRole::Triager | AccountRole::SuperAdmin => None,
        }
    }
}

/// Well-known permission keys.
pub mod permissions {
    // Admin namespace
    pub const ADMIN_USERS: &str = "admin:users";
    pub const ADMIN_PROGRAMS: &str = "admin:programs";
    pub const ADMIN_PERMISSIONS: &str = "admin:permissions";
    pub const ADMIN_ROLES: &str = "admin:roles";

    // Company namespace
    pub const COMPANY_PROGRAMS: &str = "company:programs";
    pub const COMPANY_REPORTS: &str = "company:reports";
    pub const COMPANY_PAYMENTS: &str = "company:payments";
    pub const COMPANY_MEMBERS: &str = "company:members";
    pub const COMPANY_ROLES: &str = "company:roles";

    // Researcher namespace
    pub const RESEARCHER_REPORTS: &str = "researcher:reports";
    pub const RESEARCHER_PROGRAMS: &str = "researcher:programs";
    pub const RESEARCHER_MEMBERS: &str = "researcher:members";
    pub const RESEARCHER_ROLES: &str = "researcher:roles";

    // Triage namespace
    pub const TRIAGE_REPORTS: &str = "triage:reports";
    pub const TRIAGE_QUEUE: &str = "triage:queue";
    pub const TRIAGE_MEMBERS: &str = "triage:members";
}

/// Evaluate the default policy for `principal` and fail with 403 on denial.
pub fn require(principal: &Principal, permission_key: &str) -> AppResult<()> {
    if DefaultPolicyEvaluator::new().can(principal, permission_key) {
        Ok(())
    } else {
        Err(AppError::forbidden(format!("missing permission {permission_key}")))
    }
}
