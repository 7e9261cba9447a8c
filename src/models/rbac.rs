use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::PermissionCategory;
use crate::errors::AppError;

// =============================================================================
// PERMISSION CATALOG
// =============================================================================

/// Immutable catalog entry; keys are namespaced (`admin:`, `company:`,
/// `researcher:`, `triage:`).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    pub id: Uuid,
    pub key: String,
    pub name: String,
    pub category: PermissionCategory,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPermission {
    pub id: String,
    pub key: String,
    pub name: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbPermission> for Permission {
    type Error = AppError;

    fn try_from(value: DbPermission) -> Result<Self, Self::Error> {
        Ok(Permission {
            id: Uuid::parse_str(&value.id)
                .map_err(|err| AppError::internal(format!("malformed uuid column: {err}")))?,
            key: value.key,
            name: value.name,
            category: PermissionCategory::parse(&value.category)?,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PermissionCreateRequest {
    #[schema(example = "company:payments")]
    pub key: String,
    #[schema(example = "Approve bounty payouts")]
    pub name: String,
    pub category: PermissionCategory,
}

// =============================================================================
// CUSTOM ROLE
// =============================================================================

/// Owned by exactly one root account; its permission set is homogeneous in
/// category, enforced at create/update time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomRole {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbCustomRole {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbCustomRole> for CustomRole {
    type Error = AppError;

    fn try_from(value: DbCustomRole) -> Result<Self, Self::Error> {
        let parse = |s: &str| {
            Uuid::parse_str(s).map_err(|err| AppError::internal(format!("malformed uuid column: {err}")))
        };
        Ok(CustomRole {
            id: parse(&value.id)?,
            owner_id: parse(&value.owner_id)?,
            name: value.name,
            description: value.description,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CustomRoleCreateRequest {
    #[schema(example = "payments_clerk")]
    pub name: String,
    pub description: Option<String>,
    pub permission_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CustomRoleUpdateRequest {
    pub name: Option<String>,
    /// Absent keeps the stored description, explicit `null` clears it
    #[serde(default, deserialize_with = "crate::utils::nullable_patch")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    /// Full replacement set; the old set is discarded atomically
    pub permission_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CustomRoleWithPermissions {
    #[serde(flatten)]
    pub role: CustomRole,
    pub permissions: Vec<Permission>,
}
