use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::AccountRole;
use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: AccountRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_role_id: Option<Uuid>,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbAccount {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub parent_id: Option<String>,
    pub custom_role_id: Option<String>,
    pub is_active: i64,
    pub is_verified: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbAccount> for Account {
    type Error = AppError;

    fn try_from(value: DbAccount) -> Result<Self, Self::Error> {
        Ok(Account {
            id: parse_id(&value.id)?,
            name: value.name,
            email: value.email,
            role: AccountRole::parse(&value.role)?,
            parent_id: value.parent_id.as_deref().map(parse_id).transpose()?,
            custom_role_id: value.custom_role_id.as_deref().map(parse_id).transpose()?,
            is_active: value.is_active != 0,
            is_verified: value.is_verified != 0,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

fn parse_id(value: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(value).map_err(|err| AppError::internal(format!("malformed uuid column: {err}")))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
    /// researcher or company_admin; privileged roles are seeded, not registered
    pub role: AccountRole,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub account: Account,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubAccountCreateRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignCustomRoleRequest {
    /// null clears the assignment, restoring base-role inheritance
    pub custom_role_id: Option<Uuid>,
}
