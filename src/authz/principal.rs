use std::collections::HashSet;

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::AccountRole;
use crate::errors::{AppError, AppResult};

/// The authenticated account with its resolved permission keys, loaded once
/// per request. `permission_keys` is the set reachable through the assigned
/// custom role; empty when no custom role is assigned.
#[derive(Debug, Clone)]
pub struct Principal {
    pub account_id: Uuid,
    pub role: AccountRole,
    pub parent_id: Option<Uuid>,
    pub custom_role_id: Option<Uuid>,
    pub permission_keys: HashSet<String>,
}

impl Principal {
    pub fn new(account_id: Uuid, role: AccountRole) -> Self {
        Self {
            account_id,
            role,
            parent_id: None,
            custom_role_id: None,
            permission_keys: HashSet::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_custom_role(mut self, custom_role_id: Uuid, keys: impl IntoIterator<Item = String>) -> Self {
        self.custom_role_id = Some(custom_role_id);
        self.permission_keys = keys.into_iter().collect();
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == AccountRole::SuperAdmin
    }
}

/// Load the principal for an account id: role, parent linkage and the
/// permission keys granted through its custom role, if any.
pub async fn load_principal(pool: &SqlitePool, account_id: Uuid) -> AppResult<Principal> {
    let row = sqlx::query(
        "SELECT role, parent_id, custom_role_id, is_active FROM accounts WHERE id = ?",
    )
    .bind(account_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::unauthorized("account not found"))?;

    let active: i64 = row.get("is_active");
    if active == 0 {
        return Err(AppError::unauthorized("account is disabled"));
    }

    let role = AccountRole::parse(row.get::<&str, _>("role"))?;
    let parent_id: Option<String> = row.get("parent_id");
    let custom_role_id: Option<String> = row.get("custom_role_id");

    let parent_id = parent_id
        .map(|s| Uuid::parse_str(&s).map_err(|e| AppError::internal(e.to_string())))
        .transpose()?;
    let custom_role_id = custom_role_id
        .map(|s| Uuid::parse_str(&s).map_err(|e| AppError::internal(e.to_string())))
        .transpose()?;

    let mut permission_keys = HashSet::new();
    if let Some(role_id) = custom_role_id {
        let rows = sqlx::query(
            r#"
            SELECT p.key
            FROM permissions p
            INNER JOIN custom_role_permissions crp ON p.id = crp.permission_id
            WHERE crp.role_id = ?
            "#,
        )
        .bind(role_id.to_string())
        .fetch_all(pool)
        .await?;

        permission_keys = rows.iter().map(|r| r.get::<String, _>("key")).collect();
    }

    Ok(Principal {
        account_id,
        role,
        parent_id,
        custom_role_id,
        permission_keys,
    })
}
