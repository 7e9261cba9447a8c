//! Permission catalog and custom role management.
//!
//! A custom role's permission set is homogeneous in the category implied by
//! the owner's base role; updates replace the whole set inside one
//! transaction. All modifications are written to the audit trail.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::audit::{self, AuditEntry, RequestContext};
use crate::authz::{self, load_principal, AccountRole, PermissionCategory, Principal};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::rbac::{
    CustomRole, CustomRoleCreateRequest, CustomRoleUpdateRequest, CustomRoleWithPermissions,
    DbCustomRole, DbPermission, Permission, PermissionCreateRequest,
};
use crate::utils::utc_now;

fn roles_key(role: AccountRole) -> &'static str {
    match role {
        AccountRole::Admin | AccountRole::SuperAdmin | AccountRole::Triager => {
            authz::permissions::ADMIN_ROLES
        }
        AccountRole::CompanyAdmin => authz::permissions::COMPANY_ROLES,
        AccountRole::Researcher => authz::permissions::RESEARCHER_ROLES,
    }
}

// =============================================================================
// PERMISSION CATALOG
// =============================================================================

#[utoipa::path(
    get,
    path = "/rbac/permissions",
    tag = "RBAC",
    responses((status = 200, description = "Permission catalog", body = Vec<Permission>)),
    security(("bearerAuth" = []))
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> AppResult<Json<Vec<Permission>>> {
    let rows = sqlx::query_as::<_, DbPermission>(
        "SELECT id, key, name, category, created_at FROM permissions ORDER BY key",
    )
    .fetch_all(&state.pool)
    .await?;

    let permissions = rows.into_iter().map(Permission::try_from).collect::<Result<_, _>>()?;
    Ok(Json(permissions))
}

#[utoipa::path(
    post,
    path = "/rbac/permissions",
    tag = "RBAC",
    request_body = PermissionCreateRequest,
    responses(
        (status = 201, description = "Permission created", body = Permission),
        (status = 409, description = "Permission key already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<PermissionCreateRequest>,
) -> AppResult<(StatusCode, Json<Permission>)> {
    let principal = load_principal(&state.pool, auth.account_id).await?;
    authz::require(&principal, authz::permissions::ADMIN_PERMISSIONS)?;

    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO permissions (id, key, name, category, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&payload.key)
    .bind(&payload.name)
    .bind(payload.category.as_str())
    .bind(now)
    .execute(&state.pool)
    .await
    .map_err(|err| match err {
        sqlx::Error::Database(db) if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) => {
            AppError::conflict("permission key already exists")
        }
        other => other.into(),
    })?;

    let permission = Permission {
        id,
        key: payload.key,
        name: payload.name,
        category: payload.category,
        created_at: now,
    };

    let ctx = RequestContext::from_headers(&headers);
    audit::record(
        &state.pool,
        &AuditEntry::new("PERMISSION_CREATED")
            .actor(auth.account_id)
            .details(permission.key.clone())
            .ip(ctx.ip),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(permission)))
}

/// Grantable permission catalog. Triage keys are absent on purpose: triagers
/// resolve by namespace only and never own custom roles.
const SEED_CATALOG: [(&str, &str, PermissionCategory); 13] = [
    (authz::permissions::ADMIN_USERS, "Manage platform accounts", PermissionCategory::Admin),
    (authz::permissions::ADMIN_PROGRAMS, "Manage all programs", PermissionCategory::Admin),
    (authz::permissions::ADMIN_PERMISSIONS, "Manage the permission catalog", PermissionCategory::Admin),
    (authz::permissions::ADMIN_ROLES, "Manage custom roles", PermissionCategory::Admin),
    (authz::permissions::COMPANY_PROGRAMS, "Manage company programs", PermissionCategory::Company),
    (authz::permissions::COMPANY_REPORTS, "Handle company reports", PermissionCategory::Company),
    (authz::permissions::COMPANY_PAYMENTS, "Pay bounties", PermissionCategory::Company),
    (authz::permissions::COMPANY_MEMBERS, "Manage company members", PermissionCategory::Company),
    (authz::permissions::COMPANY_ROLES, "Manage company custom roles", PermissionCategory::Company),
    (authz::permissions::RESEARCHER_REPORTS, "Write and submit reports", PermissionCategory::Researcher),
    (authz::permissions::RESEARCHER_PROGRAMS, "Browse programs", PermissionCategory::Researcher),
    (authz::permissions::RESEARCHER_MEMBERS, "Manage team members", PermissionCategory::Researcher),
    (authz::permissions::RESEARCHER_ROLES, "Manage team custom roles", PermissionCategory::Researcher),
];

#[utoipa::path(
    post,
    path = "/rbac/permissions/seed",
    tag = "RBAC",
    responses((status = 200, description = "Catalog seeded (idempotent)", body = Vec<Permission>)),
    security(("bearerAuth" = []))
)]
pub async fn seed_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Permission>>> {
    let principal = load_principal(&state.pool, auth.account_id).await?;
    authz::require(&principal, authz::permissions::ADMIN_PERMISSIONS)?;

    let now = utc_now();
    for (key, name, category) in SEED_CATALOG {
        sqlx::query(
            "INSERT OR IGNORE INTO permissions (id, key, name, category, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(key)
        .bind(name)
        .bind(category.as_str())
        .bind(now)
        .execute(&state.pool)
        .await?;
    }

    let rows = sqlx::query_as::<_, DbPermission>(
        "SELECT id, key, name, category, created_at FROM permissions ORDER BY key",
    )
    .fetch_all(&state.pool)
    .await?;

    let permissions = rows.into_iter().map(Permission::try_from).collect::<Result<_, _>>()?;
    Ok(Json(permissions))
}

// =============================================================================
// CUSTOM ROLES
// =============================================================================

#[utoipa::path(
    get,
    path = "/rbac/roles",
    tag = "RBAC",
    responses((status = 200, description = "Custom roles owned by the caller", body = Vec<CustomRole>)),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<CustomRole>>> {
    let rows = sqlx::query_as::<_, DbCustomRole>(
        "SELECT id, owner_id, name, description, created_at, updated_at FROM custom_roles WHERE owner_id = ? ORDER BY name",
    )
    .bind(auth.account_id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let roles = rows.into_iter().map(CustomRole::try_from).collect::<Result<_, _>>()?;
    Ok(Json(roles))
}

#[utoipa::path(
    post,
    path = "/rbac/roles",
    tag = "RBAC",
    request_body = CustomRoleCreateRequest,
    responses(
        (status = 201, description = "Custom role created", body = CustomRoleWithPermissions),
        (status = 403, description = "Permission outside the caller's category")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<CustomRoleCreateRequest>,
) -> AppResult<(StatusCode, Json<CustomRoleWithPermissions>)> {
    let principal = load_principal(&state.pool, auth.account_id).await?;
    authz::require(&principal, roles_key(principal.role))?;
    if !principal.is_root() {
        return Err(AppError::forbidden("only root accounts can own custom roles"));
    }

    let category = owner_category(&principal)?;
    validate_permission_categories(&state.pool, &payload.permission_ids, category).await?;

    let id = Uuid::new_v4();
    let now = utc_now();

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO custom_roles (id, owner_id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(auth.account_id.to_string())
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for permission_id in &payload.permission_ids {
        sqlx::query(
            "INSERT INTO custom_role_permissions (role_id, permission_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(permission_id.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let ctx = RequestContext::from_headers(&headers);
    audit::record(
        &state.pool,
        &AuditEntry::new("CUSTOM_ROLE_CREATED")
            .actor(auth.account_id)
            .details(format!("role {id} ({})", payload.name))
            .ip(ctx.ip),
    )
    .await?;

    let role = fetch_role_with_permissions(&state.pool, id).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/rbac/roles/{role_id}",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Custom role id")),
    responses(
        (status = 200, description = "Role with its permission set", body = CustomRoleWithPermissions),
        (status = 404, description = "Role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(role_id): Path<Uuid>,
) -> AppResult<Json<CustomRoleWithPermissions>> {
    let role = fetch_role_with_permissions(&state.pool, role_id).await?;
    let principal = load_principal(&state.pool, auth.account_id).await?;
    if role.role.owner_id != auth.account_id && !principal.is_super_admin() {
        return Err(AppError::not_found("custom role not found"));
    }
    Ok(Json(role))
}

#[utoipa::path(
    put,
    path = "/rbac/roles/{role_id}",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Custom role id")),
    request_body = CustomRoleUpdateRequest,
    responses(
        (status = 200, description = "Role updated, permission set replaced", body = CustomRoleWithPermissions),
        (status = 403, description = "Permission outside the caller's category"),
        (status = 404, description = "Role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(role_id): Path<Uuid>,
    Json(payload): Json<CustomRoleUpdateRequest>,
) -> AppResult<Json<CustomRoleWithPermissions>> {
    let principal = load_principal(&state.pool, auth.account_id).await?;
    authz::require(&principal, roles_key(principal.role))?;

    let existing = fetch_role_with_permissions(&state.pool, role_id).await?;
    if existing.role.owner_id != auth.account_id && !principal.is_super_admin() {
        return Err(AppError::not_found("custom role not found"));
    }

    let category = owner_category(&principal)?;
    validate_permission_categories(&state.pool, &payload.permission_ids, category).await?;

    let now = utc_now();
    let name = payload.name.unwrap_or(existing.role.name);
    let description = payload.description.unwrap_or(existing.role.description);

    // full replacement: delete the old association set, insert the new one, in
    // a single transaction so no partial set is ever visible
    let mut tx = state.pool.begin().await?;

    sqlx::query("UPDATE custom_roles SET name = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(&description)
        .bind(now)
        .bind(role_id.to_string())
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM custom_role_permissions WHERE role_id = ?")
        .bind(role_id.to_string())
        .execute(&mut *tx)
        .await?;

    for permission_id in &payload.permission_ids {
        sqlx::query(
            "INSERT INTO custom_role_permissions (role_id, permission_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(role_id.to_string())
        .bind(permission_id.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let ctx = RequestContext::from_headers(&headers);
    audit::record(
        &state.pool,
        &AuditEntry::new("CUSTOM_ROLE_UPDATED")
            .actor(auth.account_id)
            .details(format!("role {role_id}, {} permissions", payload.permission_ids.len()))
            .ip(ctx.ip),
    )
    .await?;

    let role = fetch_role_with_permissions(&state.pool, role_id).await?;
    Ok(Json(role))
}

#[utoipa::path(
    delete,
    path = "/rbac/roles/{role_id}",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Custom role id")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 404, description = "Role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(role_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let principal = load_principal(&state.pool, auth.account_id).await?;
    authz::require(&principal, roles_key(principal.role))?;

    let existing = fetch_role_with_permissions(&state.pool, role_id).await?;
    if existing.role.owner_id != auth.account_id && !principal.is_super_admin() {
        return Err(AppError::not_found("custom role not found"));
    }

    let mut tx = state.pool.begin().await?;

    // un-assign from any sub-accounts so their base-role fallback resumes
    sqlx::query("UPDATE accounts SET custom_role_id = NULL WHERE custom_role_id = ?")
        .bind(role_id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM custom_role_permissions WHERE role_id = ?")
        .bind(role_id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM custom_roles WHERE id = ?")
        .bind(role_id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    audit::record(
        &state.pool,
        &AuditEntry::new("CUSTOM_ROLE_DELETED")
            .actor(auth.account_id)
            .details(format!("role {role_id}")),
    )
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// HELPERS
// =============================================================================

fn owner_category(principal: &Principal) -> AppResult<PermissionCategory> {
    PermissionCategory::for_owner(principal.role).ok_or_else(|| {
        AppError::category_mismatch(format!(
            "role {} cannot own custom roles",
            principal.role.as_str()
        ))
    })
}

/// Every permission id must resolve and carry the owner's category; otherwise
/// the whole request is rejected with zero rows written.
async fn validate_permission_categories(
    pool: &SqlitePool,
    permission_ids: &[Uuid],
    category: PermissionCategory,
) -> AppResult<()> {
    for permission_id in permission_ids {
        let found: Option<String> = sqlx::query_scalar("SELECT category FROM permissions WHERE id = ?")
            .bind(permission_id.to_string())
            .fetch_optional(pool)
            .await?;

        let found = found.ok_or_else(|| AppError::not_found(format!("permission {permission_id} not found")))?;
        if PermissionCategory::parse(&found)? != category {
            return Err(AppError::category_mismatch(format!(
                "permission {permission_id} is {found}, expected {}",
                category.as_str()
            )));
        }
    }

    Ok(())
}

async fn fetch_role_with_permissions(
    pool: &SqlitePool,
    role_id: Uuid,
) -> AppResult<CustomRoleWithPermissions> {
    let role = sqlx::query_as::<_, DbCustomRole>(
        "SELECT id, owner_id, name, description, created_at, updated_at FROM custom_roles WHERE id = ?",
    )
    .bind(role_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("custom role not found"))?;

    let permission_rows = sqlx::query_as::<_, DbPermission>(
        r#"
        SELECT p.id, p.key, p.name, p.category, p.created_at
        FROM permissions p
        INNER JOIN custom_role_permissions crp ON p.id = crp.permission_id
        WHERE crp.role_id = ?
        ORDER BY p.key
        "#,
    )
    .bind(role_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(CustomRoleWithPermissions {
        role: role.try_into()?,
        permissions: permission_rows
            .into_iter()
            .map(Permission::try_from)
            .collect::<Result<_, _>>()?,
    })
}
