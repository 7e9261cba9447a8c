//! Sub-account (employee) management: creation under a root account, custom
//! role assignment, soft-disable.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::audit::{self, AuditEntry, RequestContext};
use crate::authz::{self, load_principal, AccountRole};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::account::{Account, AssignCustomRoleRequest, SubAccountCreateRequest};
use crate::routes::auth::{ensure_email_available, fetch_account_by_id};
use crate::utils::{hash_password, utc_now};

fn members_key(role: AccountRole) -> &'static str {
    match role {
        AccountRole::Admin | AccountRole::SuperAdmin => authz::permissions::ADMIN_USERS,
        AccountRole::CompanyAdmin => authz::permissions::COMPANY_MEMBERS,
        AccountRole::Researcher => authz::permissions::RESEARCHER_MEMBERS,
        AccountRole::Triager => authz::permissions::TRIAGE_MEMBERS,
    }
}

#[utoipa::path(
    post,
    path = "/accounts/sub",
    tag = "Accounts",
    request_body = SubAccountCreateRequest,
    responses(
        (status = 201, description = "Sub-account created", body = Account),
        (status = 403, description = "Caller is not a root account"),
        (status = 409, description = "Email already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_sub_account(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<SubAccountCreateRequest>,
) -> AppResult<(StatusCode, Json<Account>)> {
    let principal = load_principal(&state.pool, auth.account_id).await?;
    if !principal.is_root() {
        return Err(AppError::forbidden("only root accounts can create sub-accounts"));
    }
    authz::require(&principal, members_key(principal.role))?;

    ensure_email_available(&state.pool, &payload.email).await?;

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let account_id = Uuid::new_v4();

    // a sub-account inherits the parent's base role; a custom role may narrow
    // it later
    sqlx::query(
        "INSERT INTO accounts (id, name, email, password_hash, role, parent_id, is_active, is_verified, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, 1, 0, ?, ?)",
    )
    .bind(account_id.to_string())
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(password_hash)
    .bind(principal.role.as_str())
    .bind(auth.account_id.to_string())
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let ctx = RequestContext::from_headers(&headers);
    audit::record(
        &state.pool,
        &AuditEntry::new("SUB_ACCOUNT_CREATED")
            .actor(auth.account_id)
            .details(format!("sub-account {account_id}"))
            .ip(ctx.ip),
    )
    .await?;

    let account: Account = fetch_account_by_id(&state.pool, account_id).await?.try_into()?;
    Ok((StatusCode::CREATED, Json(account)))
}

#[utoipa::path(
    put,
    path = "/accounts/{id}/custom-role",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Sub-account id")),
    request_body = AssignCustomRoleRequest,
    responses(
        (status = 200, description = "Custom role assignment updated", body = Account),
        (status = 403, description = "Not the parent of this account"),
        (status = 404, description = "Account or role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_custom_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignCustomRoleRequest>,
) -> AppResult<Json<Account>> {
    let principal = load_principal(&state.pool, auth.account_id).await?;
    authz::require(&principal, members_key(principal.role))?;

    let target = fetch_account_by_id(&state.pool, id).await?;
    let owned = target.parent_id.as_deref() == Some(auth.account_id.to_string().as_str());
    if !owned && !principal.is_super_admin() {
        return Err(AppError::forbidden("account is not a sub-account of the caller"));
    }

    if let Some(role_id) = payload.custom_role_id {
        let owner: Option<String> =
            sqlx::query_scalar("SELECT owner_id FROM custom_roles WHERE id = ?")
                .bind(role_id.to_string())
                .fetch_optional(&state.pool)
                .await?;

        let owner = owner.ok_or_else(|| AppError::not_found("custom role not found"))?;
        if owner != auth.account_id.to_string() && !principal.is_super_admin() {
            return Err(AppError::forbidden("custom role belongs to another account"));
        }
    }

    let now = utc_now();
    sqlx::query("UPDATE accounts SET custom_role_id = ?, updated_at = ? WHERE id = ?")
        .bind(payload.custom_role_id.map(|u| u.to_string()))
        .bind(now)
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    let ctx = RequestContext::from_headers(&headers);
    audit::record(
        &state.pool,
        &AuditEntry::new("CUSTOM_ROLE_ASSIGNED")
            .actor(auth.account_id)
            .details(format!(
                "account {id} -> {}",
                payload
                    .custom_role_id
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "none".to_string())
            ))
            .ip(ctx.ip),
    )
    .await?;

    let account: Account = fetch_account_by_id(&state.pool, id).await?.try_into()?;
    Ok(Json(account))
}

#[utoipa::path(
    delete,
    path = "/accounts/{id}",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 204, description = "Account disabled"),
        (status = 404, description = "Account not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn deactivate_account(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let principal = load_principal(&state.pool, auth.account_id).await?;
    authz::require(&principal, members_key(principal.role))?;

    let target = fetch_account_by_id(&state.pool, id).await?;
    let owned = target.parent_id.as_deref() == Some(auth.account_id.to_string().as_str());
    if !owned && !principal.is_super_admin() {
        return Err(AppError::forbidden("account is not a sub-account of the caller"));
    }

    let now = utc_now();
    sqlx::query("UPDATE accounts SET is_active = 0, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    audit::record(
        &state.pool,
        &AuditEntry::new("ACCOUNT_DISABLED")
            .actor(auth.account_id)
            .details(format!("account {id}")),
    )
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
