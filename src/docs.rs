//! OpenAPI document assembly for Swagger UI.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::authz::{AccountRole, PermissionCategory};
use crate::models;
use crate::models::program::ProgramStatus;
use crate::models::report::ReportStatus;
use crate::routes;
use crate::routes::health::HealthResponse;
use crate::sla::SlaMetrics;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::auth::register,
        routes::auth::login,
        routes::auth::me,
        routes::auth::logout,
        routes::accounts::create_sub_account,
        routes::accounts::assign_custom_role,
        routes::accounts::deactivate_account,
        routes::rbac::list_permissions,
        routes::rbac::create_permission,
        routes::rbac::seed_permissions,
        routes::rbac::list_roles,
        routes::rbac::create_role,
        routes::rbac::get_role,
        routes::rbac::update_role,
        routes::rbac::delete_role,
        routes::programs::list_programs,
        routes::programs::create_program,
        routes::programs::get_program,
        routes::programs::update_program,
        routes::reports::create_report,
        routes::reports::list_reports,
        routes::reports::get_report,
        routes::reports::submit_report,
        routes::reports::transition_report,
        routes::reports::payout_report,
        routes::dashboard::sla_metrics,
        routes::health::health,
    ),
    components(
        schemas(
            models::account::Account,
            models::account::AuthResponse,
            models::account::LoginRequest,
            models::account::RegisterRequest,
            models::account::SubAccountCreateRequest,
            models::account::AssignCustomRoleRequest,
            models::rbac::Permission,
            models::rbac::PermissionCreateRequest,
            models::rbac::CustomRole,
            models::rbac::CustomRoleCreateRequest,
            models::rbac::CustomRoleUpdateRequest,
            models::rbac::CustomRoleWithPermissions,
            models::program::Program,
            models::program::ProgramCreateRequest,
            models::program::ProgramUpdateRequest,
            models::report::Report,
            models::report::ReportCreateRequest,
            models::report::ReportTransitionRequest,
            models::report::PayoutRequest,
            AccountRole,
            PermissionCategory,
            ProgramStatus,
            ReportStatus,
            SlaMetrics,
            HealthResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Accounts", description = "Sub-account and role assignment"),
        (name = "RBAC", description = "Permissions and custom roles"),
        (name = "Programs", description = "Bug bounty programs"),
        (name = "Reports", description = "Vulnerability report lifecycle"),
        (name = "Dashboard", description = "SLA compliance rollups"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
