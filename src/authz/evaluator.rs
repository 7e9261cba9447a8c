use super::principal::Principal;

/// Policy evaluator trait for pluggable authorization logic
pub trait PolicyEvaluator: Send + Sync {
    /// Check if the principal may exercise the given permission key
    fn can(&self, principal: &Principal, permission_key: &str) -> bool;
}

/// Default policy evaluator.
///
/// Evaluation order, first match wins:
/// 1. super_admin role -> allow
/// 2. custom-role permission set contains the key -> allow
/// 3. root account -> allow iff the key carries the base role's namespace
/// 4. sub-account without a custom role (or with an empty set) -> same
///    namespace fallback on the base role
/// 5. deny -- a sub-account with a populated custom role never falls back to
///    base-role grants
#[derive(Debug, Clone, Default)]
pub struct DefaultPolicyEvaluator;

impl DefaultPolicyEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn prefix_allows(principal: &Principal, permission_key: &str) -> bool {
        principal
            .role
            .namespace()
            .map(|ns| permission_key.starts_with(ns))
            .unwrap_or(false)
    }
}

impl PolicyEvaluator for DefaultPolicyEvaluator {
    fn can(&self, principal: &Principal, permission_key: &str) -> bool {
        // 1. Super admin bypasses all checks
        if principal.is_super_admin() {
            tracing::debug!(
                account_id = %principal.account_id,
                permission = %permission_key,
                "super_admin bypass"
            );
            return true;
        }

        // 2. Custom-role permission set
        if !principal.permission_keys.is_empty() && principal.permission_keys.contains(permission_key) {
            tracing::debug!(
                account_id = %principal.account_id,
                permission = %permission_key,
                "custom role permission match"
            );
            return true;
        }

        // 3. Root account: base-role namespace
        if principal.is_root() {
            let allowed = Self::prefix_allows(principal, permission_key);
            if !allowed {
                tracing::debug!(
                    account_id = %principal.account_id,
                    permission = %permission_key,
                    role = principal.role.as_str(),
                    "permission denied (namespace mismatch)"
                );
            }
            return allowed;
        }

        // 4. Sub-account without an effective custom role: namespace fallback
        if principal.custom_role_id.is_none() || principal.permission_keys.is_empty() {
            let allowed = Self::prefix_allows(principal, permission_key);
            if !allowed {
                tracing::debug!(
                    account_id = %principal.account_id,
                    permission = %permission_key,
                    role = principal.role.as_str(),
                    "permission denied (namespace mismatch)"
                );
            }
            return allowed;
        }

        // 5. Custom role assigned but the key is not in its set: no fallback
        tracing::debug!(
            account_id = %principal.account_id,
            permission = %permission_key,
            "permission denied (custom role supersedes base role)"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::AccountRole;
    use uuid::Uuid;

    #[test]
    fn super_admin_bypasses_all() {
        let evaluator = DefaultPolicyEvaluator::new();
        let principal = Principal::new(Uuid::new_v4(), AccountRole::SuperAdmin);

        assert!(evaluator.can(&principal, "admin:users"));
        assert!(evaluator.can(&principal, "company:payments"));
        assert!(evaluator.can(&principal, "anything:at-all"));
    }

    #[test]
    fn root_account_allowed_by_namespace_only() {
        let evaluator = DefaultPolicyEvaluator::new();
        let principal = Principal::new(Uuid::new_v4(), AccountRole::CompanyAdmin);

        assert!(evaluator.can(&principal, "company:payments"));
        assert!(evaluator.can(&principal, "company:programs"));
        assert!(!evaluator.can(&principal, "admin:users"));
        assert!(!evaluator.can(&principal, "researcher:reports"));
    }

    #[test]
    fn root_account_ignores_incidental_custom_role() {
        // A root account resolves through its base role even when a custom
        // role happens to be attached.
        let evaluator = DefaultPolicyEvaluator::new();
        let principal = Principal::new(Uuid::new_v4(), AccountRole::Researcher)
            .with_custom_role(Uuid::new_v4(), vec!["researcher:programs".to_string()]);

        assert!(evaluator.can(&principal, "researcher:reports"));
        assert!(evaluator.can(&principal, "researcher:programs"));
        assert!(!evaluator.can(&principal, "company:reports"));
    }

    #[test]
    fn sub_account_without_custom_role_falls_back_to_base_role() {
        let evaluator = DefaultPolicyEvaluator::new();
        let principal =
            Principal::new(Uuid::new_v4(), AccountRole::CompanyAdmin).with_parent(Uuid::new_v4());

        assert!(evaluator.can(&principal, "company:reports"));
        assert!(!evaluator.can(&principal, "admin:users"));
    }

    #[test]
    fn sub_account_custom_role_supersedes_base_role() {
        let evaluator = DefaultPolicyEvaluator::new();
        let principal = Principal::new(Uuid::new_v4(), AccountRole::CompanyAdmin)
            .with_parent(Uuid::new_v4())
            .with_custom_role(Uuid::new_v4(), vec!["company:reports".to_string()]);

        assert!(evaluator.can(&principal, "company:reports"));
        // base-role namespace keys outside the custom role's set stay denied
        assert!(!evaluator.can(&principal, "company:payments"));
        assert!(!evaluator.can(&principal, "company:members"));
    }

    #[test]
    fn sub_account_with_empty_custom_role_keeps_base_grants() {
        let evaluator = DefaultPolicyEvaluator::new();
        let mut principal = Principal::new(Uuid::new_v4(), AccountRole::Triager)
            .with_parent(Uuid::new_v4());
        principal.custom_role_id = Some(Uuid::new_v4());

        assert!(evaluator.can(&principal, "triage:reports"));
        assert!(!evaluator.can(&principal, "company:reports"));
    }
}
