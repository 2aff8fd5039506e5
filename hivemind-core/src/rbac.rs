//! Domain-aware RBAC enforcement
//!
//! Policies are `(subject, domain, object, action)` tuples persisted by the
//! storage backend; role bindings map subjects to roles per domain. Three
//! enforcement levels are encoded in the object prefix:
//!
//! - `namespace:<tenant>` — tenant-wide access
//! - `category:<cat>`     — knowledge-category access
//! - `item:<uuid>`        — individual item access
//!
//! `*` acts as a wildcard for the action or object of a policy rule. Role
//! management is admin-gated: mutating any policy in a tenant requires
//! `enforce(caller, tenant, "namespace:<tenant>", "*")`.

use tracing::debug;

use crate::storage::{KnowledgeStore, PolicyRule};
use crate::Result;

/// Role granted full tenant access at onboarding
pub const ROLE_ADMIN: &str = "admin";

/// Role granted read/write tenant access at onboarding
pub const ROLE_CONTRIBUTOR: &str = "contributor";

/// Build the namespace-level object string for a tenant
pub fn namespace_object(tenant_id: &str) -> String {
    format!("namespace:{tenant_id}")
}

fn matches(pattern: &str, value: &str) -> bool {
    pattern == "*" || pattern == value
}

/// Check whether `subject` may perform `action` on `object` within `domain`
///
/// The subject's role bindings in the domain are expanded before matching, so
/// a policy granted to a role covers every subject bound to it.
pub async fn enforce(
    store: &dyn KnowledgeStore,
    subject: &str,
    domain: &str,
    object: &str,
    action: &str,
) -> Result<bool> {
    let mut subjects = vec![subject.to_string()];
    subjects.extend(store.roles_for_subject(subject, domain).await?);

    let policies = store.policies_for_domain(domain).await?;
    let allowed = policies.iter().any(|p| {
        subjects.iter().any(|s| s == &p.subject)
            && matches(&p.object, object)
            && matches(&p.action, action)
    });

    debug!("rbac: enforce({subject}, {domain}, {object}, {action}) = {allowed}");
    Ok(allowed)
}

/// True when the subject holds tenant-admin privileges
pub async fn is_tenant_admin(
    store: &dyn KnowledgeStore,
    subject: &str,
    tenant_id: &str,
) -> Result<bool> {
    enforce(store, subject, tenant_id, &namespace_object(tenant_id), "*").await
}

/// Seed baseline policies for a newly onboarded tenant
///
/// Grants `admin` full access and `contributor` read+write on the tenant
/// namespace. Safe to call repeatedly: policy inserts are idempotent.
pub async fn seed_default_policies(store: &dyn KnowledgeStore, tenant_id: &str) -> Result<()> {
    let namespace = namespace_object(tenant_id);

    store
        .add_policy(&PolicyRule {
            subject: ROLE_ADMIN.to_string(),
            domain: tenant_id.to_string(),
            object: namespace.clone(),
            action: "*".to_string(),
        })
        .await?;

    for action in ["read", "write"] {
        store
            .add_policy(&PolicyRule {
                subject: ROLE_CONTRIBUTOR.to_string(),
                domain: tenant_id.to_string(),
                object: namespace.clone(),
                action: action.to_string(),
            })
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_encoding() {
        assert_eq!(namespace_object("acme"), "namespace:acme");
    }

    #[test]
    fn wildcard_matching() {
        assert!(matches("*", "read"));
        assert!(matches("read", "read"));
        assert!(!matches("read", "write"));
        assert!(matches("*", "namespace:acme"));
        assert!(!matches("namespace:acme", "namespace:globex"));
    }
}
