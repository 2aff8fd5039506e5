//! `manage_roles` tool: tenant-scoped role and permission management
//!
//! Admin-gated: the caller must hold `*` on `namespace:<tenant>` in their own
//! tenant before any action runs. Objects use the three-level encoding
//! (`namespace:`, `category:`, `item:`); actions are free-form permission
//! strings plus the `*` wildcard.

use hivemind_core::storage::PolicyRule;
use hivemind_core::{rbac, Error, Result};
use serde_json::{json, Value};

use crate::auth::Caller;
use crate::state::AppState;
use crate::tools::{opt_str, req_str};

const VALID_ACTIONS: [&str; 4] = [
    "assign_role",
    "get_roles",
    "add_permission",
    "remove_permission",
];

pub async fn handle(state: &AppState, caller: &Caller, args: Value) -> Result<Value> {
    let action = req_str(&args, "action")?;
    let agent_id = req_str(&args, "agent_id")?;
    let tenant_id = &caller.auth.tenant_id;

    // Admin gate: every action requires tenant-admin privileges
    let is_admin =
        rbac::is_tenant_admin(state.store.as_ref(), &caller.auth.agent_id, tenant_id).await?;
    if !is_admin {
        return Err(Error::PolicyDenied(
            "Only tenant admins can manage roles. \
             Your agent does not have admin privileges in this tenant."
                .to_string(),
        ));
    }

    match action.as_str() {
        "assign_role" => {
            let role = opt_str(&args, "role").ok_or_else(|| {
                Error::Validation("'assign_role' action requires the 'role' parameter.".to_string())
            })?;
            let added = state
                .store
                .add_role_binding(&agent_id, &role, tenant_id)
                .await?;
            Ok(json!({
                "action": "assign_role",
                "agent_id": agent_id,
                "role": role,
                "added": added,
            }))
        }
        "get_roles" => {
            let roles = state.store.roles_for_subject(&agent_id, tenant_id).await?;
            Ok(json!({
                "action": "get_roles",
                "agent_id": agent_id,
                "roles": roles,
            }))
        }
        "add_permission" => {
            let (obj, permission) = permission_args(&args)?;
            let added = state
                .store
                .add_policy(&PolicyRule {
                    subject: agent_id.clone(),
                    domain: tenant_id.clone(),
                    object: obj.clone(),
                    action: permission.clone(),
                })
                .await?;
            Ok(json!({
                "action": "add_permission",
                "agent_id": agent_id,
                "obj": obj,
                "permission": permission,
                "added": added,
            }))
        }
        "remove_permission" => {
            let (obj, permission) = permission_args(&args)?;
            let removed = state
                .store
                .remove_policy(&PolicyRule {
                    subject: agent_id.clone(),
                    domain: tenant_id.clone(),
                    object: obj.clone(),
                    action: permission.clone(),
                })
                .await?;
            Ok(json!({
                "action": "remove_permission",
                "agent_id": agent_id,
                "obj": obj,
                "permission": permission,
                "removed": removed,
            }))
        }
        other => Err(Error::Validation(format!(
            "Invalid action '{other}'. Valid actions: {}",
            VALID_ACTIONS.join(", ")
        ))),
    }
}

fn permission_args(args: &Value) -> Result<(String, String)> {
    let obj = opt_str(args, "obj").ok_or_else(|| {
        Error::Validation(
            "This action requires the 'obj' parameter \
             (e.g. 'namespace:<tenant>', 'category:<cat>', or 'item:<uuid>')."
                .to_string(),
        )
    })?;
    let permission = opt_str(args, "permission").ok_or_else(|| {
        Error::Validation(
            "This action requires the 'permission' parameter (e.g. 'read', 'write', '*').".to_string(),
        )
    })?;
    Ok((obj, permission))
}
