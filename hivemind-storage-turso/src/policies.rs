//! Authorization policy persistence
//!
//! Policy tuples (`ptype = 'p'`) and role bindings (`ptype = 'g'`) share one
//! table. Inserts are idempotent via the unique constraint; the boolean
//! return mirrors whether a row was actually added or removed.

use hivemind_core::storage::PolicyRule;
use hivemind_core::{Error, Result};

use crate::knowledge::next_row;
use crate::{col, TursoStorage};

impl TursoStorage {
    /// Add a policy rule; returns false when it already existed
    pub async fn add_policy(&self, rule: &PolicyRule) -> Result<bool> {
        let conn = self.get_connection()?;
        let affected = conn
            .execute(
                "INSERT OR IGNORE INTO authorization_policies (ptype, subject, domain, object, action) \
                 VALUES ('p', ?, ?, ?, ?)",
                libsql::params![
                    rule.subject.clone(),
                    rule.domain.clone(),
                    rule.object.clone(),
                    rule.action.clone(),
                ],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to add policy: {e}")))?;
        Ok(affected > 0)
    }

    /// Remove a policy rule; returns false when it did not exist
    pub async fn remove_policy(&self, rule: &PolicyRule) -> Result<bool> {
        let conn = self.get_connection()?;
        let affected = conn
            .execute(
                "DELETE FROM authorization_policies \
                 WHERE ptype = 'p' AND subject = ? AND domain = ? AND object = ? AND action = ?",
                libsql::params![
                    rule.subject.clone(),
                    rule.domain.clone(),
                    rule.object.clone(),
                    rule.action.clone(),
                ],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to remove policy: {e}")))?;
        Ok(affected > 0)
    }

    /// All policy rules scoped to a domain
    pub async fn policies_for_domain(&self, domain: &str) -> Result<Vec<PolicyRule>> {
        let conn = self.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT subject, domain, object, action FROM authorization_policies \
                 WHERE ptype = 'p' AND domain = ?",
                libsql::params![domain],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to load policies: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = next_row(&mut rows).await? {
            out.push(PolicyRule {
                subject: col!(row, 0)?,
                domain: col!(row, 1)?,
                object: col!(row, 2)?,
                action: col!(row, 3)?,
            });
        }
        Ok(out)
    }

    /// Bind a role to a subject within a domain (idempotent)
    pub async fn add_role_binding(
        &self,
        subject: &str,
        role: &str,
        domain: &str,
    ) -> Result<bool> {
        let conn = self.get_connection()?;
        let affected = conn
            .execute(
                "INSERT OR IGNORE INTO authorization_policies (ptype, subject, domain, object, action) \
                 VALUES ('g', ?, ?, ?, '')",
                libsql::params![subject, domain, role],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to add role binding: {e}")))?;
        Ok(affected > 0)
    }

    /// Roles bound to a subject within a domain
    pub async fn roles_for_subject(&self, subject: &str, domain: &str) -> Result<Vec<String>> {
        let conn = self.get_connection()?;
        let mut rows = conn
            .query(
                "SELECT object FROM authorization_policies \
                 WHERE ptype = 'g' AND subject = ? AND domain = ?",
                libsql::params![subject, domain],
            )
            .await
            .map_err(|e| Error::Storage(format!("Failed to load role bindings: {e}")))?;

        let mut roles = Vec::new();
        while let Some(row) = next_row(&mut rows).await? {
            roles.push(col!(row, 0)?);
        }
        Ok(roles)
    }
}
