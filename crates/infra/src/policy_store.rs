//! Postgres persistence for policy rules and role groupings.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use warden_auth::{Effect, Grouping, PolicyError, PolicyRule, PolicySnapshot, PolicyStore, Role};

#[derive(Debug, Clone)]
pub struct PostgresPolicyStore {
    pool: Arc<PgPool>,
}

impl PostgresPolicyStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PolicyStore for PostgresPolicyStore {
    #[instrument(skip(self), err)]
    async fn load_policy(&self) -> Result<PolicySnapshot, PolicyError> {
        let rule_rows = sqlx::query("SELECT subject, object, action, effect FROM policy_rules")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_policy", e))?;

        let mut rules = Vec::with_capacity(rule_rows.len());
        for row in rule_rows {
            let effect: String = row.try_get("effect").map_err(|e| map_sqlx_error("load_policy", e))?;
            let effect = parse_effect(&effect)?;
            rules.push(PolicyRule {
                subject: row.try_get("subject").map_err(|e| map_sqlx_error("load_policy", e))?,
                object: row.try_get("object").map_err(|e| map_sqlx_error("load_policy", e))?,
                action: row.try_get("action").map_err(|e| map_sqlx_error("load_policy", e))?,
                effect,
            });
        }

        let grouping_rows = sqlx::query("SELECT subject, role FROM policy_groupings")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_policy", e))?;

        let mut groupings = Vec::with_capacity(grouping_rows.len());
        for row in grouping_rows {
            let subject: String = row.try_get("subject").map_err(|e| map_sqlx_error("load_policy", e))?;
            let role: String = row.try_get("role").map_err(|e| map_sqlx_error("load_policy", e))?;
            groupings.push(Grouping::new(subject, Role::new(role)));
        }

        Ok(PolicySnapshot { rules, groupings })
    }

    #[instrument(skip(self), err)]
    async fn add_policy(&self, rule: &PolicyRule) -> Result<(), PolicyError> {
        sqlx::query(
            r#"
            INSERT INTO policy_rules (subject, object, action, effect)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&rule.subject)
        .bind(&rule.object)
        .bind(&rule.action)
        .bind(rule.effect.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("add_policy", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn remove_policy(&self, rule: &PolicyRule) -> Result<(), PolicyError> {
        sqlx::query(
            "DELETE FROM policy_rules WHERE subject = $1 AND object = $2 AND action = $3 AND effect = $4",
        )
        .bind(&rule.subject)
        .bind(&rule.object)
        .bind(&rule.action)
        .bind(rule.effect.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("remove_policy", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(role = %role), err)]
    async fn add_grouping(&self, subject: &str, role: &Role) -> Result<(), PolicyError> {
        sqlx::query("INSERT INTO policy_groupings (subject, role) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(subject)
            .bind(role.as_str())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("add_grouping", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(role = %role), err)]
    async fn remove_grouping(&self, subject: &str, role: &Role) -> Result<(), PolicyError> {
        sqlx::query("DELETE FROM policy_groupings WHERE subject = $1 AND role = $2")
            .bind(subject)
            .bind(role.as_str())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("remove_grouping", e))?;
        Ok(())
    }

    /// Delete-then-insert inside one transaction; a failure rolls back both.
    #[instrument(skip(self, roles), fields(count = roles.len()), err)]
    async fn replace_roles(&self, subject: &str, roles: &[Role]) -> Result<(), PolicyError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("replace_roles", e))?;

        sqlx::query("DELETE FROM policy_groupings WHERE subject = $1")
            .bind(subject)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_roles", e))?;

        for role in roles {
            sqlx::query("INSERT INTO policy_groupings (subject, role) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(subject)
                .bind(role.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("replace_roles", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("replace_roles", e))?;
        Ok(())
    }
}

fn parse_effect(raw: &str) -> Result<Effect, PolicyError> {
    match raw {
        "allow" => Ok(Effect::Allow),
        "deny" => Ok(Effect::Deny),
        other => Err(PolicyError::Store(format!("unknown policy effect '{other}'"))),
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> PolicyError {
    match err {
        sqlx::Error::Database(db_err) => {
            PolicyError::Store(format!("database error in {}: {}", operation, db_err.message()))
        }
        other => PolicyError::Store(format!("sqlx error in {operation}: {other}")),
    }
}
