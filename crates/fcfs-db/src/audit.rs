//! Append-only audit trail.
//!
//! One row per significant state change, inserted on the same transaction as
//! the change itself: an aborted transaction discards both, so the log never
//! describes an effect that did not happen. There are no update or delete
//! paths.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use uuid::Uuid;

use crate::TenantTx;

/// Who performed an engine operation, as resolved from the bearer credential.
#[derive(Debug, Clone, Default)]
pub struct ActorContext {
    pub user_id: Option<Uuid>,
    pub role: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuditRow {
    pub audit_id: i64,
    pub tenant_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub actor_role: Option<String>,
    pub action: String,
    pub target_table: String,
    pub target_id: String,
    pub payload: Value,
    pub created_at_utc: DateTime<Utc>,
}

/// Append one audit row within the current transaction.
pub async fn append(
    tx: &mut TenantTx,
    actor: &ActorContext,
    action: &str,
    target_table: &str,
    target_id: &str,
    payload: Value,
) -> Result<i64> {
    let tenant_id = tx.tenant_id();
    let (audit_id,): (i64,) = sqlx::query_as(
        r#"
        insert into audit_logs (tenant_id, actor_user_id, actor_role, action, target_table, target_id, payload)
        values ($1, $2, $3, $4, $5, $6, $7)
        returning audit_id
        "#,
    )
    .bind(tenant_id)
    .bind(actor.user_id)
    .bind(actor.role.as_deref())
    .bind(action)
    .bind(target_table)
    .bind(target_id)
    .bind(payload)
    .fetch_one(tx.conn())
    .await
    .context("audit append failed")?;

    Ok(audit_id)
}

/// Recent audit rows for the transaction's tenant, newest first.
pub async fn list_recent(tx: &mut TenantTx, limit: i64) -> Result<Vec<AuditRow>> {
    let tenant_id = tx.tenant_id();
    let rows = sqlx::query(
        r#"
        select audit_id, tenant_id, actor_user_id, actor_role, action,
               target_table, target_id, payload, created_at_utc
        from audit_logs
        where tenant_id = $1
        order by created_at_utc desc, audit_id desc
        limit $2
        "#,
    )
    .bind(tenant_id)
    .bind(limit)
    .fetch_all(tx.conn())
    .await
    .context("audit list failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(AuditRow {
            audit_id: row.try_get("audit_id")?,
            tenant_id: row.try_get("tenant_id")?,
            actor_user_id: row.try_get("actor_user_id")?,
            actor_role: row.try_get("actor_role")?,
            action: row.try_get("action")?,
            target_table: row.try_get("target_table")?,
            target_id: row.try_get("target_id")?,
            payload: row.try_get("payload")?,
            created_at_utc: row.try_get("created_at_utc")?,
        });
    }
    Ok(out)
}

/// Count audit rows matching an action + target, within the transaction's
/// tenant. Used by scenario tests asserting side-effect atomicity.
pub async fn count_for_target(
    tx: &mut TenantTx,
    action: &str,
    target_table: &str,
    target_id: &str,
) -> Result<i64> {
    let tenant_id = tx.tenant_id();
    let (n,): (i64,) = sqlx::query_as(
        r#"
        select count(*)::bigint
        from audit_logs
        where tenant_id = $1
          and action = $2
          and target_table = $3
          and target_id = $4
        "#,
    )
    .bind(tenant_id)
    .bind(action)
    .bind(target_table)
    .bind(target_id)
    .fetch_one(tx.conn())
    .await
    .context("audit count failed")?;

    Ok(n)
}
