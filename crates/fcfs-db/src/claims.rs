//! Claim rows: the durable record of a successful FCFS transition.
//!
//! A claim is inserted once and never mutated. `request_id` is the caller's
//! idempotency key and is unique across tenants; `slot_id` uniqueness is the
//! storage-level backstop for "at most one claim per slot".

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::TenantTx;

pub const UQ_CLAIMS_REQUEST_ID: &str = "uq_claims_request_id";
pub const UQ_CLAIMS_SLOT_ID: &str = "uq_claims_slot_id";

#[derive(Debug, Clone)]
pub struct ClaimRow {
    pub claim_id: Uuid,
    pub tenant_id: Uuid,
    pub slot_id: Uuid,
    pub company_id: Uuid,
    pub user_id: Option<Uuid>,
    pub request_id: String,
    pub claimed_at_utc: DateTime<Utc>,
}

const CLAIM_COLUMNS: &str =
    "claim_id, tenant_id, slot_id, company_id, user_id, request_id, claimed_at_utc";

fn map_claim_row(row: &PgRow) -> Result<ClaimRow, sqlx::Error> {
    Ok(ClaimRow {
        claim_id: row.try_get("claim_id")?,
        tenant_id: row.try_get("tenant_id")?,
        slot_id: row.try_get("slot_id")?,
        company_id: row.try_get("company_id")?,
        user_id: row.try_get("user_id")?,
        request_id: row.try_get("request_id")?,
        claimed_at_utc: row.try_get("claimed_at_utc")?,
    })
}

/// Insert the claim row for a freshly won slot.
///
/// Returns the raw sqlx error so callers can discriminate unique-constraint
/// races: a violation of [`UQ_CLAIMS_REQUEST_ID`] means a concurrent sibling
/// with the same idempotency key committed first; [`UQ_CLAIMS_SLOT_ID`] means
/// the slot somehow acquired a second claim and the transaction must abort.
pub async fn insert(
    tx: &mut TenantTx,
    slot_id: Uuid,
    company_id: Uuid,
    user_id: Option<Uuid>,
    request_id: &str,
) -> Result<ClaimRow, sqlx::Error> {
    let tenant_id = tx.tenant_id();
    let claim_id = Uuid::new_v4();

    let row = sqlx::query(&format!(
        r#"
        insert into claims (claim_id, tenant_id, slot_id, company_id, user_id, request_id)
        values ($1, $2, $3, $4, $5, $6)
        returning {CLAIM_COLUMNS}
        "#
    ))
    .bind(claim_id)
    .bind(tenant_id)
    .bind(slot_id)
    .bind(company_id)
    .bind(user_id)
    .bind(request_id)
    .fetch_one(tx.conn())
    .await?;

    map_claim_row(&row)
}

/// Idempotency probe: the stored claim for a request id, within the
/// transaction's tenant.
pub async fn fetch_by_request_id(
    tx: &mut TenantTx,
    request_id: &str,
) -> Result<Option<ClaimRow>> {
    let tenant_id = tx.tenant_id();
    let row = sqlx::query(&format!(
        "select {CLAIM_COLUMNS} from claims where request_id = $1 and tenant_id = $2"
    ))
    .bind(request_id)
    .bind(tenant_id)
    .fetch_optional(tx.conn())
    .await
    .context("fetch claim by request_id failed")?;

    row.as_ref()
        .map(|r| map_claim_row(r).context("map claim row"))
        .transpose()
}

/// The claim attached to a slot, if any (cancelled slots keep theirs).
pub async fn fetch_by_slot(tx: &mut TenantTx, slot_id: Uuid) -> Result<Option<ClaimRow>> {
    let tenant_id = tx.tenant_id();
    let row = sqlx::query(&format!(
        "select {CLAIM_COLUMNS} from claims where slot_id = $1 and tenant_id = $2"
    ))
    .bind(slot_id)
    .bind(tenant_id)
    .fetch_optional(tx.conn())
    .await
    .context("fetch claim by slot failed")?;

    row.as_ref()
        .map(|r| map_claim_row(r).context("map claim row"))
        .transpose()
}
