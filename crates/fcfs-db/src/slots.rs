//! Job-slot rows: the unit of FCFS contention.
//!
//! The two conditional updates here ([`try_claim`], [`try_cancel`]) are the
//! whole concurrency story: the storage engine serializes concurrent updates
//! on the same row, so at most one caller observes the required status and
//! wins. Losers get zero rows back and classify the conflict with a re-read.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use fcfs_schemas::{CancelReason, SlotStatus};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::TenantTx;

#[derive(Debug, Clone)]
pub struct SlotRow {
    pub slot_id: Uuid,
    pub tenant_id: Uuid,
    pub job_post_id: Uuid,
    pub work_date: NaiveDate,
    pub slot_no: i32,
    pub status: SlotStatus,
    pub claimed_by_company: Option<Uuid>,
    pub claimed_by_user: Option<Uuid>,
    pub claimed_at_utc: Option<DateTime<Utc>>,
    pub cancelled_at_utc: Option<DateTime<Utc>>,
    pub cancel_reason: Option<CancelReason>,
    pub created_at_utc: DateTime<Utc>,
}

/// A slot joined with its job post and project, as needed for integration
/// event payloads and as the origin of an alternatives query.
#[derive(Debug, Clone)]
pub struct SlotDetailRow {
    pub slot_id: Uuid,
    pub work_date: NaiveDate,
    pub status: SlotStatus,
    pub job_post_id: Uuid,
    pub title: String,
    pub trade: String,
    pub project_id: Uuid,
    pub dw_project_id: Option<String>,
}

/// One alternatives-query result row.
#[derive(Debug, Clone)]
pub struct AlternativeRow {
    pub slot_id: Uuid,
    pub work_date: NaiveDate,
    pub job_post_id: Uuid,
    pub title: String,
    pub trade: String,
}

const SLOT_COLUMNS: &str = "slot_id, tenant_id, job_post_id, work_date, slot_no, status, \
     claimed_by_company, claimed_by_user, claimed_at_utc, cancelled_at_utc, \
     cancel_reason, created_at_utc";

fn map_slot_row(row: &PgRow) -> Result<SlotRow> {
    let cancel_reason: Option<String> = row.try_get("cancel_reason")?;
    Ok(SlotRow {
        slot_id: row.try_get("slot_id")?,
        tenant_id: row.try_get("tenant_id")?,
        job_post_id: row.try_get("job_post_id")?,
        work_date: row.try_get("work_date")?,
        slot_no: row.try_get("slot_no")?,
        status: SlotStatus::parse(&row.try_get::<String, _>("status")?)?,
        claimed_by_company: row.try_get("claimed_by_company")?,
        claimed_by_user: row.try_get("claimed_by_user")?,
        claimed_at_utc: row.try_get("claimed_at_utc")?,
        cancelled_at_utc: row.try_get("cancelled_at_utc")?,
        cancel_reason: cancel_reason
            .as_deref()
            .map(CancelReason::parse)
            .transpose()?,
        created_at_utc: row.try_get("created_at_utc")?,
    })
}

/// Fetch a slot within the transaction's tenant. Cross-tenant ids read as
/// `None`, never as an authorization error.
pub async fn fetch(tx: &mut TenantTx, slot_id: Uuid) -> Result<Option<SlotRow>> {
    let tenant_id = tx.tenant_id();
    let row = sqlx::query(&format!(
        "select {SLOT_COLUMNS} from job_slots where slot_id = $1 and tenant_id = $2"
    ))
    .bind(slot_id)
    .bind(tenant_id)
    .fetch_optional(tx.conn())
    .await
    .context("fetch slot failed")?;

    row.as_ref().map(map_slot_row).transpose()
}

/// Fetch a slot with its job post and project context.
pub async fn fetch_detail(tx: &mut TenantTx, slot_id: Uuid) -> Result<Option<SlotDetailRow>> {
    let tenant_id = tx.tenant_id();
    let row = sqlx::query(
        r#"
        select s.slot_id, s.work_date, s.status,
               j.job_post_id, j.title, j.trade, j.project_id,
               p.dw_project_id
        from job_slots s
        join job_posts j on j.job_post_id = s.job_post_id
        join projects p on p.project_id = j.project_id
        where s.slot_id = $1
          and s.tenant_id = $2
        "#,
    )
    .bind(slot_id)
    .bind(tenant_id)
    .fetch_optional(tx.conn())
    .await
    .context("fetch slot detail failed")?;

    let Some(row) = row else { return Ok(None) };

    Ok(Some(SlotDetailRow {
        slot_id: row.try_get("slot_id")?,
        work_date: row.try_get("work_date")?,
        status: SlotStatus::parse(&row.try_get::<String, _>("status")?)?,
        job_post_id: row.try_get("job_post_id")?,
        title: row.try_get("title")?,
        trade: row.try_get("trade")?,
        project_id: row.try_get("project_id")?,
        dw_project_id: row.try_get("dw_project_id")?,
    }))
}

/// The FCFS primitive: conditionally move `available → claimed`, stamping the
/// claimant. Returns the updated row, or `None` when another transaction got
/// there first (or the slot does not exist in this tenant — callers
/// discriminate with [`fetch`]).
pub async fn try_claim(
    tx: &mut TenantTx,
    slot_id: Uuid,
    company_id: Uuid,
    user_id: Option<Uuid>,
) -> Result<Option<SlotRow>> {
    let tenant_id = tx.tenant_id();
    let row = sqlx::query(&format!(
        r#"
        update job_slots
           set status = 'claimed',
               claimed_by_company = $2,
               claimed_by_user = $3,
               claimed_at_utc = now()
         where slot_id = $1
           and tenant_id = $4
           and status = 'available'
        returning {SLOT_COLUMNS}
        "#
    ))
    .bind(slot_id)
    .bind(company_id)
    .bind(user_id)
    .bind(tenant_id)
    .fetch_optional(tx.conn())
    .await
    .context("claim conditional update failed")?;

    row.as_ref().map(map_slot_row).transpose()
}

/// Conditionally move `claimed → cancelled`. The claim row is untouched:
/// cancellation preserves history and does not re-open the slot.
pub async fn try_cancel(
    tx: &mut TenantTx,
    slot_id: Uuid,
    reason: CancelReason,
) -> Result<Option<SlotRow>> {
    let tenant_id = tx.tenant_id();
    let row = sqlx::query(&format!(
        r#"
        update job_slots
           set status = 'cancelled',
               cancelled_at_utc = now(),
               cancel_reason = $2
         where slot_id = $1
           and tenant_id = $3
           and status = 'claimed'
        returning {SLOT_COLUMNS}
        "#
    ))
    .bind(slot_id)
    .bind(reason.as_str())
    .bind(tenant_id)
    .fetch_optional(tx.conn())
    .await
    .context("cancel conditional update failed")?;

    row.as_ref().map(map_slot_row).transpose()
}

/// Up to three available slots near the origin: same project, same trade,
/// within ±`days` calendar days inclusive, the origin itself excluded.
/// Ordered by work_date ascending, newest-created first within a date.
pub async fn find_alternatives(
    tx: &mut TenantTx,
    origin: &SlotDetailRow,
    days: i64,
) -> Result<Vec<AlternativeRow>> {
    let tenant_id = tx.tenant_id();
    let window_start = origin.work_date - Duration::days(days);
    let window_end = origin.work_date + Duration::days(days);

    let rows = sqlx::query(
        r#"
        select s.slot_id, s.work_date, j.job_post_id, j.title, j.trade
        from job_slots s
        join job_posts j on j.job_post_id = s.job_post_id
        where j.project_id = $1
          and j.trade = $2
          and s.status = 'available'
          and s.slot_id <> $3
          and s.tenant_id = $4
          and s.work_date between $5 and $6
        order by s.work_date asc, s.created_at_utc desc
        limit 3
        "#,
    )
    .bind(origin.project_id)
    .bind(&origin.trade)
    .bind(origin.slot_id)
    .bind(tenant_id)
    .bind(window_start)
    .bind(window_end)
    .fetch_all(tx.conn())
    .await
    .context("alternatives query failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(AlternativeRow {
            slot_id: row.try_get("slot_id")?,
            work_date: row.try_get("work_date")?,
            job_post_id: row.try_get("job_post_id")?,
            title: row.try_get("title")?,
            trade: row.try_get("trade")?,
        });
    }
    Ok(out)
}
