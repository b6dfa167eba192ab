//! Transactional outbox rows.
//!
//! Producer side ([`enqueue`]) only works on a [`TenantTx`]: the event row
//! commits or rolls back together with the state change that produced it.
//! Dispatcher side operates on the pool — each settle is its own small
//! transactional update, status-guarded so a row that left `pending` while a
//! delivery was in flight is never overwritten.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::TenantTx;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Outbox delivery state. Retryable failures keep the row `pending` (with a
/// bumped retry_count and attempt time); `failed` is the parked state that
/// only an operator requeue leaves; `sent` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Sent => "sent",
            OutboxStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(OutboxStatus::Pending),
            "sent" => Ok(OutboxStatus::Sent),
            "failed" => Ok(OutboxStatus::Failed),
            other => Err(anyhow!("invalid outbox status: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OutboxEventRow {
    pub outbox_id: i64,
    pub event_id: String,
    pub event_name: String,
    pub payload: Value,
    pub target: String,
    pub status: OutboxStatus,
    pub retry_count: i32,
    pub next_attempt_at_utc: DateTime<Utc>,
    pub leased_until_utc: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

const OUTBOX_COLUMNS: &str = "outbox_id, event_id, event_name, payload, target, status, \
     retry_count, next_attempt_at_utc, leased_until_utc, last_error, \
     created_at_utc, updated_at_utc";

fn map_outbox_row(row: &PgRow) -> Result<OutboxEventRow> {
    Ok(OutboxEventRow {
        outbox_id: row.try_get("outbox_id")?,
        event_id: row.try_get("event_id")?,
        event_name: row.try_get("event_name")?,
        payload: row.try_get("payload")?,
        target: row.try_get("target")?,
        status: OutboxStatus::parse(&row.try_get::<String, _>("status")?)?,
        retry_count: row.try_get("retry_count")?,
        next_attempt_at_utc: row.try_get("next_attempt_at_utc")?,
        leased_until_utc: row.try_get("leased_until_utc")?,
        last_error: row.try_get("last_error")?,
        created_at_utc: row.try_get("created_at_utc")?,
        updated_at_utc: row.try_get("updated_at_utc")?,
    })
}

// ---------------------------------------------------------------------------
// Producer side
// ---------------------------------------------------------------------------

/// Derive a globally unique event id from an entity id, the current time and
/// a random suffix, e.g. `evt_550e8400_1730000000000_9f3a1c2e`.
pub fn derive_event_id(entity_id: Uuid) -> String {
    let fragment = &entity_id.simple().to_string()[..8];
    let millis = Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen();
    format!("evt_{fragment}_{millis}_{suffix:08x}")
}

/// Insert a `pending` outbox row on the producing transaction.
///
/// There is deliberately no pool-level variant: an event that is not written
/// in the same transaction as its state change could announce work that was
/// rolled back.
pub async fn enqueue(
    tx: &mut TenantTx,
    event_id: &str,
    event_name: &str,
    target: &str,
    payload: Value,
) -> Result<i64> {
    let (outbox_id,): (i64,) = sqlx::query_as(
        r#"
        insert into outbox_events (event_id, event_name, payload, target, status, next_attempt_at_utc)
        values ($1, $2, $3, $4, 'pending', now())
        returning outbox_id
        "#,
    )
    .bind(event_id)
    .bind(event_name)
    .bind(payload)
    .bind(target)
    .fetch_one(tx.conn())
    .await
    .context("outbox enqueue failed")?;

    Ok(outbox_id)
}

// ---------------------------------------------------------------------------
// Dispatcher side
// ---------------------------------------------------------------------------

/// Claim up to `batch_size` due rows bound for `target`, stamping a lease.
///
/// A dispatcher serves exactly one integration target, so the poll filters on
/// the target tag. `FOR UPDATE SKIP LOCKED` keeps concurrent dispatchers off
/// each other's rows at claim time; the lease keeps a crashed dispatcher's
/// rows invisible until it lapses. Delivery is still at-least-once, not
/// exactly-once: a dispatcher that dies between delivering and settling
/// redelivers after the lease expires.
pub async fn claim_due_batch(
    pool: &PgPool,
    target: &str,
    batch_size: i64,
    lease_secs: i64,
) -> Result<Vec<OutboxEventRow>> {
    let rows = sqlx::query(&format!(
        r#"
        with due as (
            select outbox_id
              from outbox_events
             where target = $1
               and status = 'pending'
               and next_attempt_at_utc <= now()
               and (leased_until_utc is null or leased_until_utc <= now())
             order by created_at_utc asc
             limit $2
             for update skip locked
        )
        update outbox_events
           set leased_until_utc = now() + make_interval(secs => $3::double precision),
               updated_at_utc = now()
         where outbox_id in (select outbox_id from due)
        returning {OUTBOX_COLUMNS}
        "#
    ))
    .bind(target)
    .bind(batch_size)
    .bind(lease_secs)
    .fetch_all(pool)
    .await
    .context("outbox claim batch failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        out.push(map_outbox_row(row)?);
    }
    // Claim order is the delivery order.
    out.sort_by_key(|r| r.outbox_id);
    Ok(out)
}

/// Settle a delivered event: `pending → sent`. Returns false when the row was
/// not in `pending` (settled by another dispatcher instance).
pub async fn mark_sent(pool: &PgPool, event_id: &str) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        update outbox_events
           set status = 'sent',
               leased_until_utc = null,
               last_error = null,
               updated_at_utc = now()
         where event_id = $1
           and status = 'pending'
        returning outbox_id
        "#,
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await
    .context("outbox mark sent failed")?;

    Ok(row.is_some())
}

/// Settle a retryable failure: bump retry_count, push the next attempt out by
/// `delay_secs`, release the lease. The row stays `pending`.
pub async fn schedule_retry(
    pool: &PgPool,
    event_id: &str,
    retry_count: i32,
    delay_secs: i64,
    error: &str,
) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        update outbox_events
           set retry_count = $2,
               next_attempt_at_utc = now() + make_interval(secs => $3::double precision),
               leased_until_utc = null,
               last_error = $4,
               updated_at_utc = now()
         where event_id = $1
           and status = 'pending'
        returning outbox_id
        "#,
    )
    .bind(event_id)
    .bind(retry_count)
    .bind(delay_secs)
    .bind(error)
    .fetch_optional(pool)
    .await
    .context("outbox schedule retry failed")?;

    Ok(row.is_some())
}

/// Park an event: `pending → failed`, capturing the final error. Parked rows
/// leave the dispatch loop until an operator requeues them.
pub async fn mark_failed(
    pool: &PgPool,
    event_id: &str,
    retry_count: i32,
    error: &str,
) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        update outbox_events
           set status = 'failed',
               retry_count = $2,
               leased_until_utc = null,
               last_error = $3,
               updated_at_utc = now()
         where event_id = $1
           and status = 'pending'
        returning outbox_id
        "#,
    )
    .bind(event_id)
    .bind(retry_count)
    .bind(error)
    .fetch_optional(pool)
    .await
    .context("outbox mark failed failed")?;

    Ok(row.is_some())
}

/// Operator requeue: `failed → pending` with retry_count reset and the next
/// attempt jittered around 60 s (±10 %) so a bulk requeue does not stampede
/// the receiver. Returns false when the event is not parked.
pub async fn requeue(pool: &PgPool, event_id: &str) -> Result<bool> {
    let jitter_secs: f64 = rand::thread_rng().gen_range(54.0..=66.0);

    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        update outbox_events
           set status = 'pending',
               retry_count = 0,
               next_attempt_at_utc = now() + make_interval(secs => $2),
               leased_until_utc = null,
               updated_at_utc = now()
         where event_id = $1
           and status = 'failed'
        returning outbox_id
        "#,
    )
    .bind(event_id)
    .bind(jitter_secs)
    .fetch_optional(pool)
    .await
    .context("outbox requeue failed")?;

    Ok(row.is_some())
}

/// Fetch a single event by its id.
pub async fn fetch_by_event_id(pool: &PgPool, event_id: &str) -> Result<Option<OutboxEventRow>> {
    let row = sqlx::query(&format!(
        "select {OUTBOX_COLUMNS} from outbox_events where event_id = $1"
    ))
    .bind(event_id)
    .fetch_optional(pool)
    .await
    .context("outbox fetch by event_id failed")?;

    row.as_ref().map(map_outbox_row).transpose()
}

/// Operator read view: recent events, optionally filtered by status, newest
/// first.
pub async fn list_recent(
    pool: &PgPool,
    status: Option<OutboxStatus>,
    limit: i64,
) -> Result<Vec<OutboxEventRow>> {
    let rows = match status {
        Some(s) => {
            sqlx::query(&format!(
                r#"
                select {OUTBOX_COLUMNS}
                from outbox_events
                where status = $1
                order by created_at_utc desc
                limit $2
                "#
            ))
            .bind(s.as_str())
            .bind(limit)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query(&format!(
                r#"
                select {OUTBOX_COLUMNS}
                from outbox_events
                order by created_at_utc desc
                limit $1
                "#
            ))
            .bind(limit)
            .fetch_all(pool)
            .await
        }
    }
    .context("outbox list recent failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        out.push(map_outbox_row(row)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_carry_entity_fragment_and_are_distinct() {
        let entity = Uuid::new_v4();
        let a = derive_event_id(entity);
        let b = derive_event_id(entity);

        let fragment = &entity.simple().to_string()[..8];
        assert!(a.starts_with(&format!("evt_{fragment}_")));
        assert_ne!(a, b, "random suffix must make ids distinct");
    }

    #[test]
    fn outbox_status_round_trips() {
        for s in [OutboxStatus::Pending, OutboxStatus::Sent, OutboxStatus::Failed] {
            assert_eq!(OutboxStatus::parse(s.as_str()).unwrap(), s);
        }
        assert!(OutboxStatus::parse("parked").is_err());
    }
}
