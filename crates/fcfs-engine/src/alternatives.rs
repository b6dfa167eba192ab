//! Alternatives query: nearby open slots for a contended one.

use fcfs_db::slots::{self, AlternativeRow};
use fcfs_db::TenantTx;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

pub const DEFAULT_WINDOW_DAYS: i64 = 3;
pub const MAX_WINDOW_DAYS: i64 = 30;

/// Up to three available slots on the origin's project and trade within
/// ±`days` calendar days (default 3, max 30), work_date ascending. Read-only
/// and idempotent; holds no locks worth mentioning.
pub async fn find_alternatives(
    pool: &PgPool,
    tenant_id: Uuid,
    slot_id: Uuid,
    days: Option<i64>,
) -> EngineResult<Vec<AlternativeRow>> {
    let days = days.unwrap_or(DEFAULT_WINDOW_DAYS);
    if !(1..=MAX_WINDOW_DAYS).contains(&days) {
        return Err(EngineError::Validation(format!(
            "days must be between 1 and {MAX_WINDOW_DAYS}"
        )));
    }

    let mut tx = TenantTx::begin(pool, tenant_id).await?;

    let origin = slots::fetch_detail(&mut tx, slot_id)
        .await?
        .ok_or(EngineError::NotFound)?;
    let alternatives = slots::find_alternatives(&mut tx, &origin, days).await?;

    tx.commit().await?;
    Ok(alternatives)
}
