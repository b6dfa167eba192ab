//! The cancel operation: `claimed → cancelled`.
//!
//! The claim row is retained — cancellation preserves history — and the slot
//! is not re-opened. A `claim.cancelled` event mirrors the confirmation sent
//! at claim time.

use anyhow::{anyhow, Context};
use chrono::Utc;
use fcfs_db::{audit, claims, outbox, slots};
use fcfs_db::{ActorContext, ClaimRow, SlotRow, TenantTx};
use fcfs_schemas::{CancelReason, CancelRef, IntegrationEvent, SlotStatus, EVENT_CLAIM_CANCELLED};
use serde_json::json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::{cancelled_at_or, claim_event_data, INTEGRATION_TARGET};

#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub slot: SlotRow,
    pub claim: ClaimRow,
}

/// Cancel the claim on a slot.
pub async fn cancel_claim(
    pool: &PgPool,
    tenant_id: Uuid,
    actor: &ActorContext,
    slot_id: Uuid,
    reason: CancelReason,
) -> EngineResult<CancelOutcome> {
    let mut tx = TenantTx::begin(pool, tenant_id).await?;

    // Classify before touching anything; every non-claimed state has its own
    // conflict code so callers know whether retrying can help.
    let current = slots::fetch(&mut tx, slot_id)
        .await?
        .ok_or(EngineError::NotFound)?;
    match current.status {
        SlotStatus::Available => return Err(EngineError::SlotNotClaimed),
        SlotStatus::Cancelled => return Err(EngineError::AlreadyCancelled),
        SlotStatus::Completed => return Err(EngineError::AlreadyCompleted),
        SlotStatus::Claimed => {}
    }

    // Zero rows here means a concurrent cancel (or completion) slipped in
    // between the read and the update: a retriable conflict.
    let slot = slots::try_cancel(&mut tx, slot_id, reason)
        .await?
        .ok_or(EngineError::CancelFailed)?;

    let claim = claims::fetch_by_slot(&mut tx, slot_id).await?.ok_or_else(|| {
        EngineError::Internal(anyhow!("claimed slot {slot_id} has no claim row"))
    })?;

    let occurred_at = Utc::now();
    let event_id = outbox::derive_event_id(slot.slot_id);
    let envelope = IntegrationEvent::claim_cancelled(
        &event_id,
        occurred_at,
        claim_event_data(
            &slots::fetch_detail(&mut tx, slot_id).await?.ok_or_else(|| {
                EngineError::Internal(anyhow!("cancelled slot {slot_id} lost its job post"))
            })?,
            &slot,
            &claim,
            Some(CancelRef {
                cancel_reason: reason,
                cancelled_at: cancelled_at_or(&slot, occurred_at),
            }),
        ),
    );
    let payload = serde_json::to_value(&envelope)
        .context("serialize claim.cancelled payload")
        .map_err(EngineError::Internal)?;
    outbox::enqueue(
        &mut tx,
        &event_id,
        EVENT_CLAIM_CANCELLED,
        INTEGRATION_TARGET,
        payload,
    )
    .await?;

    audit::append(
        &mut tx,
        actor,
        "cancel",
        "job_slots",
        &slot.slot_id.to_string(),
        json!({
            "previous_status": "claimed",
            "new_status": "cancelled",
            "cancel_reason": reason.as_str(),
            "claim_id": claim.claim_id,
        }),
    )
    .await?;

    tx.commit().await?;

    info!(slot_id = %slot.slot_id, reason = reason.as_str(), "claim cancelled");

    Ok(CancelOutcome { slot, claim })
}
