//! The FCFS claim operation.
//!
//! Ordering inside the transaction matters:
//! 1. idempotency probe — a retried request returns its stored result and
//!    writes nothing;
//! 2. conditional update `available → claimed` — the single point where the
//!    race is decided;
//! 3. claim-row insert — unique constraints catch the two races the update
//!    cannot see (same request id on a sibling, second claim on the slot);
//! 4. outbox enqueue + 5. audit — committed atomically with the claim, or
//!    rolled back with it.

use anyhow::{anyhow, Context};
use chrono::Utc;
use fcfs_db::{audit, claims, is_unique_constraint_violation, outbox, slots};
use fcfs_db::{ActorContext, ClaimRow, SlotRow, TenantTx};
use fcfs_schemas::{IntegrationEvent, EVENT_CLAIM_CONFIRMED};
use serde_json::json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::{claim_event_data, validate_request_id, INTEGRATION_TARGET};

#[derive(Debug, Clone)]
pub struct ClaimCommand {
    pub slot_id: Uuid,
    pub company_id: Uuid,
    pub request_id: String,
}

#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    pub slot: SlotRow,
    pub claim: ClaimRow,
    /// True when the result was served from a stored claim (idempotent
    /// replay) rather than a fresh transition.
    pub replayed: bool,
}

/// Claim a slot first-come-first-served. Under concurrent invocation on the
/// same available slot exactly one call succeeds; the rest see
/// [`EngineError::AlreadyClaimed`]. Safe to retry with the same request id.
pub async fn claim_slot(
    pool: &PgPool,
    tenant_id: Uuid,
    actor: &ActorContext,
    cmd: ClaimCommand,
) -> EngineResult<ClaimOutcome> {
    validate_request_id(&cmd.request_id)?;

    let mut tx = TenantTx::begin(pool, tenant_id).await?;

    // Step 1: idempotency probe. Without this, a retried request that already
    // claimed the slot would see it `claimed` and report a conflict to its
    // own original requester.
    if let Some(existing) = claims::fetch_by_request_id(&mut tx, &cmd.request_id).await? {
        let slot = slots::fetch(&mut tx, existing.slot_id)
            .await?
            .ok_or_else(|| {
                EngineError::Internal(anyhow!(
                    "claim {} references a slot missing from its tenant",
                    existing.claim_id
                ))
            })?;
        tx.rollback().await?;
        info!(request_id = %cmd.request_id, slot_id = %slot.slot_id, "claim replayed");
        return Ok(ClaimOutcome {
            slot,
            claim: existing,
            replayed: true,
        });
    }

    // Step 2: the FCFS conditional update. Zero rows means either the slot is
    // gone (for this tenant) or someone else holds it; a second read
    // discriminates.
    let slot = match slots::try_claim(&mut tx, cmd.slot_id, cmd.company_id, actor.user_id).await? {
        Some(slot) => slot,
        None => {
            // If the winner was this request's own concurrent sibling (same
            // idempotency key, already committed), serve its result instead
            // of a conflict.
            if let Some(claim) = claims::fetch_by_request_id(&mut tx, &cmd.request_id).await? {
                let slot = slots::fetch(&mut tx, claim.slot_id).await?.ok_or_else(|| {
                    EngineError::Internal(anyhow!(
                        "claim {} references a slot missing from its tenant",
                        claim.claim_id
                    ))
                })?;
                tx.rollback().await?;
                return Ok(ClaimOutcome {
                    slot,
                    claim,
                    replayed: true,
                });
            }
            return match slots::fetch(&mut tx, cmd.slot_id).await? {
                None => Err(EngineError::NotFound),
                Some(_) => Err(EngineError::AlreadyClaimed),
            };
        }
    };

    // Step 3: claim-row insert. A unique violation aborts the Postgres
    // transaction, so both race branches leave via a fresh transaction or an
    // error — the conditional update above rolls back either way.
    let claim = match claims::insert(
        &mut tx,
        cmd.slot_id,
        cmd.company_id,
        actor.user_id,
        &cmd.request_id,
    )
    .await
    {
        Ok(claim) => claim,
        Err(e) if is_unique_constraint_violation(&e, claims::UQ_CLAIMS_REQUEST_ID) => {
            drop(tx);
            return replay_winning_sibling(pool, tenant_id, &cmd.request_id).await;
        }
        Err(e) if is_unique_constraint_violation(&e, claims::UQ_CLAIMS_SLOT_ID) => {
            return Err(EngineError::AlreadyClaimed);
        }
        Err(e) => {
            return Err(EngineError::Internal(
                anyhow::Error::new(e).context("insert claim row"),
            ))
        }
    };

    // Step 4: announce the transition in the same transaction.
    let detail = slots::fetch_detail(&mut tx, cmd.slot_id).await?.ok_or_else(|| {
        EngineError::Internal(anyhow!("claimed slot {} lost its job post", cmd.slot_id))
    })?;
    let event_id = outbox::derive_event_id(slot.slot_id);
    let envelope = IntegrationEvent::claim_confirmed(
        &event_id,
        Utc::now(),
        claim_event_data(&detail, &slot, &claim, None),
    );
    let payload = serde_json::to_value(&envelope)
        .context("serialize claim.confirmed payload")
        .map_err(EngineError::Internal)?;
    outbox::enqueue(
        &mut tx,
        &event_id,
        EVENT_CLAIM_CONFIRMED,
        INTEGRATION_TARGET,
        payload,
    )
    .await?;

    // Step 5: audit the transition.
    audit::append(
        &mut tx,
        actor,
        "claim",
        "job_slots",
        &slot.slot_id.to_string(),
        json!({
            "previous_status": "available",
            "new_status": "claimed",
            "company": cmd.company_id,
            "request_id": cmd.request_id,
        }),
    )
    .await?;

    tx.commit().await?;

    info!(
        slot_id = %slot.slot_id,
        company_id = %cmd.company_id,
        request_id = %cmd.request_id,
        "slot claimed"
    );

    Ok(ClaimOutcome {
        slot,
        claim,
        replayed: false,
    })
}

/// A concurrent request with the same idempotency key won the insert race.
/// The violation is only raised after the winner committed, so a fresh
/// transaction always finds its claim — unless the key collided with another
/// tenant's, which global `request_id` uniqueness rejects on purpose.
async fn replay_winning_sibling(
    pool: &PgPool,
    tenant_id: Uuid,
    request_id: &str,
) -> EngineResult<ClaimOutcome> {
    let mut tx = TenantTx::begin(pool, tenant_id).await?;

    let claim = match claims::fetch_by_request_id(&mut tx, request_id).await? {
        Some(claim) => claim,
        None => {
            return Err(EngineError::Validation(format!(
                "requestId {request_id} is already in use"
            )));
        }
    };
    let slot = slots::fetch(&mut tx, claim.slot_id).await?.ok_or_else(|| {
        EngineError::Internal(anyhow!(
            "claim {} references a slot missing from its tenant",
            claim.claim_id
        ))
    })?;
    tx.rollback().await?;

    Ok(ClaimOutcome {
        slot,
        claim,
        replayed: true,
    })
}
