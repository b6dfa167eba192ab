//! The claim engine: FCFS claim, cancel and alternatives over job slots.
//!
//! Each operation runs inside one tenant-scoped transaction. Coordination
//! between concurrent claimers is delegated entirely to the storage engine's
//! conditional updates — there is no in-process locking anywhere in this
//! crate.

use chrono::{DateTime, Utc};
use fcfs_db::slots::SlotDetailRow;
use fcfs_db::{ClaimRow, SlotRow};
use fcfs_schemas::{CancelRef, ClaimEventData, ClaimRef, JobPostRef, SlotRef};

mod alternatives;
mod cancel;
mod claim;
mod error;

pub use alternatives::{find_alternatives, DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS};
pub use cancel::{cancel_claim, CancelOutcome};
pub use claim::{claim_slot, ClaimCommand, ClaimOutcome};
pub use error::{EngineError, EngineResult};

/// Outbox `target` tag for events bound for the external integration.
pub const INTEGRATION_TARGET: &str = "dandori";

/// Assemble the `data` object shared by `claim.confirmed` and
/// `claim.cancelled` envelopes.
pub(crate) fn claim_event_data(
    detail: &SlotDetailRow,
    slot: &SlotRow,
    claim: &ClaimRow,
    cancel: Option<CancelRef>,
) -> ClaimEventData {
    ClaimEventData {
        dw_project_id: detail.dw_project_id.clone(),
        job_post: JobPostRef {
            id: detail.job_post_id,
            work_date: slot.work_date,
        },
        slot: SlotRef {
            slot_id: slot.slot_id,
            status: slot.status,
        },
        claim: ClaimRef {
            claim_id: claim.claim_id,
            company_id: claim.company_id,
            user_id: claim.user_id,
            claimed_at: claim.claimed_at_utc,
        },
        cancel,
        tenant_id: slot.tenant_id,
    }
}

/// `cancelled_at` for event payloads: the slot's stamp, falling back to the
/// envelope time if the row somehow lacks one.
pub(crate) fn cancelled_at_or(slot: &SlotRow, fallback: DateTime<Utc>) -> DateTime<Utc> {
    slot.cancelled_at_utc.unwrap_or(fallback)
}

/// Validation shared by the HTTP boundary tests: the idempotency key is a
/// caller-supplied opaque string, required and bounded.
pub(crate) fn validate_request_id(request_id: &str) -> Result<(), EngineError> {
    if request_id.trim().is_empty() {
        return Err(EngineError::Validation(
            "requestId must not be empty".to_string(),
        ));
    }
    if request_id.len() > 255 {
        return Err(EngineError::Validation(
            "requestId must be at most 255 characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_validation_bounds() {
        assert!(validate_request_id("r-1").is_ok());
        assert!(validate_request_id("").is_err());
        assert!(validate_request_id("   ").is_err());
        assert!(validate_request_id(&"x".repeat(256)).is_err());
        assert!(validate_request_id(&"x".repeat(255)).is_ok());
    }
}
