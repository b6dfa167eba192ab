//! Shared wire types for the FCFS booking core.
//!
//! Everything here is `Serialize + Deserialize` data: the integration event
//! envelope delivered by the outbox dispatcher, and the closed string enums
//! (slot status, cancel reason, tenant integration mode) that both the
//! storage layer and the HTTP surface bind against. No business logic.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope `version` carried by every integration event.
pub const EVENT_VERSION: &str = "1.0";

/// Envelope `producer` tag.
pub const PRODUCER: &str = "fcfs-booking";

pub const EVENT_CLAIM_CONFIRMED: &str = "claim.confirmed";
pub const EVENT_CLAIM_CANCELLED: &str = "claim.cancelled";

// ---------------------------------------------------------------------------
// Slot status
// ---------------------------------------------------------------------------

/// Lifecycle state of a job slot. Stored lowercase; permitted transitions are
/// `available → claimed`, `claimed → cancelled`, `claimed → completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Available,
    Claimed,
    Cancelled,
    Completed,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Available => "available",
            SlotStatus::Claimed => "claimed",
            SlotStatus::Cancelled => "cancelled",
            SlotStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "available" => Ok(SlotStatus::Available),
            "claimed" => Ok(SlotStatus::Claimed),
            "cancelled" => Ok(SlotStatus::Cancelled),
            "completed" => Ok(SlotStatus::Completed),
            other => Err(anyhow!("invalid slot status: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Cancel reason
// ---------------------------------------------------------------------------

/// Enumerated reason attached to every `claimed → cancelled` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    NoShow,
    Weather,
    ClientChange,
    MaterialDelay,
    Other,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::NoShow => "no_show",
            CancelReason::Weather => "weather",
            CancelReason::ClientChange => "client_change",
            CancelReason::MaterialDelay => "material_delay",
            CancelReason::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "no_show" => Ok(CancelReason::NoShow),
            "weather" => Ok(CancelReason::Weather),
            "client_change" => Ok(CancelReason::ClientChange),
            "material_delay" => Ok(CancelReason::MaterialDelay),
            "other" => Ok(CancelReason::Other),
            other => Err(anyhow!("invalid cancel reason: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tenant integration mode
// ---------------------------------------------------------------------------

/// How a tenant's events leave the system: `standalone` tenants keep events
/// in-house; `dandori` tenants forward to the external integration target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMode {
    Standalone,
    Dandori,
}

impl IntegrationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationMode::Standalone => "standalone",
            IntegrationMode::Dandori => "dandori",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "standalone" => Ok(IntegrationMode::Standalone),
            "dandori" => Ok(IntegrationMode::Dandori),
            other => Err(anyhow!("invalid integration mode: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Integration event envelope (outbox payload)
// ---------------------------------------------------------------------------

/// Envelope delivered to the integration target for both `claim.confirmed`
/// and `claim.cancelled`. The two differ only in `event`, `data.slot.status`
/// and the presence of `data.cancel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntegrationEvent {
    pub event: String,
    pub version: String,
    pub id: String,
    pub occurred_at: DateTime<Utc>,
    pub producer: String,
    pub data: ClaimEventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimEventData {
    pub dw_project_id: Option<String>,
    pub job_post: JobPostRef,
    pub slot: SlotRef,
    pub claim: ClaimRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel: Option<CancelRef>,
    pub tenant_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobPostRef {
    pub id: Uuid,
    pub work_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotRef {
    pub slot_id: Uuid,
    pub status: SlotStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimRef {
    pub claim_id: Uuid,
    pub company_id: Uuid,
    pub user_id: Option<Uuid>,
    pub claimed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelRef {
    pub cancel_reason: CancelReason,
    pub cancelled_at: DateTime<Utc>,
}

impl IntegrationEvent {
    /// Build a `claim.confirmed` envelope.
    pub fn claim_confirmed(event_id: &str, occurred_at: DateTime<Utc>, data: ClaimEventData) -> Self {
        Self {
            event: EVENT_CLAIM_CONFIRMED.to_string(),
            version: EVENT_VERSION.to_string(),
            id: event_id.to_string(),
            occurred_at,
            producer: PRODUCER.to_string(),
            data,
        }
    }

    /// Build a `claim.cancelled` envelope. `data.cancel` must be populated
    /// and `data.slot.status` must be `cancelled`; callers own that.
    pub fn claim_cancelled(event_id: &str, occurred_at: DateTime<Utc>, data: ClaimEventData) -> Self {
        Self {
            event: EVENT_CLAIM_CANCELLED.to_string(),
            version: EVENT_VERSION.to_string(),
            id: event_id.to_string(),
            occurred_at,
            producer: PRODUCER.to_string(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slot_status_round_trips_through_str() {
        for s in [
            SlotStatus::Available,
            SlotStatus::Claimed,
            SlotStatus::Cancelled,
            SlotStatus::Completed,
        ] {
            assert_eq!(SlotStatus::parse(s.as_str()).unwrap(), s);
        }
        assert!(SlotStatus::parse("open").is_err());
    }

    #[test]
    fn cancel_reason_rejects_unknown_values() {
        assert_eq!(
            CancelReason::parse("material_delay").unwrap(),
            CancelReason::MaterialDelay
        );
        assert!(CancelReason::parse("rain").is_err());
    }

    #[test]
    fn confirmed_envelope_serializes_to_contract_shape() {
        let slot_id = Uuid::new_v4();
        let ev = IntegrationEvent::claim_confirmed(
            "evt_abc_1730000000000_deadbeef",
            Utc::now(),
            ClaimEventData {
                dw_project_id: Some("DW-1".to_string()),
                job_post: JobPostRef {
                    id: Uuid::new_v4(),
                    work_date: NaiveDate::from_ymd_opt(2024, 11, 5).unwrap(),
                },
                slot: SlotRef {
                    slot_id,
                    status: SlotStatus::Claimed,
                },
                claim: ClaimRef {
                    claim_id: Uuid::new_v4(),
                    company_id: Uuid::new_v4(),
                    user_id: None,
                    claimed_at: Utc::now(),
                },
                cancel: None,
                tenant_id: Uuid::new_v4(),
            },
        );

        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "claim.confirmed");
        assert_eq!(v["version"], "1.0");
        assert_eq!(v["producer"], "fcfs-booking");
        assert_eq!(v["data"]["slot"]["status"], "claimed");
        assert_eq!(v["data"]["job_post"]["work_date"], "2024-11-05");
        // `cancel` is absent, not null, on confirmed events.
        assert!(v["data"].get("cancel").is_none());
        assert_eq!(v["data"]["slot"]["slot_id"], json!(slot_id.to_string()));
    }

    #[test]
    fn envelope_rejects_unknown_fields() {
        let bad = json!({
            "event": "claim.confirmed",
            "version": "1.0",
            "id": "evt_x",
            "occurred_at": "2024-11-05T00:00:00Z",
            "producer": "fcfs-booking",
            "surprise": true,
            "data": {
                "dw_project_id": null,
                "job_post": {"id": Uuid::new_v4(), "work_date": "2024-11-05"},
                "slot": {"slot_id": Uuid::new_v4(), "status": "claimed"},
                "claim": {
                    "claim_id": Uuid::new_v4(),
                    "company_id": Uuid::new_v4(),
                    "user_id": null,
                    "claimed_at": "2024-11-05T00:00:00Z"
                },
                "tenant_id": Uuid::new_v4()
            }
        });
        assert!(serde_json::from_value::<IntegrationEvent>(bad).is_err());
    }
}
