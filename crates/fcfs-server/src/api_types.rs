//! Request and response types for all HTTP endpoints.
//!
//! Request bodies reject unknown fields; response shapes are part of the
//! external contract and must not drift. No business logic lives here.

use chrono::{DateTime, NaiveDate, Utc};
use fcfs_db::slots::AlternativeRow;
use fcfs_db::{AuditRow, OutboxEventRow};
use fcfs_engine::{CancelOutcome, ClaimOutcome};
use fcfs_schemas::{CancelReason, SlotStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// POST /claims
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ClaimRequestBody {
    pub slot_id: Uuid,
    pub company_id: Uuid,
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub slot: ClaimedSlotView,
    pub claim: ClaimView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimedSlotView {
    pub id: Uuid,
    pub status: SlotStatus,
    pub work_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimView {
    pub id: Uuid,
    pub company_id: Uuid,
    pub user_id: Option<Uuid>,
    pub claimed_at: DateTime<Utc>,
}

impl From<&ClaimOutcome> for ClaimResponse {
    fn from(outcome: &ClaimOutcome) -> Self {
        Self {
            slot: ClaimedSlotView {
                id: outcome.slot.slot_id,
                status: outcome.slot.status,
                work_date: outcome.slot.work_date,
            },
            claim: ClaimView {
                id: outcome.claim.claim_id,
                company_id: outcome.claim.company_id,
                user_id: outcome.claim.user_id,
                claimed_at: outcome.claim.claimed_at_utc,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// POST /cancel-claim
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CancelRequestBody {
    pub slot_id: Uuid,
    pub reason: CancelReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub slot: CancelledSlotView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelledSlotView {
    pub id: Uuid,
    pub status: SlotStatus,
    pub canceled_at: DateTime<Utc>,
    pub cancel_reason: CancelReason,
}

impl CancelResponse {
    /// The engine's conditional update always stamps both fields; their
    /// absence would mean the slot row broke its own CHECK constraints.
    pub fn try_from_outcome(outcome: &CancelOutcome) -> Option<Self> {
        Some(Self {
            slot: CancelledSlotView {
                id: outcome.slot.slot_id,
                status: outcome.slot.status,
                canceled_at: outcome.slot.cancelled_at_utc?,
                cancel_reason: outcome.slot.cancel_reason?,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// GET /alternatives
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlternativesParams {
    #[serde(rename = "slotId")]
    pub slot_id: Uuid,
    #[serde(default)]
    pub days: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternativesResponse {
    pub alternatives: Vec<AlternativeView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternativeView {
    pub slot_id: Uuid,
    pub work_date: NaiveDate,
    pub job_post: AlternativeJobPostView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternativeJobPostView {
    pub id: Uuid,
    pub title: String,
    pub trade: String,
}

impl From<&AlternativeRow> for AlternativeView {
    fn from(row: &AlternativeRow) -> Self {
        Self {
            slot_id: row.slot_id,
            work_date: row.work_date,
            job_post: AlternativeJobPostView {
                id: row.job_post_id,
                title: row.title.clone(),
                trade: row.trade.clone(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub db_ok: bool,
}

// ---------------------------------------------------------------------------
// Admin: outbox + audit read views, requeue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AdminOutboxParams {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEventView {
    pub event_id: String,
    pub event_name: String,
    pub target: String,
    pub status: String,
    pub retry_count: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&OutboxEventRow> for OutboxEventView {
    fn from(row: &OutboxEventRow) -> Self {
        Self {
            event_id: row.event_id.clone(),
            event_name: row.event_name.clone(),
            target: row.target.clone(),
            status: row.status.as_str().to_string(),
            retry_count: row.retry_count,
            next_attempt_at: row.next_attempt_at_utc,
            last_error: row.last_error.clone(),
            created_at: row.created_at_utc,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxListResponse {
    pub events: Vec<OutboxEventView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequeueResponse {
    pub event_id: String,
    pub requeued: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminAuditParams {
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogView {
    pub audit_id: i64,
    pub actor_user_id: Option<Uuid>,
    pub actor_role: Option<String>,
    pub action: String,
    pub target_table: String,
    pub target_id: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl From<&AuditRow> for AuditLogView {
    fn from(row: &AuditRow) -> Self {
        Self {
            audit_id: row.audit_id,
            actor_user_id: row.actor_user_id,
            actor_role: row.actor_role.clone(),
            action: row.action.clone(),
            target_table: row.target_table.clone(),
            target_id: row.target_id.clone(),
            payload: row.payload.clone(),
            created_at: row.created_at_utc,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditListResponse {
    pub entries: Vec<AuditLogView>,
}
