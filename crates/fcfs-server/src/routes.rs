//! Axum router and all HTTP handlers.
//!
//! `build_router` is the single entry point; `main.rs` attaches middleware
//! layers after this call so tests can use the bare router.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use fcfs_db::{audit, outbox, TenantTx};
use fcfs_engine::ClaimCommand;
use serde_json::json;
use tracing::info;

use crate::api_types::{
    AdminAuditParams, AdminOutboxParams, AlternativeView, AlternativesParams,
    AlternativesResponse, AuditListResponse, AuditLogView, CancelRequestBody, CancelResponse,
    ClaimRequestBody, ClaimResponse, HealthResponse, OutboxEventView, OutboxListResponse,
    RequeueResponse,
};
use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::state::AppState;

/// Build the complete application router wired to the given shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/claims", post(create_claim))
        .route("/cancel-claim", post(cancel_claim))
        .route("/alternatives", get(alternatives))
        .route("/admin/outbox", get(admin_outbox_list))
        .route("/admin/outbox/:event_id/requeue", post(admin_outbox_requeue))
        .route("/admin/audit", get(admin_audit_list))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> Json<HealthResponse> {
    let db_ok = fcfs_db::status(&st.pool)
        .await
        .map(|s| s.ok && s.has_job_slots_table)
        .unwrap_or(false);

    Json(HealthResponse {
        ok: db_ok,
        service: st.build.service,
        version: st.build.version,
        db_ok,
    })
}

// ---------------------------------------------------------------------------
// POST /claims
// ---------------------------------------------------------------------------

pub(crate) async fn create_claim(
    State(st): State<Arc<AppState>>,
    auth: AuthContext,
    body: Result<Json<ClaimRequestBody>, JsonRejection>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::validation(e.body_text()))?;

    let outcome = fcfs_engine::claim_slot(
        &st.pool,
        auth.tenant_id,
        &auth.actor,
        ClaimCommand {
            slot_id: body.slot_id,
            company_id: body.company_id,
            request_id: body.request_id,
        },
    )
    .await?;

    Ok(Json(ClaimResponse::from(&outcome)))
}

// ---------------------------------------------------------------------------
// POST /cancel-claim
// ---------------------------------------------------------------------------

pub(crate) async fn cancel_claim(
    State(st): State<Arc<AppState>>,
    auth: AuthContext,
    body: Result<Json<CancelRequestBody>, JsonRejection>,
) -> Result<Json<CancelResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::validation(e.body_text()))?;

    let outcome = fcfs_engine::cancel_claim(
        &st.pool,
        auth.tenant_id,
        &auth.actor,
        body.slot_id,
        body.reason,
    )
    .await?;

    CancelResponse::try_from_outcome(&outcome)
        .map(Json)
        .ok_or_else(|| ApiError::internal("cancelled slot missing cancellation stamps"))
}

// ---------------------------------------------------------------------------
// GET /alternatives
// ---------------------------------------------------------------------------

pub(crate) async fn alternatives(
    State(st): State<Arc<AppState>>,
    auth: AuthContext,
    params: Result<Query<AlternativesParams>, QueryRejection>,
) -> Result<Json<AlternativesResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::validation(e.body_text()))?;

    let rows =
        fcfs_engine::find_alternatives(&st.pool, auth.tenant_id, params.slot_id, params.days)
            .await?;

    Ok(Json(AlternativesResponse {
        alternatives: rows.iter().map(AlternativeView::from).collect(),
    }))
}

// ---------------------------------------------------------------------------
// GET /admin/outbox
// ---------------------------------------------------------------------------

pub(crate) async fn admin_outbox_list(
    State(st): State<Arc<AppState>>,
    _auth: AuthContext,
    params: Result<Query<AdminOutboxParams>, QueryRejection>,
) -> Result<Json<OutboxListResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::validation(e.body_text()))?;

    let status = params
        .status
        .as_deref()
        .map(fcfs_db::OutboxStatus::parse)
        .transpose()
        .map_err(|e| ApiError::validation(e.to_string()))?;
    let limit = params.limit.unwrap_or(50).clamp(1, 500);

    let rows = outbox::list_recent(&st.pool, status, limit)
        .await
        .map_err(|_| ApiError::internal("outbox list failed"))?;

    Ok(Json(OutboxListResponse {
        events: rows.iter().map(OutboxEventView::from).collect(),
    }))
}

// ---------------------------------------------------------------------------
// POST /admin/outbox/:event_id/requeue
// ---------------------------------------------------------------------------

pub(crate) async fn admin_outbox_requeue(
    State(st): State<Arc<AppState>>,
    auth: AuthContext,
    Path(event_id): Path<String>,
) -> Result<Json<RequeueResponse>, ApiError> {
    let requeued = outbox::requeue(&st.pool, &event_id)
        .await
        .map_err(|_| ApiError::internal("outbox requeue failed"))?;

    if !requeued {
        return Err(ApiError::not_found());
    }

    // Requeue is an operator action and leaves an audit row of its own.
    let mut tx = TenantTx::begin(&st.pool, auth.tenant_id)
        .await
        .map_err(|_| ApiError::internal("begin audit transaction"))?;
    audit::append(
        &mut tx,
        &auth.actor,
        "outbox_requeue",
        "outbox_events",
        &event_id,
        json!({}),
    )
    .await
    .map_err(|_| ApiError::internal("audit outbox requeue"))?;
    tx.commit()
        .await
        .map_err(|_| ApiError::internal("commit audit transaction"))?;

    info!(event_id = %event_id, "outbox event requeued");
    Ok(Json(RequeueResponse { event_id, requeued }))
}

// ---------------------------------------------------------------------------
// GET /admin/audit
// ---------------------------------------------------------------------------

pub(crate) async fn admin_audit_list(
    State(st): State<Arc<AppState>>,
    auth: AuthContext,
    params: Result<Query<AdminAuditParams>, QueryRejection>,
) -> Result<Json<AuditListResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::validation(e.body_text()))?;
    let limit = params.limit.unwrap_or(50).clamp(1, 500);

    let mut tx = TenantTx::begin(&st.pool, auth.tenant_id)
        .await
        .map_err(|_| ApiError::internal("begin audit transaction"))?;
    let rows = audit::list_recent(&mut tx, limit)
        .await
        .map_err(|_| ApiError::internal("audit list failed"))?;
    tx.rollback()
        .await
        .map_err(|_| ApiError::internal("close audit transaction"))?;

    Ok(Json(AuditListResponse {
        entries: rows.iter().map(AuditLogView::from).collect(),
    }))
}
