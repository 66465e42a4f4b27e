//! Integration API handlers: manual pushes and delivery status queries.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tickd_core::{DispatchError, DispatchOutcome, IntegrationTarget, PushStatus};

use super::{ticket_error_response, ErrorBody};
use crate::state::AppState;

/// Delivery status of one `(ticket, target)` pair
#[derive(Debug, Serialize)]
pub struct PushStatusResponse {
    pub ticket_id: String,
    pub target: IntegrationTarget,
    pub status: PushStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_ref: Option<String>,
    pub last_attempted_sequence: u64,
    pub last_delivered_sequence: u64,
    /// Latest event sequence of the ticket; the delivery lag is the gap to
    /// `last_delivered_sequence`.
    pub latest_sequence: u64,
    pub attempt_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

fn dispatch_error_response(error: DispatchError) -> (StatusCode, Json<ErrorBody>) {
    let status = match &error {
        DispatchError::TicketNotFound(_) => StatusCode::NOT_FOUND,
        DispatchError::TargetNotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorBody::new(error.to_string())))
}

async fn sync_target(
    state: Arc<AppState>,
    target: IntegrationTarget,
    ticket_id: String,
) -> Result<Json<DispatchOutcome>, (StatusCode, Json<ErrorBody>)> {
    let outcome = state
        .dispatcher()
        .sync_now(&ticket_id, target)
        .await
        .map_err(dispatch_error_response)?;
    Ok(Json(outcome))
}

/// Push a ticket to Jira now
pub async fn sync_jira(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DispatchOutcome>, (StatusCode, Json<ErrorBody>)> {
    sync_target(state, IntegrationTarget::Jira, id).await
}

/// Create/refresh the GitHub issue for a ticket now
pub async fn create_github_issue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DispatchOutcome>, (StatusCode, Json<ErrorBody>)> {
    sync_target(state, IntegrationTarget::Github, id).await
}

/// Push a ticket to TestRail now
pub async fn push_testrail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DispatchOutcome>, (StatusCode, Json<ErrorBody>)> {
    sync_target(state, IntegrationTarget::Testrail, id).await
}

/// Delivery status for one `(ticket, target)` pair.
///
/// This is the only surface where permanent integration failures become
/// visible; mutation responses never carry them.
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path((target, id)): Path<(String, String)>,
) -> Result<Json<PushStatusResponse>, (StatusCode, Json<ErrorBody>)> {
    let target = IntegrationTarget::parse(&target).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new(format!("unknown integration target: {}", target))),
        )
    })?;

    // Unknown tickets are a 404 even before any delivery was attempted.
    state.tickets().get(&id).map_err(ticket_error_response)?;

    let record = state
        .push_records()
        .get_or_default(&id, target)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new(e.to_string())),
            )
        })?;

    let latest_sequence = state.events().latest_sequence(&id).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody::new(e.to_string())),
        )
    })?;

    Ok(Json(PushStatusResponse {
        ticket_id: record.ticket_id,
        target: record.target,
        status: record.status,
        remote_ref: record.remote_ref,
        last_attempted_sequence: record.last_attempted_sequence,
        last_delivered_sequence: record.last_delivered_sequence,
        latest_sequence,
        attempt_count: record.attempt_count,
        last_error: record.last_error,
    }))
}
