//! Ticket API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tickd_core::{CreateTicketRequest, Ticket, TicketFilter, TicketPriority, TicketStatus};

use super::{ticket_error_response, ErrorBody};
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

/// Request body for creating a ticket
#[derive(Debug, Deserialize)]
pub struct CreateTicketBody {
    pub title: String,
    pub description: String,
    pub reporter: String,
    #[serde(default)]
    pub priority: TicketPriority,
    pub assignee: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Query parameters for listing tickets
#[derive(Debug, Deserialize)]
pub struct ListTicketsParams {
    /// Filter by current status.
    pub status: Option<String>,
}

/// Request body for adding a comment
#[derive(Debug, Deserialize)]
pub struct CommentBody {
    pub author: String,
    pub body: String,
}

/// Request body for assigning a ticket
#[derive(Debug, Deserialize)]
pub struct AssignBody {
    pub assignee: String,
}

/// Request body for a status transition
#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    pub target_status: TicketStatus,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a new ticket
pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTicketBody>,
) -> Result<(StatusCode, Json<Ticket>), (StatusCode, Json<ErrorBody>)> {
    let request = CreateTicketRequest {
        title: body.title,
        description: body.description,
        reporter: body.reporter,
        priority: body.priority,
        assignee: body.assignee,
        tags: body.tags,
    };

    let ticket = state
        .lifecycle()
        .create_ticket(request)
        .map_err(ticket_error_response)?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// List tickets, optionally filtered by status
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTicketsParams>,
) -> Result<Json<Vec<Ticket>>, (StatusCode, Json<ErrorBody>)> {
    let mut filter = TicketFilter::new();

    if let Some(ref status) = params.status {
        let status = TicketStatus::parse(status).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::new(format!("unknown status: {}", status))),
            )
        })?;
        filter = filter.with_status(status);
    }

    let tickets = state
        .tickets()
        .list(&filter)
        .map_err(ticket_error_response)?;
    Ok(Json(tickets))
}

/// Get a ticket by ID
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Ticket>, (StatusCode, Json<ErrorBody>)> {
    let ticket = state.tickets().get(&id).map_err(ticket_error_response)?;
    Ok(Json(ticket))
}

/// Append a comment to a ticket
pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<CommentBody>,
) -> Result<Json<Ticket>, (StatusCode, Json<ErrorBody>)> {
    let ticket = state
        .lifecycle()
        .add_comment(&id, &body.author, &body.body)
        .map_err(ticket_error_response)?;
    Ok(Json(ticket))
}

/// Assign a ticket
pub async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AssignBody>,
) -> Result<Json<Ticket>, (StatusCode, Json<ErrorBody>)> {
    let ticket = state
        .lifecycle()
        .assign(&id, &body.assignee)
        .map_err(ticket_error_response)?;
    Ok(Json(ticket))
}

/// Transition a ticket's status
pub async fn transition_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<TransitionBody>,
) -> Result<Json<Ticket>, (StatusCode, Json<ErrorBody>)> {
    let ticket = state
        .lifecycle()
        .transition(&id, body.target_status)
        .map_err(ticket_error_response)?;
    Ok(Json(ticket))
}
