pub mod handlers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod tickets;

pub use routes::create_router;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tickd_core::TicketError;

/// Error body shared by all endpoints. The client surfaces `detail` verbatim.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl ErrorBody {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Map a ticket error to its HTTP response.
pub fn ticket_error_response(error: TicketError) -> (StatusCode, Json<ErrorBody>) {
    let status = match &error {
        TicketError::Validation(_) => StatusCode::BAD_REQUEST,
        TicketError::NotFound(_) => StatusCode::NOT_FOUND,
        TicketError::InvalidTransition { .. } => StatusCode::CONFLICT,
        TicketError::Conflict(_) => StatusCode::CONFLICT,
        TicketError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorBody::new(error.to_string())))
}
