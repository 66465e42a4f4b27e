//! Domain event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ticket::{TicketPriority, TicketStatus};

/// What happened to a ticket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// Ticket was created.
    Created {
        title: String,
        reporter: String,
        priority: TicketPriority,
    },

    /// A comment was appended.
    Commented { author: String },

    /// The assignee was set.
    Assigned { assignee: String },

    /// The status changed.
    Transitioned {
        from: TicketStatus,
        to: TicketStatus,
    },
}

impl EventKind {
    /// Returns the kind as a string (for storage and filtering).
    pub fn kind_name(&self) -> &'static str {
        match self {
            EventKind::Created { .. } => "created",
            EventKind::Commented { .. } => "commented",
            EventKind::Assigned { .. } => "assigned",
            EventKind::Transitioned { .. } => "transitioned",
        }
    }
}

/// An immutable record of one mutation applied to a ticket.
///
/// Sequences are per-ticket, contiguous and start at 1; they match the
/// order in which mutations were applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainEvent {
    /// Ticket the event belongs to.
    pub ticket_id: String,
    /// Per-ticket monotonic sequence number, starting at 1.
    pub sequence: u64,
    /// When the mutation was applied.
    pub occurred_at: DateTime<Utc>,
    /// Kind-specific payload.
    #[serde(flatten)]
    pub kind: EventKind,
}
