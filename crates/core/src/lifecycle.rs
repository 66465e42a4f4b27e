//! Ticket lifecycle manager.
//!
//! Validates and applies every ticket mutation: create, comment, assign,
//! and status transitions. Each mutation runs inside the store's per-ticket
//! critical section; the domain event is appended within that same section,
//! so per-ticket event sequences exactly match mutation order. The
//! integration dispatcher is notified after the mutation commits and never
//! blocks or fails the mutation path.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::event::{EventKind, SqliteEventLog};
use crate::integration::DispatcherHandle;
use crate::ticket::{
    Comment, SqliteTicketStore, Ticket, TicketError, TicketPriority, TicketStatus,
};

/// Request to create a new ticket.
#[derive(Debug, Clone)]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: String,
    pub reporter: String,
    pub priority: TicketPriority,
    pub assignee: Option<String>,
    pub tags: Vec<String>,
}

/// Validates and applies ticket mutations. The single writer of `status`.
pub struct LifecycleManager {
    store: Arc<SqliteTicketStore>,
    events: Arc<SqliteEventLog>,
    dispatcher: Option<DispatcherHandle>,
}

impl LifecycleManager {
    /// Create a new lifecycle manager without integration notifications.
    pub fn new(store: Arc<SqliteTicketStore>, events: Arc<SqliteEventLog>) -> Self {
        Self {
            store,
            events,
            dispatcher: None,
        }
    }

    /// Sets the dispatcher handle notified after each committed mutation.
    pub fn with_dispatcher(mut self, dispatcher: DispatcherHandle) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Create a ticket in state `open` and record the `created` event.
    pub fn create_ticket(&self, request: CreateTicketRequest) -> Result<Ticket, TicketError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(TicketError::Validation("title must not be empty".to_string()));
        }
        if request.description.trim().is_empty() {
            return Err(TicketError::Validation(
                "description must not be empty".to_string(),
            ));
        }
        if request.reporter.trim().is_empty() {
            return Err(TicketError::Validation(
                "reporter must not be empty".to_string(),
            ));
        }
        if let Some(ref assignee) = request.assignee {
            if assignee.trim().is_empty() {
                return Err(TicketError::Validation(
                    "assignee must not be empty".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let ticket = Ticket {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: request.description,
            reporter: request.reporter,
            assignee: request.assignee,
            priority: request.priority,
            status: TicketStatus::Open,
            tags: dedup_tags(request.tags),
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let ticket = self.store.create(ticket)?;
        self.events
            .append(
                &ticket.id,
                EventKind::Created {
                    title: ticket.title.clone(),
                    reporter: ticket.reporter.clone(),
                    priority: ticket.priority,
                },
            )
            .map_err(|e| TicketError::Database(e.to_string()))?;

        debug!(ticket_id = %ticket.id, "ticket created");
        self.notify(&ticket.id);
        Ok(ticket)
    }

    /// Append a comment and record the `commented` event.
    pub fn add_comment(&self, id: &str, author: &str, body: &str) -> Result<Ticket, TicketError> {
        let author = author.trim();
        let body = body.trim();
        if author.is_empty() {
            return Err(TicketError::Validation(
                "comment author must not be empty".to_string(),
            ));
        }
        if body.is_empty() {
            return Err(TicketError::Validation(
                "comment body must not be empty".to_string(),
            ));
        }

        let comment = Comment {
            author: author.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        };

        let events = Arc::clone(&self.events);
        let (updated, _) = self.store.mutate(id, move |ticket| {
            ticket.comments.push(comment.clone());
            events
                .append(
                    &ticket.id,
                    EventKind::Commented {
                        author: comment.author.clone(),
                    },
                )
                .map_err(|e| TicketError::Database(e.to_string()))
        })?;

        self.notify(&updated.id);
        Ok(updated)
    }

    /// Set the assignee and record the `assigned` event.
    pub fn assign(&self, id: &str, assignee: &str) -> Result<Ticket, TicketError> {
        let assignee = assignee.trim();
        if assignee.is_empty() {
            return Err(TicketError::Validation(
                "assignee must not be empty".to_string(),
            ));
        }

        let assignee = assignee.to_string();
        let events = Arc::clone(&self.events);
        let (updated, _) = self.store.mutate(id, move |ticket| {
            ticket.assignee = Some(assignee.clone());
            events
                .append(&ticket.id, EventKind::Assigned { assignee })
                .map_err(|e| TicketError::Database(e.to_string()))
        })?;

        self.notify(&updated.id);
        Ok(updated)
    }

    /// Transition the ticket's status and record the `transitioned` event.
    ///
    /// Fails with `InvalidTransition` when the target is not reachable from
    /// the current status, including any transition out of `closed`.
    pub fn transition(&self, id: &str, target: TicketStatus) -> Result<Ticket, TicketError> {
        let events = Arc::clone(&self.events);
        let (updated, _) = self.store.mutate(id, move |ticket| {
            let from = ticket.status;
            if !from.can_transition_to(target) {
                return Err(TicketError::InvalidTransition { from, to: target });
            }
            ticket.status = target;
            events
                .append(&ticket.id, EventKind::Transitioned { from, to: target })
                .map_err(|e| TicketError::Database(e.to_string()))
        })?;

        debug!(ticket_id = %updated.id, status = %updated.status, "ticket transitioned");
        self.notify(&updated.id);
        Ok(updated)
    }

    // Fire-and-forget wakeup for the integration workers; never blocks and
    // never fails the mutation that triggered it.
    fn notify(&self, ticket_id: &str) {
        if let Some(ref dispatcher) = self.dispatcher {
            dispatcher.try_notify(ticket_id);
        }
    }
}

/// Deduplicate tags, keeping the first occurrence and insertion order.
fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}
