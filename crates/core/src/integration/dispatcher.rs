//! Integration dispatcher.
//!
//! Consumes domain events and pushes ticket state to configured external
//! systems without ever blocking the mutation path. Each target gets its
//! own worker task fed by a bounded wakeup queue; a wakeup makes the worker
//! drain *all* undelivered events for that ticket in sequence order, so a
//! dropped or reordered wakeup can delay delivery but never skip or reorder
//! it. Delivery progress lives in the push record store, which doubles as
//! the idempotency marker across restarts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::event::{EventLogError, SqliteEventLog};
use crate::metrics::{INTEGRATION_DELIVERIES_TOTAL, INTEGRATION_WAKEUPS_DROPPED_TOTAL};
use crate::ticket::{SqliteTicketStore, Ticket, TicketError};

use super::config::RetryConfig;
use super::push_records::{PushRecord, PushStatus, PushStoreError, SqlitePushRecordStore};
use super::{DeliveryError, IntegrationClient, IntegrationTarget};

/// Errors that can occur while dispatching.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No client configured for the requested target.
    #[error("integration target not configured: {0}")]
    TargetNotConfigured(IntegrationTarget),

    /// Unknown ticket id.
    #[error("ticket not found: {0}")]
    TicketNotFound(String),

    /// Ticket store error.
    #[error("ticket store error: {0}")]
    TicketStore(String),

    /// Event log error.
    #[error("event log error: {0}")]
    EventLog(#[from] EventLogError),

    /// Push record store error.
    #[error("push record error: {0}")]
    PushStore(#[from] PushStoreError),
}

/// Result of a manual "sync now" request.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    /// "delivered" when the target is caught up with the event log,
    /// "failed" on a permanent rejection, "pending" otherwise.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Wakeup for one ticket on one target's queue.
#[derive(Debug, Clone)]
struct DeliveryJob {
    ticket_id: String,
}

/// Handle for notifying the dispatcher that a ticket has new events.
///
/// Cheaply cloneable; `try_notify` never blocks. A full queue drops the
/// wakeup, which is safe because every wakeup drains all pending events.
#[derive(Clone, Default)]
pub struct DispatcherHandle {
    senders: Arc<HashMap<IntegrationTarget, mpsc::Sender<DeliveryJob>>>,
}

impl DispatcherHandle {
    /// Enqueue a delivery wakeup for every configured target.
    pub fn try_notify(&self, ticket_id: &str) {
        for (target, tx) in self.senders.iter() {
            let job = DeliveryJob {
                ticket_id: ticket_id.to_string(),
            };
            if tx.try_send(job).is_err() {
                INTEGRATION_WAKEUPS_DROPPED_TOTAL
                    .with_label_values(&[target.as_str()])
                    .inc();
                warn!(target = %target, ticket_id, "integration queue full, dropping wakeup");
            }
        }
    }

    /// Targets this handle notifies.
    pub fn targets(&self) -> Vec<IntegrationTarget> {
        self.senders.keys().copied().collect()
    }
}

enum EventOutcome {
    Delivered,
    PermanentlyFailed,
    RetriesExhausted,
}

struct DispatchShared {
    tickets: Arc<SqliteTicketStore>,
    events: Arc<SqliteEventLog>,
    push_records: Arc<SqlitePushRecordStore>,
    retry: RetryConfig,
}

/// Drives per-target workers that project ticket state to external systems.
pub struct Dispatcher {
    clients: HashMap<IntegrationTarget, Arc<dyn IntegrationClient>>,
    shared: Arc<DispatchShared>,
    queue_capacity: usize,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl Dispatcher {
    /// Create a new dispatcher over the given clients and stores.
    pub fn new(
        clients: Vec<Arc<dyn IntegrationClient>>,
        tickets: Arc<SqliteTicketStore>,
        events: Arc<SqliteEventLog>,
        push_records: Arc<SqlitePushRecordStore>,
        retry: RetryConfig,
        queue_capacity: usize,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let clients = clients
            .into_iter()
            .map(|c| (c.target(), c))
            .collect::<HashMap<_, _>>();

        Self {
            clients,
            shared: Arc::new(DispatchShared {
                tickets,
                events,
                push_records,
                retry,
            }),
            queue_capacity,
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Spawn one worker task per configured target and return the handle
    /// used to wake them up.
    pub fn start(&self) -> DispatcherHandle {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Dispatcher already running");
            return DispatcherHandle::default();
        }

        let mut senders = HashMap::new();
        for (target, client) in &self.clients {
            let (tx, rx) = mpsc::channel(self.queue_capacity.max(1));
            senders.insert(*target, tx);
            Self::spawn_worker(
                Arc::clone(client),
                Arc::clone(&self.shared),
                rx,
                self.shutdown_tx.subscribe(),
            );
        }

        info!(targets = senders.len(), "Integration dispatcher started");
        DispatcherHandle {
            senders: Arc::new(senders),
        }
    }

    /// Stop all workers gracefully. In-flight deliveries finish; undelivered
    /// sequences remain recorded in the push records for resumption.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping integration dispatcher");
        let _ = self.shutdown_tx.send(());
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    /// Manual on-demand push for one `(ticket, target)` pair.
    ///
    /// Runs the drain on the caller's task with a single attempt per event
    /// (no backoff sleeps). Retries events that previously failed
    /// permanently, but still never re-delivers an already delivered
    /// sequence.
    pub async fn sync_now(
        &self,
        ticket_id: &str,
        target: IntegrationTarget,
    ) -> Result<DispatchOutcome, DispatchError> {
        let client = self
            .clients
            .get(&target)
            .ok_or(DispatchError::TargetNotConfigured(target))?;

        // Surface unknown ids before touching any record.
        Self::load_ticket(&self.shared, ticket_id)?;

        let record = Self::drain_ticket(client.as_ref(), &self.shared, ticket_id, true).await?;
        let latest = self.shared.events.latest_sequence(ticket_id)?;

        let outcome = if record.last_delivered_sequence >= latest {
            DispatchOutcome {
                status: "delivered".to_string(),
                detail: None,
            }
        } else if record.status == PushStatus::Failed {
            DispatchOutcome {
                status: "failed".to_string(),
                detail: record.last_error,
            }
        } else {
            DispatchOutcome {
                status: "pending".to_string(),
                detail: record.last_error,
            }
        };
        Ok(outcome)
    }

    fn spawn_worker(
        client: Arc<dyn IntegrationClient>,
        shared: Arc<DispatchShared>,
        mut rx: mpsc::Receiver<DeliveryJob>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        tokio::spawn(async move {
            let target = client.target();
            info!(target = %target, "Integration worker started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(target = %target, "Integration worker received shutdown signal");
                        break;
                    }
                    job = rx.recv() => {
                        let Some(job) = job else { break };
                        if let Err(e) =
                            Self::drain_ticket(client.as_ref(), &shared, &job.ticket_id, false).await
                        {
                            warn!(target = %target, ticket_id = %job.ticket_id, "delivery drain failed: {}", e);
                        }
                    }
                }
            }
            info!(target = %target, "Integration worker stopped");
        });
    }

    fn load_ticket(shared: &DispatchShared, ticket_id: &str) -> Result<Ticket, DispatchError> {
        shared.tickets.get(ticket_id).map_err(|e| match e {
            TicketError::NotFound(id) => DispatchError::TicketNotFound(id),
            other => DispatchError::TicketStore(other.to_string()),
        })
    }

    /// Deliver all undelivered events for one `(ticket, target)` pair in
    /// sequence order. Returns the push record as of the end of the drain.
    async fn drain_ticket(
        client: &dyn IntegrationClient,
        shared: &DispatchShared,
        ticket_id: &str,
        manual: bool,
    ) -> Result<PushRecord, DispatchError> {
        let target = client.target();

        if manual {
            shared.push_records.reset_failure(ticket_id, target)?;
        }

        let mut record = shared.push_records.get_or_default(ticket_id, target)?;
        let pending = shared
            .events
            .read_since(ticket_id, record.last_delivered_sequence)?;

        for event in pending {
            // Idempotency: never re-deliver a delivered sequence.
            if event.sequence <= record.last_delivered_sequence {
                continue;
            }
            // A permanent verdict sticks until a manual sync clears it.
            if !manual
                && record.status == PushStatus::Failed
                && event.sequence <= record.last_attempted_sequence
            {
                continue;
            }

            let ticket = Self::load_ticket(shared, ticket_id)?;
            match Self::attempt_event(client, shared, &ticket, &event, &record, manual).await? {
                EventOutcome::Delivered => {}
                EventOutcome::PermanentlyFailed => {
                    // The target rejected this payload; later events are
                    // independent of it.
                }
                EventOutcome::RetriesExhausted => break,
            }
            record = shared.push_records.get_or_default(ticket_id, target)?;
        }

        Ok(record)
    }

    async fn attempt_event(
        client: &dyn IntegrationClient,
        shared: &DispatchShared,
        ticket: &Ticket,
        event: &crate::event::DomainEvent,
        record: &PushRecord,
        manual: bool,
    ) -> Result<EventOutcome, DispatchError> {
        let target = client.target();
        let max_attempts = if manual {
            1
        } else {
            shared.retry.max_attempts.max(1)
        };

        let mut attempt = 1;
        loop {
            shared
                .push_records
                .record_attempt(&ticket.id, target, event.sequence)?;

            match client
                .deliver(ticket, event, record.remote_ref.as_deref())
                .await
            {
                Ok(new_ref) => {
                    shared.push_records.mark_delivered(
                        &ticket.id,
                        target,
                        event.sequence,
                        new_ref.as_deref(),
                    )?;
                    INTEGRATION_DELIVERIES_TOTAL
                        .with_label_values(&[target.as_str(), "delivered"])
                        .inc();
                    debug!(target = %target, ticket_id = %ticket.id, sequence = event.sequence, "event delivered");
                    return Ok(EventOutcome::Delivered);
                }
                Err(DeliveryError::Permanent(msg)) => {
                    shared
                        .push_records
                        .mark_failed(&ticket.id, target, event.sequence, &msg)?;
                    INTEGRATION_DELIVERIES_TOTAL
                        .with_label_values(&[target.as_str(), "permanent_failure"])
                        .inc();
                    warn!(target = %target, ticket_id = %ticket.id, sequence = event.sequence, "delivery permanently rejected: {}", msg);
                    return Ok(EventOutcome::PermanentlyFailed);
                }
                Err(DeliveryError::Transient(msg)) => {
                    if attempt >= max_attempts {
                        shared
                            .push_records
                            .record_transient(&ticket.id, target, &msg)?;
                        INTEGRATION_DELIVERIES_TOTAL
                            .with_label_values(&[target.as_str(), "retries_exhausted"])
                            .inc();
                        warn!(target = %target, ticket_id = %ticket.id, sequence = event.sequence, "delivery attempts exhausted: {}", msg);
                        return Ok(EventOutcome::RetriesExhausted);
                    }
                    let delay = shared.retry.delay_after(attempt);
                    debug!(
                        target = %target,
                        ticket_id = %ticket.id,
                        sequence = event.sequence,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient delivery failure, backing off: {}",
                        msg
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
