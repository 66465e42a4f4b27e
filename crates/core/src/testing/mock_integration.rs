//! Mock integration client for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::event::DomainEvent;
use crate::integration::{DeliveryError, IntegrationClient, IntegrationTarget};
use crate::ticket::Ticket;

/// A recorded delivery for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDelivery {
    /// Ticket the event belonged to.
    pub ticket_id: String,
    /// Event sequence that was delivered.
    pub sequence: u64,
    /// Remote reference passed in by the dispatcher.
    pub remote_ref: Option<String>,
}

enum ScriptedOutcome {
    Succeed,
    Transient(String),
    Permanent(String),
}

/// Mock implementation of the [`IntegrationClient`] trait.
///
/// Provides controllable behavior for testing:
/// - Script failures for upcoming attempts
/// - Track successful deliveries and total attempts for assertions
///
/// Attempts consume the scripted outcomes in order; once the script is
/// empty every attempt succeeds.
pub struct MockIntegrationClient {
    target: IntegrationTarget,
    script: Mutex<VecDeque<ScriptedOutcome>>,
    deliveries: Mutex<Vec<RecordedDelivery>>,
    attempts: Mutex<u32>,
}

impl MockIntegrationClient {
    /// Create a mock client for a target; every attempt succeeds.
    pub fn new(target: IntegrationTarget) -> Self {
        Self {
            target,
            script: Mutex::new(VecDeque::new()),
            deliveries: Mutex::new(Vec::new()),
            attempts: Mutex::new(0),
        }
    }

    /// Queue `n` transient failures before attempts succeed again.
    pub fn fail_transient(&self, n: usize) {
        let mut script = self.script.lock().unwrap();
        for _ in 0..n {
            script.push_back(ScriptedOutcome::Transient("connection refused".to_string()));
        }
    }

    /// Queue one permanent rejection.
    pub fn fail_permanent(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptedOutcome::Permanent(message.to_string()));
    }

    /// Successful deliveries in order.
    pub fn deliveries(&self) -> Vec<RecordedDelivery> {
        self.deliveries.lock().unwrap().clone()
    }

    /// Total attempts, including failed ones.
    pub fn attempt_count(&self) -> u32 {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl IntegrationClient for MockIntegrationClient {
    fn target(&self) -> IntegrationTarget {
        self.target
    }

    async fn deliver(
        &self,
        ticket: &Ticket,
        event: &DomainEvent,
        remote_ref: Option<&str>,
    ) -> Result<Option<String>, DeliveryError> {
        *self.attempts.lock().unwrap() += 1;

        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ScriptedOutcome::Succeed);

        match outcome {
            ScriptedOutcome::Transient(msg) => Err(DeliveryError::Transient(msg)),
            ScriptedOutcome::Permanent(msg) => Err(DeliveryError::Permanent(msg)),
            ScriptedOutcome::Succeed => {
                self.deliveries.lock().unwrap().push(RecordedDelivery {
                    ticket_id: ticket.id.clone(),
                    sequence: event.sequence,
                    remote_ref: remote_ref.map(String::from),
                });
                // Establish a remote reference on the first delivery.
                if remote_ref.is_none() && event.sequence == 1 {
                    Ok(Some(format!("{}-{}", self.target, event.sequence)))
                } else {
                    Ok(None)
                }
            }
        }
    }
}
