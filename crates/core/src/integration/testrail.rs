//! TestRail run push client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::event::{DomainEvent, EventKind};
use crate::ticket::{Ticket, TicketStatus};

use super::client::{check_response_status, transport_error};
use super::config::TestRailConfig;
use super::{DeliveryError, IntegrationClient, IntegrationTarget};

/// Pushes ticket state to TestRail as a test run.
///
/// `created` adds a run under the configured project; later events update
/// that run's description with the projected run status.
pub struct TestRailClient {
    client: Client,
    config: TestRailConfig,
}

#[derive(Debug, Deserialize)]
struct CreatedRun {
    id: u64,
}

impl TestRailClient {
    /// Create a new TestRail client with the given configuration.
    pub fn new(config: TestRailConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/index.php?/api/v2/{}",
            self.config.url.trim_end_matches('/'),
            method
        )
    }

    async fn post_json(
        &self,
        url: &str,
        payload: serde_json::Value,
    ) -> Result<String, DeliveryError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(IntegrationTarget::Testrail, e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        check_response_status(IntegrationTarget::Testrail, status, &body)?;
        Ok(body)
    }
}

#[async_trait]
impl IntegrationClient for TestRailClient {
    fn target(&self) -> IntegrationTarget {
        IntegrationTarget::Testrail
    }

    async fn deliver(
        &self,
        ticket: &Ticket,
        event: &DomainEvent,
        remote_ref: Option<&str>,
    ) -> Result<Option<String>, DeliveryError> {
        if let EventKind::Created { .. } = event.kind {
            let url = self.api_url(&format!("add_run/{}", self.config.project_id));
            let payload = json!({
                "name": ticket.title,
                "description": ticket.description,
                "refs": ticket.id,
            });
            let body = self.post_json(&url, payload).await?;
            let created: CreatedRun = serde_json::from_str(&body).map_err(|e| {
                DeliveryError::Transient(format!("testrail returned unparseable response: {}", e))
            })?;
            debug!(run_id = created.id, ticket_id = %ticket.id, "testrail run created");
            return Ok(Some(created.id.to_string()));
        }

        let run_id = remote_ref.ok_or_else(|| {
            DeliveryError::Permanent(format!("no testrail run reference for ticket {}", ticket.id))
        })?;

        let url = self.api_url(&format!("update_run/{}", urlencoding::encode(run_id)));
        let payload = json!({
            "description": format!(
                "{}\n\nrun status: {}",
                ticket.description,
                run_status_for(ticket.status)
            ),
        });
        self.post_json(&url, payload).await?;
        Ok(None)
    }
}

/// TestRail run status projected from a ticket status.
pub fn run_status_for(status: TicketStatus) -> &'static str {
    match status {
        TicketStatus::Open => "not_ready",
        TicketStatus::InProgress => "queued",
        TicketStatus::Blocked => "blocked",
        TicketStatus::Resolved => "completed",
        TicketStatus::Closed => "completed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_mapping() {
        assert_eq!(run_status_for(TicketStatus::Open), "not_ready");
        assert_eq!(run_status_for(TicketStatus::InProgress), "queued");
        assert_eq!(run_status_for(TicketStatus::Blocked), "blocked");
        assert_eq!(run_status_for(TicketStatus::Resolved), "completed");
        assert_eq!(run_status_for(TicketStatus::Closed), "completed");
    }

    #[test]
    fn test_api_url() {
        let client = TestRailClient::new(TestRailConfig {
            url: "https://example.testrail.io/".to_string(),
            api_key: "secret".to_string(),
            project_id: 7,
            timeout_secs: 5,
        });
        assert_eq!(
            client.api_url("add_run/7"),
            "https://example.testrail.io/index.php?/api/v2/add_run/7"
        );
    }
}
