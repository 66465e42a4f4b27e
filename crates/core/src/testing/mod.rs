//! Test doubles for integration points.

mod mock_integration;

pub use mock_integration::{MockIntegrationClient, RecordedDelivery};
