//! Prometheus metrics exposed by the core crate.
//!
//! The server registers these into its registry via [`all_metrics`].

use once_cell::sync::Lazy;
use prometheus::{core::Collector, IntCounterVec, Opts};

/// Integration delivery outcomes by target.
pub static INTEGRATION_DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tickd_integration_deliveries_total",
            "Integration delivery outcomes",
        ),
        &["target", "outcome"],
    )
    .unwrap()
});

/// Wakeups dropped because a target queue was full.
pub static INTEGRATION_WAKEUPS_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tickd_integration_wakeups_dropped_total",
            "Integration wakeups dropped due to a full queue",
        ),
        &["target"],
    )
    .unwrap()
});

/// All core metrics, for registration in the server's registry.
pub fn all_metrics() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(INTEGRATION_DELIVERIES_TOTAL.clone()),
        Box::new(INTEGRATION_WAKEUPS_DROPPED_TOTAL.clone()),
    ]
}
