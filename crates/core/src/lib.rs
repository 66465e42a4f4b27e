pub mod config;
pub mod event;
pub mod integration;
pub mod lifecycle;
pub mod metrics;
pub mod testing;
pub mod ticket;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use event::{DomainEvent, EventKind, EventLogError, SqliteEventLog};
pub use integration::{
    run_status_for, DeliveryError, DispatchError, DispatchOutcome, Dispatcher, DispatcherHandle,
    GithubClient, GithubConfig, IntegrationClient, IntegrationTarget, IntegrationsConfig,
    JiraClient, JiraConfig, PushRecord, PushStatus, PushStoreError, RetryConfig,
    SqlitePushRecordStore, TestRailClient, TestRailConfig,
};
pub use lifecycle::{CreateTicketRequest, LifecycleManager};
pub use ticket::{
    Comment, SqliteTicketStore, Ticket, TicketError, TicketFilter, TicketPriority, TicketStatus,
};
