use std::sync::Arc;

use tickd_core::{
    Config, Dispatcher, LifecycleManager, SanitizedConfig, SqliteEventLog, SqlitePushRecordStore,
    SqliteTicketStore,
};

/// Shared application state
pub struct AppState {
    config: Config,
    lifecycle: Arc<LifecycleManager>,
    tickets: Arc<SqliteTicketStore>,
    events: Arc<SqliteEventLog>,
    push_records: Arc<SqlitePushRecordStore>,
    dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(
        config: Config,
        lifecycle: Arc<LifecycleManager>,
        tickets: Arc<SqliteTicketStore>,
        events: Arc<SqliteEventLog>,
        push_records: Arc<SqlitePushRecordStore>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            config,
            lifecycle,
            tickets,
            events,
            push_records,
            dispatcher,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn tickets(&self) -> &SqliteTicketStore {
        &self.tickets
    }

    pub fn events(&self) -> &SqliteEventLog {
        &self.events
    }

    pub fn push_records(&self) -> &SqlitePushRecordStore {
        &self.push_records
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
