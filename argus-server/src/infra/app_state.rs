use std::sync::Arc;

use argus_config::Config;
use argus_core::{
    AdmissionController, CollectorRegistry, Dispatcher, Ledger, TaskNotifier,
    TaskStore,
};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: Arc<Ledger>,
    pub registry: Arc<CollectorRegistry>,
    pub store: Arc<TaskStore>,
    pub notifier: Arc<TaskNotifier>,
    pub admission: Arc<AdmissionController>,
    pub dispatcher: Dispatcher,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("tasks", &self.store.len())
            .field("workers", &self.dispatcher.workers())
            .finish_non_exhaustive()
    }
}
