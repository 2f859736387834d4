//! Assembly of the core components into a ready [`AppState`].

use std::sync::Arc;

use tracing::info;

use argus_config::Config;
use argus_core::{
    AdmissionController, CollectorRegistry, DispatchPolicy, Dispatcher, Ledger,
    NotifyPolicy, RateLimitPolicy, TaskNotifier, TaskStore,
    store::RetentionPolicy,
};
use argus_model::AccountId;

use crate::infra::app_state::AppState;

/// Build every component from the resolved config and start the worker
/// pool and eviction sweep. The registry is supplied by the caller so
/// tests can wire scripted collectors.
pub fn wire_app_state(
    config: Arc<Config>,
    registry: Arc<CollectorRegistry>,
) -> AppState {
    let ledger = Arc::new(Ledger::new());
    seed_accounts(&ledger, &config);

    let notifier = Arc::new(TaskNotifier::new(NotifyPolicy {
        channel_capacity: config.notifier.channel_capacity,
        close_on_terminal: config.notifier.close_on_terminal,
    }));

    let store = Arc::new(TaskStore::new(
        RetentionPolicy {
            terminal_ttl: config.retention.terminal_ttl,
            sweep_interval: config.retention.sweep_interval,
            history_depth: config.retention.history_depth,
        },
        notifier.clone(),
    ));
    // Detached; the sweep stops once the store is dropped.
    let _ = store.clone().spawn_eviction();

    let dispatcher = Dispatcher::spawn(
        DispatchPolicy {
            workers: config.dispatcher.workers,
            max_attempts: config.dispatcher.max_attempts,
            backoff_base: config.dispatcher.backoff_base,
            backoff_max: config.dispatcher.backoff_max,
            soft_deadline: config.dispatcher.soft_deadline,
            hard_deadline: config.dispatcher.hard_deadline,
        },
        store.clone(),
        registry.clone(),
    );

    let admission = Arc::new(AdmissionController::new(
        RateLimitPolicy {
            limit: config.admission.rate_limit,
            window: config.admission.rate_window,
        },
        ledger.clone(),
        registry.clone(),
        store.clone(),
        dispatcher.clone(),
    ));

    AppState {
        config,
        ledger,
        registry,
        store,
        notifier,
        admission,
        dispatcher,
    }
}

fn seed_accounts(ledger: &Ledger, config: &Config) {
    if config.accounts.is_empty() {
        let demo = AccountId::new();
        ledger.open_account(demo, 50, true);
        info!(
            account_id = %demo,
            credits = 50,
            "no accounts configured; opened demo account"
        );
        return;
    }

    for seed in &config.accounts {
        ledger.open_account(AccountId::from(seed.id), seed.credits, seed.active);
    }
    info!(count = config.accounts.len(), "seeded accounts from config");
}
