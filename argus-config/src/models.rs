use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

/// Resolved runtime configuration for the whole service.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerSettings,
    pub admission: AdmissionSettings,
    pub dispatcher: DispatcherSettings,
    pub retention: RetentionSettings,
    pub notifier: NotifierSettings,
    /// Accounts opened at startup. When empty the server seeds a demo
    /// account and logs its id.
    pub accounts: Vec<AccountSeed>,
    pub metadata: ConfigMetadata,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            admission: AdmissionSettings::default(),
            dispatcher: DispatcherSettings::default(),
            retention: RetentionSettings::default(),
            notifier: NotifierSettings::default(),
            accounts: Vec::new(),
            metadata: ConfigMetadata::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Admission-side limits: the request-rate window checked before any
/// ledger reservation.
#[derive(Debug, Clone)]
pub struct AdmissionSettings {
    /// Maximum submissions per account within `rate_window`.
    pub rate_limit: u32,
    pub rate_window: Duration,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            rate_limit: 10,
            rate_window: Duration::from_secs(60),
        }
    }
}

/// Worker pool sizing and retry/timeout policy.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub workers: usize,
    /// Total invocation attempts per task, first try included.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Cooperative "wrap up" signal fired at this point of each attempt.
    pub soft_deadline: Duration,
    /// Forcible per-attempt cutoff; expiry is a terminal timeout failure.
    pub hard_deadline: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            soft_deadline: Duration::from_secs(25),
            hard_deadline: Duration::from_secs(30),
        }
    }
}

/// Task store retention: how long terminal records stay readable and how
/// often the sweep runs.
#[derive(Debug, Clone)]
pub struct RetentionSettings {
    pub terminal_ttl: Duration,
    pub sweep_interval: Duration,
    /// Most recent task ids kept per account for the history listing.
    pub history_depth: usize,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            terminal_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            history_depth: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifierSettings {
    /// Broadcast buffer per task channel.
    pub channel_capacity: usize,
    /// Drop a task's channel once its terminal transition is published.
    pub close_on_terminal: bool,
    pub heartbeat_interval: Duration,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            close_on_terminal: true,
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}

/// One account opened in the ledger at startup.
#[derive(Debug, Clone)]
pub struct AccountSeed {
    pub id: Uuid,
    pub credits: u64,
    pub active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

/// Non-fatal finding from loading or validation; `main` logs these.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

impl ConfigWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push(&mut self, warning: ConfigWarning) {
        self.items.push(warning);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
