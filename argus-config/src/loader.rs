//! Layered configuration loading: defaults, then an optional TOML file,
//! then `ARGUS_*` environment overrides. Problems that have a safe
//! fallback become [`ConfigWarning`]s instead of hard errors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::models::{
    AccountSeed, Config, ConfigWarning, ConfigWarnings,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid duration for `{key}`: {value:?}")]
    BadDuration { key: &'static str, value: String },
}

/// Result of a load: the resolved config plus any non-fatal findings.
#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit config file path; when unset, `ARGUS_CONFIG` is consulted
    /// and a missing file is simply skipped.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn load(self) -> Result<ConfigLoad, ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();
        let mut config = Config::default();

        let path = self
            .path
            .or_else(|| std::env::var("ARGUS_CONFIG").ok().map(PathBuf::from));

        if let Some(path) = path {
            if path.exists() {
                let file = read_config_file(&path)?;
                apply_file(&mut config, file, &mut warnings)?;
                config.metadata.config_path = Some(path);
            } else {
                warnings.push(ConfigWarning::with_hint(
                    format!("config file {} not found", path.display()),
                    "continuing with defaults and environment overrides",
                ));
            }
        }

        apply_env(&mut config, std::env::vars(), &mut warnings);
        validate(&mut config, &mut warnings);

        Ok(ConfigLoad { config, warnings })
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigLoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| {
        ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        }
    })?;
    toml::from_str(&raw).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// On-disk layout. Every field is optional; absent sections keep their
/// defaults. Durations are humantime strings ("30s", "1h").
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    server: Option<ServerSection>,
    admission: Option<AdmissionSection>,
    dispatcher: Option<DispatcherSection>,
    retention: Option<RetentionSection>,
    notifier: Option<NotifierSection>,
    #[serde(default)]
    accounts: Vec<AccountSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerSection {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AdmissionSection {
    rate_limit: Option<u32>,
    rate_window: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DispatcherSection {
    workers: Option<usize>,
    max_attempts: Option<u32>,
    backoff_base: Option<String>,
    backoff_max: Option<String>,
    soft_deadline: Option<String>,
    hard_deadline: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RetentionSection {
    terminal_ttl: Option<String>,
    sweep_interval: Option<String>,
    history_depth: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NotifierSection {
    channel_capacity: Option<usize>,
    close_on_terminal: Option<bool>,
    heartbeat_interval: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AccountSection {
    id: Uuid,
    credits: u64,
    #[serde(default = "default_true")]
    active: bool,
}

fn default_true() -> bool {
    true
}

fn parse_file_duration(
    key: &'static str,
    value: Option<String>,
) -> Result<Option<Duration>, ConfigLoadError> {
    match value {
        None => Ok(None),
        Some(raw) => humantime::parse_duration(&raw)
            .map(Some)
            .map_err(|_| ConfigLoadError::BadDuration { key, value: raw }),
    }
}

fn apply_file(
    config: &mut Config,
    file: ConfigFile,
    _warnings: &mut ConfigWarnings,
) -> Result<(), ConfigLoadError> {
    if let Some(server) = file.server {
        if let Some(host) = server.host {
            config.server.host = host;
        }
        if let Some(port) = server.port {
            config.server.port = port;
        }
    }

    if let Some(admission) = file.admission {
        if let Some(limit) = admission.rate_limit {
            config.admission.rate_limit = limit;
        }
        if let Some(window) =
            parse_file_duration("admission.rate_window", admission.rate_window)?
        {
            config.admission.rate_window = window;
        }
    }

    if let Some(dispatcher) = file.dispatcher {
        if let Some(workers) = dispatcher.workers {
            config.dispatcher.workers = workers;
        }
        if let Some(attempts) = dispatcher.max_attempts {
            config.dispatcher.max_attempts = attempts;
        }
        if let Some(d) = parse_file_duration(
            "dispatcher.backoff_base",
            dispatcher.backoff_base,
        )? {
            config.dispatcher.backoff_base = d;
        }
        if let Some(d) =
            parse_file_duration("dispatcher.backoff_max", dispatcher.backoff_max)?
        {
            config.dispatcher.backoff_max = d;
        }
        if let Some(d) = parse_file_duration(
            "dispatcher.soft_deadline",
            dispatcher.soft_deadline,
        )? {
            config.dispatcher.soft_deadline = d;
        }
        if let Some(d) = parse_file_duration(
            "dispatcher.hard_deadline",
            dispatcher.hard_deadline,
        )? {
            config.dispatcher.hard_deadline = d;
        }
    }

    if let Some(retention) = file.retention {
        if let Some(d) =
            parse_file_duration("retention.terminal_ttl", retention.terminal_ttl)?
        {
            config.retention.terminal_ttl = d;
        }
        if let Some(d) = parse_file_duration(
            "retention.sweep_interval",
            retention.sweep_interval,
        )? {
            config.retention.sweep_interval = d;
        }
        if let Some(depth) = retention.history_depth {
            config.retention.history_depth = depth;
        }
    }

    if let Some(notifier) = file.notifier {
        if let Some(capacity) = notifier.channel_capacity {
            config.notifier.channel_capacity = capacity;
        }
        if let Some(close) = notifier.close_on_terminal {
            config.notifier.close_on_terminal = close;
        }
        if let Some(d) = parse_file_duration(
            "notifier.heartbeat_interval",
            notifier.heartbeat_interval,
        )? {
            config.notifier.heartbeat_interval = d;
        }
    }

    for account in file.accounts {
        config.accounts.push(AccountSeed {
            id: account.id,
            credits: account.credits,
            active: account.active,
        });
    }

    Ok(())
}

/// Environment overrides, separated from `std::env` so tests can feed a
/// plain list of pairs.
fn apply_env(
    config: &mut Config,
    vars: impl IntoIterator<Item = (String, String)>,
    warnings: &mut ConfigWarnings,
) {
    for (key, value) in vars {
        match key.as_str() {
            "ARGUS_HOST" => config.server.host = value,
            "ARGUS_PORT" => {
                override_parsed(&key, &value, &mut config.server.port, warnings)
            }
            "ARGUS_WORKERS" => override_parsed(
                &key,
                &value,
                &mut config.dispatcher.workers,
                warnings,
            ),
            "ARGUS_MAX_ATTEMPTS" => override_parsed(
                &key,
                &value,
                &mut config.dispatcher.max_attempts,
                warnings,
            ),
            "ARGUS_RATE_LIMIT" => override_parsed(
                &key,
                &value,
                &mut config.admission.rate_limit,
                warnings,
            ),
            "ARGUS_RATE_WINDOW" => override_duration(
                &key,
                &value,
                &mut config.admission.rate_window,
                warnings,
            ),
            "ARGUS_SOFT_DEADLINE" => override_duration(
                &key,
                &value,
                &mut config.dispatcher.soft_deadline,
                warnings,
            ),
            "ARGUS_HARD_DEADLINE" => override_duration(
                &key,
                &value,
                &mut config.dispatcher.hard_deadline,
                warnings,
            ),
            "ARGUS_TERMINAL_TTL" => override_duration(
                &key,
                &value,
                &mut config.retention.terminal_ttl,
                warnings,
            ),
            "ARGUS_HEARTBEAT_INTERVAL" => override_duration(
                &key,
                &value,
                &mut config.notifier.heartbeat_interval,
                warnings,
            ),
            _ => {}
        }
    }
}

fn override_parsed<T: std::str::FromStr>(
    key: &str,
    value: &str,
    slot: &mut T,
    warnings: &mut ConfigWarnings,
) {
    match value.parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warnings.push(ConfigWarning::with_hint(
            format!("ignoring {key}={value:?}"),
            "value does not parse; keeping previous setting",
        )),
    }
}

fn override_duration(
    key: &str,
    value: &str,
    slot: &mut Duration,
    warnings: &mut ConfigWarnings,
) {
    match humantime::parse_duration(value) {
        Ok(parsed) => *slot = parsed,
        Err(_) => warnings.push(ConfigWarning::with_hint(
            format!("ignoring {key}={value:?}"),
            "expected a duration like \"30s\" or \"1h\"",
        )),
    }
}

/// Guard rails: settings a misconfigured deployment would trip over get
/// clamped to workable values, with a warning, rather than failing boot.
fn validate(config: &mut Config, warnings: &mut ConfigWarnings) {
    if config.dispatcher.workers == 0 {
        warnings.push(ConfigWarning::new(
            "dispatcher.workers = 0 would accept work and never run it; using 1",
        ));
        config.dispatcher.workers = 1;
    }

    if config.dispatcher.max_attempts == 0 {
        warnings.push(ConfigWarning::new(
            "dispatcher.max_attempts = 0 is treated as 1",
        ));
        config.dispatcher.max_attempts = 1;
    }

    if config.dispatcher.hard_deadline <= config.dispatcher.soft_deadline {
        warnings.push(ConfigWarning::with_hint(
            "dispatcher.hard_deadline must exceed soft_deadline",
            "the wrap-up signal would never fire before the forcible cutoff",
        ));
        config.dispatcher.hard_deadline =
            config.dispatcher.soft_deadline + Duration::from_secs(5);
    }

    if config.admission.rate_limit == 0 {
        warnings.push(ConfigWarning::new(
            "admission.rate_limit = 0 rejects every submission; using 1",
        ));
        config.admission.rate_limit = 1;
    }

    if config.notifier.channel_capacity == 0 {
        config.notifier.channel_capacity = 1;
    }
}
