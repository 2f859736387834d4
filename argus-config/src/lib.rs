//! Shared configuration library for Argus.
//!
//! This crate centralizes config defaults, TOML loading, environment
//! overrides, and validation warnings. The server re-exports these
//! utilities so there is a single source of truth for settings and their
//! guard rails.

pub mod loader;
pub mod models;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader};
pub use models::{
    AccountSeed, AdmissionSettings, Config, ConfigMetadata, ConfigWarning,
    ConfigWarnings, DispatcherSettings, NotifierSettings, RetentionSettings,
    ServerSettings,
};
