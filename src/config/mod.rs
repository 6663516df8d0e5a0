//! Configuration module for querygate.
//!
//! Handles the TOML settings file and environment variable expansion.

mod settings;

pub use settings::{
    expand_env_vars, SafetySettings, Settings, SettingsError, TenantSettings, TrendSettings,
};
