//! TOML-based configuration for querygate.
//!
//! Supports a config file (querygate.toml) with environment variable expansion
//! in the catalog path.
//!
//! Example configuration:
//! ```toml
//! catalog = "${QG_HOME}/catalog.toml"
//!
//! [tenant]
//! param = "restaurant"
//!
//! [trend]
//! recent_weeks = 2
//! prior_weeks = 2
//! limit = 5
//!
//! [safety]
//! allowed_schemas = ["public"]
//! restrict_tables = true
//!
//! [normalizer]
//! relative_week_tables = ["sales", "payments"]
//!
//! [[normalizer.banned_columns]]
//! table = "sales"
//! column = "closed_at"
//! replacement = "created_at"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::compile::{CompileOptions, TrendDefaults};
use crate::normalize::NormalizerRules;
use crate::safety::{SafetyPolicy, DEFAULT_FORBIDDEN_FUNCTIONS};
use crate::schema::SchemaGraph;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Optional TOML catalog replacing the built-in restaurant catalog.
    /// Supports `${ENV_VAR}` expansion.
    pub catalog: Option<String>,

    pub tenant: TenantSettings,

    pub trend: TrendSettings,

    pub safety: SafetySettings,

    pub normalizer: NormalizerRules,
}

/// Tenant scoping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TenantSettings {
    /// Placeholder name carrying the tenant value.
    pub param: String,
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self {
            param: "restaurant".to_string(),
        }
    }
}

/// Trend fast-path defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrendSettings {
    pub recent_weeks: u32,
    pub prior_weeks: u32,
    /// Rows returned when the plan has no limit.
    pub limit: u64,
}

impl Default for TrendSettings {
    fn default() -> Self {
        let defaults = TrendDefaults::default();
        Self {
            recent_weeks: defaults.recent_weeks,
            prior_weeks: defaults.prior_weeks,
            limit: defaults.limit,
        }
    }
}

/// Safety gate policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SafetySettings {
    /// Schemas a qualified relation may name.
    pub allowed_schemas: Vec<String>,

    /// Functions that are never allowed (case-insensitive).
    pub forbidden_functions: Vec<String>,

    /// Reject relations that are neither catalog tables nor CTE names.
    pub restrict_tables: bool,
}

impl Default for SafetySettings {
    fn default() -> Self {
        Self {
            allowed_schemas: vec!["public".to_string()],
            forbidden_functions: DEFAULT_FORBIDDEN_FUNCTIONS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            restrict_tables: false,
        }
    }
}

impl SafetySettings {
    /// Build the gate policy, restricted to `schema` when configured.
    pub fn policy(&self, schema: &SchemaGraph) -> SafetyPolicy {
        let policy = SafetyPolicy::default()
            .with_allowed_schemas(self.allowed_schemas.iter().cloned())
            .with_forbidden_functions(self.forbidden_functions.iter().cloned());
        if self.restrict_tables {
            policy.restrict_to(schema)
        } else {
            policy
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `QUERYGATE_CONFIG`
    /// 2. `./querygate.toml`
    /// 3. `~/.config/querygate/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("QUERYGATE_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("querygate.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("querygate").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Reject settings the compiler or normalizer cannot run with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.tenant.param.trim().is_empty() {
            return Err(SettingsError::InvalidConfig(
                "tenant.param must not be empty".into(),
            ));
        }
        if self.trend.recent_weeks == 0 || self.trend.prior_weeks == 0 {
            return Err(SettingsError::InvalidConfig(
                "trend week counts must be positive".into(),
            ));
        }
        if self.trend.limit == 0 {
            return Err(SettingsError::InvalidConfig(
                "trend.limit must be positive".into(),
            ));
        }
        for banned in &self.normalizer.banned_columns {
            if [&banned.table, &banned.column, &banned.replacement]
                .iter()
                .any(|s| s.trim().is_empty())
            {
                return Err(SettingsError::InvalidConfig(format!(
                    "banned column entry {}.{} is incomplete",
                    banned.table, banned.column
                )));
            }
            if banned.column.eq_ignore_ascii_case(&banned.replacement) {
                return Err(SettingsError::InvalidConfig(format!(
                    "banned column {}.{} replaces itself",
                    banned.table, banned.column
                )));
            }
        }
        Ok(())
    }

    /// The catalog path with environment variables expanded.
    pub fn catalog_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.catalog
            .as_deref()
            .map(|p| expand_env_vars(p).map(PathBuf::from))
            .transpose()
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions::default()
            .with_tenant_param(&self.tenant.param)
            .with_trend_defaults(TrendDefaults {
                recent_weeks: self.trend.recent_weeks,
                prior_weeks: self.trend.prior_weeks,
                limit: self.trend.limit,
            })
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let braced = chars.peek() == Some(&'{');
        let mut var_name = String::new();
        if braced {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                var_name.push(ch);
            }
            if var_name.is_empty() {
                // Lone $
                result.push('$');
                continue;
            }
        }

        let value = env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name))?;
        result.push_str(&value);
    }

    Ok(result)
}
