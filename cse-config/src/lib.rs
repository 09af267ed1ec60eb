//! Configuration loading for the CSE: YAML base + profile override + `.env`
//! + environment-variable overlay, with typed access via `Deref` (spec §9,
//! ambient stack — grounded on the teacher's `r2e-core::config` module).
//!
//! Resolution order (lowest to highest priority):
//! 1. `cse.yaml` (base)
//! 2. `cse-{profile}.yaml` (profile override)
//! 3. `.env` / `.env.{profile}` (loaded into process environment)
//! 4. Environment variables (`CSE_REGISTRATION_ALLOWEDAEORIGINATORS` overrides
//!    `cse.registration.allowedAEOriginators`)

mod loader;
pub mod settings;
pub mod value;

pub use settings::CseSettings;
pub use value::{ConfigValue, FromConfigValue};

use std::collections::HashMap;
use std::ops::Deref;
use std::path::Path;

#[derive(Debug)]
pub enum ConfigError {
    NotFound(String),
    TypeMismatch { key: String, expected: &'static str },
    Load(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "Config key not found: {key}"),
            ConfigError::TypeMismatch { key, expected } => {
                write!(f, "Config type mismatch for '{key}': expected {expected}")
            }
            ConfigError::Load(msg) => write!(f, "Config load error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration loaded from YAML files, `.env` files, and environment
/// variables. `CseConfig` (= `CseConfig<()>`) provides raw key-value
/// access only; `CseConfig<CseSettings>` adds typed field access via
/// `Deref`.
#[derive(Debug, Clone)]
pub struct CseConfig<T = ()> {
    values: HashMap<String, ConfigValue>,
    profile: String,
    typed: T,
}

impl CseConfig {
    /// Load configuration for the given profile.
    ///
    /// Looks for `cse.yaml` and `cse-{profile}.yaml` in the current
    /// working directory, then overlays `.env` and environment variables.
    /// Profile resolution: `CSE_PROFILE` env var > argument > `"dev"`.
    pub fn load(profile: &str) -> Result<Self, ConfigError> {
        let active_profile = std::env::var("CSE_PROFILE").unwrap_or_else(|_| profile.to_string());

        let mut values = HashMap::new();
        loader::load_yaml_file(Path::new("cse.yaml"), &mut values)?;
        loader::load_yaml_file(Path::new(&format!("cse-{active_profile}.yaml")), &mut values)?;

        let _ = dotenvy::dotenv();
        let _ = dotenvy::from_filename(format!(".env.{active_profile}"));

        for (env_key, env_val) in std::env::vars() {
            let config_key = env_key.to_lowercase().replace('_', ".");
            values.insert(config_key, ConfigValue::String(env_val));
        }

        Ok(CseConfig { values, profile: active_profile, typed: () })
    }

    /// Build a config from a YAML string directly (tests).
    pub fn from_yaml_str(yaml: &str, profile: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        loader::load_yaml_str(yaml, &mut values)?;
        Ok(CseConfig { values, profile: profile.to_string(), typed: () })
    }

    pub fn empty() -> Self {
        CseConfig { values: HashMap::new(), profile: "test".to_string(), typed: () }
    }

    pub fn set(&mut self, key: &str, value: ConfigValue) {
        self.values.insert(key.to_string(), value);
    }

    /// Upgrade to a typed config by constructing `CseSettings` from the raw
    /// values.
    pub fn with_settings(self) -> Result<CseConfig<CseSettings>, ConfigError> {
        let typed = CseSettings::from_config(&self)?;
        Ok(CseConfig { values: self.values, profile: self.profile, typed })
    }
}

impl<T> CseConfig<T> {
    pub fn get<V: FromConfigValue>(&self, key: &str) -> Result<V, ConfigError> {
        let value = self.values.get(key).ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        V::from_config_value(value, key)
    }

    pub fn get_or<V: FromConfigValue>(&self, key: &str, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn typed(&self) -> &T {
        &self.typed
    }
}

impl<T> Deref for CseConfig<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.typed
    }
}
