//! Layered application configuration.
//!
//! Sources, lowest priority first:
//! 1. `application.yaml`
//! 2. `application-{profile}.yaml`
//! 3. `.env` then `.env.{profile}` (never overwrite variables already set)
//! 4. environment variables (`SECURITY_JWT_SECRET` overrides `security.jwt.secret`)
//!
//! The profile comes from `RIVET_PROFILE`, else the argument to
//! [`RivetConfig::load`].

mod loader;
mod value;

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

pub use value::{ConfigValue, FromConfigValue};

use crate::descriptor::Platform;
use crate::guards::UnknownGuardPolicy;

pub const PROFILE_ENV: &str = "RIVET_PROFILE";

pub mod keys {
    pub const SERVER_PORT: &str = "server.port";
    pub const JWT_SECRET: &str = "security.jwt.secret";
    pub const JWT_ISSUER: &str = "security.jwt.issuer";
    pub const JWT_AUDIENCE: &str = "security.jwt.audience";
    pub const UNKNOWN_GUARD_POLICY: &str = "guards.unknown-policy";
    pub const PLATFORM: &str = "platform";
}

#[derive(Debug)]
pub enum ConfigError {
    NotFound(String),
    TypeMismatch { key: String, expected: &'static str },
    /// Invalid value for a known key.
    Invalid { key: String, message: String },
    /// I/O or YAML parse failure.
    Load(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "Config key not found: {key}"),
            ConfigError::TypeMismatch { key, expected } => {
                write!(f, "Config type mismatch for '{key}': expected {expected}")
            }
            ConfigError::Invalid { key, message } => {
                write!(f, "Invalid config value for '{key}': {message}")
            }
            ConfigError::Load(msg) => write!(f, "Config load error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Flattened key/value configuration.
#[derive(Debug, Clone)]
pub struct RivetConfig {
    values: HashMap<String, ConfigValue>,
    profile: String,
}

impl RivetConfig {
    /// Load from the current working directory.
    pub fn load(profile: &str) -> Result<Self, ConfigError> {
        Self::load_from(Path::new("."), profile)
    }

    /// Load with `dir` as the directory holding the YAML and `.env` files.
    pub fn load_from(dir: &Path, profile: &str) -> Result<Self, ConfigError> {
        let profile = std::env::var(PROFILE_ENV).unwrap_or_else(|_| profile.to_string());
        let mut values = HashMap::new();

        for file in [
            dir.join("application.yaml"),
            dir.join(format!("application-{profile}.yaml")),
        ] {
            if loader::merge_file(&file, &mut values)? {
                debug!(file = %file.display(), "Loaded config file");
            }
        }

        for env_file in [dir.join(".env"), dir.join(format!(".env.{profile}"))] {
            load_env_file(&env_file);
        }
        loader::overlay_env(std::env::vars(), &mut values);

        Ok(Self { values, profile })
    }

    /// Parse a YAML document without consulting files or the environment.
    pub fn from_yaml_str(yaml: &str, profile: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        loader::merge_str(yaml, &mut values)?;
        Ok(Self {
            values,
            profile: profile.to_string(),
        })
    }

    pub fn empty() -> Self {
        Self {
            values: HashMap::new(),
            profile: "test".to_string(),
        }
    }

    pub fn set(&mut self, key: &str, value: ConfigValue) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get<V: FromConfigValue>(&self, key: &str) -> Result<V, ConfigError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        V::from_config_value(value, key)
    }

    /// `default` when the key is missing; conversion errors still surface.
    pub fn get_or<V: FromConfigValue>(&self, key: &str, default: V) -> Result<V, ConfigError> {
        match self.get(key) {
            Err(ConfigError::NotFound(_)) => Ok(default),
            other => other,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn server_port(&self) -> Result<u16, ConfigError> {
        self.get_or(keys::SERVER_PORT, 3000)
    }

    /// `guards.unknown-policy`, defaulting to deny.
    pub fn unknown_guard_policy(&self) -> Result<UnknownGuardPolicy, ConfigError> {
        self.parsed(keys::UNKNOWN_GUARD_POLICY)
            .map(Option::unwrap_or_default)
    }

    /// The platform to compile routes for; `None` when unset.
    pub fn platform(&self) -> Result<Option<Platform>, ConfigError> {
        self.parsed(keys::PLATFORM)
    }

    fn parsed<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get::<Option<String>>(key) {
            Err(ConfigError::NotFound(_)) | Ok(None) => Ok(None),
            Err(e) => Err(e),
            Ok(Some(raw)) => raw.parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

fn load_env_file(path: &Path) {
    match dotenvy::from_path(path) {
        Ok(()) => debug!(file = %path.display(), "Loaded env file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(file = %path.display(), error = %e, "Failed to read env file"),
    }
}
