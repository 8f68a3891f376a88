//! Startup configuration.
//!
//! Loaded once from an optional TOML file, then overridden by `DEVPAIR_*`
//! environment variables; the binary applies CLI flags last. The resulting
//! value is passed by reference into the handler and never mutated.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const ENV_CATALOG: &str = "DEVPAIR_CATALOG";
const ENV_STATE: &str = "DEVPAIR_STATE";
const ENV_LOG: &str = "DEVPAIR_LOG";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Application catalog seed file loaded into the `applications` collection.
    pub catalog_path: Option<PathBuf>,
    /// Store snapshot; when unset the store lives only in memory.
    pub state_path: Option<PathBuf>,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub intake: IntakeConfig,
    pub actions: ActionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: None,
            state_path: None,
            log_filter: "info".to_string(),
            intake: IntakeConfig::default(),
            actions: ActionPolicy::default(),
        }
    }
}

/// Identity of the queue this handler consumes.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntakeConfig {
    pub group: String,
    pub kind: String,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            group: "system".to_string(),
            kind: "register".to_string(),
        }
    }
}

impl IntakeConfig {
    pub fn queue_name(&self) -> String {
        format!("{}/{}", self.group, self.kind)
    }
}

/// Lifetime and resend bookkeeping stamped on every created action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActionPolicy {
    pub timeout_ms: u64,
    pub max_resends: u32,
    pub resend_timeout_ms: u64,
}

impl Default for ActionPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 86_400_000,
            max_resends: 3,
            resend_timeout_ms: 10_000,
        }
    }
}

impl Config {
    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config =
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// File (when given) plus process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_env(|key| std::env::var(key).ok())
    }

    /// Apply `DEVPAIR_*` overrides read through `lookup`.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(catalog) = non_empty(ENV_CATALOG) {
            self.catalog_path = Some(PathBuf::from(catalog));
        }
        if let Some(state) = non_empty(ENV_STATE) {
            self.state_path = Some(PathBuf::from(state));
        }
        if let Some(filter) = non_empty(ENV_LOG) {
            self.log_filter = filter;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.intake.group.trim().is_empty() || self.intake.kind.trim().is_empty() {
            bail!("intake.group and intake.kind must not be empty");
        }
        if self.actions.timeout_ms == 0 {
            bail!("actions.timeout_ms must be greater than zero");
        }
        Ok(())
    }
}
