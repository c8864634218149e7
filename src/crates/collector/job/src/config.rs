//! Job configuration loaded from YAML and resolved against module defaults.

use collector_error::{CollectorError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Plugin name used when a job does not set one.
pub const DEFAULT_PLUGIN_NAME: &str = "go.d";

/// Per-module defaults, registered alongside the module's constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDefaults {
    /// Collection interval in seconds
    pub update_every: u64,
    /// Seconds between auto-detection attempts, 0 disables retrying
    pub autodetection_retry: u64,
    /// Priority of the first chart declared without one
    pub priority: i64,
    /// Disabled modules are only run when explicitly enabled
    pub disabled: bool,
}

impl Default for ModuleDefaults {
    fn default() -> Self {
        Self {
            update_every: 1,
            autodetection_retry: 0,
            priority: 70000,
            disabled: false,
        }
    }
}

fn default_plugin_name() -> String {
    DEFAULT_PLUGIN_NAME.to_string()
}

fn default_autodetection_tries() -> i64 {
    -1
}

/// One job as written in a module's configuration file.
///
/// ```yaml
/// name: local
/// module: mysql
/// update_every: 5
/// autodetection_retry: 10
/// dsn: root@tcp(127.0.0.1:3306)/
/// ```
///
/// Keys this struct does not know are module-specific and kept in `options`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub name: String,
    pub module: String,
    #[serde(default = "default_plugin_name")]
    pub plugin_name: String,
    #[serde(default)]
    pub update_every: Option<u64>,
    #[serde(default)]
    pub autodetection_retry: Option<u64>,
    /// Failed checks allowed before giving up, -1 for unlimited
    #[serde(default = "default_autodetection_tries")]
    pub autodetection_tries: i64,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(flatten)]
    pub options: BTreeMap<String, serde_yaml::Value>,
}

impl JobConfig {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            module: module.into(),
            plugin_name: default_plugin_name(),
            update_every: None,
            autodetection_retry: None,
            autodetection_tries: default_autodetection_tries(),
            priority: None,
            options: BTreeMap::new(),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| CollectorError::config(format!("invalid job config: {e}")))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CollectorError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Fill unset values from `defaults` and validate the result.
    pub fn resolve(self, defaults: &ModuleDefaults) -> Result<ResolvedJobConfig> {
        if self.module.trim().is_empty() {
            return Err(CollectorError::config("module name is empty"));
        }
        if self.module.chars().any(char::is_whitespace) {
            return Err(CollectorError::config(format!(
                "module name '{}' contains whitespace",
                self.module
            )));
        }
        if self.plugin_name.trim().is_empty() {
            return Err(CollectorError::config("plugin name is empty"));
        }

        let name = match self.name.trim() {
            "" => self.module.clone(),
            name => name.split_whitespace().collect::<Vec<_>>().join("_"),
        };

        let update_every = self.update_every.unwrap_or(defaults.update_every);
        if update_every == 0 {
            return Err(CollectorError::config(format!(
                "job '{name}': update_every must be positive"
            )));
        }

        if self.autodetection_tries < -1 {
            return Err(CollectorError::config(format!(
                "job '{name}': autodetection_tries must be -1 or non-negative, got {}",
                self.autodetection_tries
            )));
        }

        Ok(ResolvedJobConfig {
            plugin_name: self.plugin_name,
            name,
            module: self.module,
            update_every,
            autodetection_retry: self
                .autodetection_retry
                .unwrap_or(defaults.autodetection_retry),
            autodetection_tries: self.autodetection_tries,
            priority: self.priority.unwrap_or(defaults.priority),
            options: self.options,
        })
    }
}

/// A validated job configuration with every value decided.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedJobConfig {
    pub plugin_name: String,
    pub name: String,
    pub module: String,
    pub update_every: u64,
    pub autodetection_retry: u64,
    pub autodetection_tries: i64,
    pub priority: i64,
    pub options: BTreeMap<String, serde_yaml::Value>,
}

impl ResolvedJobConfig {
    /// `module` when the job is named after its module, `module_name` otherwise.
    pub fn full_name(&self) -> String {
        full_name(&self.module, &self.name)
    }
}

pub(crate) fn full_name(module: &str, job: &str) -> String {
    if module == job {
        module.to_string()
    } else {
        format!("{module}_{job}")
    }
}
