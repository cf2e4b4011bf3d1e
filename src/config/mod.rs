//! Configuration loading.
//!
//! A single YAML document maps directly onto [`Config`] via `serde`. There is
//! no dynamic module loading (see the `modules` table below): `module_name`
//! is validated against [`crate::modules::known_module_names`] at load time,
//! so a typo in the config file is a startup-time `Config` error rather than
//! a silent no-op at request time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{IcapError, IcapResult};

fn default_port() -> u16 {
    1344
}

fn default_children() -> usize {
    4
}

fn default_max_requests() -> u64 {
    1000
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("/var/run/icapd.pid")
}

fn default_run_dir() -> PathBuf {
    PathBuf::from("/")
}

fn default_log_category() -> String {
    "icapd".to_string()
}

fn default_read_timeout_secs() -> u64 {
    30
}

/// One named adaptation module entry under `modules.<name>`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ModuleConfig {
    /// Filesystem directory to search for the module.
    ///
    /// Retained for configuration-format compatibility with the original
    /// dynamic-loading design; this implementation resolves modules from a
    /// static registry and does not read this path.
    #[serde(default)]
    pub module_path: Option<PathBuf>,
    /// Module identifier, looked up in the static registry.
    pub module_name: String,
}

/// Ordered module chains per ICAP method.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct HandlersConfig {
    #[serde(default)]
    pub reqmod: Vec<String>,
    #[serde(default)]
    pub respmod: Vec<String>,
}

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_children")]
    pub children: usize,
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,
    #[serde(default = "default_run_dir")]
    pub run_dir: PathBuf,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_log_category")]
    pub log_category: String,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default)]
    pub modules: IndexMap<String, ModuleConfig>,
    #[serde(default)]
    pub handlers: HandlersConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: default_port(),
            children: default_children(),
            max_requests: default_max_requests(),
            pid_file: default_pid_file(),
            run_dir: default_run_dir(),
            log_file: None,
            log_category: default_log_category(),
            read_timeout_secs: default_read_timeout_secs(),
            modules: IndexMap::new(),
            handlers: HandlersConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a YAML file.
    ///
    /// Every module name referenced by `handlers.reqmod`/`handlers.respmod`
    /// must appear in `modules` and must resolve in `known_modules` (the
    /// static registry's names); otherwise this is a `Fatal` error raised
    /// before daemonization.
    pub fn load(path: &Path, known_modules: &[&str]) -> IcapResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| IcapError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Config = serde_yaml::from_str(&text)?;
        config.validate(known_modules)?;
        Ok(config)
    }

    fn validate(&self, known_modules: &[&str]) -> IcapResult<()> {
        if self.children == 0 {
            return Err(IcapError::Config("children must be at least 1".into()));
        }
        let mut seen: HashMap<&str, &ModuleConfig> = HashMap::new();
        for (name, module) in &self.modules {
            seen.insert(name.as_str(), module);
            if !known_modules.contains(&module.module_name.as_str()) {
                return Err(IcapError::Config(format!(
                    "modules.{name}: unknown module_name `{}`",
                    module.module_name
                )));
            }
        }
        for name in self.handlers.reqmod.iter().chain(self.handlers.respmod.iter()) {
            if !seen.contains_key(name.as_str()) {
                return Err(IcapError::Config(format!(
                    "handlers reference undefined module `{name}`"
                )));
            }
        }
        Ok(())
    }
}
