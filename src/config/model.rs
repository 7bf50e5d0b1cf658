// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::listener::poll_queue::PollQueueOptions;
use crate::triggers::model::FunctionDefinition;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [host]
/// name = "local"
/// poll_interval = "2s"
///
/// [function.resize]
/// cmd = "convert in out"
/// blob = "images/{name}.png"
/// outputs = ["thumbs/{name}.png"]
///
/// [function.ingest]
/// cmd = "ingest.sh"
/// queue = "orders"
/// ```
///
/// Nothing here is validated; see [`ConfigFile`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub host: HostSection,

    /// All functions from `[function.<name>]`, keyed by name.
    #[serde(default)]
    pub function: BTreeMap<String, FunctionConfig>,
}

/// `[host]` section. Durations are strings like `"250ms"`, `"2s"`, `"10m"`.
#[derive(Debug, Clone, Deserialize)]
pub struct HostSection {
    /// Scope of every function defined in this file.
    #[serde(default = "default_host_name")]
    pub name: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout: String,

    #[serde(default = "default_min_renewal_interval")]
    pub min_renewal_interval: String,

    #[serde(default = "default_renewal_failure_divisor")]
    pub renewal_failure_divisor: u32,

    #[serde(default = "default_max_dequeue_count")]
    pub max_dequeue_count: u32,

    /// Queue carrying blob-written notifications.
    #[serde(default = "default_blob_notification_queue")]
    pub blob_notification_queue: String,
}

fn default_host_name() -> String {
    "local".to_string()
}

fn default_poll_interval() -> String {
    "2s".to_string()
}

fn default_visibility_timeout() -> String {
    "10m".to_string()
}

fn default_min_renewal_interval() -> String {
    "1m".to_string()
}

fn default_renewal_failure_divisor() -> u32 {
    2
}

fn default_max_dequeue_count() -> u32 {
    5
}

fn default_blob_notification_queue() -> String {
    "blob-written".to_string()
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            name: default_host_name(),
            poll_interval: default_poll_interval(),
            visibility_timeout: default_visibility_timeout(),
            min_renewal_interval: default_min_renewal_interval(),
            renewal_failure_divisor: default_renewal_failure_divisor(),
            max_dequeue_count: default_max_dequeue_count(),
            blob_notification_queue: default_blob_notification_queue(),
        }
    }
}

/// `[function.<name>]` section. At most one of `blob`, `queue` and `timer`
/// may be set; a function with none of them only runs when called.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionConfig {
    /// Shell command to run.
    pub cmd: String,

    /// Input blob pattern, e.g. `"images/{name}.png"`.
    #[serde(default)]
    pub blob: Option<String>,

    /// Output blob patterns of a blob-triggered function.
    #[serde(default)]
    pub outputs: Vec<String>,

    #[serde(default)]
    pub queue: Option<String>,

    /// Interval of a timer-triggered function, e.g. `"30s"`.
    #[serde(default)]
    pub timer: Option<String>,
}

/// Validated host settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSettings {
    pub name: String,
    pub listener: PollQueueOptions,
    pub blob_notification_queue: String,
}

/// Validated configuration. Built from a [`RawConfigFile`] via `TryFrom`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub host: HostSettings,
    pub functions: Vec<FunctionDefinition>,
}

impl ConfigFile {
    /// Bypasses validation; only the validator calls this.
    pub(crate) fn new_unchecked(host: HostSettings, functions: Vec<FunctionDefinition>) -> Self {
        Self { host, functions }
    }

    /// Look a function up by its local name.
    pub fn function(&self, name: &str) -> Option<&FunctionDefinition> {
        self.functions.iter().find(|f| f.location.name == name)
    }
}
