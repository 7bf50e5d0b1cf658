// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{ConfigFile, FunctionConfig, HostSection, HostSettings, RawConfigFile};
use crate::errors::{HostError, Result};
use crate::listener::poll_queue::PollQueueOptions;
use crate::triggers::blob_path::BlobPattern;
use crate::triggers::model::{
    BlobTrigger, FunctionDefinition, FunctionLocation, QueueTrigger, TimerTrigger, Trigger,
};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = HostError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_functions(&raw)?;
        let host = validate_host_section(&raw.host)?;
        let functions = raw
            .function
            .iter()
            .map(|(name, function)| build_function(&host.name, name, function))
            .collect::<Result<Vec<_>>>()?;
        Ok(ConfigFile::new_unchecked(host, functions))
    }
}

/// Queue names are 1-63 characters of lower-case letters, digits and `-`,
/// starting with a letter or digit.
pub fn is_valid_queue_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn ensure_has_functions(cfg: &RawConfigFile) -> Result<()> {
    if cfg.function.is_empty() {
        return Err(HostError::ConfigError(
            "config must contain at least one [function.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_host_section(host: &HostSection) -> Result<HostSettings> {
    if host.name.is_empty() || host.name.contains('.') {
        return Err(HostError::ConfigError(format!(
            "[host].name must be non-empty and must not contain '.' (got '{}')",
            host.name
        )));
    }

    let poll_interval = duration_field("[host].poll_interval", &host.poll_interval)?;
    let visibility_timeout = duration_field("[host].visibility_timeout", &host.visibility_timeout)?;
    let min_renewal_interval =
        duration_field("[host].min_renewal_interval", &host.min_renewal_interval)?;

    if poll_interval.is_zero() {
        return Err(HostError::ConfigError(
            "[host].poll_interval must be greater than zero".to_string(),
        ));
    }
    if visibility_timeout.is_zero() {
        return Err(HostError::ConfigError(
            "[host].visibility_timeout must be greater than zero".to_string(),
        ));
    }
    if min_renewal_interval > visibility_timeout / 2 {
        return Err(HostError::ConfigError(format!(
            "[host].min_renewal_interval ({}) must not exceed half of visibility_timeout ({})",
            host.min_renewal_interval, host.visibility_timeout
        )));
    }
    if host.renewal_failure_divisor < 1 {
        return Err(HostError::ConfigError(
            "[host].renewal_failure_divisor must be >= 1 (got 0)".to_string(),
        ));
    }
    if host.max_dequeue_count < 1 {
        return Err(HostError::ConfigError(
            "[host].max_dequeue_count must be >= 1 (got 0)".to_string(),
        ));
    }
    if !is_valid_queue_name(&host.blob_notification_queue) {
        return Err(HostError::ConfigError(format!(
            "[host].blob_notification_queue '{}' is not a valid queue name",
            host.blob_notification_queue
        )));
    }

    Ok(HostSettings {
        name: host.name.clone(),
        listener: PollQueueOptions {
            poll_interval,
            visibility_timeout,
            min_renewal_interval,
            renewal_failure_divisor: host.renewal_failure_divisor,
            max_dequeue_count: host.max_dequeue_count,
        },
        blob_notification_queue: host.blob_notification_queue.clone(),
    })
}

fn build_function(scope: &str, name: &str, cfg: &FunctionConfig) -> Result<FunctionDefinition> {
    if name.is_empty() || name.contains('.') || name.contains(char::is_whitespace) {
        return Err(HostError::ConfigError(format!(
            "function name '{name}' must be non-empty without '.' or whitespace"
        )));
    }
    if cfg.cmd.trim().is_empty() {
        return Err(HostError::ConfigError(format!(
            "function '{name}' has an empty `cmd`"
        )));
    }

    let set = [cfg.blob.is_some(), cfg.queue.is_some(), cfg.timer.is_some()];
    if set.iter().filter(|s| **s).count() > 1 {
        return Err(HostError::ConfigError(format!(
            "function '{name}' may declare at most one of `blob`, `queue` and `timer`"
        )));
    }
    if !cfg.outputs.is_empty() && cfg.blob.is_none() {
        return Err(HostError::ConfigError(format!(
            "function '{name}' declares `outputs` without a `blob` trigger"
        )));
    }

    let mut triggers = Vec::new();
    if let Some(pattern) = &cfg.blob {
        triggers.push(Trigger::Blob(build_blob_trigger(name, pattern, &cfg.outputs)?));
    }
    if let Some(queue) = &cfg.queue {
        if !is_valid_queue_name(queue) {
            return Err(HostError::ConfigError(format!(
                "function '{name}' listens on invalid queue name '{queue}' (use lower-case letters, digits and '-')"
            )));
        }
        triggers.push(Trigger::Queue(QueueTrigger {
            queue_name: queue.clone(),
        }));
    }
    if let Some(timer) = &cfg.timer {
        let interval = duration_field(&format!("function '{name}' timer"), timer)?;
        if interval.is_zero() {
            return Err(HostError::ConfigError(format!(
                "function '{name}' timer interval must be greater than zero"
            )));
        }
        triggers.push(Trigger::Timer(TimerTrigger { interval }));
    }

    Ok(FunctionDefinition {
        location: FunctionLocation::new(scope, name),
        command: cfg.cmd.clone(),
        triggers,
    })
}

fn build_blob_trigger(name: &str, input: &str, outputs: &[String]) -> Result<BlobTrigger> {
    let input = BlobPattern::parse(input)?;
    let outputs = outputs
        .iter()
        .map(|o| BlobPattern::parse(o))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for output in &outputs {
        if let Some(unbound) = output.names().iter().find(|n| !input.names().contains(n)) {
            return Err(HostError::ConfigError(format!(
                "function '{name}': output '{output}' uses '{{{unbound}}}', which input '{input}' does not bind"
            )));
        }
    }

    Ok(BlobTrigger { input, outputs })
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| HostError::ConfigError(format!("{field}: invalid duration '{value}': {e}")))
}
