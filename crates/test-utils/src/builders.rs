#![allow(dead_code)]

use std::collections::BTreeMap;

use jobhost::config::{ConfigFile, FunctionConfig, HostSection, RawConfigFile};
use jobhost::triggers::{
    BlobPattern, BlobTrigger, FunctionDefinition, FunctionLocation, QueueTrigger, TimerTrigger,
    Trigger,
};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                host: HostSection::default(),
                function: BTreeMap::new(),
            },
        }
    }

    pub fn host_name(mut self, name: &str) -> Self {
        self.config.host.name = name.to_string();
        self
    }

    pub fn poll_interval(mut self, value: &str) -> Self {
        self.config.host.poll_interval = value.to_string();
        self
    }

    pub fn visibility_timeout(mut self, value: &str) -> Self {
        self.config.host.visibility_timeout = value.to_string();
        self
    }

    pub fn min_renewal_interval(mut self, value: &str) -> Self {
        self.config.host.min_renewal_interval = value.to_string();
        self
    }

    pub fn max_dequeue_count(mut self, value: u32) -> Self {
        self.config.host.max_dequeue_count = value;
        self
    }

    pub fn with_function(mut self, name: &str, function: FunctionConfig) -> Self {
        self.config.function.insert(name.to_string(), function);
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `FunctionConfig`.
pub struct FunctionConfigBuilder {
    function: FunctionConfig,
}

impl FunctionConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            function: FunctionConfig {
                cmd: cmd.to_string(),
                blob: None,
                outputs: vec![],
                queue: None,
                timer: None,
            },
        }
    }

    pub fn blob(mut self, pattern: &str) -> Self {
        self.function.blob = Some(pattern.to_string());
        self
    }

    pub fn output(mut self, pattern: &str) -> Self {
        self.function.outputs.push(pattern.to_string());
        self
    }

    pub fn queue(mut self, name: &str) -> Self {
        self.function.queue = Some(name.to_string());
        self
    }

    pub fn timer(mut self, interval: &str) -> Self {
        self.function.timer = Some(interval.to_string());
        self
    }

    pub fn build(self) -> FunctionConfig {
        self.function
    }
}

/// Builder for an already-validated `FunctionDefinition`, for tests that
/// bypass configuration.
pub struct FunctionBuilder {
    function: FunctionDefinition,
}

impl FunctionBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            function: FunctionDefinition {
                location: FunctionLocation::new("test", name),
                command: format!("echo {name}"),
                triggers: vec![],
            },
        }
    }

    pub fn command(mut self, cmd: &str) -> Self {
        self.function.command = cmd.to_string();
        self
    }

    pub fn queue(mut self, name: &str) -> Self {
        self.function.triggers.push(Trigger::Queue(QueueTrigger {
            queue_name: name.to_string(),
        }));
        self
    }

    pub fn timer(mut self, interval: std::time::Duration) -> Self {
        self.function
            .triggers
            .push(Trigger::Timer(TimerTrigger { interval }));
        self
    }

    pub fn blob(mut self, input: &str, outputs: &[&str]) -> Self {
        self.function.triggers.push(Trigger::Blob(BlobTrigger {
            input: BlobPattern::parse(input).expect("valid input pattern"),
            outputs: outputs
                .iter()
                .map(|o| BlobPattern::parse(o).expect("valid output pattern"))
                .collect(),
        }));
        self
    }

    pub fn build(self) -> FunctionDefinition {
        self.function
    }
}
