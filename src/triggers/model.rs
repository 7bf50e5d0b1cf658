// src/triggers/model.rs

use std::fmt;
use std::time::Duration;

use crate::triggers::blob_path::BlobPattern;

/// Where a function lives: `scope` is the host (or assembly) that defines
/// it, `name` its local name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionLocation {
    pub scope: String,
    pub name: String,
}

impl FunctionLocation {
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            name: name.into(),
        }
    }

    /// Stable id, `"scope.name"`.
    pub fn id(&self) -> String {
        format!("{}.{}", self.scope, self.name)
    }
}

impl fmt::Display for FunctionLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.scope, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobTrigger {
    pub input: BlobPattern,
    /// Blobs the function writes. When non-empty the function only runs if
    /// one of them is missing or older than the input.
    pub outputs: Vec<BlobPattern>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTrigger {
    pub queue_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTrigger {
    pub interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Blob(BlobTrigger),
    Queue(QueueTrigger),
    Timer(TimerTrigger),
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Blob(b) if b.outputs.is_empty() => write!(f, "blob {}", b.input),
            Trigger::Blob(b) => {
                let outputs: Vec<&str> = b.outputs.iter().map(BlobPattern::as_str).collect();
                write!(f, "blob {} -> [{}]", b.input, outputs.join(", "))
            }
            Trigger::Queue(q) => write!(f, "queue {}", q.queue_name),
            Trigger::Timer(t) => write!(f, "timer every {:?}", t.interval),
        }
    }
}

/// A function the host knows how to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDefinition {
    pub location: FunctionLocation,
    /// Shell command executed for each invocation.
    pub command: String,
    /// Empty for functions that only run when called explicitly.
    pub triggers: Vec<Trigger>,
}

impl FunctionDefinition {
    pub fn id(&self) -> String {
        self.location.id()
    }
}
