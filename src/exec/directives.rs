// src/exec/directives.rs

//! Output directives printed by functions on stdout.
//!
//! - `::queue <name> <payload>` enqueues `<payload>` on queue `<name>`;
//! - `::blob <container/path>` reports that the function wrote that blob.
//!
//! Any other line is ordinary output.

use regex::Regex;
use tracing::warn;

use crate::errors::{HostError, Result};
use crate::exec::backend::FunctionOutput;
use crate::triggers::blob_path::BlobPath;

#[derive(Debug, Clone)]
pub struct DirectiveParser {
    queue: Regex,
    blob: Regex,
}

impl DirectiveParser {
    pub fn new() -> Result<Self> {
        let compile = |src: &str| {
            Regex::new(src).map_err(|e| HostError::ConfigError(format!("directive regex: {e}")))
        };
        Ok(Self {
            queue: compile(r"^::queue\s+([a-z0-9][a-z0-9-]*)\s+(.+)$")?,
            blob: compile(r"^::blob\s+(\S+)\s*$")?,
        })
    }

    /// The output described by `line`, if it is a well-formed directive.
    pub fn parse(&self, line: &str) -> Option<FunctionOutput> {
        let line = line.trim_end_matches(['\r', '\n']);
        if !line.starts_with("::") {
            return None;
        }

        if let Some(caps) = self.queue.captures(line) {
            return Some(FunctionOutput::Queue {
                queue: caps[1].to_string(),
                payload: caps[2].to_string(),
            });
        }

        if let Some(caps) = self.blob.captures(line) {
            return match caps[1].parse::<BlobPath>() {
                Ok(path) => Some(FunctionOutput::Blob(path)),
                Err(e) => {
                    warn!(line, error = %e, "ignoring malformed blob directive");
                    None
                }
            };
        }

        warn!(line, "ignoring unrecognised directive");
        None
    }
}
