// src/triggers/blob_path.rs

//! Blob paths (`container/blob`) and patterns with `{name}` captures.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobPathError {
    #[error("blob path '{0}' must have the form 'container/blob'")]
    MissingSeparator(String),

    #[error("blob path '{0}' has an empty container or blob name")]
    EmptyPart(String),

    #[error("container of '{0}' cannot contain a capture")]
    CaptureInContainer(String),

    #[error("unbalanced braces in '{0}'")]
    UnbalancedBraces(String),

    #[error("invalid capture name '{name}' in '{pattern}'")]
    InvalidCapture { pattern: String, name: String },

    #[error("no value bound for '{name}' in '{pattern}'")]
    UnboundName { pattern: String, name: String },
}

/// A concrete blob location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobPath {
    pub container: String,
    pub blob: String,
}

impl BlobPath {
    pub fn new(container: impl Into<String>, blob: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            blob: blob.into(),
        }
    }

    /// Key that treats containers case-insensitively.
    pub fn key(&self) -> String {
        format!("{}/{}", self.container.to_ascii_lowercase(), self.blob)
    }
}

impl fmt::Display for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.blob)
    }
}

impl FromStr for BlobPath {
    type Err = BlobPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (container, blob) = split_path(s)?;
        if container.contains(['{', '}']) || blob.contains(['{', '}']) {
            return Err(BlobPathError::InvalidCapture {
                pattern: s.to_string(),
                name: String::new(),
            });
        }
        Ok(Self::new(container, blob))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Capture(String),
}

/// A blob path pattern such as `images/{name}.png`.
///
/// Captures match one or more characters and never cross a `/`. Containers
/// compare case-insensitively, blob names case-sensitively. A name used
/// twice must capture the same text both times.
#[derive(Debug, Clone)]
pub struct BlobPattern {
    source: String,
    container: String,
    segments: Vec<Segment>,
    names: Vec<String>,
    regex: Regex,
}

impl PartialEq for BlobPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for BlobPattern {}

impl BlobPattern {
    pub fn parse(pattern: &str) -> Result<Self, BlobPathError> {
        let (container, blob) = split_path(pattern)?;
        if container.contains(['{', '}']) {
            return Err(BlobPathError::CaptureInContainer(pattern.to_string()));
        }

        let segments = parse_segments(pattern, blob)?;

        let mut names = Vec::new();
        let mut regex_src = String::from("^");
        for seg in &segments {
            match seg {
                Segment::Literal(lit) => regex_src.push_str(&regex::escape(lit)),
                Segment::Capture(name) => {
                    regex_src.push_str("([^/]+?)");
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
            }
        }
        regex_src.push('$');

        let regex = Regex::new(&regex_src).map_err(|_| BlobPathError::InvalidCapture {
            pattern: pattern.to_string(),
            name: String::new(),
        })?;

        Ok(Self {
            source: pattern.to_string(),
            container: container.to_string(),
            segments,
            names,
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Capture names in order of first appearance.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Match a concrete path, returning the captured values.
    pub fn match_path(&self, actual: &BlobPath) -> Option<BTreeMap<String, String>> {
        if !self.container.eq_ignore_ascii_case(&actual.container) {
            return None;
        }
        let caps = self.regex.captures(&actual.blob)?;

        let mut bound = BTreeMap::new();
        let capture_names = self.segments.iter().filter_map(|s| match s {
            Segment::Capture(name) => Some(name),
            Segment::Literal(_) => None,
        });
        for (idx, name) in capture_names.enumerate() {
            let value = caps.get(idx + 1)?.as_str();
            match bound.get(name) {
                Some(existing) if existing != value => return None,
                Some(_) => {}
                None => {
                    bound.insert(name.clone(), value.to_string());
                }
            }
        }
        Some(bound)
    }

    /// Substitute `names` into the pattern.
    pub fn apply_names(&self, names: &BTreeMap<String, String>) -> Result<BlobPath, BlobPathError> {
        let mut blob = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Literal(lit) => blob.push_str(lit),
                Segment::Capture(name) => {
                    let value = names.get(name).ok_or_else(|| BlobPathError::UnboundName {
                        pattern: self.source.clone(),
                        name: name.clone(),
                    })?;
                    blob.push_str(value);
                }
            }
        }
        Ok(BlobPath::new(self.container.clone(), blob))
    }
}

impl fmt::Display for BlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for BlobPattern {
    type Err = BlobPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn split_path(s: &str) -> Result<(&str, &str), BlobPathError> {
    let (container, blob) = s
        .split_once('/')
        .ok_or_else(|| BlobPathError::MissingSeparator(s.to_string()))?;
    if container.is_empty() || blob.is_empty() {
        return Err(BlobPathError::EmptyPart(s.to_string()));
    }
    Ok((container, blob))
}

fn parse_segments(pattern: &str, blob: &str) -> Result<Vec<Segment>, BlobPathError> {
    let mut segments = Vec::new();
    let mut rest = blob;

    while !rest.is_empty() {
        match rest.find(['{', '}']) {
            None => {
                segments.push(Segment::Literal(rest.to_string()));
                break;
            }
            Some(pos) => {
                if rest.as_bytes()[pos] == b'}' {
                    return Err(BlobPathError::UnbalancedBraces(pattern.to_string()));
                }
                if pos > 0 {
                    segments.push(Segment::Literal(rest[..pos].to_string()));
                }
                let after = &rest[pos + 1..];
                let close = after
                    .find('}')
                    .ok_or_else(|| BlobPathError::UnbalancedBraces(pattern.to_string()))?;
                let name = &after[..close];
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(BlobPathError::InvalidCapture {
                        pattern: pattern.to_string(),
                        name: name.to_string(),
                    });
                }
                segments.push(Segment::Capture(name.to_string()));
                rest = &after[close + 1..];
            }
        }
    }

    Ok(segments)
}
