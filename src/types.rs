use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one function invocation attempt.
///
/// The hyphenated lower-case form is used verbatim as table partition and
/// row keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(Uuid);

impl InvocationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for InvocationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Lifecycle of a function invocation as reported by the instance store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionStatus {
    Queued,
    Running,
    CompletedSuccess,
    CompletedFailed,
    /// The hosting process went away without reporting an outcome.
    NeverFinished,
}

impl FunctionStatus {
    /// True once the invocation can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FunctionStatus::CompletedSuccess
                | FunctionStatus::CompletedFailed
                | FunctionStatus::NeverFinished
        )
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration too large: '{}'", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_id_round_trips_through_its_key_form() {
        let id = InvocationId::new();
        let key = id.to_string();
        assert_eq!(key, key.to_lowercase());
        assert_eq!(key.parse::<InvocationId>().unwrap(), id);
    }

    #[test]
    fn parses_supported_duration_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn rejects_malformed_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("15").is_err());
        assert!(parse_duration("3d").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn oversized_durations_are_rejected_instead_of_wrapping() {
        let err = parse_duration("400000000000000000m").unwrap_err();
        assert!(err.contains("too large"), "{err}");
        assert!(parse_duration("6000000000000000h").is_err());
        assert_eq!(
            parse_duration("18446744073709551615s").unwrap(),
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn only_completed_states_are_terminal() {
        assert!(!FunctionStatus::Queued.is_terminal());
        assert!(!FunctionStatus::Running.is_terminal());
        assert!(FunctionStatus::CompletedSuccess.is_terminal());
        assert!(FunctionStatus::CompletedFailed.is_terminal());
        assert!(FunctionStatus::NeverFinished.is_terminal());
    }
}
