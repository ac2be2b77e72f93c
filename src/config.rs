//! Stack configuration.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_LEVELS: u32 = 6;
/// Level 2 is always attempted, so the cap never goes below it.
pub const MIN_MAX_LEVELS: u32 = 2;

/// How invariant violations are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvariantMode {
    /// Log and return violations, keep processing.
    #[default]
    Soft,
    /// Fail the bar with an error listing the violations. Development and tests only.
    Hard,
}

impl InvariantMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "soft" | "0" | "off" => Some(InvariantMode::Soft),
            "hard" | "1" | "on" => Some(InvariantMode::Hard),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvariantMode::Soft => "soft",
            InvariantMode::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Highest recursion level that may be built.
    pub max_levels: u32,
    pub invariant_mode: InvariantMode,
    /// Label attached to log records.
    pub stream_id: String,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            max_levels: DEFAULT_MAX_LEVELS,
            invariant_mode: InvariantMode::Soft,
            stream_id: "default".to_string(),
        }
    }
}

impl StackConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_levels: std::env::var("STRATUM_MAX_LEVELS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_levels)
                .max(MIN_MAX_LEVELS),
            invariant_mode: std::env::var("STRATUM_INVARIANTS")
                .ok()
                .and_then(|v| InvariantMode::parse(&v))
                .unwrap_or(defaults.invariant_mode),
            stream_id: std::env::var("STRATUM_STREAM_ID").unwrap_or(defaults.stream_id),
        }
    }

    pub fn with_max_levels(mut self, max_levels: u32) -> Self {
        self.max_levels = max_levels.max(MIN_MAX_LEVELS);
        self
    }

    pub fn with_invariant_mode(mut self, mode: InvariantMode) -> Self {
        self.invariant_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = StackConfig::default();
        assert_eq!(cfg.max_levels, 6);
        assert_eq!(cfg.invariant_mode, InvariantMode::Soft);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(InvariantMode::parse("HARD"), Some(InvariantMode::Hard));
        assert_eq!(InvariantMode::parse(" soft "), Some(InvariantMode::Soft));
        assert_eq!(InvariantMode::parse("1"), Some(InvariantMode::Hard));
        assert_eq!(InvariantMode::parse("maybe"), None);
    }

    #[test]
    fn test_max_levels_floor() {
        let cfg = StackConfig::default().with_max_levels(0);
        assert_eq!(cfg.max_levels, MIN_MAX_LEVELS);
        let cfg = StackConfig::default().with_max_levels(9);
        assert_eq!(cfg.max_levels, 9);
    }
}
