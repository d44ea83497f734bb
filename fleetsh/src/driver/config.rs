//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// How output pagination is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationMode {
    /// Set terminal length/width to unbounded for the session, restore on close.
    #[default]
    Suppress,

    /// Leave paging on and press space at each pagination marker.
    Advance,
}

/// Tunables for one device session.
///
/// Deserializes from any serde format; durations are given in seconds
/// (fractions allowed). Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity timeout while waiting for command output.
    #[serde(with = "seconds")]
    pub command_timeout: Duration,

    /// How many times a timed-out command is resent after resynchronizing.
    pub command_retries: u32,

    /// Pagination strategy.
    pub pagination: PaginationMode,

    /// Quiet period that confirms a pagination marker is really the end of
    /// the stream and not text that happens to look like one.
    #[serde(with = "seconds")]
    pub marker_settle: Duration,

    /// How long to wait for a prompt after login before nudging the device.
    #[serde(with = "seconds")]
    pub prompt_timeout: Duration,

    /// How many times to nudge (send a bare line ending) for a prompt.
    pub prompt_attempts: u32,

    /// Bytes of banner text the classifier looks at.
    pub banner_sample: usize,

    /// Bytes from the end of the output searched for prompts and markers.
    pub search_depth: usize,

    /// Command run to classify devices whose login banner has no vendor
    /// marker. `None` disables the probe.
    pub probe_command: Option<String>,

    /// Line ending appended to every command.
    pub line_ending: String,

    /// Output substrings that mark a command as failed.
    pub failure_patterns: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(30),
            command_retries: 0,
            pagination: PaginationMode::Suppress,
            marker_settle: Duration::from_millis(150),
            prompt_timeout: Duration::from_secs(2),
            prompt_attempts: 3,
            banner_sample: 4096,
            search_depth: 1000,
            probe_command: Some("show version | include Cisco".to_string()),
            line_ending: "\n".to_string(),
            failure_patterns: vec![
                "% Invalid input".to_string(),
                "% Incomplete command".to_string(),
                "% Ambiguous command".to_string(),
                "% Unknown command".to_string(),
                "ERROR: % Invalid".to_string(),
            ],
        }
    }
}

impl SessionConfig {
    /// Set the inactivity timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the retry count for timed-out commands.
    pub fn with_command_retries(mut self, retries: u32) -> Self {
        self.command_retries = retries;
        self
    }

    /// Set the pagination strategy.
    pub fn with_pagination(mut self, mode: PaginationMode) -> Self {
        self.pagination = mode;
        self
    }

    /// Set the marker settle period.
    pub fn with_marker_settle(mut self, settle: Duration) -> Self {
        self.marker_settle = settle;
        self
    }

    /// Set or disable the classification probe command.
    pub fn with_probe_command(mut self, command: Option<String>) -> Self {
        self.probe_command = command;
        self
    }

    /// Add a failure pattern.
    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failure_patterns.push(pattern.into());
        self
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<(), SessionError> {
        let invalid = |message: &str| SessionError::InvalidConfig {
            message: message.to_string(),
        };

        if self.command_timeout.is_zero() {
            return Err(invalid("command_timeout must be greater than zero"));
        }
        if self.prompt_attempts == 0 {
            return Err(invalid("prompt_attempts must be at least 1"));
        }
        if self.line_ending.is_empty() {
            return Err(invalid("line_ending must not be empty"));
        }
        if self.search_depth == 0 || self.banner_sample == 0 {
            return Err(invalid("search_depth and banner_sample must be greater than zero"));
        }
        Ok(())
    }
}

/// Serde helpers for durations expressed in (fractional) seconds.
pub(crate) mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pagination, PaginationMode::Suppress);
        assert_eq!(config.prompt_attempts, 3);
    }

    #[test]
    fn test_deserialize_partial_with_seconds() {
        let config: SessionConfig = serde_json::from_str(
            r#"{ "command_timeout": 2.5, "pagination": "advance", "probe_command": null }"#,
        )
        .unwrap();
        assert_eq!(config.command_timeout, Duration::from_millis(2500));
        assert_eq!(config.pagination, PaginationMode::Advance);
        assert_eq!(config.probe_command, None);
        assert_eq!(config.marker_settle, Duration::from_millis(150));
    }

    #[test]
    fn test_invalid_config() {
        let config = SessionConfig::default().with_command_timeout(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(SessionError::InvalidConfig { .. })
        ));
    }
}
