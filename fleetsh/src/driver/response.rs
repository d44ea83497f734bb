//! Result type for command execution.

use std::time::Duration;

use serde::Serialize;

/// Output of one command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    /// The command that was executed.
    pub command: String,

    /// The command output (normalized: echo, pagination markers and
    /// trailing prompt removed).
    pub text: String,

    /// The output as received, after escape-code stripping.
    pub raw: String,

    /// The prompt that ended the output.
    pub prompt: String,

    /// Time taken to execute the command.
    #[serde(with = "super::config::seconds")]
    pub elapsed: Duration,

    /// Number of pagination markers advanced past.
    pub pages: u32,

    /// Failure message if the output matched a failure pattern.
    pub failure_message: Option<String>,
}

impl CommandResult {
    /// Check if the command succeeded.
    pub fn is_success(&self) -> bool {
        self.failure_message.is_none()
    }

    /// Whether the output spanned more than one page.
    pub fn paginated(&self) -> bool {
        self.pages > 0
    }

    /// Get the output lines as an iterator.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }

    /// Check if the output contains a substring.
    pub fn contains(&self, pattern: &str) -> bool {
        self.text.contains(pattern)
    }
}

impl std::fmt::Display for CommandResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Normalize raw command output.
///
/// Line endings become `\n`, the echoed command line is dropped, and when
/// `complete` is set the trailing prompt line is dropped as well. Leading and
/// trailing blank lines are trimmed; indentation on the first line is kept.
pub(crate) fn normalize_output(raw: &str, command: &str, complete: bool) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "");
    let mut body = text.as_str();

    // Echo: the first line ends with the command as typed.
    if let Some(pos) = body.find('\n') {
        let first = body[..pos].trim_end();
        if first.ends_with(command.trim()) {
            body = &body[pos + 1..];
        }
    } else if !complete && body.trim_end().ends_with(command.trim()) {
        body = "";
    }

    if complete {
        body = match body.rfind('\n') {
            Some(pos) => &body[..pos],
            None => "",
        };
    }

    body.trim_start_matches('\n').trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(failure: Option<&str>) -> CommandResult {
        CommandResult {
            command: "show clock".into(),
            text: "12:00:00.000 UTC Mon Jan 1 2024".into(),
            raw: String::new(),
            prompt: "r1#".into(),
            elapsed: Duration::from_millis(10),
            pages: 0,
            failure_message: failure.map(String::from),
        }
    }

    #[test]
    fn test_success_and_display() {
        let ok = result(None);
        assert!(ok.is_success());
        assert!(!ok.paginated());
        assert_eq!(ok.to_string(), "12:00:00.000 UTC Mon Jan 1 2024");
        assert!(!result(Some("% Invalid input")).is_success());
    }

    #[test]
    fn test_normalize_strips_echo_and_prompt() {
        let raw = "show clock\r\n12:00:00 UTC\r\nr1#";
        assert_eq!(normalize_output(raw, "show clock", true), "12:00:00 UTC");
    }

    #[test]
    fn test_normalize_keeps_indentation() {
        let raw = "show run | s line\r\n  line con 0\r\n   exec-timeout 0\r\nr1#";
        assert_eq!(
            normalize_output(raw, "show run | s line", true),
            "  line con 0\n   exec-timeout 0"
        );
    }

    #[test]
    fn test_normalize_empty_output() {
        assert_eq!(normalize_output("terminal length 0\r\nr1#", "terminal length 0", true), "");
        assert_eq!(normalize_output("\r\nr1#", "", true), "");
    }

    #[test]
    fn test_normalize_partial_keeps_last_line() {
        let raw = "show tech\r\n------ show clock ------\r\nBuilding";
        assert_eq!(
            normalize_output(raw, "show tech", false),
            "------ show clock ------\nBuilding"
        );
        assert_eq!(normalize_output("show tech\r\n", "show tech", false), "");
    }
}
