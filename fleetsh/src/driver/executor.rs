//! Command executor: send one command, collect output until the prompt.

use std::time::Instant;

use log::{debug, trace, warn};
use regex::bytes::Regex;

use super::config::SessionConfig;
use super::response::{CommandResult, normalize_output};
use crate::channel::patterns::last_line;
use crate::channel::{PatternBuffer, TerminalChannel};
use crate::error::{CommandTimeoutError, Error, Result};

/// Keystroke that advances a pager by one screen.
const ADVANCE_KEY: &str = " ";

/// Runs commands on a channel sitting at a known prompt.
///
/// The executor borrows everything it needs for one exchange. `marker` is the
/// pagination marker to watch for; pass `None` when paging is known to be off.
pub struct CommandExecutor<'a, C: TerminalChannel> {
    channel: &'a mut C,
    prompt: &'a Regex,
    marker: Option<&'a Regex>,
    config: &'a SessionConfig,
}

impl<'a, C: TerminalChannel> CommandExecutor<'a, C> {
    /// Create an executor over `channel`.
    pub fn new(
        channel: &'a mut C,
        prompt: &'a Regex,
        marker: Option<&'a Regex>,
        config: &'a SessionConfig,
    ) -> Self {
        Self {
            channel,
            prompt,
            marker,
            config,
        }
    }

    /// Execute a command, retrying after a timeout up to `command_retries` times.
    ///
    /// Before each retry the executor resynchronizes by sending a bare line
    /// ending and waiting for the prompt. If that fails the original timeout
    /// is returned.
    pub async fn execute(&mut self, command: &str) -> Result<CommandResult> {
        let mut attempt = 0;
        loop {
            match self.execute_once(command).await {
                Err(Error::CommandTimeout(timeout)) if attempt < self.config.command_retries => {
                    attempt += 1;
                    warn!(
                        "Command {:?} timed out, retrying ({}/{})",
                        command, attempt, self.config.command_retries
                    );
                    if let Err(e) = self.resync().await {
                        debug!("Resync after timeout failed: {}", e);
                        return Err(timeout.into());
                    }
                }
                other => return other,
            }
        }
    }

    async fn execute_once(&mut self, command: &str) -> Result<CommandResult> {
        let start = Instant::now();
        debug!("Sending command: {:?}", command);
        self.channel
            .send(&format!("{}{}", command, self.config.line_ending))
            .await?;

        let mut buffer = PatternBuffer::new(self.config.search_depth);
        let mut pages = 0;

        loop {
            let Some(chunk) = self.channel.read(self.config.command_timeout).await? else {
                let raw = buffer.as_str_lossy();
                return Err(CommandTimeoutError {
                    command: command.to_string(),
                    timeout: self.config.command_timeout,
                    partial_output: normalize_output(&raw, command, false),
                }
                .into());
            };

            buffer.extend(&chunk);
            trace!("read {} bytes, buffer {} bytes", chunk.len(), buffer.len());

            if self.settle(&mut buffer, &mut pages).await? {
                break;
            }
        }

        let raw = buffer.as_str_lossy().into_owned();
        let prompt = last_line(&raw).unwrap_or_default().to_string();
        let text = normalize_output(&raw, command, true);
        let failure_message = self
            .config
            .failure_patterns
            .iter()
            .find(|pattern| text.contains(pattern.as_str()))
            .cloned();

        let elapsed = start.elapsed();
        debug!(
            "Command {:?} completed in {:?}, pages={}, success={}",
            command,
            elapsed,
            pages,
            failure_message.is_none()
        );

        Ok(CommandResult {
            command: command.to_string(),
            text,
            raw,
            prompt,
            elapsed,
            pages,
            failure_message,
        })
    }

    /// Decide what the tail of the buffer means.
    ///
    /// Returns `true` once the prompt ends the buffer. A pagination marker at
    /// the tail only counts if nothing else arrives within `marker_settle`;
    /// then it is removed and the pager advanced.
    async fn settle(&mut self, buffer: &mut PatternBuffer, pages: &mut u32) -> Result<bool> {
        loop {
            if buffer.tail_contains(self.prompt) {
                return Ok(true);
            }

            let Some(marker) = self.marker else {
                return Ok(false);
            };
            if !buffer.ends_with_match(marker) {
                return Ok(false);
            }

            match self.channel.read(self.config.marker_settle).await? {
                Some(more) => {
                    trace!("Marker look-alike followed by more output");
                    buffer.extend(&more);
                }
                None => {
                    buffer.strip_tail_match(marker);
                    *pages += 1;
                    trace!("Advancing past pagination marker (page {})", pages);
                    self.channel.send(ADVANCE_KEY).await?;
                    return Ok(false);
                }
            }
        }
    }

    /// Send a bare line ending and wait for the prompt.
    pub async fn resync(&mut self) -> Result<()> {
        self.channel.send(&self.config.line_ending).await?;
        self.channel
            .read_until(self.prompt, self.config.command_timeout)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::channel::ScriptedDevice;
    use crate::channel::patterns::{completion_pattern, marker_pattern};
    use crate::platform::{OsFamily, TerminalProfile};

    async fn ready(device: &ScriptedDevice) -> crate::channel::ScriptedChannel {
        let mut channel = device.connect();
        while channel.read(Duration::ZERO).await.unwrap().is_some() {}
        channel
    }

    fn ios_marker() -> Regex {
        marker_pattern(TerminalProfile::for_family(OsFamily::Ios).more_marker).unwrap()
    }

    #[tokio::test]
    async fn test_simple_command() {
        let device = ScriptedDevice::ios("r1").with_output("show clock", "*12:00:00.000 UTC Mon Jan 1 2024");
        let mut channel = ready(&device).await;
        let prompt = completion_pattern("r1").unwrap();
        let config = SessionConfig::default();

        let mut exec = CommandExecutor::new(&mut channel, &prompt, None, &config);
        let result = exec.execute("show clock").await.unwrap();
        assert_eq!(result.text, "*12:00:00.000 UTC Mon Jan 1 2024");
        assert_eq!(result.prompt, "r1#");
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_failure_pattern() {
        let device = ScriptedDevice::ios("r1");
        let mut channel = ready(&device).await;
        let prompt = completion_pattern("r1").unwrap();
        let config = SessionConfig::default();

        let mut exec = CommandExecutor::new(&mut channel, &prompt, None, &config);
        let result = exec.execute("show bogus").await.unwrap();
        assert_eq!(result.failure_message.as_deref(), Some("% Invalid input"));
    }

    #[tokio::test]
    async fn test_advances_pages_without_leaking_marker() {
        let output: String = (1..=60).map(|i| format!("entry {:02}\n", i)).collect();
        let device = ScriptedDevice::ios("r1")
            .with_output("show log", output)
            .with_chunk_size(7);
        let mut channel = ready(&device).await;
        let prompt = completion_pattern("r1").unwrap();
        let marker = ios_marker();
        let config = SessionConfig::default();

        let mut exec = CommandExecutor::new(&mut channel, &prompt, Some(&marker), &config);
        let result = exec.execute("show log").await.unwrap();
        assert_eq!(result.pages, 2);
        assert!(!result.text.contains("More"));
        let lines: Vec<&str> = result.lines().collect();
        assert_eq!(lines.len(), 60);
        assert_eq!(lines[0], "entry 01");
        assert_eq!(lines[59], "entry 60");
    }

    #[tokio::test]
    async fn test_marker_look_alike_mid_line_survives() {
        // Chunks of 13 put a read boundary right after "--More-- ".
        let output = "interface Gi0/1\n description --More-- uplink\ninterface Gi0/2";
        let device = ScriptedDevice::ios("r1")
            .with_output("show run | s interface", output)
            .with_chunk_size(13);
        let mut channel = ready(&device).await;
        let prompt = completion_pattern("r1").unwrap();
        let marker = ios_marker();
        let config = SessionConfig::default();

        let mut exec = CommandExecutor::new(&mut channel, &prompt, Some(&marker), &config);
        let result = exec.execute("show run | s interface").await.unwrap();
        assert_eq!(result.pages, 0);
        assert!(result.contains(" description --More-- uplink"));
        assert!(result.text.ends_with("interface Gi0/2"));
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let device = ScriptedDevice::ios("r1")
            .with_stalled_output("show tech", "---- show clock ----\n12:00");
        let mut channel = ready(&device).await;
        let prompt = completion_pattern("r1").unwrap();
        let config = SessionConfig::default().with_command_timeout(Duration::from_millis(50));

        let mut exec = CommandExecutor::new(&mut channel, &prompt, None, &config);
        let err = exec.execute("show tech").await.unwrap_err();
        match err {
            Error::CommandTimeout(e) => {
                assert_eq!(e.command, "show tech");
                assert_eq!(e.timeout, Duration::from_millis(50));
                assert_eq!(e.partial_output, "---- show clock ----\n12:00");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_without_output() {
        let device = ScriptedDevice::ios("r1").with_silent_command("show tech");
        let mut channel = ready(&device).await;
        let prompt = completion_pattern("r1").unwrap();
        let config = SessionConfig::default().with_command_timeout(Duration::from_millis(50));

        let mut exec = CommandExecutor::new(&mut channel, &prompt, None, &config);
        match exec.execute("show tech").await.unwrap_err() {
            Error::CommandTimeout(e) => assert_eq!(e.partial_output, ""),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_retry_after_timeout_resends() {
        let device = ScriptedDevice::ios("r1").with_silent_command("show tech");
        let mut channel = ready(&device).await;
        let prompt = completion_pattern("r1").unwrap();
        let config = SessionConfig::default()
            .with_command_timeout(Duration::from_millis(50))
            .with_command_retries(2);

        let mut exec = CommandExecutor::new(&mut channel, &prompt, None, &config);
        assert!(exec.execute("show tech").await.is_err());
        assert_eq!(device.log().count("show tech"), 3);
    }
}
