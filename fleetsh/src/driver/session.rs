//! Device session lifecycle.
//!
//! ```text
//! Classifying -> Ready -> Executing -> Ready ... -> Disconnecting -> Disconnected
//!      \______________________\____________________________> Failed
//! ```
//!
//! A [`Session`] is built on an already-connected [`TerminalChannel`]: the
//! [`Connector`](crate::transport::Connector) covers connecting. Establishing
//! the session discovers the prompt, classifies the device, escalates to
//! privileged mode when an enable password is available, and switches paging
//! off. Closing restores the terminal and closes the channel.

use std::fmt;
use std::sync::LazyLock;

use futures_util::future::BoxFuture;
use log::{debug, info, warn};
use regex::bytes::Regex;
use secrecy::{ExposeSecret, SecretString};

use super::config::{PaginationMode, SessionConfig};
use super::executor::CommandExecutor;
use super::pagination::TerminalGuard;
use super::response::CommandResult;
use crate::channel::patterns::{self, completion_pattern, last_line, marker_pattern};
use crate::channel::{PatternBuffer, TerminalChannel};
use crate::error::{ChannelError, Error, Result, SessionError, UnsupportedDeviceError};
use crate::platform::{
    Classification, OsFamily, PrivilegeMode, TerminalProfile, TerminalSettings, classify,
    parse_prompt,
};

/// Reply to `enable`: a password prompt or a prompt line.
static ENABLE_REPLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:assword:|[#>])[ \t]*\z").expect("static enable reply pattern")
});

/// Confirmation question at the tail, e.g. `Destination filename [startup-config]?`.
const CONFIRMATION: &str = r"\?[ \t]*\z";

/// Saves the running configuration on every supported family.
pub const SAVE_COMMAND: &str = "copy running-config startup-config";

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Discovering the prompt and identifying the device.
    Classifying,
    /// At the prompt, ready for a command.
    Ready,
    /// A command is in flight.
    Executing,
    /// Restoring terminal settings and closing.
    Disconnecting,
    /// Closed.
    Disconnected,
    /// The channel failed; only closing is possible.
    Failed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Classifying => "classifying",
            SessionPhase::Ready => "ready",
            SessionPhase::Executing => "executing",
            SessionPhase::Disconnecting => "disconnecting",
            SessionPhase::Disconnected => "disconnected",
            SessionPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What the session learned about the device.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    prompt: String,
    os_family: OsFamily,
    hostname: String,
    privilege: PrivilegeMode,
    saved_terminal: TerminalSettings,
    pagination_suppressed: bool,
}

impl SessionState {
    /// The current prompt line.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Classified OS family.
    pub fn os_family(&self) -> OsFamily {
        self.os_family
    }

    /// Hostname taken from the prompt.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Current privilege mode.
    pub fn privilege(&self) -> PrivilegeMode {
        self.privilege
    }

    /// Terminal settings as found at login.
    pub fn saved_terminal(&self) -> TerminalSettings {
        self.saved_terminal
    }

    /// Whether paging is off for this session.
    pub fn is_pagination_suppressed(&self) -> bool {
        self.pagination_suppressed
    }
}

/// An interactive session with one classified device.
pub struct Session<C: TerminalChannel> {
    channel: C,
    config: SessionConfig,
    state: SessionState,
    phase: SessionPhase,
    prompt_pattern: Regex,
    marker_pattern: Option<Regex>,
    terminal: Option<TerminalGuard>,
}

impl<C: TerminalChannel> Session<C> {
    /// Classify the device behind `channel` and prepare it for commands.
    ///
    /// On failure the session is torn down (terminal restored where it was
    /// changed, channel closed) before the error is returned.
    pub async fn establish(
        channel: C,
        config: SessionConfig,
        enable_password: Option<&SecretString>,
    ) -> Result<Self> {
        config.validate()?;

        let mut session = Self {
            channel,
            config,
            state: SessionState::default(),
            phase: SessionPhase::Classifying,
            prompt_pattern: Regex::new(patterns::GENERIC_PROMPT).map_err(ChannelError::from)?,
            marker_pattern: None,
            terminal: None,
        };

        match session.initialize(enable_password).await {
            Ok(()) => {
                session.phase = SessionPhase::Ready;
                info!(
                    "Session ready: {} ({}, {:?}, paging {})",
                    session.state.hostname,
                    session.state.os_family,
                    session.state.privilege,
                    if session.state.pagination_suppressed { "off" } else { "on" }
                );
                Ok(session)
            }
            Err(e) => {
                session.phase = SessionPhase::Failed;
                if let Err(cleanup) = session.teardown().await {
                    debug!("Cleanup after failed session setup: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    /// Establish a session, run `task`, and close, whatever the task returns.
    ///
    /// A task error wins over a close error; a close error after a successful
    /// task is returned as the result.
    pub async fn scoped<T, F>(
        channel: C,
        config: SessionConfig,
        enable_password: Option<&SecretString>,
        task: F,
    ) -> Result<T>
    where
        F: for<'s> FnOnce(&'s mut Session<C>) -> BoxFuture<'s, Result<T>>,
    {
        let mut session = Self::establish(channel, config, enable_password).await?;
        let outcome = task(&mut session).await;
        let closed = session.close().await;

        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!("Closing session after task failure also failed: {}", close_err);
                Err(e)
            }
        }
    }

    async fn initialize(&mut self, enable_password: Option<&SecretString>) -> Result<()> {
        let banner = self.discover_prompt().await?;

        if let Some(prompt) = last_line(&banner)
            && let Some((_, _, true)) = parse_prompt(prompt)
        {
            return Err(SessionError::ConfigurationMode {
                prompt: prompt.to_string(),
            }
            .into());
        }

        let classification = match classify(&banner, self.config.banner_sample) {
            Ok(classification) => classification,
            Err(UnsupportedDeviceError::UnrecognizedBanner { prompt }) => {
                self.probe(prompt).await?
            }
            Err(e) => return Err(e.into()),
        };

        self.prompt_pattern =
            completion_pattern(&classification.hostname).map_err(ChannelError::from)?;
        self.state = SessionState {
            prompt: classification.prompt,
            os_family: classification.family,
            hostname: classification.hostname,
            privilege: classification.privilege,
            ..SessionState::default()
        };

        if self.state.privilege == PrivilegeMode::User {
            match enable_password {
                Some(secret) => self.escalate(secret).await?,
                None => info!(
                    "No enable password for {}, staying in user mode",
                    self.state.hostname
                ),
            }
        }

        let profile = TerminalProfile::for_family(self.state.os_family);
        self.marker_pattern = Some(marker_pattern(profile.more_marker).map_err(ChannelError::from)?);

        if self.config.pagination == PaginationMode::Suppress {
            self.suppress_pagination().await?;
        }

        Ok(())
    }

    /// Read the banner until a prompt line sits at the end of it, nudging the
    /// device with a bare line ending when it stays quiet.
    async fn discover_prompt(&mut self) -> Result<String> {
        let pattern = Regex::new(patterns::GENERIC_PROMPT).map_err(ChannelError::from)?;
        let mut buffer = PatternBuffer::new(self.config.banner_sample);
        let attempts = self.config.prompt_attempts;

        for attempt in 0..=attempts {
            while let Some(chunk) = self.channel.read(self.config.prompt_timeout).await? {
                buffer.extend(&chunk);
                if !buffer.tail_contains(&pattern) {
                    continue;
                }

                // Drain what is still arriving (e.g. prompts answering earlier nudges).
                while let Some(more) = self.channel.read(self.config.marker_settle).await? {
                    buffer.extend(&more);
                }
                if buffer.tail_contains(&pattern) {
                    debug!("Prompt discovered after {} nudge(s)", attempt);
                    return Ok(buffer.as_str_lossy().into_owned());
                }
            }

            if attempt < attempts {
                debug!("No prompt yet, sending line ending ({}/{})", attempt + 1, attempts);
                self.channel.send(&self.config.line_ending).await?;
            }
        }

        Err(UnsupportedDeviceError::PromptNotFound { attempts }.into())
    }

    /// Identify a device whose banner has no vendor marker by running the
    /// probe command and classifying its output.
    async fn probe(&mut self, prompt: String) -> Result<Classification> {
        let Some(command) = self.config.probe_command.clone() else {
            return Err(UnsupportedDeviceError::UnrecognizedBanner { prompt }.into());
        };
        let Some((hostname, _, _)) = parse_prompt(&prompt) else {
            return Err(UnsupportedDeviceError::InvalidPrompt { prompt }.into());
        };

        debug!("Banner has no vendor marker, probing {} with {:?}", hostname, command);
        self.prompt_pattern = completion_pattern(&hostname).map_err(ChannelError::from)?;
        let marker = marker_pattern(TerminalProfile::for_family(OsFamily::Unknown).more_marker)
            .map_err(ChannelError::from)?;

        let output = CommandExecutor::new(
            &mut self.channel,
            &self.prompt_pattern,
            Some(&marker),
            &self.config,
        )
        .execute(&command)
        .await?;

        let text = format!("{}\n{}", output.text, prompt);
        Ok(classify(&text, self.config.banner_sample)?)
    }

    /// Move from user to privileged mode.
    async fn escalate(&mut self, secret: &SecretString) -> Result<()> {
        info!("Entering enable mode on {}", self.state.hostname);
        let timeout = self.config.command_timeout;

        self.channel
            .send(&format!("enable{}", self.config.line_ending))
            .await?;
        let reply = self.channel.read_until(&ENABLE_REPLY, timeout).await?;
        let mut reply = String::from_utf8_lossy(&reply).into_owned();

        if reply.to_ascii_lowercase().contains("no password set") {
            return Err(SessionError::EnableFailed {
                reason: "no enable password is set on the device".to_string(),
            }
            .into());
        }

        if reply.trim_end().ends_with(':') {
            // Never echoed or logged.
            self.channel
                .send(&format!("{}{}", secret.expose_secret(), self.config.line_ending))
                .await?;
            let answer = self.channel.read_until(&ENABLE_REPLY, timeout).await?;
            reply = String::from_utf8_lossy(&answer).into_owned();

            let reprompted = reply.trim_end().ends_with(':');
            if reprompted || reply.to_ascii_lowercase().contains("% bad secrets") {
                if reprompted {
                    self.channel.send("\x03").await?;
                    self.channel.read_until(&self.prompt_pattern, timeout).await?;
                }
                return Err(SessionError::EnableFailed {
                    reason: "enable secret rejected".to_string(),
                }
                .into());
            }
        }

        let prompt = last_line(&reply).unwrap_or_default().to_string();
        match parse_prompt(&prompt) {
            Some((_, PrivilegeMode::Privileged, _)) => {
                debug!("Enable mode active, prompt {:?}", prompt);
                self.state.prompt = prompt;
                self.state.privilege = PrivilegeMode::Privileged;
                Ok(())
            }
            _ => Err(SessionError::EnableFailed {
                reason: format!("access denied (prompt {:?})", prompt),
            }
            .into()),
        }
    }

    async fn suppress_pagination(&mut self) -> Result<()> {
        let mut guard = TerminalGuard::new(self.state.os_family);
        let outcome = {
            let mut exec = CommandExecutor::new(
                &mut self.channel,
                &self.prompt_pattern,
                self.marker_pattern.as_ref(),
                &self.config,
            );
            guard.suppress(&mut exec).await
        };

        self.state.saved_terminal = guard.saved();
        self.state.pagination_suppressed = guard.is_suppressed();
        if !guard.is_suppressed() {
            info!(
                "Pagination stays on for {}, advancing past markers",
                self.state.hostname
            );
        }
        self.terminal = Some(guard);
        outcome
    }

    /// Execute one command and wait for the prompt.
    ///
    /// A timeout leaves the session ready for the next command; a channel
    /// failure moves it to [`SessionPhase::Failed`].
    pub async fn execute(&mut self, command: &str) -> Result<CommandResult> {
        self.run(command, None).await
    }

    /// Run one command, completing on `completion` instead of the prompt when given.
    async fn run(&mut self, command: &str, completion: Option<&Regex>) -> Result<CommandResult> {
        self.ensure_ready()?;
        self.phase = SessionPhase::Executing;

        let marker = if self.state.pagination_suppressed {
            None
        } else {
            self.marker_pattern.as_ref()
        };
        let completion = completion.unwrap_or(&self.prompt_pattern);
        let result = CommandExecutor::new(&mut self.channel, completion, marker, &self.config)
            .execute(command)
            .await;

        self.phase = match &result {
            Err(Error::Channel(e)) => {
                warn!("Channel to {} failed: {}", self.state.hostname, e);
                SessionPhase::Failed
            }
            _ => SessionPhase::Ready,
        };
        result
    }

    /// Execute commands in order, stopping at the first error.
    pub async fn execute_all<S: AsRef<str>>(&mut self, commands: &[S]) -> Result<Vec<CommandResult>> {
        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            results.push(self.execute(command.as_ref()).await?);
        }
        Ok(results)
    }

    /// Apply configuration commands inside `configure terminal` ... `end`.
    ///
    /// Stops at the first command whose output matches a failure pattern; the
    /// returned results end with that command. Configuration mode is left
    /// in every case where the channel is still usable.
    pub async fn send_config<S: AsRef<str>>(&mut self, commands: &[S]) -> Result<Vec<CommandResult>> {
        let enter = self.execute("configure terminal").await?;
        if !enter.is_success() {
            return Err(SessionError::ConfigurationRefused { output: enter.text }.into());
        }

        let mut results = Vec::with_capacity(commands.len());
        let mut outcome = Ok(());
        for command in commands {
            match self.execute(command.as_ref()).await {
                Ok(result) => {
                    let failed = !result.is_success();
                    results.push(result);
                    if failed {
                        warn!("Configuration command {:?} failed, stopping", command.as_ref());
                        break;
                    }
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        if self.phase == SessionPhase::Ready {
            let end = self.execute("end").await;
            if outcome.is_ok() {
                end?;
            }
        }

        outcome.map(|()| results)
    }

    /// Save the running configuration with [`SAVE_COMMAND`].
    pub async fn save(&mut self) -> Result<CommandResult> {
        self.save_with(SAVE_COMMAND).await
    }

    /// Save the configuration with `command`, accepting the default answer
    /// if the device asks for confirmation.
    pub async fn save_with(&mut self, command: &str) -> Result<CommandResult> {
        info!("Saving configuration on {}", self.state.hostname);
        let asking = format!("(?:{})|(?:{})", self.prompt_pattern.as_str(), CONFIRMATION);
        let asking = Regex::new(&asking).map_err(ChannelError::from)?;

        let first = self.run(command, Some(&asking)).await?;
        if self.prompt_pattern.is_match(first.raw.as_bytes()) {
            return Ok(first);
        }

        debug!("Confirming {:?}", first.prompt);
        let answer = self.run("", None).await?;
        Ok(CommandResult {
            command: first.command,
            text: answer.text,
            raw: format!("{}{}", first.raw, answer.raw),
            prompt: answer.prompt,
            elapsed: first.elapsed + answer.elapsed,
            pages: first.pages + answer.pages,
            failure_message: first.failure_message.or(answer.failure_message),
        })
    }

    /// Fail with [`UnsupportedDeviceError::OsNotAccepted`] unless the device
    /// runs one of `accepted`.
    pub fn require_os(&self, accepted: &[OsFamily]) -> Result<()> {
        if accepted.contains(&self.state.os_family) {
            return Ok(());
        }
        let expected = accepted
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        debug!("{} runs {}, not in [{}]", self.state.hostname, self.state.os_family, expected);
        Err(UnsupportedDeviceError::OsNotAccepted {
            os: self.state.os_family,
            expected,
        }
        .into())
    }

    /// Restore terminal settings and close the channel.
    pub async fn close(mut self) -> Result<()> {
        self.teardown().await
    }

    async fn teardown(&mut self) -> Result<()> {
        if self.phase == SessionPhase::Disconnected {
            return Ok(());
        }
        self.phase = SessionPhase::Disconnecting;
        debug!("Closing session to {}", self.state.hostname);

        let mut outcome = Ok(());
        if let Some(guard) = self.terminal.as_mut() {
            let mut exec = CommandExecutor::new(&mut self.channel, &self.prompt_pattern, None, &self.config);
            outcome = guard.release(&mut exec).await;
        }

        if let Err(e) = self.channel.close().await {
            warn!("Error closing channel to {}: {}", self.state.hostname, e);
            if outcome.is_ok() {
                outcome = Err(e);
            }
        }

        self.phase = SessionPhase::Disconnected;
        outcome
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.phase == SessionPhase::Ready {
            Ok(())
        } else {
            Err(SessionError::NotReady {
                state: self.phase.to_string(),
            }
            .into())
        }
    }

    /// Hostname taken from the prompt.
    pub fn hostname(&self) -> &str {
        &self.state.hostname
    }

    /// Classified OS family.
    pub fn os_family(&self) -> OsFamily {
        self.state.os_family
    }

    /// Current privilege mode.
    pub fn privilege(&self) -> PrivilegeMode {
        self.state.privilege
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Read-only view of what the session learned about the device.
    pub fn state(&self) -> &SessionState {
        &self.state
    }
}

impl<C: TerminalChannel> Drop for Session<C> {
    fn drop(&mut self) {
        if self.phase != SessionPhase::Disconnected {
            warn!(
                "Session to {} dropped without close(); terminal settings were not restored",
                self.state.hostname
            );
        }
    }
}
