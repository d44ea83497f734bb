//! Login dialogs: wait for one of several prompts, answer, repeat.

use std::sync::LazyLock;
use std::time::Duration;

use log::trace;
use regex::bytes::Regex;

use crate::channel::patterns::{GENERIC_PROMPT, exact_prompt_pattern};
use crate::channel::{PatternBuffer, TerminalChannel};
use crate::error::{ChannelError, Result};

pub(crate) static USERNAME_PROMPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:user ?name|login):[ \t]*\z").expect("static username pattern")
});
pub(crate) static PASSWORD_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)assword:[ \t]*\z").expect("static password pattern"));
pub(crate) static DEVICE_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(GENERIC_PROMPT).expect("static device prompt pattern"));

/// What a login dialog step saw at the tail of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reply {
    Username,
    Password,
    /// The hop's own prompt came back: the connection attempt ended.
    Origin,
    Device,
}

/// Read until the tail shows a username, password, origin or device prompt.
///
/// The origin prompt (the jump host's own prompt, if any) is checked before
/// the generic device prompt, which would match it too. Returns the reply and every byte read.
pub(crate) async fn expect_reply<C: TerminalChannel>(
    channel: &mut C,
    origin: Option<&Regex>,
    timeout: Duration,
) -> Result<(Reply, Vec<u8>)> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut buffer = PatternBuffer::default();

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let Some(chunk) = channel.read(remaining).await? else {
            return Err(ChannelError::PatternTimeout(timeout).into());
        };
        buffer.extend(&chunk);

        let reply = if buffer.tail_contains(&PASSWORD_PROMPT) {
            Some(Reply::Password)
        } else if buffer.tail_contains(&USERNAME_PROMPT) {
            Some(Reply::Username)
        } else if origin.is_some_and(|origin| buffer.tail_contains(origin)) {
            Some(Reply::Origin)
        } else if buffer.tail_contains(&DEVICE_PROMPT) {
            Some(Reply::Device)
        } else {
            None
        };

        if let Some(reply) = reply {
            trace!("Login dialog reply: {:?}", reply);
            return Ok((reply, buffer.take()));
        }
    }
}

/// Pattern for a known prompt string, e.g. the jump host's shell prompt.
pub(crate) fn origin_pattern(prompt: &str) -> Result<Regex> {
    Ok(exact_prompt_pattern(prompt).map_err(ChannelError::from)?)
}

/// The last line before the prompt, used as the reason for a refusal.
pub(crate) fn refusal_detail(output: &[u8]) -> String {
    let text = String::from_utf8_lossy(output);
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .rev();
    lines.next();
    lines.next().unwrap_or("connection closed").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts() {
        assert!(USERNAME_PROMPT.is_match(b"\r\nUser Access Verification\r\n\r\nUsername: "));
        assert!(USERNAME_PROMPT.is_match(b"switch login:"));
        assert!(PASSWORD_PROMPT.is_match(b"admin@10.1.1.1's password: "));
        assert!(!PASSWORD_PROMPT.is_match(b"Password: ok\r\n"));
    }

    #[test]
    fn test_refusal_detail() {
        let output = b"ssh admin@10.9.9.9\r\nssh: connect to host 10.9.9.9 port 22: Connection refused\r\njump:~$ ";
        assert_eq!(
            refusal_detail(output),
            "ssh: connect to host 10.9.9.9 port 22: Connection refused"
        );
        assert_eq!(refusal_detail(b"jump:~$ "), "connection closed");
    }
}
