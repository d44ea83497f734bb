//! Channel layer for raw terminal I/O and pattern matching.
//!
//! A [`TerminalChannel`] is the primitive every higher layer is written
//! against: send text, read whatever arrived within a timeout, close. The SSH,
//! Telnet and jump-host channels in [`crate::transport`] implement it, as does
//! the simulated [`ScriptedChannel`] used for dry runs and tests.

mod buffer;
pub mod patterns;
mod scripted;

pub use buffer::PatternBuffer;
pub use scripted::{ScriptedChannel, ScriptedDevice, ScriptedLog};

use std::future::Future;
use std::time::Duration;

use log::trace;
use regex::bytes::Regex;

use crate::error::{ChannelError, Result};

/// Raw interactive channel to a connected device.
pub trait TerminalChannel: Send {
    /// Write text to the device exactly as given.
    fn send(&mut self, text: &str) -> impl Future<Output = Result<()>> + Send;

    /// Read the next chunk of output.
    ///
    /// Returns `Ok(None)` if nothing arrived within `timeout`, and
    /// `ChannelError::Closed` once the remote side has gone away.
    fn read(&mut self, timeout: Duration) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Close the channel.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Check if the channel is still open.
    fn is_open(&self) -> bool;

    /// Read until `pattern` matches the tail of the accumulated output.
    ///
    /// `timeout` bounds the whole wait, not each read. Returns everything read,
    /// including the matched text.
    fn read_until(
        &mut self,
        pattern: &Regex,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send
    where
        Self: Sized,
    {
        async move {
            let deadline = tokio::time::Instant::now() + timeout;
            let mut buffer = PatternBuffer::default();

            loop {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                if remaining.is_zero() {
                    return Err(ChannelError::PatternTimeout(timeout).into());
                }

                match self.read(remaining).await? {
                    Some(chunk) => {
                        buffer.extend(&chunk);
                        if buffer.tail_contains(pattern) {
                            trace!("read_until matched after {} bytes", buffer.len());
                            return Ok(buffer.take());
                        }
                    }
                    None => return Err(ChannelError::PatternTimeout(timeout).into()),
                }
            }
        }
    }
}
