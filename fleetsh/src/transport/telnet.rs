//! Telnet transport: option negotiation, line discipline and login.
//!
//! The client refuses every option except the two a CLI session needs:
//! the server may echo (`WILL ECHO`) and either side may suppress go-ahead.
//! `DONT`/`WONT` are never answered, so negotiation cannot loop.

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use log::debug;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use super::config::TelnetConfig;
use super::dialog::{Reply, expect_reply};
use crate::channel::TerminalChannel;
use crate::error::{ChannelError, ConnectError, CredentialError, Error, Result};

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

const OPT_ECHO: u8 = 1;
const OPT_SGA: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Data,
    Iac,
    Negotiate(u8),
    Sub,
    SubIac,
}

/// Incremental telnet decoder; command sequences may span reads.
#[derive(Debug, Default)]
pub struct TelnetCodec {
    state: State,
}

impl TelnetCodec {
    /// Split raw input into terminal data and the negotiation replies owed.
    pub fn decode(&mut self, input: &[u8], data: &mut BytesMut, replies: &mut BytesMut) {
        let mut rest = input;
        while !rest.is_empty() {
            if self.state == State::Data {
                match memchr::memchr(IAC, rest) {
                    Some(pos) => {
                        data.put_slice(&rest[..pos]);
                        self.state = State::Iac;
                        rest = &rest[pos + 1..];
                    }
                    None => {
                        data.put_slice(rest);
                        rest = &[];
                    }
                }
                continue;
            }

            let byte = rest[0];
            rest = &rest[1..];
            self.state = match (self.state, byte) {
                (State::Iac, IAC) => {
                    data.put_u8(IAC);
                    State::Data
                }
                (State::Iac, DO | DONT | WILL | WONT) => State::Negotiate(byte),
                (State::Iac, SB) => State::Sub,
                (State::Iac, _) => State::Data,
                (State::Negotiate(command), option) => {
                    if let Some(reply) = Self::answer(command, option) {
                        replies.put_slice(&[IAC, reply, option]);
                    }
                    State::Data
                }
                (State::Sub, IAC) => State::SubIac,
                (State::SubIac, SE) => State::Data,
                (State::Sub | State::SubIac, _) => State::Sub,
                (State::Data, _) => State::Data,
            };
        }
    }

    fn answer(command: u8, option: u8) -> Option<u8> {
        match (command, option) {
            (DO, OPT_SGA) => Some(WILL),
            (DO, _) => Some(WONT),
            (WILL, OPT_ECHO | OPT_SGA) => Some(DO),
            (WILL, _) => Some(DONT),
            _ => None,
        }
    }

    /// Encode outgoing text; a bare `\n` goes out as CR LF.
    ///
    /// UTF-8 never contains 0xFF, so no IAC escaping is needed.
    pub fn encode(text: &str, out: &mut BytesMut) {
        let mut previous = 0u8;
        for &byte in text.as_bytes() {
            if byte == b'\n' && previous != b'\r' {
                out.put_slice(b"\r\n");
            } else {
                out.put_u8(byte);
            }
            previous = byte;
        }
    }
}

/// Interactive channel over a telnet byte stream.
pub struct TelnetChannel<S> {
    stream: S,
    codec: TelnetCodec,
    pending: Option<Vec<u8>>,
    open: bool,
}

impl TelnetChannel<TcpStream> {
    /// Connect and log in.
    pub async fn connect(config: &TelnetConfig) -> Result<Self> {
        debug!("Connecting to {} via telnet", config.socket_addr());
        let stream = tokio::time::timeout(
            config.timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| ConnectError::Timeout(config.timeout))?
        .map_err(|source| ConnectError::ConnectionFailed {
            host: config.host.clone(),
            port: config.port,
            source,
        })?;

        let mut channel = Self::new(stream);
        channel
            .login(&config.username, config.password.as_ref(), config.timeout)
            .await?;
        Ok(channel)
    }
}

impl<S> TelnetChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an established byte stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            codec: TelnetCodec::default(),
            pending: None,
            open: true,
        }
    }

    /// Answer username and password prompts until a device prompt appears.
    ///
    /// Output read during login (banner, prompt) is handed back by the next
    /// [`read`](TerminalChannel::read).
    pub async fn login(
        &mut self,
        username: &str,
        password: Option<&SecretString>,
        timeout: Duration,
    ) -> Result<()> {
        let mut sent_username = false;
        let mut sent_password = false;

        loop {
            let (reply, seen) = expect_reply(self, None, timeout)
                .await
                .map_err(login_failure)?;

            match reply {
                Reply::Username if !sent_username => {
                    self.send(&format!("{}\n", username)).await?;
                    sent_username = true;
                }
                Reply::Password if !sent_password => {
                    let password = password.ok_or_else(|| CredentialError::MissingPassword {
                        username: username.to_string(),
                    })?;
                    self.send(&format!("{}\n", password.expose_secret())).await?;
                    sent_password = true;
                }
                Reply::Username | Reply::Password => {
                    return Err(ConnectError::AuthenticationFailed {
                        user: username.to_string(),
                    }
                    .into());
                }
                Reply::Device | Reply::Origin => {
                    debug!("Telnet login complete for {}", username);
                    self.pending = Some(seen);
                    return Ok(());
                }
            }
        }
    }
}

/// Channel failures during a login dialog are connection failures.
pub(crate) fn login_failure(error: Error) -> Error {
    match error {
        Error::Channel(e) => ConnectError::Login(e).into(),
        other => other,
    }
}

impl<S> TerminalChannel for TelnetChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, text: &str) -> Result<()> {
        if !self.open {
            return Err(ChannelError::Closed.into());
        }
        let mut out = BytesMut::with_capacity(text.len() + 2);
        TelnetCodec::encode(text, &mut out);
        self.stream.write_all(&out).await.map_err(ChannelError::Io)?;
        self.stream.flush().await.map_err(ChannelError::Io)?;
        Ok(())
    }

    async fn read(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        if let Some(pending) = self.pending.take() {
            return Ok(Some(pending));
        }
        if !self.open {
            return Err(ChannelError::Closed.into());
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let mut raw = [0u8; 4096];
        loop {
            let n = match tokio::time::timeout_at(deadline, self.stream.read(&mut raw)).await {
                Err(_) => return Ok(None),
                Ok(result) => result.map_err(ChannelError::Io)?,
            };
            if n == 0 {
                debug!("Telnet connection closed by peer");
                self.open = false;
                return Err(ChannelError::Closed.into());
            }

            let mut data = BytesMut::with_capacity(n);
            let mut replies = BytesMut::new();
            self.codec.decode(&raw[..n], &mut data, &mut replies);
            if !replies.is_empty() {
                self.stream.write_all(&replies).await.map_err(ChannelError::Io)?;
            }
            if !data.is_empty() {
                return Ok(Some(data.to_vec()));
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            if let Err(e) = self.stream.shutdown().await {
                debug!("Telnet shutdown failed: {}", e);
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
