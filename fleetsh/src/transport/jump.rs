//! Jump-host hops.
//!
//! A proxy is an already-connected shell (usually a Linux bastion) from
//! which devices are reached by typing `ssh` or `telnet` at its prompt. The
//! proxy is registered once as a [`ProxyLink`] behind an
//! `Arc<tokio::sync::Mutex<_>>`; a [`JumpChannel`] holds the owned lock for
//! its whole lifetime, so a proxy carries one hop at a time.

use std::time::Duration;

use log::{debug, warn};
use regex::bytes::Regex;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::OwnedMutexGuard;

use super::dialog::{Reply, expect_reply, origin_pattern, refusal_detail};
use super::telnet::login_failure;
use crate::channel::patterns::{GENERIC_PROMPT, last_line};
use crate::channel::{PatternBuffer, TerminalChannel};
use crate::error::{ChannelError, ConnectError, CredentialError, Result};

/// How the jump host reaches the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopProtocol {
    Ssh,
    Telnet,
}

/// A connected proxy shell and the prompt it returns to between hops.
pub struct ProxyLink<P> {
    name: String,
    prompt: String,
    channel: P,
    poisoned: bool,
}

impl<P: TerminalChannel> ProxyLink<P> {
    /// Wrap a proxy channel, discovering its prompt.
    pub async fn discover(name: impl Into<String>, mut channel: P, timeout: Duration) -> Result<Self> {
        let name = name.into();
        let pattern = Regex::new(GENERIC_PROMPT).map_err(ChannelError::from)?;

        channel.send("\n").await?;
        let raw = channel
            .read_until(&pattern, timeout)
            .await
            .map_err(login_failure)?;
        let mut buffer = PatternBuffer::default();
        buffer.extend(&raw);
        let text = buffer.as_str_lossy();
        let prompt = last_line(&text)
            .ok_or(ChannelError::PatternTimeout(timeout))?
            .to_string();

        debug!("Proxy '{}' prompt is {:?}", name, prompt);
        Ok(Self::new(name, channel, prompt))
    }

    /// Wrap a proxy channel whose prompt is already known.
    pub fn new(name: impl Into<String>, channel: P, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            channel,
            poisoned: false,
        }
    }

    /// Name the proxy was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The proxy's own prompt.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Whether the proxy was left on a device it could not leave.
    ///
    /// A poisoned proxy must not carry further hops: anything typed at it
    /// would land on the previous device.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub(crate) fn poison(&mut self) {
        self.poisoned = true;
    }

    /// Close the proxy channel itself.
    pub async fn close(&mut self) -> Result<()> {
        self.channel.close().await
    }
}

/// Parameters for one hop.
#[derive(Debug)]
pub struct Hop<'a> {
    pub protocol: HopProtocol,
    pub host: &'a str,
    pub port: u16,
    pub username: &'a str,
    pub password: Option<&'a SecretString>,
}

impl Hop<'_> {
    fn command(&self, ssh_options: &str) -> String {
        match self.protocol {
            HopProtocol::Ssh => {
                let mut command = String::from("ssh");
                if !ssh_options.is_empty() {
                    command.push(' ');
                    command.push_str(ssh_options);
                }
                if self.port != 22 {
                    command.push_str(&format!(" -p {}", self.port));
                }
                format!("{} {}@{}", command, self.username, self.host)
            }
            HopProtocol::Telnet if self.port != 23 => format!("telnet {} {}", self.host, self.port),
            HopProtocol::Telnet => format!("telnet {}", self.host),
        }
    }
}

/// Device channel tunnelled through a proxy's CLI.
pub struct JumpChannel<P> {
    link: OwnedMutexGuard<ProxyLink<P>>,
    origin: Regex,
    pending: Option<Vec<u8>>,
    exit_command: String,
    timeout: Duration,
    open: bool,
}

impl<P: TerminalChannel> JumpChannel<P> {
    /// Run the hop command on the proxy and answer the login dialog.
    ///
    /// On failure the proxy is brought back to its own prompt (when possible)
    /// before the lock is released.
    pub async fn open(
        mut link: OwnedMutexGuard<ProxyLink<P>>,
        hop: &Hop<'_>,
        ssh_options: &str,
        exit_command: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let origin = origin_pattern(&link.prompt)?;
        let command = hop.command(ssh_options);
        debug!("Hopping from proxy '{}': {}", link.name, command);

        match Self::login(&mut link.channel, &origin, hop, &command, timeout).await {
            Ok(seen) => Ok(Self {
                link,
                origin,
                pending: Some(seen),
                exit_command: exit_command.to_string(),
                timeout,
                open: true,
            }),
            Err(e) => {
                Self::abandon(&mut link, &origin, timeout).await;
                Err(e)
            }
        }
    }

    async fn login(
        channel: &mut P,
        origin: &Regex,
        hop: &Hop<'_>,
        command: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        channel.send(&format!("{}\n", command)).await?;

        let mut sent_username = hop.protocol == HopProtocol::Ssh;
        let mut sent_password = false;

        loop {
            let (reply, seen) = expect_reply(channel, Some(origin), timeout)
                .await
                .map_err(login_failure)?;

            match reply {
                Reply::Origin => {
                    return Err(ConnectError::Refused {
                        host: hop.host.to_string(),
                        detail: refusal_detail(&seen),
                    }
                    .into());
                }
                Reply::Username if !sent_username => {
                    channel.send(&format!("{}\n", hop.username)).await?;
                    sent_username = true;
                }
                Reply::Password if !sent_password => {
                    let password = hop.password.ok_or_else(|| CredentialError::MissingPassword {
                        username: hop.username.to_string(),
                    })?;
                    channel.send(&format!("{}\n", password.expose_secret())).await?;
                    sent_password = true;
                }
                Reply::Username | Reply::Password => {
                    return Err(ConnectError::AuthenticationFailed {
                        user: hop.username.to_string(),
                    }
                    .into());
                }
                Reply::Device => return Ok(seen),
            }
        }
    }

    /// Interrupt the hop so the proxy is usable again, poisoning it if the
    /// proxy prompt never comes back.
    async fn abandon(link: &mut ProxyLink<P>, origin: &Regex, timeout: Duration) {
        if !link.channel.is_open() {
            return;
        }
        if link.channel.send("\x03").await.is_ok()
            && link.channel.read_until(origin, timeout).await.is_ok()
        {
            return;
        }
        warn!(
            "Proxy '{}' did not return to its prompt; it will not carry further hops",
            link.name
        );
        link.poison();
    }

    /// Name of the proxy carrying this hop.
    pub fn proxy_name(&self) -> &str {
        &self.link.name
    }
}

impl<P: TerminalChannel> TerminalChannel for JumpChannel<P> {
    async fn send(&mut self, text: &str) -> Result<()> {
        if !self.open {
            return Err(ChannelError::Closed.into());
        }
        self.link.channel.send(text).await
    }

    async fn read(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        if let Some(pending) = self.pending.take() {
            return Ok(Some(pending));
        }
        if !self.open {
            return Err(ChannelError::Closed.into());
        }
        self.link.channel.read(timeout).await
    }

    /// Leave the device and wait for the proxy prompt. The proxy stays open.
    async fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.pending = None;

        let exit = format!("{}\n", self.exit_command);
        let left = match self.link.channel.send(&exit).await {
            Ok(()) => self.link.channel.read_until(&self.origin, self.timeout).await,
            Err(e) => Err(e),
        };
        if let Err(e) = left {
            warn!(
                "'{}' did not return proxy '{}' to its prompt: {}",
                self.exit_command, self.link.name, e
            );
            Self::abandon(&mut self.link, &self.origin, self.timeout).await;
            return Err(e);
        }
        debug!("Back on proxy '{}'", self.link.name);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open && self.link.channel.is_open()
    }
}

impl<P> Drop for JumpChannel<P> {
    fn drop(&mut self) {
        if self.open {
            warn!(
                "JumpChannel dropped without close(); proxy '{}' is still on the device",
                self.link.name
            );
            self.link.poisoned = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use super::*;
    use crate::error::{Error, FailureKind};

    /// Proxy shell answering each received line from a script.
    #[derive(Default)]
    struct Bastion {
        script: VecDeque<(&'static str, &'static str)>,
        outbound: VecDeque<Vec<u8>>,
        received: Vec<String>,
        line: String,
    }

    impl Bastion {
        fn answering(script: &[(&'static str, &'static str)]) -> Self {
            Self {
                script: script.iter().copied().collect(),
                ..Self::default()
            }
        }
    }

    impl TerminalChannel for Bastion {
        async fn send(&mut self, text: &str) -> Result<()> {
            for ch in text.chars() {
                if ch != '\n' && ch != '\x03' {
                    self.line.push(ch);
                    continue;
                }
                if ch == '\x03' {
                    self.line = "^C".to_string();
                }
                let line = std::mem::take(&mut self.line);
                if let Some((expected, reply)) = self.script.pop_front() {
                    assert_eq!(line, expected);
                    self.outbound.push_back(reply.as_bytes().to_vec());
                }
                self.received.push(line);
            }
            Ok(())
        }

        async fn read(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>> {
            Ok(self.outbound.pop_front())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }
    }

    fn proxy(bastion: Bastion) -> Arc<Mutex<ProxyLink<Bastion>>> {
        Arc::new(Mutex::new(ProxyLink::new("bastion", bastion, "ops@jump:~$")))
    }

    fn hop<'a>(protocol: HopProtocol, password: Option<&'a SecretString>) -> Hop<'a> {
        Hop {
            protocol,
            host: "10.1.1.1",
            port: if protocol == HopProtocol::Ssh { 22 } else { 23 },
            username: "admin",
            password,
        }
    }

    const SSH: &str = "ssh -o StrictHostKeyChecking=no admin@10.1.1.1";
    const TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_ssh_hop_and_exit() {
        let link = proxy(Bastion::answering(&[
            (SSH, "admin@10.1.1.1's password: "),
            ("s3cret", "\r\nedge1#"),
            ("show clock", "show clock\r\n12:00:00 UTC\r\nedge1#"),
            ("exit", "exit\r\nConnection to 10.1.1.1 closed.\r\nops@jump:~$ "),
        ]));
        let secret = SecretString::from("s3cret".to_string());

        let guard = link.clone().try_lock_owned().unwrap();
        let mut channel = JumpChannel::open(
            guard,
            &hop(HopProtocol::Ssh, Some(&secret)),
            "-o StrictHostKeyChecking=no",
            "exit",
            TIMEOUT,
        )
        .await
        .unwrap();
        assert!(link.clone().try_lock_owned().is_err());

        let replay = channel.read(TIMEOUT).await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&replay).ends_with("edge1#"));

        channel.send("show clock\n").await.unwrap();
        let out = channel.read(TIMEOUT).await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&out).contains("12:00:00"));

        channel.close().await.unwrap();
        assert!(!channel.is_open());
        drop(channel);

        let link = link.try_lock_owned().unwrap();
        assert_eq!(link.channel.received, vec![SSH, "s3cret", "show clock", "exit"]);
    }

    #[tokio::test]
    async fn test_telnet_hop_with_port() {
        let link = proxy(Bastion::answering(&[
            ("telnet 10.1.1.1 2023", "Trying 10.1.1.1...\r\n\r\nUsername: "),
            ("admin", "Password: "),
            ("s3cret", "\r\nedge1>"),
        ]));
        let secret = SecretString::from("s3cret".to_string());
        let mut target = hop(HopProtocol::Telnet, Some(&secret));
        target.port = 2023;

        let guard = link.clone().try_lock_owned().unwrap();
        let mut channel = JumpChannel::open(guard, &target, "", "exit", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(channel.proxy_name(), "bastion");
        assert!(channel.read(TIMEOUT).await.unwrap().is_some());
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn test_refused_hop_releases_proxy() {
        let link = proxy(Bastion::answering(&[(
            SSH,
            "ssh: connect to host 10.1.1.1 port 22: Connection refused\r\nops@jump:~$ ",
        )]));

        let guard = link.clone().try_lock_owned().unwrap();
        let err = JumpChannel::open(
            guard,
            &hop(HopProtocol::Ssh, None),
            "-o StrictHostKeyChecking=no",
            "exit",
            TIMEOUT,
        )
        .await
        .err()
        .unwrap();

        match &err {
            Error::Connect(ConnectError::Refused { host, detail }) => {
                assert_eq!(host, "10.1.1.1");
                assert!(detail.ends_with("Connection refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(link.try_lock_owned().is_ok());
    }

    #[tokio::test]
    async fn test_rejected_password_interrupts_hop() {
        let link = proxy(Bastion::answering(&[
            (SSH, "admin@10.1.1.1's password: "),
            ("wrong", "Permission denied, please try again.\r\nadmin@10.1.1.1's password: "),
            ("^C", "\r\nops@jump:~$ "),
        ]));
        let secret = SecretString::from("wrong".to_string());

        let guard = link.clone().try_lock_owned().unwrap();
        let err = JumpChannel::open(
            guard,
            &hop(HopProtocol::Ssh, Some(&secret)),
            "-o StrictHostKeyChecking=no",
            "exit",
            TIMEOUT,
        )
        .await
        .err()
        .unwrap();

        assert_eq!(err.failure_kind(), FailureKind::Connect);
        let link = link.try_lock_owned().unwrap();
        assert_eq!(link.channel.received.last().map(String::as_str), Some("^C"));
    }

    async fn open_edge(link: &Arc<Mutex<ProxyLink<Bastion>>>) -> JumpChannel<Bastion> {
        let guard = link.clone().try_lock_owned().unwrap();
        JumpChannel::open(
            guard,
            &hop(HopProtocol::Ssh, None),
            "-o StrictHostKeyChecking=no",
            "exit",
            TIMEOUT,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_hung_exit_poisons_proxy() {
        // Neither `exit` nor ^C gets an answer.
        let link = proxy(Bastion::answering(&[(SSH, "\r\nedge1#")]));
        let mut channel = open_edge(&link).await;

        let err = channel.close().await.err().unwrap();
        assert!(matches!(err, Error::Channel(ChannelError::PatternTimeout(_))));
        drop(channel);

        let link = link.try_lock_owned().unwrap();
        assert!(link.is_poisoned());
        assert_eq!(link.channel.received, vec![SSH, "exit", "^C"]);
    }

    #[tokio::test]
    async fn test_hung_exit_recovered_with_interrupt() {
        let link = proxy(Bastion::answering(&[
            (SSH, "\r\nedge1#"),
            ("exit", ""),
            ("^C", "\r\nConnection to 10.1.1.1 closed.\r\nops@jump:~$ "),
        ]));
        let mut channel = open_edge(&link).await;

        assert!(channel.close().await.is_err());
        drop(channel);

        let link = link.try_lock_owned().unwrap();
        assert!(!link.is_poisoned());
    }

    #[tokio::test]
    async fn test_drop_without_close_poisons_proxy() {
        let link = proxy(Bastion::answering(&[(SSH, "\r\nedge1#")]));
        drop(open_edge(&link).await);
        assert!(link.try_lock_owned().unwrap().is_poisoned());
    }

    #[tokio::test]
    async fn test_discover_prompt() {
        let bastion = Bastion::answering(&[("", "\r\nLast login: Mon\r\nops@jump:~$ ")]);
        let link = ProxyLink::discover("bastion", bastion, TIMEOUT).await.unwrap();
        assert_eq!(link.prompt(), "ops@jump:~$");
        assert_eq!(link.name(), "bastion");
    }
}
