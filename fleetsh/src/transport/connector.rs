//! Dialing devices.
//!
//! A [`Connector`] turns a [`DeviceEndpoint`] and resolved [`Credentials`]
//! into a connected [`TerminalChannel`]. [`NetConnector`] is the real one:
//! it dials SSH or Telnet itself, hops through registered proxy sessions, or
//! lends out a caller-supplied channel for `direct` endpoints.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::config::{AuthMethod, SshConfig, TelnetConfig, TransportOptions};
use super::jump::{Hop, HopProtocol, JumpChannel, ProxyLink};
use super::ssh::{SshChannel, SshTransport};
use super::telnet::TelnetChannel;
use crate::channel::TerminalChannel;
use crate::error::{ChannelError, ConnectError, CredentialError, Result};
use crate::fleet::{Credentials, DeviceEndpoint, Transport};

/// Opens channels to devices.
pub trait Connector: Send {
    type Channel: TerminalChannel;

    /// Connect and log in to `endpoint`.
    fn connect(
        &mut self,
        endpoint: &DeviceEndpoint,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Self::Channel>> + Send;
}

/// A channel this process dialed itself.
pub enum LinkChannel {
    Ssh(SshChannel),
    Telnet(TelnetChannel<TcpStream>),
}

impl TerminalChannel for LinkChannel {
    async fn send(&mut self, text: &str) -> Result<()> {
        match self {
            LinkChannel::Ssh(channel) => channel.send(text).await,
            LinkChannel::Telnet(channel) => channel.send(text).await,
        }
    }

    async fn read(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        match self {
            LinkChannel::Ssh(channel) => channel.read(timeout).await,
            LinkChannel::Telnet(channel) => channel.read(timeout).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            LinkChannel::Ssh(channel) => channel.close().await,
            LinkChannel::Telnet(channel) => channel.close().await,
        }
    }

    fn is_open(&self) -> bool {
        match self {
            LinkChannel::Ssh(channel) => channel.is_open(),
            LinkChannel::Telnet(channel) => channel.is_open(),
        }
    }
}

/// Borrowed use of the caller's already-connected channel.
///
/// Closing the lease ends the borrow; the channel itself stays open.
pub struct DirectLease {
    channel: OwnedMutexGuard<LinkChannel>,
    open: bool,
}

impl TerminalChannel for DirectLease {
    async fn send(&mut self, text: &str) -> Result<()> {
        if !self.open {
            return Err(ChannelError::Closed.into());
        }
        self.channel.send(text).await
    }

    async fn read(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        if !self.open {
            return Err(ChannelError::Closed.into());
        }
        self.channel.read(timeout).await
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open && self.channel.is_open()
    }
}

/// Channel produced by [`NetConnector`].
pub enum DeviceChannel {
    Link(LinkChannel),
    Jump(JumpChannel<LinkChannel>),
    Direct(DirectLease),
}

impl TerminalChannel for DeviceChannel {
    async fn send(&mut self, text: &str) -> Result<()> {
        match self {
            DeviceChannel::Link(channel) => channel.send(text).await,
            DeviceChannel::Jump(channel) => channel.send(text).await,
            DeviceChannel::Direct(channel) => channel.send(text).await,
        }
    }

    async fn read(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        match self {
            DeviceChannel::Link(channel) => channel.read(timeout).await,
            DeviceChannel::Jump(channel) => channel.read(timeout).await,
            DeviceChannel::Direct(channel) => channel.read(timeout).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            DeviceChannel::Link(channel) => channel.close().await,
            DeviceChannel::Jump(channel) => channel.close().await,
            DeviceChannel::Direct(channel) => channel.close().await,
        }
    }

    fn is_open(&self) -> bool {
        match self {
            DeviceChannel::Link(channel) => channel.is_open(),
            DeviceChannel::Jump(channel) => channel.is_open(),
            DeviceChannel::Direct(channel) => channel.is_open(),
        }
    }
}

/// Dials devices over the network.
pub struct NetConnector {
    options: TransportOptions,
    proxies: HashMap<String, Arc<Mutex<ProxyLink<LinkChannel>>>>,
    direct: Option<Arc<Mutex<LinkChannel>>>,
}

impl NetConnector {
    /// Create a connector with no proxies or direct channel.
    pub fn new(options: TransportOptions) -> Self {
        Self {
            options,
            proxies: HashMap::new(),
            direct: None,
        }
    }

    /// Transport settings used for every connection.
    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Dial `host` from this process and log in.
    pub async fn open_link(
        &self,
        protocol: HopProtocol,
        host: &str,
        port: u16,
        username: &str,
        password: Option<&SecretString>,
    ) -> Result<LinkChannel> {
        match protocol {
            HopProtocol::Ssh => {
                let auth = self.ssh_auth(username, password)?;
                let config = SshConfig::new(host, port, username, auth, &self.options);
                let transport = SshTransport::connect(config).await?;
                Ok(LinkChannel::Ssh(transport.open_shell().await?))
            }
            HopProtocol::Telnet => {
                let config = TelnetConfig {
                    host: host.to_string(),
                    port,
                    username: username.to_string(),
                    password: password.map(|p| SecretString::from(p.expose_secret().to_string())),
                    timeout: self.options.login_timeout,
                };
                Ok(LinkChannel::Telnet(TelnetChannel::connect(&config).await?))
            }
        }
    }

    fn ssh_auth(&self, username: &str, password: Option<&SecretString>) -> Result<AuthMethod> {
        if let Some(password) = password {
            return Ok(AuthMethod::Password(SecretString::from(
                password.expose_secret().to_string(),
            )));
        }
        match &self.options.private_key {
            Some(path) => Ok(AuthMethod::PrivateKey {
                path: path.clone(),
                passphrase: None,
            }),
            None => Err(CredentialError::MissingPassword {
                username: username.to_string(),
            }
            .into()),
        }
    }

    /// Register a connected shell as a proxy session named `name`.
    ///
    /// The proxy's prompt is discovered now; it must be sitting at its own
    /// prompt.
    pub async fn register_proxy(&mut self, name: impl Into<String>, channel: LinkChannel) -> Result<()> {
        let name = name.into();
        let link = ProxyLink::discover(name.clone(), channel, self.options.login_timeout).await?;
        info!("Registered proxy session '{}' ({})", name, link.prompt());
        if self
            .proxies
            .insert(name.clone(), Arc::new(Mutex::new(link)))
            .is_some()
        {
            warn!("Proxy session '{}' replaced", name);
        }
        Ok(())
    }

    /// Lend `channel` to endpoints whose transport is `direct`.
    pub fn set_direct(&mut self, channel: LinkChannel) {
        self.direct = Some(Arc::new(Mutex::new(channel)));
    }

    /// Close every proxy session and the direct channel.
    pub async fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for (name, proxy) in self.proxies.drain() {
            debug!("Closing proxy session '{}'", name);
            if let Err(e) = proxy.lock().await.close().await {
                warn!("Closing proxy session '{}' failed: {}", name, e);
                first_error.get_or_insert(e);
            }
        }
        if let Some(direct) = self.direct.take()
            && let Err(e) = direct.lock().await.close().await
        {
            first_error.get_or_insert(e);
        }
        first_error.map_or(Ok(()), Err)
    }

    fn lease_direct(&self, endpoint: &DeviceEndpoint) -> Result<DeviceChannel> {
        let no_channel = || ConnectError::NoDirectChannel {
            host: endpoint.host().to_string(),
        };
        let direct = self.direct.as_ref().ok_or_else(no_channel)?;
        let channel = direct.clone().try_lock_owned().map_err(|_| no_channel())?;
        Ok(DeviceChannel::Direct(DirectLease {
            channel,
            open: true,
        }))
    }

    async fn hop(
        &self,
        proxy: &str,
        protocol: HopProtocol,
        endpoint: &DeviceEndpoint,
        port: u16,
        credentials: &Credentials,
    ) -> Result<DeviceChannel> {
        let link = self
            .proxies
            .get(proxy)
            .ok_or_else(|| ConnectError::ProxyUnavailable {
                name: proxy.to_string(),
            })?;
        let guard = link
            .clone()
            .try_lock_owned()
            .map_err(|_| ConnectError::ProxyBusy {
                name: proxy.to_string(),
            })?;
        if guard.is_poisoned() {
            return Err(ConnectError::ProxyUnavailable {
                name: proxy.to_string(),
            }
            .into());
        }

        let hop = Hop {
            protocol,
            host: endpoint.host(),
            port,
            username: credentials.username(),
            password: credentials.password(),
        };
        let channel = JumpChannel::open(
            guard,
            &hop,
            &self.options.jump_ssh_options,
            &self.options.jump_exit_command,
            self.options.login_timeout,
        )
        .await?;
        Ok(DeviceChannel::Jump(channel))
    }
}

impl Connector for NetConnector {
    type Channel = DeviceChannel;

    async fn connect(
        &mut self,
        endpoint: &DeviceEndpoint,
        credentials: &Credentials,
    ) -> Result<DeviceChannel> {
        let (Some(protocol), Some(port)) = (endpoint.transport().hop_protocol(), endpoint.port())
        else {
            return self.lease_direct(endpoint);
        };

        debug!("Connecting to {} as {}", endpoint, credentials.username());
        match endpoint.proxy() {
            Some(proxy) => self.hop(proxy, protocol, endpoint, port, credentials).await,
            None => {
                let channel = self
                    .open_link(
                        protocol,
                        endpoint.host(),
                        port,
                        credentials.username(),
                        credentials.password(),
                    )
                    .await?;
                Ok(DeviceChannel::Link(channel))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    use super::*;
    use crate::error::{Error, FailureKind};

    /// One-connection telnet server: greet, then answer each line in turn.
    async fn serve(greeting: &'static str, replies: &'static [&'static str]) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            write.write_all(greeting.as_bytes()).await.unwrap();
            for reply in replies {
                if !matches!(lines.next_line().await, Ok(Some(_))) {
                    return;
                }
                write.write_all(reply.as_bytes()).await.unwrap();
            }
            while let Ok(Some(_)) = lines.next_line().await {}
        });
        port
    }

    fn options() -> TransportOptions {
        TransportOptions::default()
            .with_connect_timeout(Duration::from_secs(2))
            .with_login_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_telnet_endpoint() {
        let port = serve("Username: ", &["Password: ", "\r\nsw1#"]).await;
        let mut connector = NetConnector::new(options());
        let endpoint = DeviceEndpoint::new(Transport::Telnet, "127.0.0.1").with_port(port);
        let credentials = Credentials::new("admin").with_password("s3cret");

        let mut channel = connector.connect(&endpoint, &credentials).await.unwrap();
        assert!(matches!(channel, DeviceChannel::Link(LinkChannel::Telnet(_))));
        let replay = channel.read(Duration::from_secs(1)).await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&replay).ends_with("sw1#"));
        channel.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut connector = NetConnector::new(options());
        let endpoint = DeviceEndpoint::new(Transport::Telnet, "127.0.0.1").with_port(port);
        let err = connector
            .connect(&endpoint, &Credentials::new("admin"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.failure_kind(), FailureKind::Connect);
    }

    #[tokio::test]
    async fn test_unknown_proxy() {
        let mut connector = NetConnector::new(options());
        let endpoint = DeviceEndpoint::new(Transport::Ssh, "10.0.0.1").with_proxy("bastion");
        let err = connector
            .connect(&endpoint, &Credentials::new("admin"))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Connect(ConnectError::ProxyUnavailable { ref name }) if name == "bastion"
        ));
    }

    #[tokio::test]
    async fn test_busy_proxy() {
        let port = serve("ops@jump:~$ ", &[]).await;
        let mut connector = NetConnector::new(options());
        let proxy = connector
            .open_link(HopProtocol::Telnet, "127.0.0.1", port, "ops", None)
            .await
            .unwrap();
        connector.register_proxy("bastion", proxy).await.unwrap();

        let held = connector.proxies["bastion"].clone().try_lock_owned().unwrap();
        let endpoint = DeviceEndpoint::new(Transport::Ssh, "10.0.0.1").with_proxy("bastion");
        let err = connector
            .connect(&endpoint, &Credentials::new("admin"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Connect(ConnectError::ProxyBusy { .. })));

        drop(held);
        connector.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_poisoned_proxy_refused() {
        let port = serve("ops@jump:~$ ", &[]).await;
        let mut connector = NetConnector::new(options());
        let proxy = connector
            .open_link(HopProtocol::Telnet, "127.0.0.1", port, "ops", None)
            .await
            .unwrap();
        connector.register_proxy("bastion", proxy).await.unwrap();
        connector.proxies["bastion"].lock().await.poison();

        let endpoint = DeviceEndpoint::new(Transport::Ssh, "10.0.0.1").with_proxy("bastion");
        let err = connector
            .connect(&endpoint, &Credentials::new("admin"))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Connect(ConnectError::ProxyUnavailable { ref name }) if name == "bastion"
        ));
        connector.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_direct_without_channel() {
        let mut connector = NetConnector::new(options());
        let endpoint = DeviceEndpoint::new(Transport::Direct, "console");
        let err = connector
            .connect(&endpoint, &Credentials::new("admin"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Connect(ConnectError::NoDirectChannel { .. })));
    }

    #[tokio::test]
    async fn test_ssh_needs_password_or_key() {
        let connector = NetConnector::new(options());
        let err = connector.ssh_auth("admin", None).err().unwrap();
        assert_eq!(err.failure_kind(), FailureKind::Credential);

        let connector = NetConnector::new(options().with_private_key("/tmp/id_ed25519"));
        assert!(matches!(
            connector.ssh_auth("admin", None),
            Ok(AuthMethod::PrivateKey { .. })
        ));
    }
}
