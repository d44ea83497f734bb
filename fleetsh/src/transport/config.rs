//! Connection configuration.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys. Connection fails if the host
    /// is not already in known_hosts.
    Strict,

    /// Accept and auto-learn unknown keys, but reject changed keys.
    /// This is the default and matches common SSH client behavior.
    #[default]
    AcceptNew,

    /// Accept all keys without checking. For testing and lab use only.
    Disabled,
}

/// Settings shared by every connection a [`NetConnector`](super::NetConnector) makes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Timeout for TCP connect plus SSH handshake.
    #[serde(with = "crate::driver::seconds")]
    pub connect_timeout: Duration,

    /// Timeout for each step of a login dialog (telnet, jump host).
    #[serde(with = "crate::driver::seconds")]
    pub login_timeout: Duration,

    /// Terminal width requested for SSH PTYs.
    pub terminal_width: u32,

    /// Terminal height requested for SSH PTYs.
    pub terminal_height: u32,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file (default `~/.ssh/known_hosts`).
    pub known_hosts_path: Option<PathBuf>,

    /// Private key tried when no password is available.
    pub private_key: Option<PathBuf>,

    /// Options passed to `ssh` on a jump host.
    pub jump_ssh_options: String,

    /// Command that leaves a device and returns to the jump host.
    pub jump_exit_command: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            login_timeout: Duration::from_secs(15),
            terminal_width: 511,
            terminal_height: 24,
            host_key_verification: HostKeyVerification::AcceptNew,
            known_hosts_path: None,
            private_key: None,
            jump_ssh_options: "-o StrictHostKeyChecking=no".to_string(),
            jump_exit_command: "exit".to_string(),
        }
    }
}

impl TransportOptions {
    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the login dialog timeout.
    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Set the host key verification mode.
    pub fn with_host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    /// Use a specific known_hosts file.
    pub fn with_known_hosts(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// Authenticate with this private key when no password is available.
    pub fn with_private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key = Some(path.into());
        self
    }
}

/// SSH connection configuration.
#[derive(Debug)]
pub struct SshConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// SSH port (default: 22).
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Authentication method.
    pub auth: AuthMethod,

    /// Connection timeout.
    pub timeout: Duration,

    /// Terminal width for PTY.
    pub terminal_width: u32,

    /// Terminal height for PTY.
    pub terminal_height: u32,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file.
    pub known_hosts_path: Option<PathBuf>,
}

impl SshConfig {
    /// Build a config from shared options.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        auth: AuthMethod,
        options: &TransportOptions,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            auth,
            timeout: options.connect_timeout,
            terminal_width: options.terminal_width,
            terminal_height: options.terminal_height,
            host_key_verification: options.host_key_verification,
            known_hosts_path: options.known_hosts_path.clone(),
        }
    }

    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Authentication method for SSH connections.
#[derive(Debug)]
pub enum AuthMethod {
    /// No authentication (for testing only).
    None,

    /// Password authentication.
    Password(SecretString),

    /// Private key authentication.
    PrivateKey {
        /// Path to the private key file.
        path: PathBuf,
        /// Optional passphrase for encrypted keys.
        passphrase: Option<SecretString>,
    },
}

/// Telnet connection configuration.
#[derive(Debug)]
pub struct TelnetConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// Telnet port (default: 23).
    pub port: u16,

    /// Username sent at the login prompt.
    pub username: String,

    /// Password sent at the password prompt.
    pub password: Option<SecretString>,

    /// Timeout for connecting and for each login step.
    pub timeout: Duration,
}

impl TelnetConfig {
    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
