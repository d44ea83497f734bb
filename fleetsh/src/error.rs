//! Error types for fleetsh.

use std::io;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::platform::OsFamily;

/// Main error type for fleetsh operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Connecting or authenticating to a device failed
    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The device could not be classified
    #[error("Unsupported device: {0}")]
    UnsupportedDevice(#[from] UnsupportedDeviceError),

    /// A command stalled before the prompt came back
    #[error("{0}")]
    CommandTimeout(#[from] CommandTimeoutError),

    /// Session-level errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// The manifest cannot drive a run
    #[error("Manifest validation error: {0}")]
    ManifestValidation(#[from] ManifestValidationError),

    /// Credentials could not be resolved
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),
}

impl Error {
    /// Classify this error for a fleet report entry.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Error::Connect(_) => FailureKind::Connect,
            Error::Channel(_) => FailureKind::Channel,
            Error::UnsupportedDevice(_) => FailureKind::UnsupportedDevice,
            Error::CommandTimeout(_) => FailureKind::CommandTimeout,
            Error::Session(_) => FailureKind::Session,
            Error::ManifestValidation(_) => FailureKind::InvalidEntry,
            Error::Credential(_) => FailureKind::Credential,
        }
    }

    /// Partial output captured before a command timed out, if any.
    pub fn partial_output(&self) -> Option<&str> {
        match self {
            Error::CommandTimeout(e) => Some(&e.partial_output),
            _ => None,
        }
    }
}

/// Connection establishment errors (dial, authentication, jump host).
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Failed to reach the host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host key not present in known_hosts (strict mode)
    #[error("Host key for {host}:{port} is not in known_hosts")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key differs from the known_hosts entry
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Connecting took longer than the configured timeout
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// The remote side (or jump host) refused the connection
    #[error("Connection to {host} refused: {detail}")]
    Refused { host: String, detail: String },

    /// No proxy session registered under that name
    #[error("Proxy session '{name}' is not connected")]
    ProxyUnavailable { name: String },

    /// The proxy session is already carrying another hop
    #[error("Proxy session '{name}' is in use by another session")]
    ProxyBusy { name: String },

    /// A `direct` endpoint was requested but no connected channel was supplied
    #[error("No already-connected channel available for direct endpoint '{host}'")]
    NoDirectChannel { host: String },

    /// The channel failed while logging in
    #[error("Login failed: {0}")]
    Login(#[from] ChannelError),
}

/// Channel layer errors (reads, writes, pattern matching).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Failed to open PTY channel
    #[error("Failed to open PTY channel")]
    PtyOpenFailed,

    /// Pattern matching timed out
    #[error("Pattern not found within {0:?}")]
    PatternTimeout(Duration),

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    Closed,

    /// SSH protocol error on the channel
    #[error("Channel SSH error: {0}")]
    Ssh(russh::Error),

    /// I/O error on a socket-backed channel
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Classification failures. Never retried.
#[derive(Error, Debug)]
pub enum UnsupportedDeviceError {
    /// No prompt line could be discovered
    #[error("Unable to discover device prompt after {attempts} attempts")]
    PromptNotFound { attempts: u32 },

    /// The trailing line does not look like a supported prompt
    #[error("Unsupported prompt format '{prompt}'")]
    InvalidPrompt { prompt: String },

    /// A prompt was found but no OS rule matched
    #[error("Unknown or unsupported device OS (prompt '{prompt}')")]
    UnrecognizedBanner { prompt: String },

    /// The device was classified but its OS is not one the caller accepts
    #[error("Device runs {os}, expected one of: {expected}")]
    OsNotAccepted { os: OsFamily, expected: String },
}

/// A command did not complete within the inactivity timeout.
#[derive(Error, Debug)]
#[error("Command '{command}' timed out after {timeout:?} of inactivity")]
pub struct CommandTimeoutError {
    /// The command that was sent.
    pub command: String,

    /// The inactivity timeout that elapsed.
    pub timeout: Duration,

    /// Normalized output captured before the device went quiet.
    pub partial_output: String,
}

/// Session lifecycle errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Operation attempted outside the Ready state
    #[error("Session is not ready (state: {state})")]
    NotReady { state: String },

    /// Privilege escalation failed
    #[error("Unable to enter enable mode: {reason}")]
    EnableFailed { reason: String },

    /// The device was left in configuration mode
    #[error("Device is in configuration mode ('{prompt}'); exit configuration mode and retry")]
    ConfigurationMode { prompt: String },

    /// The device would not enter configuration mode
    #[error("Device refused configuration mode: {output}")]
    ConfigurationRefused { output: String },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Manifest validation errors. Fatal for the whole run.
#[derive(Error, Debug)]
pub enum ManifestValidationError {
    /// Required columns are absent from the header
    #[error("Manifest is missing required column(s): {}", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    /// The manifest could not be read
    #[error("Unable to read manifest: {0}")]
    Read(#[from] csv::Error),

    /// A row could not be used (reported per row, not for the run)
    #[error("Invalid manifest row {row}: {message}")]
    InvalidRow { row: usize, message: String },
}

/// Credential resolution errors.
#[derive(Error, Debug)]
pub enum CredentialError {
    /// No password known for this user
    #[error("No password available for user '{username}'")]
    MissingPassword { username: String },

    /// No username in the row and no default configured
    #[error("No username given and no default username configured")]
    MissingUsername,

    /// The provider itself failed (e.g. the prompt was cancelled)
    #[error("Credential provider failed: {0}")]
    Provider(String),
}

/// Coarse failure category recorded in a fleet report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Connect,
    Channel,
    UnsupportedDevice,
    CommandTimeout,
    Session,
    Credential,
    InvalidEntry,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Connect => "ConnectError",
            FailureKind::Channel => "ChannelError",
            FailureKind::UnsupportedDevice => "UnsupportedDeviceError",
            FailureKind::CommandTimeout => "CommandTimeoutError",
            FailureKind::Session => "SessionError",
            FailureKind::Credential => "CredentialError",
            FailureKind::InvalidEntry => "InvalidEntry",
        };
        f.write_str(name)
    }
}

/// Result type alias using fleetsh's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_mapping() {
        let err: Error = ConnectError::AuthenticationFailed {
            user: "admin".into(),
        }
        .into();
        assert_eq!(err.failure_kind(), FailureKind::Connect);
        assert_eq!(err.failure_kind().to_string(), "ConnectError");

        let err: Error = UnsupportedDeviceError::PromptNotFound { attempts: 3 }.into();
        assert_eq!(err.failure_kind(), FailureKind::UnsupportedDevice);
    }

    #[test]
    fn test_timeout_keeps_partial_output() {
        let err: Error = CommandTimeoutError {
            command: "show tech".into(),
            timeout: Duration::from_secs(5),
            partial_output: "Building configuration".into(),
        }
        .into();
        assert_eq!(err.partial_output(), Some("Building configuration"));
        assert!(err.to_string().contains("show tech"));
    }

    #[test]
    fn test_missing_columns_message() {
        let err = ManifestValidationError::MissingColumns {
            missing: vec!["Username".into(), "Protocol".into()],
        };
        assert_eq!(
            err.to_string(),
            "Manifest is missing required column(s): Username, Protocol"
        );
    }
}
