//! Builder for fleet runners.

use std::time::Duration;

use super::config::FleetConfig;
use super::credentials::CredentialProvider;
use super::endpoint::Transport;
use super::runner::FleetRunner;
use crate::driver::{PaginationMode, SessionConfig};
use crate::error::Result;
use crate::transport::Connector;

/// Builder for constructing a [`FleetRunner`].
///
/// # Example
///
/// ```rust,no_run
/// use fleetsh::fleet::{FleetRunnerBuilder, StaticCredentials, Transport};
/// use fleetsh::transport::{NetConnector, TransportOptions};
///
/// # fn example() -> Result<(), fleetsh::Error> {
/// let runner = FleetRunnerBuilder::new(
///     NetConnector::new(TransportOptions::default()),
///     StaticCredentials::new().with_default_username("netops"),
/// )
/// .default_transport(Transport::Telnet)
/// .proxy("bastion")
/// .build()?;
/// # Ok(())
/// # }
/// ```
pub struct FleetRunnerBuilder<K, P> {
    connector: K,
    credentials: P,
    config: FleetConfig,
}

impl<K, P> FleetRunnerBuilder<K, P>
where
    K: Connector,
    P: CredentialProvider,
{
    /// Start from default settings.
    pub fn new(connector: K, credentials: P) -> Self {
        Self {
            connector,
            credentials,
            config: FleetConfig::default(),
        }
    }

    /// Replace all settings at once.
    pub fn config(mut self, config: FleetConfig) -> Self {
        self.config = config;
        self
    }

    /// Transport for rows with a blank `Protocol` (default: SSH).
    pub fn default_transport(mut self, transport: Transport) -> Self {
        self.config.default_transport = transport;
        self
    }

    /// Route rows without a `Proxy Session` through this proxy.
    pub fn proxy(mut self, name: impl Into<String>) -> Self {
        self.config = self.config.with_default_proxy(name);
        self
    }

    /// Replace the per-device session settings.
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.config.session = session;
        self
    }

    /// Choose how output pagination is handled.
    pub fn pagination(mut self, mode: PaginationMode) -> Self {
        self.config.session.pagination = mode;
        self
    }

    /// Set the command inactivity timeout.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.session.command_timeout = timeout;
        self
    }

    /// Number of retries after a command timeout.
    pub fn command_retries(mut self, retries: u32) -> Self {
        self.config.session.command_retries = retries;
        self
    }

    /// Build the runner, checking the session settings.
    pub fn build(self) -> Result<FleetRunner<K, P>> {
        self.config.session.validate()?;
        Ok(FleetRunner::new(self.connector, self.credentials, self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, SessionError};
    use crate::fleet::StaticCredentials;
    use crate::transport::{NetConnector, TransportOptions};

    fn builder() -> FleetRunnerBuilder<NetConnector, StaticCredentials> {
        FleetRunnerBuilder::new(
            NetConnector::new(TransportOptions::default()),
            StaticCredentials::new(),
        )
    }

    #[test]
    fn test_builder_settings() {
        let runner = builder()
            .default_transport(Transport::Telnet)
            .proxy("bastion")
            .pagination(PaginationMode::Advance)
            .command_timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        let config = runner.config();
        assert_eq!(config.default_transport, Transport::Telnet);
        assert!(config.use_proxy);
        assert_eq!(config.default_proxy.as_deref(), Some("bastion"));
        assert_eq!(config.session.pagination, PaginationMode::Advance);
        assert_eq!(config.session.command_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_session_rejected() {
        let result = builder().command_timeout(Duration::ZERO).build();
        assert!(matches!(
            result,
            Err(Error::Session(SessionError::InvalidConfig { .. }))
        ));
    }
}
