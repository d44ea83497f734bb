//! Run-wide fleet settings.

use serde::{Deserialize, Serialize};

use super::endpoint::Transport;
use crate::driver::SessionConfig;

/// Defaults applied to every manifest row, plus the per-device session tunables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Transport for rows with a blank `Protocol`.
    pub default_transport: Transport,

    /// Route rows without a `Proxy Session` through `default_proxy`.
    pub use_proxy: bool,

    /// Proxy session used when `use_proxy` is set.
    pub default_proxy: Option<String>,

    /// Session settings for every device.
    pub session: SessionConfig,
}

impl FleetConfig {
    /// Transport for rows with a blank `Protocol`.
    pub fn with_default_transport(mut self, transport: Transport) -> Self {
        self.default_transport = transport;
        self
    }

    /// Send rows without their own proxy through `name`.
    pub fn with_default_proxy(mut self, name: impl Into<String>) -> Self {
        self.use_proxy = true;
        self.default_proxy = Some(name.into());
        self
    }

    /// Per-device session settings.
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::driver::PaginationMode;

    #[test]
    fn test_from_json() {
        let config: FleetConfig = serde_json::from_str(
            r#"{
                "default_transport": "telnet",
                "use_proxy": true,
                "default_proxy": "bastion",
                "session": { "command_timeout": 10, "pagination": "advance" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.default_transport, Transport::Telnet);
        assert_eq!(config.default_proxy.as_deref(), Some("bastion"));
        assert_eq!(config.session.command_timeout, Duration::from_secs(10));
        assert_eq!(config.session.pagination, PaginationMode::Advance);
        assert_eq!(config.session.prompt_attempts, 3);
    }
}
