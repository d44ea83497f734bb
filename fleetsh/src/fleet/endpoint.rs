//! Device endpoints.

use std::fmt;
use std::str::FromStr;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::config::FleetConfig;
use super::manifest::{self, ManifestRow};
use crate::error::ManifestValidationError;
use crate::transport::HopProtocol;

/// How a device is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// An already-connected channel supplied by the caller.
    Direct,
    #[default]
    Ssh,
    Telnet,
}

impl Transport {
    /// Well-known port, `None` for direct channels.
    pub fn default_port(self) -> Option<u16> {
        match self {
            Transport::Direct => None,
            Transport::Ssh => Some(22),
            Transport::Telnet => Some(23),
        }
    }

    /// Protocol used to dial the device, from here or from a jump host.
    pub fn hop_protocol(self) -> Option<HopProtocol> {
        match self {
            Transport::Direct => None,
            Transport::Ssh => Some(HopProtocol::Ssh),
            Transport::Telnet => Some(HopProtocol::Telnet),
        }
    }
}

impl FromStr for Transport {
    type Err = String;

    /// Accepts `ssh`, `ssh1`, `ssh2`, `telnet` and `direct`, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssh" | "ssh1" | "ssh2" => Ok(Transport::Ssh),
            "telnet" => Ok(Transport::Telnet),
            "direct" => Ok(Transport::Direct),
            other => Err(format!("unknown protocol '{}'", other)),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transport::Direct => "direct",
            Transport::Ssh => "ssh",
            Transport::Telnet => "telnet",
        };
        f.write_str(name)
    }
}

/// Where and how to reach one device.
///
/// The username and passwords are optional here; blanks are filled from the
/// [`CredentialProvider`](super::CredentialProvider) when the device is run.
#[derive(Debug)]
pub struct DeviceEndpoint {
    transport: Transport,
    host: String,
    port: Option<u16>,
    proxy: Option<String>,
    username: Option<String>,
    password: Option<SecretString>,
    enable_password: Option<SecretString>,
}

impl DeviceEndpoint {
    /// An endpoint with the transport's default port and no proxy.
    pub fn new(transport: Transport, host: impl Into<String>) -> Self {
        Self {
            transport,
            host: host.into(),
            port: transport.default_port(),
            proxy: None,
            username: None,
            password: None,
            enable_password: None,
        }
    }

    /// Build an endpoint from a manifest row, applying run-wide defaults.
    pub fn from_row(row: &ManifestRow, config: &FleetConfig) -> Result<Self, ManifestValidationError> {
        let invalid = |message: String| ManifestValidationError::InvalidRow {
            row: row.number(),
            message,
        };

        let host = row
            .get(manifest::HOSTNAME)
            .ok_or_else(|| invalid("hostname is blank".to_string()))?;

        let transport = match row.get(manifest::PROTOCOL) {
            Some(protocol) => protocol.parse().map_err(invalid)?,
            None => config.default_transport,
        };

        let mut endpoint = Self::new(transport, host);

        if let Some(port) = row.get(manifest::PORT) {
            let port = port
                .parse::<u16>()
                .map_err(|_| invalid(format!("invalid port '{}'", port)))?;
            endpoint.port = Some(port);
        }

        endpoint.proxy = match row.get(manifest::PROXY_SESSION) {
            Some(proxy) => Some(proxy.to_string()),
            None if config.use_proxy => config.default_proxy.clone(),
            None => None,
        };
        if endpoint.transport == Transport::Direct {
            endpoint.proxy = None;
        }

        endpoint.username = row.get(manifest::USERNAME).map(str::to_string);
        endpoint.password = row
            .get(manifest::PASSWORD)
            .map(|p| SecretString::from(p.to_string()));
        endpoint.enable_password = row
            .get(manifest::ENABLE)
            .map(|p| SecretString::from(p.to_string()));

        Ok(endpoint)
    }

    /// Override the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Reach the device through a registered proxy session.
    pub fn with_proxy(mut self, name: impl Into<String>) -> Self {
        self.proxy = Some(name.into());
        self
    }

    /// Username for this device only.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Password for this device only.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Enable password for this device only.
    pub fn with_enable_password(mut self, password: impl Into<String>) -> Self {
        self.enable_password = Some(SecretString::from(password.into()));
        self
    }

    /// How the device is reached.
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Hostname or address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port to dial; `None` only for direct endpoints.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Proxy session carrying the hop, if any.
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&SecretString> {
        self.password.as_ref()
    }

    pub fn enable_password(&self) -> Option<&SecretString> {
        self.enable_password.as_ref()
    }
}

impl fmt::Display for DeviceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.transport, self.host)?;
        if let Some(port) = self.port
            && Some(port) != self.transport.default_port()
        {
            write!(f, ":{}", port)?;
        }
        if let Some(proxy) = &self.proxy {
            write!(f, " via {}", proxy)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;
    use crate::fleet::Manifest;

    fn manifest() -> Manifest {
        Manifest::new([
            "Hostname",
            "Protocol",
            "Username",
            "Password",
            "Enable",
            "Proxy Session",
            "Port",
        ])
    }

    #[test]
    fn test_protocol_names() {
        assert_eq!("SSH2".parse::<Transport>(), Ok(Transport::Ssh));
        assert_eq!("ssh1".parse::<Transport>(), Ok(Transport::Ssh));
        assert_eq!(" Telnet ".parse::<Transport>(), Ok(Transport::Telnet));
        assert_eq!("direct".parse::<Transport>(), Ok(Transport::Direct));
        assert!("rlogin".parse::<Transport>().is_err());
    }

    #[test]
    fn test_row_with_overrides() {
        let manifest = manifest().with_row(["10.0.0.2", "telnet", "ops", "pw", "en", "bastion", "2323"]);
        let endpoint = DeviceEndpoint::from_row(&manifest.rows()[0], &FleetConfig::default()).unwrap();

        assert_eq!(endpoint.transport(), Transport::Telnet);
        assert_eq!(endpoint.port(), Some(2323));
        assert_eq!(endpoint.proxy(), Some("bastion"));
        assert_eq!(endpoint.username(), Some("ops"));
        assert_eq!(endpoint.password().map(|p| p.expose_secret()), Some("pw"));
        assert_eq!(endpoint.enable_password().map(|p| p.expose_secret()), Some("en"));
        assert_eq!(endpoint.to_string(), "telnet://10.0.0.2:2323 via bastion");
    }

    #[test]
    fn test_row_defaults() {
        let config = FleetConfig::default().with_default_proxy("bastion");
        let manifest = manifest()
            .with_row(["sw1", "", ""])
            .with_row(["sw2", "direct", "admin"]);

        let endpoint = DeviceEndpoint::from_row(&manifest.rows()[0], &config).unwrap();
        assert_eq!(endpoint.transport(), Transport::Ssh);
        assert_eq!(endpoint.port(), Some(22));
        assert_eq!(endpoint.proxy(), Some("bastion"));
        assert_eq!(endpoint.username(), None);
        assert!(endpoint.password().is_none());

        let endpoint = DeviceEndpoint::from_row(&manifest.rows()[1], &config).unwrap();
        assert_eq!(endpoint.transport(), Transport::Direct);
        assert_eq!(endpoint.proxy(), None);
        assert_eq!(endpoint.port(), None);
    }

    #[test]
    fn test_invalid_rows() {
        let manifest = manifest()
            .with_row(["", "ssh", "admin"])
            .with_row(["sw1", "rlogin", "admin"])
            .with_row(["sw1", "ssh", "admin", "", "", "", "99999"]);

        for row in manifest.rows() {
            let err = DeviceEndpoint::from_row(row, &FleetConfig::default()).unwrap_err();
            assert!(matches!(
                err,
                ManifestValidationError::InvalidRow { row: n, .. } if n == row.number()
            ));
        }
    }
}
