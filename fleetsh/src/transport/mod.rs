//! Connecting to devices.
//!
//! SSH (via russh) and Telnet channels dialed from this process, jump-host
//! hops through a registered proxy shell, and the [`Connector`] seam the
//! fleet runner dials through.

pub mod config;
mod connector;
mod dialog;
mod jump;
mod ssh;
mod telnet;

pub use config::{AuthMethod, HostKeyVerification, SshConfig, TelnetConfig, TransportOptions};
pub use connector::{Connector, DeviceChannel, DirectLease, LinkChannel, NetConnector};
pub use jump::{Hop, HopProtocol, JumpChannel, ProxyLink};
pub use ssh::{SshChannel, SshTransport};
pub use telnet::{TelnetChannel, TelnetCodec};
