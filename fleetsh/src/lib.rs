//! # fleetsh
//!
//! Async CLI session automation for fleets of network devices.
//!
//! fleetsh drives the interactive command line of routers, switches and
//! firewalls over SSH or Telnet (optionally hopping through a jump host),
//! and runs the same task across every device listed in a manifest.
//!
//! ## Features
//!
//! - Prompt discovery and OS classification from login banners (IOS, IOS-XE,
//!   NX-OS, ASA, IOS-XR), with a probe command for terse banners
//! - Pagination either switched off for the session and restored exactly once
//!   on close, or advanced marker by marker
//! - Deterministic command completion on the device's own prompt, with
//!   inactivity timeouts and partial output on stalls
//! - Sequential fleet runs with per-device failure isolation and a
//!   serializable report
//! - A scripted simulated device for dry runs and tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fleetsh::fleet::{CsvManifestReader, FleetRunnerBuilder, StaticCredentials};
//! use fleetsh::transport::{NetConnector, TransportOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fleetsh::Error> {
//!     let credentials = StaticCredentials::new()
//!         .with_default_username("netops")
//!         .with_default_password("secret");
//!     let mut runner = FleetRunnerBuilder::new(
//!         NetConnector::new(TransportOptions::default()),
//!         credentials,
//!     )
//!     .build()?;
//!
//!     let manifest = CsvManifestReader::from_path("devices.csv")?;
//!     let report = runner
//!         .run(manifest, |session| {
//!             Box::pin(async move {
//!                 let result = session.execute("show version").await?;
//!                 println!("{}: {} lines", session.hostname(), result.lines().count());
//!                 Ok(())
//!             })
//!         })
//!         .await?;
//!
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod driver;
pub mod error;
pub mod fleet;
pub mod platform;
pub mod transport;

// Re-export main types for convenience
pub use channel::{ScriptedChannel, ScriptedDevice, TerminalChannel};
pub use driver::{CommandResult, PaginationMode, Session, SessionConfig};
pub use error::{
    ChannelError, CommandTimeoutError, ConnectError, CredentialError, Error, FailureKind,
    ManifestValidationError, Result, SessionError, UnsupportedDeviceError,
};
pub use fleet::{FleetRunReport, FleetRunner, FleetRunnerBuilder};
pub use platform::{OsFamily, PrivilegeMode};
pub use transport::{Connector, NetConnector};
