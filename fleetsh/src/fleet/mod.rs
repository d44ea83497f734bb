//! Fleet orchestration.
//!
//! A [`FleetRunner`] reads a [`Manifest`], resolves each row into a
//! [`DeviceEndpoint`] and [`Credentials`], dials it through a
//! [`Connector`](crate::transport::Connector), and runs a task inside a scoped
//! [`Session`](crate::driver::Session). Devices are handled strictly one at a
//! time; the [`FleetRunReport`] has one entry per row, in manifest order.

mod builder;
mod config;
mod credentials;
mod endpoint;
pub mod manifest;
mod report;
mod runner;

pub use builder::FleetRunnerBuilder;
pub use config::FleetConfig;
pub use credentials::{CredentialProvider, Credentials, StaticCredentials};
pub use endpoint::{DeviceEndpoint, Transport};
pub use manifest::{CsvManifestReader, Manifest, ManifestReader, ManifestRow};
pub use report::{DeviceReport, DeviceStatus, FleetRunReport};
pub use runner::{CancelHandle, FleetRunner};
