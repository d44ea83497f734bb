//! Sequential fleet runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures_util::future::BoxFuture;
use log::{debug, info, warn};

use super::config::FleetConfig;
use super::credentials::{CredentialProvider, Credentials};
use super::endpoint::DeviceEndpoint;
use super::manifest::{ManifestReader, ManifestRow};
use super::report::{DeviceReport, FleetRunReport};
use crate::driver::Session;
use crate::error::Result;
use crate::transport::Connector;

/// Stops a run between devices.
///
/// Clones share the flag, so a handle taken before the run can cancel it
/// from another task.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Skip every device not yet started.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs a task against every device in a manifest, one device at a time.
///
/// Each device gets its own [`Session`], which is closed (and its terminal
/// settings restored) before the next device is contacted. A failing device
/// becomes a report entry; the run carries on.
pub struct FleetRunner<K, P> {
    connector: K,
    credentials: P,
    config: FleetConfig,
    cancel: CancelHandle,
}

impl<K, P> FleetRunner<K, P>
where
    K: Connector,
    P: CredentialProvider,
{
    /// Create a runner; see [`FleetRunnerBuilder`](super::FleetRunnerBuilder) for validated settings.
    pub fn new(connector: K, credentials: P, config: FleetConfig) -> Self {
        Self {
            connector,
            credentials,
            config,
            cancel: CancelHandle::default(),
        }
    }

    /// Handle that cancels the remaining devices of the current or next run.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Settings applied to every row.
    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// The connector used to dial devices.
    pub fn connector(&self) -> &K {
        &self.connector
    }

    /// Mutable access to the connector, e.g. to register proxy sessions.
    pub fn connector_mut(&mut self) -> &mut K {
        &mut self.connector
    }

    /// Give back the connector, e.g. to close proxy sessions.
    pub fn into_connector(self) -> K {
        self.connector
    }

    /// Run `task` on every device in `manifest`.
    ///
    /// Fails only if the manifest cannot be read or lacks a required column,
    /// in which case no device is contacted. Everything else is recorded in
    /// the report, one entry per row, in manifest order.
    pub async fn run<M, F>(&mut self, manifest: M, mut task: F) -> Result<FleetRunReport>
    where
        M: ManifestReader,
        F: for<'a> FnMut(&'a mut Session<K::Channel>) -> BoxFuture<'a, Result<()>>,
    {
        let manifest = manifest.read_manifest()?;
        manifest.validate()?;

        let started = Instant::now();
        let mut report = FleetRunReport::default();
        info!("Starting fleet run over {} device(s)", manifest.len());

        for row in manifest.rows() {
            if self.cancel.is_cancelled() {
                report.push(DeviceReport::skipped(row.number(), row.address(), "run cancelled"));
                continue;
            }

            let device = self.run_device(row, &mut task).await;
            if device.is_success() {
                info!("{}", device);
            } else {
                warn!("{}", device);
            }
            report.push(device);
        }

        report.set_elapsed(started.elapsed());
        info!(
            "Fleet run finished: {} succeeded, {} failed, {} skipped",
            report.successes().count(),
            report.failures().count(),
            report.skipped().count()
        );
        Ok(report)
    }

    async fn run_device<F>(&mut self, row: &ManifestRow, task: &mut F) -> DeviceReport
    where
        F: for<'a> FnMut(&'a mut Session<K::Channel>) -> BoxFuture<'a, Result<()>>,
    {
        let started = Instant::now();
        let mut hostname = None;

        let outcome = self.contact(row, task, &mut hostname).await;
        let elapsed = started.elapsed();
        match outcome {
            Ok(()) => DeviceReport::success(row.number(), row.address(), hostname, elapsed),
            Err(e) => DeviceReport::failed(row.number(), row.address(), hostname, &e, elapsed),
        }
    }

    async fn contact<F>(
        &mut self,
        row: &ManifestRow,
        task: &mut F,
        hostname: &mut Option<String>,
    ) -> Result<()>
    where
        F: for<'a> FnMut(&'a mut Session<K::Channel>) -> BoxFuture<'a, Result<()>>,
    {
        let endpoint = DeviceEndpoint::from_row(row, &self.config)?;
        let credentials = Credentials::resolve(&endpoint, &self.credentials)?;

        debug!("Row {}: connecting to {}", row.number(), endpoint);
        let channel = self.connector.connect(&endpoint, &credentials).await?;

        Session::scoped(
            channel,
            self.config.session.clone(),
            credentials.enable_password(),
            |session| {
                *hostname = Some(session.hostname().to_string());
                task(session)
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::channel::{ScriptedChannel, ScriptedDevice};
    use crate::error::{ConnectError, FailureKind, ManifestValidationError};
    use crate::fleet::{DeviceStatus, Manifest, StaticCredentials};

    /// Connects to scripted devices by host; unknown hosts are unreachable.
    #[derive(Default)]
    struct Lab {
        devices: HashMap<String, ScriptedDevice>,
        attempts: Vec<String>,
    }

    impl Lab {
        fn with(mut self, host: &str, device: ScriptedDevice) -> Self {
            self.devices.insert(host.to_string(), device);
            self
        }
    }

    impl Connector for Lab {
        type Channel = ScriptedChannel;

        async fn connect(
            &mut self,
            endpoint: &DeviceEndpoint,
            _credentials: &Credentials,
        ) -> Result<ScriptedChannel> {
            self.attempts.push(endpoint.host().to_string());
            match self.devices.get(endpoint.host()) {
                Some(device) => Ok(device.connect()),
                None => Err(ConnectError::ConnectionFailed {
                    host: endpoint.host().to_string(),
                    port: endpoint.port().unwrap_or_default(),
                    source: std::io::ErrorKind::ConnectionRefused.into(),
                }
                .into()),
            }
        }
    }

    fn manifest(hosts: &[&str]) -> Manifest {
        hosts.iter().fold(
            Manifest::new(["Hostname", "Protocol", "Username"]),
            |manifest, host| manifest.with_row([*host, "ssh", "admin"]),
        )
    }

    fn runner(lab: Lab) -> FleetRunner<Lab, StaticCredentials> {
        FleetRunner::new(lab, StaticCredentials::new(), FleetConfig::default())
    }

    fn show_clock<'a>(session: &'a mut Session<ScriptedChannel>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            session.execute("show clock").await?;
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_unreachable_device_does_not_stop_run() {
        let sw1 = ScriptedDevice::ios("sw1").with_output("show clock", "12:00:00 UTC");
        let sw3 = ScriptedDevice::nxos("sw3").with_output("show clock", "12:00:01 UTC");
        let (log1, log3) = (sw1.log(), sw3.log());
        let mut runner = runner(Lab::default().with("10.0.0.1", sw1).with("10.0.0.3", sw3));

        let report = runner
            .run(manifest(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]), show_clock)
            .await
            .unwrap();

        let statuses: Vec<_> = report.devices().iter().map(|d| (d.row, d.is_success())).collect();
        assert_eq!(statuses, vec![(1, true), (2, false), (3, true)]);
        assert_eq!(report.devices()[0].hostname.as_deref(), Some("sw1"));
        assert_eq!(report.devices()[1].failure_kind(), Some(FailureKind::Connect));
        assert_eq!(report.failed_hosts(), vec!["10.0.0.2"]);

        // Terminal restored on both reachable devices
        assert_eq!(log1.count("terminal length 24"), 1);
        assert_eq!(log3.count("terminal length 31"), 1);
    }

    #[tokio::test]
    async fn test_missing_column_contacts_nothing() {
        let mut runner = runner(Lab::default().with("10.0.0.1", ScriptedDevice::ios("sw1")));
        let manifest = Manifest::new(["Hostname", "Protocol"]).with_row(["10.0.0.1", "ssh"]);

        let err = runner.run(manifest, show_clock).await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::ManifestValidation(ManifestValidationError::MissingColumns { .. })
        ));
        assert!(runner.connector().attempts.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_rows_reported() {
        let mut runner = runner(Lab::default().with("10.0.0.1", ScriptedDevice::ios("sw1")));
        let manifest = Manifest::new(["Hostname", "Protocol", "Username"])
            .with_row(["10.0.0.1", "rlogin", "admin"])
            .with_row(["10.0.0.1", "ssh", ""]);

        let report = runner.run(manifest, show_clock).await.unwrap();
        assert_eq!(report.devices()[0].failure_kind(), Some(FailureKind::InvalidEntry));
        assert_eq!(report.devices()[1].failure_kind(), Some(FailureKind::Credential));
        assert!(runner.connector().attempts.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_skips_remaining() {
        let sw1 = ScriptedDevice::ios("sw1").with_output("show clock", "12:00:00 UTC");
        let mut runner = runner(Lab::default().with("10.0.0.1", sw1));
        let cancel = runner.cancel_handle();

        let report = runner
            .run(manifest(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]), move |session| {
                cancel.cancel();
                show_clock(session)
            })
            .await
            .unwrap();

        assert!(report.devices()[0].is_success());
        for device in &report.devices()[1..] {
            assert_eq!(
                device.status,
                DeviceStatus::Skipped {
                    reason: "run cancelled".into()
                }
            );
        }
        assert_eq!(runner.connector().attempts, vec!["10.0.0.1"]);
    }

    #[tokio::test]
    async fn test_task_failure_and_hostname() {
        let sw1 = ScriptedDevice::asa("fw1").with_silent_command("show tech");
        let mut config = FleetConfig::default();
        config.session.command_timeout = std::time::Duration::from_millis(10);
        let mut runner = FleetRunner::new(
            Lab::default().with("10.0.0.1", sw1),
            StaticCredentials::new(),
            config,
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let collected = seen.clone();

        let report = runner
            .run(manifest(&["10.0.0.1"]), move |session| {
                let collected = collected.clone();
                Box::pin(async move {
                    collected.lock().unwrap().push(session.os_family());
                    session.execute("show tech").await?;
                    Ok(())
                })
            })
            .await
            .unwrap();

        let device = &report.devices()[0];
        assert_eq!(device.hostname.as_deref(), Some("fw1"));
        assert_eq!(device.failure_kind(), Some(FailureKind::CommandTimeout));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
