//! Fleet run reports.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, FailureKind};

/// Outcome for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeviceStatus {
    Success,
    Failed { kind: FailureKind, reason: String },
    Skipped { reason: String },
}

/// One manifest row's entry in a [`FleetRunReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceReport {
    /// 1-based manifest row.
    pub row: usize,

    /// Address as written in the manifest.
    pub address: String,

    /// Hostname from the device prompt, once the session got that far.
    pub hostname: Option<String>,

    #[serde(flatten)]
    pub status: DeviceStatus,

    #[serde(with = "crate::driver::seconds")]
    pub elapsed: Duration,
}

impl DeviceReport {
    pub(crate) fn success(row: usize, address: &str, hostname: Option<String>, elapsed: Duration) -> Self {
        Self {
            row,
            address: address.to_string(),
            hostname,
            status: DeviceStatus::Success,
            elapsed,
        }
    }

    pub(crate) fn failed(
        row: usize,
        address: &str,
        hostname: Option<String>,
        error: &Error,
        elapsed: Duration,
    ) -> Self {
        Self {
            row,
            address: address.to_string(),
            hostname,
            status: DeviceStatus::Failed {
                kind: error.failure_kind(),
                reason: error.to_string(),
            },
            elapsed,
        }
    }

    pub(crate) fn skipped(row: usize, address: &str, reason: impl Into<String>) -> Self {
        Self {
            row,
            address: address.to_string(),
            hostname: None,
            status: DeviceStatus::Skipped {
                reason: reason.into(),
            },
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DeviceStatus::Success
    }

    /// The row failed; skipped rows are not failures.
    pub fn is_failure(&self) -> bool {
        matches!(self.status, DeviceStatus::Failed { .. })
    }

    /// Failure category, if the device failed.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.status {
            DeviceStatus::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {} {}", self.row, self.address)?;
        if let Some(hostname) = &self.hostname {
            write!(f, " ({})", hostname)?;
        }
        match &self.status {
            DeviceStatus::Success => write!(f, ": ok"),
            DeviceStatus::Failed { kind, reason } => write!(f, ": {}: {}", kind, reason),
            DeviceStatus::Skipped { reason } => write!(f, ": skipped ({})", reason),
        }
    }
}

/// Per-device outcomes of a run, in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetRunReport {
    devices: Vec<DeviceReport>,

    #[serde(with = "crate::driver::seconds")]
    elapsed: Duration,
}

impl FleetRunReport {
    pub(crate) fn push(&mut self, device: DeviceReport) {
        self.devices.push(device);
    }

    pub(crate) fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    /// Per-device entries, in manifest order.
    pub fn devices(&self) -> &[DeviceReport] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Wall time of the whole run.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Devices whose task completed.
    pub fn successes(&self) -> impl Iterator<Item = &DeviceReport> {
        self.devices.iter().filter(|d| d.is_success())
    }

    /// Devices that failed.
    pub fn failures(&self) -> impl Iterator<Item = &DeviceReport> {
        self.devices.iter().filter(|d| d.is_failure())
    }

    /// Devices never contacted.
    pub fn skipped(&self) -> impl Iterator<Item = &DeviceReport> {
        self.devices
            .iter()
            .filter(|d| matches!(d.status, DeviceStatus::Skipped { .. }))
    }

    /// Addresses of failed devices, for re-running just those rows.
    pub fn failed_hosts(&self) -> Vec<String> {
        self.failures().map(|d| d.address.clone()).collect()
    }

    /// True if every device succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.devices.iter().all(DeviceReport::is_success)
    }
}

impl fmt::Display for FleetRunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} device(s) in {:.1}s: {} succeeded, {} failed, {} skipped",
            self.len(),
            self.elapsed.as_secs_f64(),
            self.successes().count(),
            self.failures().count(),
            self.skipped().count()
        )?;
        for device in self.devices.iter().filter(|d| !d.is_success()) {
            write!(f, "\n  {}", device)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectError;

    fn report() -> FleetRunReport {
        let refused: Error = ConnectError::Refused {
            host: "10.0.0.2".into(),
            detail: "Connection refused".into(),
        }
        .into();

        let mut report = FleetRunReport::default();
        report.push(DeviceReport::success(1, "10.0.0.1", Some("sw1".into()), Duration::from_secs(2)));
        report.push(DeviceReport::failed(2, "10.0.0.2", None, &refused, Duration::from_secs(1)));
        report.push(DeviceReport::skipped(3, "10.0.0.3", "run cancelled"));
        report.set_elapsed(Duration::from_secs(3));
        report
    }

    #[test]
    fn test_helpers() {
        let report = report();
        assert_eq!(report.successes().count(), 1);
        assert_eq!(report.failed_hosts(), vec!["10.0.0.2"]);
        assert_eq!(report.devices()[1].failure_kind(), Some(FailureKind::Connect));
        assert!(!report.all_succeeded());
    }

    #[test]
    fn test_display() {
        let text = report().to_string();
        assert!(text.starts_with("3 device(s) in 3.0s: 1 succeeded, 1 failed, 1 skipped"));
        assert!(text.contains("row 2 10.0.0.2: ConnectError: Connect error: Connection to 10.0.0.2 refused"));
        assert!(text.contains("row 3 10.0.0.3: skipped (run cancelled)"));
    }

    #[test]
    fn test_serialize() {
        let value = serde_json::to_value(report()).unwrap();
        let devices = value["devices"].as_array().unwrap();
        assert_eq!(devices[0]["status"], "success");
        assert_eq!(devices[0]["hostname"], "sw1");
        assert_eq!(devices[1]["status"], "failed");
        assert_eq!(devices[1]["kind"], "connect");
        assert_eq!(devices[2]["reason"], "run cancelled");
        assert_eq!(value["elapsed"], 3.0);
    }
}
