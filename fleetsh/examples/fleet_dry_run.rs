//! Dry run: a fleet task against simulated devices.
//!
//! Runs `show ip interface brief` across a small manifest where every device
//! is a [`ScriptedDevice`], so no network is needed. One row points at a host
//! that does not exist to show how failures are reported.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug cargo run --example fleet_dry_run
//! RUST_LOG=info cargo run --example fleet_dry_run -- --advance --json
//! ```

use std::collections::HashMap;
use std::env;
use std::sync::{Arc, Mutex};

use fleetsh::fleet::{CsvManifestReader, Credentials, DeviceEndpoint, StaticCredentials};
use fleetsh::{
    Connector, ConnectError, FleetRunnerBuilder, PaginationMode, ScriptedChannel, ScriptedDevice,
};

const MANIFEST: &str = "\
Hostname,Protocol,Username,Password,Enable
10.0.0.1,ssh2,admin,,
10.0.0.2,telnet,,,
10.0.0.3,ssh,admin,,
10.0.0.4,ssh,admin,,s3cret
";

/// Connects to simulated devices by address.
struct Lab {
    devices: HashMap<String, ScriptedDevice>,
}

impl Connector for Lab {
    type Channel = ScriptedChannel;

    async fn connect(
        &mut self,
        endpoint: &DeviceEndpoint,
        credentials: &Credentials,
    ) -> fleetsh::Result<ScriptedChannel> {
        println!("  dialing {} as {}", endpoint, credentials.username());
        match self.devices.get(endpoint.host()) {
            Some(device) => Ok(device.connect()),
            None => Err(ConnectError::Refused {
                host: endpoint.host().to_string(),
                detail: "no such device in the lab".to_string(),
            }
            .into()),
        }
    }
}

fn interfaces(count: usize) -> String {
    let mut text = String::from(
        "Interface              IP-Address      OK? Method Status                Protocol\n",
    );
    for i in 1..=count {
        text.push_str(&format!(
            "GigabitEthernet1/0/{:<4} unassigned      YES unset  up                    up\n",
            i
        ));
    }
    text
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let pagination = if args.iter().any(|a| a == "--advance") {
        PaginationMode::Advance
    } else {
        PaginationMode::Suppress
    };
    let json = args.iter().any(|a| a == "--json");

    let command = "show ip interface brief";
    let mut devices = HashMap::new();
    devices.insert(
        "10.0.0.1".to_string(),
        ScriptedDevice::ios("core-sw1")
            .with_banner("Authorized access only")
            .with_output(command, interfaces(48)),
    );
    devices.insert(
        "10.0.0.2".to_string(),
        ScriptedDevice::nxos("dc-leaf1").with_output(command, interfaces(12)),
    );
    devices.insert(
        "10.0.0.4".to_string(),
        ScriptedDevice::ios("branch-rtr1")
            .with_enable_secret("s3cret")
            .with_output(command, interfaces(4)),
    );

    let credentials = StaticCredentials::new()
        .with_default_username("netops")
        .with_default_password("lab");

    let mut runner = FleetRunnerBuilder::new(Lab { devices }, credentials)
        .pagination(pagination)
        .build()?;

    println!("Running '{}' ({:?} pagination)", command, pagination);
    let collected: Arc<Mutex<Vec<(String, usize, u32)>>> = Arc::default();
    let sink = collected.clone();

    let report = runner
        .run(CsvManifestReader::new(MANIFEST.as_bytes()), move |session| {
            let sink = sink.clone();
            Box::pin(async move {
                let result = session.execute(command).await?;
                if let Ok(mut rows) = sink.lock() {
                    rows.push((session.hostname().to_string(), result.lines().count(), result.pages));
                }
                Ok(())
            })
        })
        .await?;

    println!();
    for (hostname, lines, pages) in collected.lock().map(|rows| rows.clone()).unwrap_or_default() {
        println!("{:<12} {:>3} lines, {} page(s) advanced", hostname, lines, pages);
    }

    println!();
    println!("{}", report);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
