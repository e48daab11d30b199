//! Subcommands and the discovery stack they run on

use anyhow::{bail, Result};
use clap::Subcommand;
use roster_core::codec::DeviceRecord;
use roster_core::{Device, DeviceKind, DeviceValue, Filter, ProbeHost, UsbIdsDatabase};
use roster_discovery::{
    CommandNeighborTable, DeviceSources, LanSource, NetworkProbe, SysfsUsbBackend, UsbSource,
};
use roster_nmap::NmapBackend;
use roster_registry::{Registry, Resolved};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{self, Config};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List discovered devices
    List {
        #[arg(short, long)]
        kind: Option<DeviceKind>,
        /// Scan instead of using cached results
        #[arg(long)]
        rescan: bool,
        /// Print device records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Find discovered devices by attribute, e.g. `mac_address=00:11:22:33:44:55`
    Find {
        #[arg(short, long)]
        kind: Option<DeviceKind>,
        #[arg(long)]
        rescan: bool,
        #[arg(long)]
        json: bool,
        #[arg(required = true)]
        criteria: Vec<String>,
    },
    /// Show a named device, refreshing its addresses
    Get {
        name: String,
        #[arg(short, long)]
        kind: Option<DeviceKind>,
        /// Always rescan, even if the stored address looks current
        #[arg(long)]
        scan: bool,
        #[arg(long)]
        json: bool,
    },
    /// Name a device given by address or JSON record
    Set {
        name: String,
        value: String,
        #[arg(short, long)]
        kind: Option<DeviceKind>,
        #[arg(long)]
        scan: bool,
    },
    /// Forget a named device
    Remove {
        name: String,
        #[arg(short, long)]
        kind: Option<DeviceKind>,
    },
    /// List registered names
    Names,
    /// Mark every stored address stale so the next read rescans
    Reset,
    /// Probe hosts or subnets with nmap
    Probe {
        #[arg(required = true)]
        hosts: Vec<String>,
        /// Run in the background and wait at most this many seconds
        #[arg(long)]
        wait: Option<u64>,
        /// Print the raw host reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Discovery sources built from configuration
pub struct Stack {
    pub sources: DeviceSources,
    pub probe: Option<Arc<NetworkProbe>>,
}

pub fn build_stack(config: &Config) -> Result<Stack> {
    let probe = if config.lan.probe {
        match NmapBackend::locate(&config.lan.nmap_search_path) {
            Ok(backend) => Some(Arc::new(NetworkProbe::new(Arc::new(backend)))),
            Err(e) => {
                warn!(error = %e, "Network probe unavailable, LAN discovery uses the neighbor table only");
                None
            }
        }
    } else {
        None
    };

    let neighbors = CommandNeighborTable::new(&config.lan.neighbor_command)?;
    let mut lan = LanSource::new(Box::new(neighbors));
    if let Some(probe) = &probe {
        lan = lan.with_probe(Arc::clone(probe));
    }

    let names = UsbIdsDatabase::load_first(&config.usb.ids_paths);
    let usb = UsbSource::new(
        Box::new(SysfsUsbBackend::new(&config.usb.sysfs_root)),
        Arc::new(names),
    );

    let sources = DeviceSources::new().with(Box::new(usb)).with(Box::new(lan));
    Ok(Stack { sources, probe })
}

pub async fn run(command: Command, config: &Config, config_path: &Path) -> Result<()> {
    match command {
        Command::InitConfig { force } => {
            if config_path.exists() && !force {
                bail!("{} already exists, use --force to overwrite", config_path.display());
            }
            config::save_default_config(config_path)?;
            info!(path = %config_path.display(), "Wrote default configuration");
            Ok(())
        }
        Command::List { kind, rescan, json } => {
            let mut stack = build_stack(config)?;
            let devices = stack.sources.list(kind, rescan).await?;
            print_devices(&devices, json)
        }
        Command::Find {
            kind,
            rescan,
            json,
            criteria,
        } => {
            let filter = Filter::parse_pairs(&criteria)?;
            let mut stack = build_stack(config)?;
            let devices = stack.sources.find(kind, rescan, &filter).await?;
            print_devices(&devices, json)
        }
        Command::Probe { hosts, wait, json } => {
            let stack = build_stack(config)?;
            let Some(probe) = stack.probe else {
                bail!("no network probe available, check the [lan] section of the configuration");
            };
            probe_hosts(&probe, &hosts, wait, json).await
        }
        command => {
            let stack = build_stack(config)?;
            let mut registry = Registry::open(&config.registry.path, stack.sources)?;
            let changed = run_registry(&mut registry, command).await?;
            if changed && config.registry.autosave {
                registry.save_to(&config.registry.path, config.registry.pretty)?;
            }
            Ok(())
        }
    }
}

/// Run a registry command; returns whether the registry may have changed
async fn run_registry(registry: &mut Registry, command: Command) -> Result<bool> {
    match command {
        Command::Get {
            name,
            kind,
            scan,
            json,
        } => {
            let resolved = registry.get(&name, kind, scan).await?;
            if json {
                println!("{}", resolved_json(&resolved)?);
            } else {
                for device in resolved.devices() {
                    println!("{}", describe(device));
                }
            }
            Ok(true)
        }
        Command::Set {
            name,
            value,
            kind,
            scan,
        } => {
            let value = DeviceValue::parse(&value, kind)?;
            let device = registry.set(&name, kind, value, scan).await?;
            println!("{name}: {}", describe(&device));
            Ok(true)
        }
        Command::Remove { name, kind } => {
            registry.remove(&name, kind)?;
            Ok(true)
        }
        Command::Names => {
            for name in registry.names() {
                println!("{name}");
            }
            Ok(false)
        }
        Command::Reset => {
            registry.reset_addresses();
            Ok(true)
        }
        other => bail!("not a registry command: {other:?}"),
    }
}

async fn probe_hosts(
    probe: &NetworkProbe,
    hosts: &[String],
    wait: Option<u64>,
    json: bool,
) -> Result<()> {
    match wait {
        Some(secs) => {
            probe.scan_async(hosts, None).await;
            if probe.wait_for(Some(Duration::from_secs(secs))).await {
                println!("Probe still running after {secs}s");
                return Ok(());
            }
        }
        None => {
            if !probe.scan(hosts).await {
                warn!(hosts = %hosts.join(" "), "Probe failed");
            }
        }
    }
    if json {
        println!("{}", hosts_json(&probe.raw_hosts().await)?);
        return Ok(());
    }
    let devices: Vec<Device> = probe.devices().await.into_iter().map(Device::from).collect();
    print_devices(&devices, false)
}

fn hosts_json(hosts: &[ProbeHost]) -> Result<String> {
    Ok(serde_json::to_string_pretty(hosts)?)
}

fn print_devices(devices: &[Device], json: bool) -> Result<()> {
    if json {
        let records: Vec<serde_json::Value> = devices.iter().map(record_json).collect::<Result<_>>()?;
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        for device in devices {
            println!("{}", describe(device));
        }
    }
    Ok(())
}

/// Device record with its kind under `"type"`
fn record_json(device: &Device) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(DeviceRecord::from(device))?;
    if let Some(fields) = value.as_object_mut() {
        fields.insert("type".to_string(), device.kind().as_str().into());
    }
    Ok(value)
}

fn resolved_json(resolved: &Resolved) -> Result<String> {
    let value = match resolved {
        Resolved::Device(device) => record_json(device)?,
        Resolved::Kinds(devices) => {
            let mut map = serde_json::Map::new();
            for (kind, device) in devices {
                map.insert(kind.to_string(), record_json(device)?);
            }
            serde_json::Value::Object(map)
        }
    };
    Ok(serde_json::to_string_pretty(&value)?)
}

/// One-line human readable summary
fn describe(device: &Device) -> String {
    let mut line = format!("{:<4} {}", device.kind().as_str(), device.address().unwrap_or("-"));
    let aliases = device.addresses().aliases();
    if !aliases.is_empty() {
        line.push_str(&format!(" aliases=[{}]", aliases.join(", ")));
    }
    match device {
        Device::Usb(usb) => {
            let hex = |id: Option<u16>| id.map_or_else(|| "----".to_string(), |id| format!("{id:04x}"));
            line.push_str(&format!(" id={}:{}", hex(usb.vendor_id), hex(usb.product_id)));
            if let Some(serial) = &usb.serial {
                line.push_str(&format!(" serial={serial}"));
            }
            let names: Vec<&str> = [&usb.vendor_name, &usb.product_name]
                .into_iter()
                .flatten()
                .map(String::as_str)
                .collect();
            if !names.is_empty() {
                line.push_str(&format!(" ({})", names.join(" ")));
            }
        }
        Device::Lan(lan) => {
            if let Some(mac) = &lan.mac_address {
                line.push_str(&format!(" mac={mac}"));
            }
        }
    }
    let history = device.historical_addresses();
    if !history.is_empty() {
        line.push_str(&format!(" history=[{}]", history.join(", ")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::{AddressBook, LanDevice, UsbDevice};
    use tempfile::TempDir;

    fn usb() -> Device {
        UsbDevice {
            addresses: AddressBook::new(
                Some("/devices/usb1/1-1".to_string()),
                vec!["/dev/bus/usb/001/002".to_string()],
            ),
            vendor_id: Some(0x1122),
            product_id: Some(0xABAB),
            serial: Some("AB1234CD".to_string()),
            vendor_name: Some("Acme".to_string()),
            ..UsbDevice::default()
        }
        .into()
    }

    #[test]
    fn test_describe_usb() {
        assert_eq!(
            describe(&usb()),
            "usb  /devices/usb1/1-1 aliases=[/dev/bus/usb/001/002] id=1122:abab serial=AB1234CD (Acme)"
        );
    }

    #[test]
    fn test_describe_disconnected_lan() {
        let mut lan = LanDevice::new();
        lan.addresses = AddressBook::new(Some("10.0.0.7".to_string()), Vec::new());
        lan.set_mac_address(Some("00-11-22-33-44-55")).unwrap();
        let mut device = Device::from(lan);
        device.reset_addresses();
        assert_eq!(
            describe(&device),
            "lan  - mac=00:11:22:33:44:55 history=[10.0.0.7]"
        );
    }

    #[test]
    fn test_hosts_json() {
        let hosts = vec![ProbeHost {
            mac_address: Some("00:11:22:33:44:55".to_string()),
            addresses: vec!["10.0.0.7".to_string(), "fe80::7".to_string()],
            hostname: Some("cam.lan".to_string()),
            ..ProbeHost::default()
        }];
        let text = hosts_json(&hosts).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[0]["mac_address"], "00:11:22:33:44:55");
        assert_eq!(value[0]["addresses"][1], "fe80::7");
        assert_eq!(value[0]["hostname"], "cam.lan");

        let parsed: Vec<ProbeHost> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, hosts);
    }

    #[test]
    fn test_record_json_tagged() {
        let value = record_json(&usb()).unwrap();
        assert_eq!(value["type"], "usb");
        assert_eq!(value["serial"], "AB1234CD");

        let parsed = DeviceValue::from_json(&value, None).unwrap();
        assert!(matches!(parsed, DeviceValue::Device(Device::Usb(_))));
    }

    #[tokio::test]
    async fn test_init_config_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roster.toml");
        let config = Config::default();

        run(Command::InitConfig { force: false }, &config, &path).await.unwrap();
        assert!(path.exists());
        assert!(run(Command::InitConfig { force: false }, &config, &path).await.is_err());
        run(Command::InitConfig { force: true }, &config, &path).await.unwrap();
    }

    #[tokio::test]
    async fn test_registry_commands_autosave() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.registry.path = dir.path().join("devices.json");
        config.usb.sysfs_root = dir.path().join("no-sysfs");
        config.lan.probe = false;
        config.lan.neighbor_command = vec!["sh".into(), "-c".into(), "true".into()];
        let config_path = dir.path().join("roster.toml");

        let record = r#"{"type": "lan", "address": "10.0.0.7", "mac_address": "00:11:22:33:44:55"}"#;
        let set = Command::Set {
            name: "pi".to_string(),
            value: record.to_string(),
            kind: None,
            scan: false,
        };
        run(set, &config, &config_path).await.unwrap();

        let registry = Registry::open(&config.registry.path, DeviceSources::new()).unwrap();
        assert!(registry.contains("pi"));

        let remove = Command::Remove {
            name: "pi".to_string(),
            kind: Some(DeviceKind::Lan),
        };
        run(remove, &config, &config_path).await.unwrap();
        let registry = Registry::open(&config.registry.path, DeviceSources::new()).unwrap();
        assert!(registry.is_empty());
    }
}
