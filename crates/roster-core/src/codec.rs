//! JSON persistence for a [`DeviceTable`]
//!
//! The file maps each name to a kind tag (`"usb"` / `"lan"`) and then to a
//! flat attribute map:
//!
//! ```json
//! {
//!   "bench-psu": {
//!     "usb": { "address": "USB0\\dev", "address_aliases": [], "vendor_id": 4386, "serial": "AB1234CD" }
//!   }
//! }
//! ```
//!
//! Absent optional fields are omitted rather than written as `null`.
//! Every address read back from a file is historical: a snapshot may be
//! outdated, so devices must be found again before they count as connected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

use crate::device::{AddressBook, Device, DeviceKind, LanDevice, UsbDevice};
use crate::error::{Error, Result};
use crate::table::DeviceTable;

/// Attribute map of a USB device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub address_aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub historical_addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
}

/// Attribute map of a LAN device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub address_aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub historical_addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DeviceRecord {
    Usb(UsbRecord),
    Lan(LanRecord),
}

impl DeviceRecord {
    /// Decode the attribute map of a device of the given kind
    pub fn from_value(kind: DeviceKind, value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::InvalidValue(format!(
                "{kind} device record must be an object, got {value}"
            )));
        }
        Ok(match kind {
            DeviceKind::Usb => Self::Usb(serde_json::from_value(value)?),
            DeviceKind::Lan => Self::Lan(serde_json::from_value(value)?),
        })
    }

    pub fn kind(&self) -> DeviceKind {
        match self {
            Self::Usb(_) => DeviceKind::Usb,
            Self::Lan(_) => DeviceKind::Lan,
        }
    }

    /// Build the device; with `historical` set, no address is trusted as current
    pub fn into_device(self, historical: bool) -> Result<Device> {
        let mut device: Device = match self {
            Self::Usb(r) => {
                let mut device = UsbDevice::new();
                device.addresses = addresses(r.address, r.address_aliases, &r.historical_addresses);
                device.vendor_id = r.vendor_id;
                device.product_id = r.product_id;
                device.revision_id = r.revision_id;
                device.serial = r.serial;
                device.into()
            }
            Self::Lan(r) => {
                let mut device = LanDevice::new();
                device.addresses = addresses(r.address, r.address_aliases, &r.historical_addresses);
                device.set_mac_address(r.mac_address.as_deref())?;
                device.into()
            }
        };
        if historical {
            device.reset_addresses();
        }
        Ok(device)
    }
}

fn addresses(address: Option<String>, aliases: Vec<String>, historical: &[String]) -> AddressBook {
    let mut book = AddressBook::new(address, aliases);
    book.extend_historical(historical.iter().map(String::as_str));
    book
}

impl From<&Device> for DeviceRecord {
    fn from(device: &Device) -> Self {
        let book = device.addresses();
        let address = book.address().map(String::from);
        let address_aliases = book.aliases().to_vec();
        let historical_addresses = book.historical().to_vec();
        match device {
            Device::Usb(d) => Self::Usb(UsbRecord {
                address,
                address_aliases,
                historical_addresses,
                vendor_id: d.vendor_id,
                product_id: d.product_id,
                revision_id: d.revision_id,
                serial: d.serial.clone(),
            }),
            Device::Lan(d) => Self::Lan(LanRecord {
                address,
                address_aliases,
                historical_addresses,
                mac_address: d.mac_address.map(|m| m.to_string()),
            }),
        }
    }
}

type RawFile = BTreeMap<String, BTreeMap<String, Value>>;

fn to_file(table: &DeviceTable) -> BTreeMap<&str, BTreeMap<&'static str, DeviceRecord>> {
    table
        .iter()
        .map(|(name, devices)| {
            let records = devices
                .iter()
                .map(|(kind, device)| (kind.as_str(), DeviceRecord::from(device)))
                .collect();
            (name.as_str(), records)
        })
        .collect()
}

fn from_file(raw: RawFile) -> Result<DeviceTable> {
    let mut table = DeviceTable::new();
    for (name, devices) in raw {
        for (tag, value) in devices {
            let kind: DeviceKind = tag.parse()?;
            let device = DeviceRecord::from_value(kind, value)?.into_device(true)?;
            table.insert(name.clone(), device);
        }
    }
    debug!(entries = table.len(), "Decoded device table");
    Ok(table)
}

pub fn encode(table: &DeviceTable, pretty: bool) -> Result<String> {
    let file = to_file(table);
    let content = if pretty {
        serde_json::to_string_pretty(&file)?
    } else {
        serde_json::to_string(&file)?
    };
    Ok(content)
}

/// Decode a table; all addresses come back as historical
pub fn decode(content: &str) -> Result<DeviceTable> {
    from_file(serde_json::from_str(content)?)
}

pub fn write_to<W: Write>(table: &DeviceTable, writer: W, pretty: bool) -> Result<()> {
    let file = to_file(table);
    if pretty {
        serde_json::to_writer_pretty(writer, &file)?;
    } else {
        serde_json::to_writer(writer, &file)?;
    }
    Ok(())
}

pub fn read_from<R: Read>(reader: R) -> Result<DeviceTable> {
    from_file(serde_json::from_reader(reader)?)
}

/// Load a table from a file
pub fn load(path: &Path) -> Result<DeviceTable> {
    let content = std::fs::read_to_string(path)?;
    decode(&content)
}

/// Load a table, or start empty if the file does not exist yet
pub fn load_or_default(path: &Path) -> Result<DeviceTable> {
    if path.exists() {
        load(path)
    } else {
        Ok(DeviceTable::new())
    }
}

/// Save a table to a file, creating parent directories
pub fn save(table: &DeviceTable, path: &Path, pretty: bool) -> Result<()> {
    let content = encode(table, pretty)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;
    Ok(())
}
