//! USB discovery from raw udev-style observations

use async_trait::async_trait;
use roster_core::{AddressBook, Device, DeviceKind, Result, UsbDevice, UsbNameLookup};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::source::DiscoverySource;

pub const PROP_DEVNAME: &str = "DEVNAME";
pub const PROP_VENDOR_ID: &str = "ID_VENDOR_ID";
pub const PROP_MODEL_ID: &str = "ID_MODEL_ID";
pub const PROP_REVISION: &str = "ID_REVISION";
pub const PROP_SERIAL: &str = "ID_SERIAL_SHORT";

/// One device as reported by the platform enumeration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawUsbDevice {
    pub subsystem: Option<String>,
    /// Path of the device in the device tree; becomes the primary address
    pub device_path: Option<String>,
    pub properties: HashMap<String, String>,
}

impl RawUsbDevice {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            subsystem: Some("usb".to_string()),
            device_path: Some(device_path.into()),
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConversionError {
    #[error("device has no subsystem")]
    MissingSubsystem,
    #[error("expected subsystem \"usb\", got \"{0}\"")]
    WrongSubsystem(String),
    #[error("device has no device path")]
    MissingPath,
    #[error("{property} is not a hex id: \"{value}\"")]
    InvalidHex { property: &'static str, value: String },
}

fn hex_property(raw: &RawUsbDevice, property: &'static str) -> Result<Option<u16>, ConversionError> {
    raw.properties
        .get(property)
        .map(|value| {
            u16::from_str_radix(value.trim(), 16).map_err(|_| ConversionError::InvalidHex {
                property,
                value: value.clone(),
            })
        })
        .transpose()
}

impl TryFrom<&RawUsbDevice> for UsbDevice {
    type Error = ConversionError;

    fn try_from(raw: &RawUsbDevice) -> Result<Self, Self::Error> {
        let subsystem = raw.subsystem.as_deref().ok_or(ConversionError::MissingSubsystem)?;
        if !subsystem.eq_ignore_ascii_case("usb") {
            return Err(ConversionError::WrongSubsystem(subsystem.to_string()));
        }
        let path = raw.device_path.clone().ok_or(ConversionError::MissingPath)?;

        Ok(UsbDevice {
            addresses: AddressBook::new(Some(path), raw.properties.get(PROP_DEVNAME).cloned()),
            vendor_id: hex_property(raw, PROP_VENDOR_ID)?,
            product_id: hex_property(raw, PROP_MODEL_ID)?,
            revision_id: hex_property(raw, PROP_REVISION)?,
            serial: raw.properties.get(PROP_SERIAL).cloned(),
            ..UsbDevice::default()
        })
    }
}

/// Platform enumeration of attached USB devices
#[async_trait]
pub trait UsbBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn enumerate(&self) -> Result<Vec<RawUsbDevice>>;
}

pub struct UsbSource {
    backend: Box<dyn UsbBackend>,
    names: Arc<dyn UsbNameLookup>,
    devices: Vec<Device>,
}

impl UsbSource {
    pub fn new(backend: Box<dyn UsbBackend>, names: Arc<dyn UsbNameLookup>) -> Self {
        Self {
            backend,
            names,
            devices: Vec::new(),
        }
    }

    async fn scan(&mut self) -> Result<()> {
        let raw_devices = self.backend.enumerate().await?;
        let mut devices: Vec<Device> = Vec::with_capacity(raw_devices.len());

        for raw in &raw_devices {
            let mut usb = match UsbDevice::try_from(raw) {
                Ok(usb) => usb,
                Err(e) => {
                    debug!(path = ?raw.device_path, error = %e, "Dropping USB observation");
                    continue;
                }
            };
            usb.resolve_names(self.names.as_ref());
            let device = Device::from(usb);
            if devices.iter().any(|d| d.same_address(&device)) {
                debug!(path = ?raw.device_path, "Skipping duplicate USB observation");
                continue;
            }
            devices.push(device);
        }

        debug!(
            backend = self.backend.name(),
            observed = raw_devices.len(),
            devices = devices.len(),
            "USB scan finished"
        );
        self.devices = devices;
        Ok(())
    }
}

#[async_trait]
impl DiscoverySource for UsbSource {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Usb
    }

    async fn list(&mut self, rescan: bool) -> Result<Vec<Device>> {
        if rescan || self.devices.is_empty() {
            self.scan().await?;
        }
        Ok(self.devices.clone())
    }
}
