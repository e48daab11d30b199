//! Linux USB enumeration through sysfs

use async_trait::async_trait;
use roster_core::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, trace};

use crate::usb::{
    RawUsbDevice, UsbBackend, PROP_DEVNAME, PROP_MODEL_ID, PROP_REVISION, PROP_SERIAL,
    PROP_VENDOR_ID,
};

pub const DEFAULT_SYSFS_ROOT: &str = "/sys/bus/usb/devices";

/// Reads `/sys/bus/usb/devices/*`, keeping device entries and skipping interfaces
#[derive(Debug, Clone)]
pub struct SysfsUsbBackend {
    root: PathBuf,
}

impl Default for SysfsUsbBackend {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_ROOT)
    }
}

impl SysfsUsbBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_device(&self, dir: &Path) -> Option<RawUsbDevice> {
        let uevent = fs::read_to_string(dir.join("uevent")).await.ok()?;
        let uevent = parse_uevent(&uevent);
        if uevent.get("DEVTYPE").map(String::as_str) != Some("usb_device") {
            return None;
        }

        // Device path relative to /sys, like udev reports it
        let resolved = fs::canonicalize(dir).await.unwrap_or_else(|_| dir.to_path_buf());
        let device_path = resolved
            .strip_prefix("/sys")
            .map(|p| Path::new("/").join(p))
            .unwrap_or(resolved);

        let mut raw = RawUsbDevice::new(device_path.to_string_lossy().into_owned());
        if let Some(devname) = uevent.get("DEVNAME") {
            let node = if devname.starts_with('/') {
                devname.clone()
            } else {
                format!("/dev/{devname}")
            };
            raw.properties.insert(PROP_DEVNAME.to_string(), node);
        }
        for (attribute, property) in [
            ("idVendor", PROP_VENDOR_ID),
            ("idProduct", PROP_MODEL_ID),
            ("bcdDevice", PROP_REVISION),
            ("serial", PROP_SERIAL),
        ] {
            if let Ok(value) = fs::read_to_string(dir.join(attribute)).await {
                raw.properties.insert(property.to_string(), value.trim().to_string());
            }
        }
        Some(raw)
    }
}

fn parse_uevent(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

#[async_trait]
impl UsbBackend for SysfsUsbBackend {
    fn name(&self) -> &str {
        "sysfs"
    }

    async fn enumerate(&self) -> Result<Vec<RawUsbDevice>> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| Error::backend_unavailable("sysfs", format!("{}: {e}", self.root.display())))?;

        let mut devices = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            // "1-1:1.0" style entries are interfaces of a device
            if name.to_string_lossy().contains(':') {
                continue;
            }
            match self.read_device(&entry.path()).await {
                Some(raw) => devices.push(raw),
                None => trace!(entry = %name.to_string_lossy(), "Not a USB device entry"),
            }
        }
        debug!(root = %self.root.display(), count = devices.len(), "Enumerated sysfs USB devices");
        Ok(devices)
    }
}
