//! Vendor/product display names for USB ids
//!
//! Names come from the `usb.ids` database maintained at linux-usb.org, which
//! most distributions ship as a plain text file. A missing or unreadable
//! database never prevents device construction, names are just absent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::error::Result;

/// Usual install locations of `usb.ids`
pub const DEFAULT_USB_IDS_PATHS: &[&str] = &[
    "/usr/share/hwdata/usb.ids",
    "/usr/share/misc/usb.ids",
    "/usr/share/usb.ids",
    "/var/lib/usbutils/usb.ids",
];

static SYSTEM_DB: OnceLock<UsbIdsDatabase> = OnceLock::new();

/// Resolves (vendor id, product id) to (vendor name, product name)
pub trait UsbNameLookup: Send + Sync {
    fn names(&self, vendor_id: Option<u16>, product_id: Option<u16>)
        -> (Option<String>, Option<String>);
}

/// Lookup that never knows a name
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNames;

impl UsbNameLookup for NoNames {
    fn names(&self, _: Option<u16>, _: Option<u16>) -> (Option<String>, Option<String>) {
        (None, None)
    }
}

#[derive(Debug, Clone, Default)]
struct VendorEntry {
    name: String,
    products: HashMap<u16, String>,
}

/// Parsed `usb.ids` vendor section
#[derive(Debug, Clone, Default)]
pub struct UsbIdsDatabase {
    vendors: HashMap<u16, VendorEntry>,
}

impl UsbIdsDatabase {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse the vendor/product section of a `usb.ids` file
    ///
    /// Vendor lines are `vvvv  Name`, product lines `\tpppp  Name`. Interface
    /// lines (two tabs) are skipped and parsing stops at the device-class list.
    pub fn parse(content: &str) -> Self {
        let mut vendors: HashMap<u16, VendorEntry> = HashMap::new();
        let mut current: Option<u16> = None;

        for line in content.lines() {
            let line = line.trim_end();
            if line.starts_with("# List of known device classes") || line.starts_with("C ") {
                break;
            }
            if line.is_empty() || line.starts_with('#') || line.starts_with("\t\t") {
                continue;
            }

            if let Some(rest) = line.strip_prefix('\t') {
                let Some(vendor) = current else { continue };
                if let Some((id, name)) = split_id_line(rest) {
                    if let Some(entry) = vendors.get_mut(&vendor) {
                        entry.products.insert(id, name);
                    }
                }
            } else if let Some((id, name)) = split_id_line(line) {
                vendors.entry(id).or_default().name = name;
                current = Some(id);
            } else {
                current = None;
            }
        }

        debug!(vendors = vendors.len(), "Parsed USB id database");
        Self { vendors }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        // usb.ids is latin-1 in places
        let bytes = std::fs::read(path)?;
        let content: String = bytes.iter().map(|&b| b as char).collect();
        Ok(Self::parse(&content))
    }

    /// Load the first readable database of `paths`, or an empty one
    pub fn load_first<P: AsRef<Path>>(paths: &[P]) -> Self {
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                continue;
            }
            match Self::from_file(path) {
                Ok(db) => return db,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to read USB id database"),
            }
        }
        debug!("No USB id database found, product names unavailable");
        Self::empty()
    }

    /// Process-wide database from the default locations, loaded on first use
    pub fn system() -> &'static UsbIdsDatabase {
        SYSTEM_DB.get_or_init(|| {
            let paths: Vec<PathBuf> = DEFAULT_USB_IDS_PATHS.iter().map(PathBuf::from).collect();
            Self::load_first(&paths)
        })
    }

    pub fn len(&self) -> usize {
        self.vendors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vendors.is_empty()
    }
}

fn split_id_line(line: &str) -> Option<(u16, String)> {
    let (id, name) = line.split_once(char::is_whitespace)?;
    if id.len() != 4 {
        return None;
    }
    let id = u16::from_str_radix(id, 16).ok()?;
    Some((id, name.trim().to_string()))
}

impl UsbNameLookup for UsbIdsDatabase {
    fn names(&self, vendor_id: Option<u16>, product_id: Option<u16>) -> (Option<String>, Option<String>) {
        let Some(vendor) = vendor_id.and_then(|id| self.vendors.get(&id)) else {
            return (None, None);
        };
        let product = product_id.and_then(|id| vendor.products.get(&id)).cloned();
        (Some(vendor.name.clone()), product)
    }
}

impl UsbNameLookup for &'static UsbIdsDatabase {
    fn names(&self, vendor_id: Option<u16>, product_id: Option<u16>) -> (Option<String>, Option<String>) {
        (**self).names(vendor_id, product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "\
#
#\tList of USB ID's
#
# Vendors, devices and interfaces. Please keep sorted.

1d6b  Linux Foundation
\t0002  2.0 root hub
\t0003  3.0 root hub
046d  Logitech, Inc.
\tc52b  Unifying Receiver
\t\t00  Interface name that is skipped

# List of known device classes, subclasses and protocols
C 00  (Defined at Interface level)
";

    #[test]
    fn test_parse_vendor_and_product() {
        let db = UsbIdsDatabase::parse(SAMPLE);
        assert_eq!(db.len(), 2);
        let (vendor, product) = db.names(Some(0x046d), Some(0xc52b));
        assert_eq!(vendor.as_deref(), Some("Logitech, Inc."));
        assert_eq!(product.as_deref(), Some("Unifying Receiver"));
    }

    #[test]
    fn test_unknown_product_keeps_vendor() {
        let db = UsbIdsDatabase::parse(SAMPLE);
        let (vendor, product) = db.names(Some(0x1d6b), Some(0xffff));
        assert_eq!(vendor.as_deref(), Some("Linux Foundation"));
        assert!(product.is_none());
    }

    #[test]
    fn test_unknown_vendor() {
        let db = UsbIdsDatabase::parse(SAMPLE);
        assert_eq!(db.names(Some(0x1234), Some(0x0002)), (None, None));
        assert_eq!(db.names(None, None), (None, None));
        assert_eq!(NoNames.names(Some(0x046d), Some(0xc52b)), (None, None));
    }

    #[test]
    fn test_load_first_skips_missing() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let db = UsbIdsDatabase::load_first(&[
            PathBuf::from("/nonexistent/usb.ids"),
            file.path().to_path_buf(),
        ]);
        assert_eq!(db.len(), 2);

        let empty = UsbIdsDatabase::load_first(&[PathBuf::from("/nonexistent/usb.ids")]);
        assert!(empty.is_empty());
    }
}
