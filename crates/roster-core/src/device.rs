//! Device types for tracking intermittently connected hardware
//!
//! Two kinds of devices are supported. USB devices are identified by their
//! vendor id, product id and serial number, LAN devices by their hardware
//! (MAC) address. Addresses are never part of the identity: a device keeps
//! its identity when it moves to another port or gets a new lease.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::mac::MacAddress;
use crate::usb_ids::UsbNameLookup;

/// Transport a device is reachable over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Usb,
    Lan,
}

impl DeviceKind {
    /// Declared kind order, used whenever results of several kinds are concatenated
    pub const ALL: [DeviceKind; 2] = [DeviceKind::Usb, DeviceKind::Lan];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usb => "usb",
            Self::Lan => "lan",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidKind(s.to_string()))
    }
}

/// Current and superseded transport addresses of one device
///
/// Historical addresses never overlap the current ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressBook {
    address: Option<String>,
    aliases: Vec<String>,
    historical: Vec<String>,
}

impl AddressBook {
    pub fn new(address: Option<String>, aliases: impl IntoIterator<Item = String>) -> Self {
        let mut book = Self::default();
        book.set_address(address);
        book.set_aliases(aliases);
        book
    }

    /// Main address of the device
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Additional current addresses of the same device
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn historical(&self) -> &[String] {
        &self.historical
    }

    /// Primary address followed by the aliases, without an empty leading slot
    pub fn all(&self) -> Vec<&str> {
        self.address
            .iter()
            .chain(self.aliases.iter())
            .map(String::as_str)
            .collect()
    }

    /// Current addresses followed by historical ones
    pub fn known(&self) -> Vec<&str> {
        let mut known = self.all();
        known.extend(self.historical.iter().map(String::as_str));
        known
    }

    pub fn has_current(&self) -> bool {
        self.address.is_some() || !self.aliases.is_empty()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.address.as_deref() == Some(address) || self.aliases.iter().any(|a| a == address)
    }

    pub fn set_address(&mut self, address: Option<String>) {
        if let Some(ref addr) = address {
            self.historical.retain(|h| h != addr);
        }
        self.address = address;
    }

    pub fn set_aliases(&mut self, aliases: impl IntoIterator<Item = String>) {
        self.aliases.clear();
        for alias in aliases {
            self.push_alias(alias);
        }
    }

    /// Add an alias unless the address is already current
    pub fn push_alias(&mut self, alias: String) -> bool {
        if self.contains(&alias) {
            return false;
        }
        self.historical.retain(|h| h != &alias);
        self.aliases.push(alias);
        true
    }

    /// Record addresses as previously held, skipping current and known ones
    pub fn extend_historical<'a>(&mut self, addresses: impl IntoIterator<Item = &'a str>) {
        for address in addresses {
            if !self.contains(address) && !self.historical.iter().any(|h| h == address) {
                self.historical.push(address.to_string());
            }
        }
    }

    /// Rotate every current address into history
    pub fn reset(&mut self) {
        let current: Vec<String> = self
            .address
            .take()
            .into_iter()
            .chain(self.aliases.drain(..))
            .collect();
        self.extend_historical(current.iter().map(String::as_str));
    }

    /// Take over the current addresses of `other`
    ///
    /// Everything this book knew before (current or historical) and the
    /// history of `other` end up in history unless it is current again.
    pub fn merge_from(&mut self, other: &AddressBook) {
        self.reset();
        let previous = std::mem::take(&mut self.historical);
        self.address = other.address.clone();
        self.aliases = other.aliases.clone();
        self.extend_historical(previous.iter().map(String::as_str));
        self.extend_historical(other.historical.iter().map(String::as_str));
    }
}

/// Address-independent key of a physical device
///
/// Absent components are part of the key and only match other absences.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UniqueIdentifier {
    Usb {
        vendor_id: Option<u16>,
        product_id: Option<u16>,
        serial: Option<String>,
    },
    Lan {
        mac_address: Option<MacAddress>,
    },
}

impl UniqueIdentifier {
    pub fn kind(&self) -> DeviceKind {
        match self {
            Self::Usb { .. } => DeviceKind::Usb,
            Self::Lan { .. } => DeviceKind::Lan,
        }
    }
}

/// A device attached over USB
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsbDevice {
    pub addresses: AddressBook,
    /// Manufacturer id assigned by the USB committee
    pub vendor_id: Option<u16>,
    /// Product id assigned by the manufacturer
    pub product_id: Option<u16>,
    pub revision_id: Option<u16>,
    pub serial: Option<String>,
    pub vendor_name: Option<String>,
    pub product_name: Option<String>,
}

impl UsbDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up display names for the current vendor/product ids
    pub fn resolve_names(&mut self, lookup: &dyn UsbNameLookup) {
        let (vendor, product) = lookup.names(self.vendor_id, self.product_id);
        self.vendor_name = vendor;
        self.product_name = product;
    }

    pub fn identifier(&self) -> UniqueIdentifier {
        UniqueIdentifier::Usb {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            serial: self.serial.clone(),
        }
    }

    fn backfill(&mut self, other: &UsbDevice) {
        if other.vendor_id.is_some() {
            self.vendor_id = other.vendor_id;
        }
        if other.product_id.is_some() {
            self.product_id = other.product_id;
        }
        if other.revision_id.is_some() {
            self.revision_id = other.revision_id;
        }
        if other.serial.is_some() {
            self.serial = other.serial.clone();
        }
        if other.vendor_name.is_some() {
            self.vendor_name = other.vendor_name.clone();
        }
        if other.product_name.is_some() {
            self.product_name = other.product_name.clone();
        }
    }
}

/// A device on the local network
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanDevice {
    pub addresses: AddressBook,
    pub mac_address: Option<MacAddress>,
}

impl LanDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hardware address from any accepted spelling
    pub fn set_mac_address(&mut self, mac: Option<&str>) -> Result<()> {
        self.mac_address = mac.map(str::parse).transpose()?;
        Ok(())
    }

    pub fn identifier(&self) -> UniqueIdentifier {
        UniqueIdentifier::Lan {
            mac_address: self.mac_address,
        }
    }
}

/// A device of any supported kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Device {
    Usb(UsbDevice),
    Lan(LanDevice),
}

impl Device {
    /// An empty device of the given kind, identifier to be filled in by the caller
    pub fn empty(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::Usb => Self::Usb(UsbDevice::new()),
            DeviceKind::Lan => Self::Lan(LanDevice::new()),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        match self {
            Self::Usb(_) => DeviceKind::Usb,
            Self::Lan(_) => DeviceKind::Lan,
        }
    }

    pub fn addresses(&self) -> &AddressBook {
        match self {
            Self::Usb(d) => &d.addresses,
            Self::Lan(d) => &d.addresses,
        }
    }

    pub fn addresses_mut(&mut self) -> &mut AddressBook {
        match self {
            Self::Usb(d) => &mut d.addresses,
            Self::Lan(d) => &mut d.addresses,
        }
    }

    pub fn address(&self) -> Option<&str> {
        self.addresses().address()
    }

    pub fn all_addresses(&self) -> Vec<&str> {
        self.addresses().all()
    }

    pub fn historical_addresses(&self) -> &[String] {
        self.addresses().historical()
    }

    pub fn has_current_address(&self) -> bool {
        self.addresses().has_current()
    }

    pub fn identifier(&self) -> UniqueIdentifier {
        match self {
            Self::Usb(d) => d.identifier(),
            Self::Lan(d) => d.identifier(),
        }
    }

    /// Same kind and same unique identifier; addresses are ignored
    pub fn same_identity(&self, other: &Device) -> bool {
        self.identifier() == other.identifier()
    }

    /// Same kind and at least one shared current address
    pub fn same_address(&self, other: &Device) -> bool {
        self.kind() == other.kind()
            && self
                .all_addresses()
                .iter()
                .any(|a| other.addresses().contains(a))
    }

    /// Update this device from a fresher observation of the same kind
    ///
    /// Current addresses are replaced by the other's, superseded ones move
    /// into history, and fields present on `other` overwrite ours.
    pub fn merge_from(&mut self, other: &Device) -> Result<()> {
        match (self, other) {
            (Self::Usb(this), Self::Usb(that)) => {
                this.addresses.merge_from(&that.addresses);
                this.backfill(that);
            }
            (Self::Lan(this), Self::Lan(that)) => {
                this.addresses.merge_from(&that.addresses);
                if that.mac_address.is_some() {
                    this.mac_address = that.mac_address;
                }
            }
            (this, that) => {
                return Err(Error::KindMismatch {
                    expected: this.kind(),
                    actual: that.kind(),
                })
            }
        }
        Ok(())
    }

    /// Presume the device disconnected: all current addresses become historical
    pub fn reset_addresses(&mut self) {
        self.addresses_mut().reset();
    }

    pub fn as_usb(&self) -> Option<&UsbDevice> {
        match self {
            Self::Usb(d) => Some(d),
            Self::Lan(_) => None,
        }
    }

    pub fn as_lan(&self) -> Option<&LanDevice> {
        match self {
            Self::Lan(d) => Some(d),
            Self::Usb(_) => None,
        }
    }
}

impl From<UsbDevice> for Device {
    fn from(device: UsbDevice) -> Self {
        Self::Usb(device)
    }
}

impl From<LanDevice> for Device {
    fn from(device: LanDevice) -> Self {
        Self::Lan(device)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address() {
            Some(address) => write!(f, "{} device at {}", self.kind(), address),
            None => write!(f, "{} device (disconnected)", self.kind()),
        }
    }
}
