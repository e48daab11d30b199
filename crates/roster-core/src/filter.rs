//! Attribute filters for discovery queries

use std::fmt;

use crate::device::{Device, UniqueIdentifier};
use crate::error::{Error, Result};
use crate::mac::MacAddress;

/// One exact-match condition on a named device attribute
///
/// `Address` matches any current address. The optional criteria compare
/// absence as a value: `Serial(None)` only matches devices without serial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
    Address(String),
    VendorId(Option<u16>),
    ProductId(Option<u16>),
    RevisionId(Option<u16>),
    Serial(Option<String>),
    MacAddress(Option<MacAddress>),
}

impl Criterion {
    /// Build a criterion from an attribute name and its textual value
    ///
    /// Ids are hexadecimal (with or without `0x`), hardware addresses are
    /// canonicalized before comparing.
    pub fn parse(attribute: &str, value: &str) -> Result<Self> {
        let criterion = match attribute {
            "address" => Self::Address(value.to_string()),
            "vendor_id" => Self::VendorId(Some(parse_hex_id(attribute, value)?)),
            "product_id" => Self::ProductId(Some(parse_hex_id(attribute, value)?)),
            "revision_id" => Self::RevisionId(Some(parse_hex_id(attribute, value)?)),
            "serial" => Self::Serial(Some(value.to_string())),
            "mac_address" => Self::MacAddress(Some(value.parse()?)),
            other => return Err(Error::InvalidFilter(format!("unknown attribute \"{other}\""))),
        };
        Ok(criterion)
    }

    /// Devices lacking the attribute altogether never match
    pub fn matches(&self, device: &Device) -> bool {
        match (self, device) {
            (Self::Address(address), _) => device.addresses().contains(address),
            (Self::VendorId(id), Device::Usb(d)) => d.vendor_id == *id,
            (Self::ProductId(id), Device::Usb(d)) => d.product_id == *id,
            (Self::RevisionId(id), Device::Usb(d)) => d.revision_id == *id,
            (Self::Serial(serial), Device::Usb(d)) => d.serial == *serial,
            (Self::MacAddress(mac), Device::Lan(d)) => d.mac_address == *mac,
            _ => false,
        }
    }
}

fn parse_hex_id(attribute: &str, value: &str) -> Result<u16> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u16::from_str_radix(digits, 16)
        .map_err(|_| Error::InvalidFilter(format!("{attribute} must be a 16-bit hex id, got \"{value}\"")))
}

/// Conjunction of criteria; an empty filter matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    criteria: Vec<Criterion>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, criterion: Criterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    pub fn address(address: impl Into<String>) -> Self {
        Self::new().with(Criterion::Address(address.into()))
    }

    /// Exact match on every component of a unique identifier
    pub fn identity(identifier: &UniqueIdentifier) -> Self {
        match identifier {
            UniqueIdentifier::Usb {
                vendor_id,
                product_id,
                serial,
            } => Self::new()
                .with(Criterion::VendorId(*vendor_id))
                .with(Criterion::ProductId(*product_id))
                .with(Criterion::Serial(serial.clone())),
            UniqueIdentifier::Lan { mac_address } => {
                Self::new().with(Criterion::MacAddress(*mac_address))
            }
        }
    }

    /// Parse `attribute=value` pairs
    pub fn parse_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<Self> {
        pairs.iter().try_fold(Self::new(), |filter, pair| {
            let pair = pair.as_ref();
            let (attribute, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::InvalidFilter(format!("expected attribute=value, got \"{pair}\"")))?;
            Ok(filter.with(Criterion::parse(attribute.trim(), value.trim())?))
        })
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn matches(&self, device: &Device) -> bool {
        self.criteria.iter().all(|c| c.matches(device))
    }

    pub fn apply<'a>(&self, devices: impl IntoIterator<Item = &'a Device>) -> Vec<Device> {
        devices
            .into_iter()
            .filter(|d| self.matches(d))
            .cloned()
            .collect()
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt<T: fmt::Display>(value: &Option<T>) -> String {
            value.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "<none>".to_string())
        }
        match self {
            Self::Address(a) => write!(f, "address={a}"),
            Self::VendorId(id) => write!(f, "vendor_id={}", opt(&id.map(|v| format!("{v:04x}")))),
            Self::ProductId(id) => write!(f, "product_id={}", opt(&id.map(|v| format!("{v:04x}")))),
            Self::RevisionId(id) => write!(f, "revision_id={}", opt(&id.map(|v| format!("{v:04x}")))),
            Self::Serial(s) => write!(f, "serial={}", opt(s)),
            Self::MacAddress(m) => write!(f, "mac_address={}", opt(m)),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.criteria.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(" "))
    }
}
