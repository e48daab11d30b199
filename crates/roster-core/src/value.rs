//! Values accepted when assigning a registry name

use serde_json::Value;

use crate::codec::DeviceRecord;
use crate::device::{Device, DeviceKind, LanDevice, UsbDevice};
use crate::error::{Error, Result};

/// Either an address to resolve through discovery, or a device to reconcile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceValue {
    Address(String),
    Device(Device),
}

impl DeviceValue {
    /// Decode a value given as JSON
    ///
    /// A string is an address. An object is a device record whose kind comes
    /// from its `"type"` field or, failing that, from `kind`. Any other JSON
    /// type is rejected.
    pub fn from_json(value: &Value, kind: Option<DeviceKind>) -> Result<Self> {
        match value {
            Value::String(address) => Ok(Self::Address(address.clone())),
            Value::Object(fields) => {
                let tagged = match fields.get("type") {
                    Some(Value::String(tag)) => Some(tag.parse::<DeviceKind>()?),
                    Some(other) => {
                        return Err(Error::InvalidValue(format!(
                            "device type must be a string, got {other}"
                        )))
                    }
                    None => None,
                };
                let record_kind = match (tagged, kind) {
                    (Some(tagged), Some(key)) if tagged != key => {
                        return Err(Error::KindMismatch {
                            expected: key,
                            actual: tagged,
                        })
                    }
                    (Some(k), _) | (None, Some(k)) => k,
                    (None, None) => {
                        return Err(Error::InvalidValue(
                            "device record needs a \"type\" field or an explicit kind".to_string(),
                        ))
                    }
                };
                let device = DeviceRecord::from_value(record_kind, value.clone())?.into_device(false)?;
                Ok(Self::Device(device))
            }
            other => Err(Error::InvalidValue(format!(
                "expected an address string or a device record, got {other}"
            ))),
        }
    }

    /// Parse command-line input: JSON when it looks like JSON, an address otherwise
    pub fn parse(input: &str, kind: Option<DeviceKind>) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.starts_with(['{', '[', '"']) || matches!(trimmed, "null" | "true" | "false") {
            let value: Value = serde_json::from_str(trimmed)?;
            return Self::from_json(&value, kind);
        }
        if trimmed.parse::<f64>().is_ok() {
            return Err(Error::InvalidValue(format!(
                "expected an address string or a device record, got {trimmed}"
            )));
        }
        Ok(Self::Address(trimmed.to_string()))
    }
}

impl From<Device> for DeviceValue {
    fn from(device: Device) -> Self {
        Self::Device(device)
    }
}

impl From<UsbDevice> for DeviceValue {
    fn from(device: UsbDevice) -> Self {
        Self::Device(device.into())
    }
}

impl From<LanDevice> for DeviceValue {
    fn from(device: LanDevice) -> Self {
        Self::Device(device.into())
    }
}

impl From<String> for DeviceValue {
    fn from(address: String) -> Self {
        Self::Address(address)
    }
}

impl From<&str> for DeviceValue {
    fn from(address: &str) -> Self {
        Self::Address(address.to_string())
    }
}
