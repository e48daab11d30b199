//! Roster Core - Device identity, registry data shapes and persistence
//!
//! This crate provides the foundational types for Roster:
//! - USB and LAN device identities with address history
//! - Attribute filters used by discovery queries
//! - The name -> kind -> device table and its JSON file format
//! - The contract implemented by active network probe backends

pub mod codec;
pub mod device;
pub mod error;
pub mod filter;
pub mod mac;
pub mod probe;
pub mod table;
pub mod usb_ids;
pub mod value;

pub use device::{AddressBook, Device, DeviceKind, LanDevice, UniqueIdentifier, UsbDevice};
pub use error::{Error, Result};
pub use filter::{Criterion, Filter};
pub use mac::MacAddress;
pub use probe::{ProbeBackend, ProbeError, ProbeHost};
pub use table::{DeviceTable, KindMap};
pub use usb_ids::{NoNames, UsbIdsDatabase, UsbNameLookup};
pub use value::DeviceValue;
