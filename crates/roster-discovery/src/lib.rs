//! Roster Discovery - per-transport device discovery
//!
//! This crate provides the discovery sources the registry reconciles against:
//! - USB enumeration from raw udev-style observations (sysfs backend on Linux)
//! - LAN discovery from the system neighbor (ARP) table
//! - Background network probing through a pluggable active probe backend
//! - An aggregate that fans queries out over every registered source

pub mod aggregate;
pub mod arp;
pub mod lan;
pub mod probe;
pub mod source;
pub mod sysfs;
pub mod usb;

pub use aggregate::DeviceSources;
pub use arp::{CommandNeighborTable, NeighborBackend, NeighborEntry};
pub use lan::LanSource;
pub use probe::{NetworkProbe, ProbeEvent};
pub use source::DiscoverySource;
pub use sysfs::SysfsUsbBackend;
pub use usb::{RawUsbDevice, UsbBackend, UsbSource};
