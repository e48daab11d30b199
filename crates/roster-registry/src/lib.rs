//! Roster Registry - named devices kept current across reconnects
//!
//! The [`Registry`] maps user-chosen names to one device per kind. Every
//! read and write reconciles the stored device against the discovery
//! sources, so addresses that went stale are rotated into history and
//! devices that moved are picked up at their new address.

pub mod reconcile;
pub mod registry;

pub use registry::{Registry, Resolved};

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use roster_core::{AddressBook, Device, DeviceKind, LanDevice, Result, UsbDevice};
    use roster_discovery::{DeviceSources, DiscoverySource};
    use std::sync::{Arc, Mutex};

    /// What a fake source sees, shared with the test body
    #[derive(Default)]
    pub struct World {
        /// Devices reported by a scan
        pub devices: Vec<Device>,
        /// Devices that only show up after an active probe
        pub probe_devices: Vec<Device>,
        pub scans: usize,
        pub probes: Vec<Vec<String>>,
    }

    impl World {
        pub fn shared() -> Arc<Mutex<World>> {
            Arc::new(Mutex::new(World::default()))
        }
    }

    struct FakeSource {
        kind: DeviceKind,
        world: Arc<Mutex<World>>,
        can_probe: bool,
        cache: Vec<Device>,
        probed: Vec<Device>,
    }

    #[async_trait]
    impl DiscoverySource for FakeSource {
        fn kind(&self) -> DeviceKind {
            self.kind
        }

        async fn list(&mut self, rescan: bool) -> Result<Vec<Device>> {
            let empty = self.cache.is_empty() && self.probed.is_empty();
            if rescan || empty {
                let mut world = self.world.lock().unwrap();
                world.scans += 1;
                self.cache = world.devices.clone();
            }
            let mut devices = self.cache.clone();
            devices.extend(self.probed.iter().cloned());
            Ok(devices)
        }

        fn can_probe(&self) -> bool {
            self.can_probe
        }

        async fn probe(&mut self, hosts: &[String]) -> bool {
            if !self.can_probe {
                return false;
            }
            let mut world = self.world.lock().unwrap();
            world.probes.push(hosts.to_vec());
            self.probed = world.probe_devices.clone();
            true
        }
    }

    /// Sources backed by the two worlds; only the LAN one may probe
    pub fn registry_sources(
        usb_world: &Arc<Mutex<World>>,
        lan_world: &Arc<Mutex<World>>,
        can_probe: bool,
    ) -> DeviceSources {
        DeviceSources::new()
            .with(Box::new(FakeSource {
                kind: DeviceKind::Usb,
                world: Arc::clone(usb_world),
                can_probe: false,
                cache: Vec::new(),
                probed: Vec::new(),
            }))
            .with(Box::new(FakeSource {
                kind: DeviceKind::Lan,
                world: Arc::clone(lan_world),
                can_probe,
                cache: Vec::new(),
                probed: Vec::new(),
            }))
    }

    pub fn usb(address: Option<&str>, vendor_id: u16, product_id: u16, serial: &str) -> Device {
        UsbDevice {
            addresses: AddressBook::new(address.map(String::from), Vec::new()),
            vendor_id: Some(vendor_id),
            product_id: Some(product_id),
            serial: Some(serial.to_string()),
            ..UsbDevice::default()
        }
        .into()
    }

    pub fn lan(address: &str, mac: &str) -> Device {
        LanDevice {
            addresses: AddressBook::new(Some(address.to_string()), Vec::new()),
            mac_address: Some(mac.parse().unwrap()),
        }
        .into()
    }
}
