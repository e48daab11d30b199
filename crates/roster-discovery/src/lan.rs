//! LAN discovery: neighbor table plus optional active probing

use async_trait::async_trait;
use roster_core::{AddressBook, Device, DeviceKind, LanDevice, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::arp::{NeighborBackend, NeighborEntry};
use crate::probe::{NetworkProbe, ProbeListener};
use crate::source::DiscoverySource;

/// Add `device` to `devices`, merging into an entry with the same hardware address
///
/// Addresses the entry does not hold yet are appended as aliases.
pub(crate) fn fold_by_mac(devices: &mut Vec<LanDevice>, device: LanDevice) {
    let existing = devices
        .iter_mut()
        .find(|d| d.mac_address.is_some() && d.mac_address == device.mac_address);
    match existing {
        Some(existing) => {
            for address in device.addresses.all() {
                existing.addresses.push_alias(address.to_string());
            }
        }
        None => devices.push(device),
    }
}

fn device_from_entry(entry: &NeighborEntry) -> LanDevice {
    LanDevice {
        addresses: AddressBook::new(Some(entry.ip.to_string()), Vec::new()),
        mac_address: Some(entry.mac),
    }
}

pub struct LanSource {
    backend: Box<dyn NeighborBackend>,
    probe: Option<Arc<NetworkProbe>>,
    /// Last neighbor table, one device per hardware address
    neighbors: Vec<LanDevice>,
    devices: Vec<Device>,
    probe_updated: Arc<AtomicBool>,
    /// Registered on `probe`; dropping it unregisters
    probe_listener: Option<ProbeListener>,
}

impl LanSource {
    pub fn new(backend: Box<dyn NeighborBackend>) -> Self {
        Self {
            backend,
            probe: None,
            neighbors: Vec::new(),
            devices: Vec::new(),
            probe_updated: Arc::new(AtomicBool::new(false)),
            probe_listener: None,
        }
    }

    /// Enrich listings with the results of `probe`
    ///
    /// Every finished probe scan, including background ones, marks the
    /// cached batch for refolding on the next listing.
    pub fn with_probe(mut self, probe: Arc<NetworkProbe>) -> Self {
        let updated = Arc::clone(&self.probe_updated);
        let listener: ProbeListener = Arc::new(move |_| updated.store(true, Ordering::SeqCst));
        probe.register_listener(&listener);
        self.probe_listener = Some(listener);
        self.probe = Some(probe);
        self
    }

    pub fn network_probe(&self) -> Option<&Arc<NetworkProbe>> {
        self.probe.as_ref()
    }

    async fn scan(&mut self) -> Result<()> {
        let entries = self.backend.read().await?;
        let mut neighbors = Vec::with_capacity(entries.len());
        for entry in &entries {
            fold_by_mac(&mut neighbors, device_from_entry(entry));
        }
        debug!(
            backend = self.backend.name(),
            entries = entries.len(),
            devices = neighbors.len(),
            "Read neighbor table"
        );
        self.neighbors = neighbors;
        self.refold().await;
        Ok(())
    }

    /// Rebuild the batch from the last neighbor table and all probe results
    async fn refold(&mut self) {
        self.probe_updated.store(false, Ordering::SeqCst);
        let mut merged = self.neighbors.clone();
        if let Some(probe) = &self.probe {
            for device in probe.devices().await {
                fold_by_mac(&mut merged, device);
            }
        }
        self.devices = merged.into_iter().map(Device::from).collect();
    }
}

#[async_trait]
impl DiscoverySource for LanSource {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Lan
    }

    async fn list(&mut self, rescan: bool) -> Result<Vec<Device>> {
        if rescan || self.devices.is_empty() {
            self.scan().await?;
        } else if self.probe_updated.load(Ordering::SeqCst) {
            self.refold().await;
        }
        Ok(self.devices.clone())
    }

    fn can_probe(&self) -> bool {
        self.probe.is_some()
    }

    async fn probe(&mut self, hosts: &[String]) -> bool {
        let Some(probe) = &self.probe else {
            debug!("No network probe configured");
            return false;
        };
        info!(hosts = %hosts.join(" "), "Probing network");
        probe.scan(hosts).await
    }
}
