//! One source per device kind, queried together or one at a time

use roster_core::{Device, DeviceKind, Error, Filter, Result};
use std::collections::BTreeMap;
use tracing::debug;

use crate::source::DiscoverySource;

/// Every registered discovery source, keyed by kind
///
/// Queries without a kind visit the sources in [`DeviceKind`] order and
/// concatenate their results.
#[derive(Default)]
pub struct DeviceSources {
    sources: BTreeMap<DeviceKind, Box<dyn DiscoverySource>>,
}

impl DeviceSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under its own kind, returning the one it replaced
    pub fn register(&mut self, source: Box<dyn DiscoverySource>) -> Option<Box<dyn DiscoverySource>> {
        debug!(kind = %source.kind(), "Registered discovery source");
        self.sources.insert(source.kind(), source)
    }

    pub fn with(mut self, source: Box<dyn DiscoverySource>) -> Self {
        self.register(source);
        self
    }

    pub fn kinds(&self) -> impl Iterator<Item = DeviceKind> + '_ {
        self.sources.keys().copied()
    }

    pub fn contains(&self, kind: DeviceKind) -> bool {
        self.sources.contains_key(&kind)
    }

    pub fn source(&self, kind: DeviceKind) -> Result<&dyn DiscoverySource> {
        self.sources
            .get(&kind)
            .map(|s| s.as_ref())
            .ok_or(Error::SourceNotRegistered(kind))
    }

    pub fn source_mut(&mut self, kind: DeviceKind) -> Result<&mut Box<dyn DiscoverySource>> {
        self.sources
            .get_mut(&kind)
            .ok_or(Error::SourceNotRegistered(kind))
    }

    /// List one kind, or every kind when `kind` is `None`
    pub async fn list(&mut self, kind: Option<DeviceKind>, rescan: bool) -> Result<Vec<Device>> {
        match kind {
            Some(kind) => self.source_mut(kind)?.list(rescan).await,
            None => {
                let mut devices = Vec::new();
                for source in self.sources.values_mut() {
                    devices.extend(source.list(rescan).await?);
                }
                Ok(devices)
            }
        }
    }

    pub async fn find(
        &mut self,
        kind: Option<DeviceKind>,
        rescan: bool,
        filter: &Filter,
    ) -> Result<Vec<Device>> {
        match kind {
            Some(kind) => self.source_mut(kind)?.find(rescan, filter).await,
            None => {
                let mut devices = Vec::new();
                for source in self.sources.values_mut() {
                    devices.extend(source.find(rescan, filter).await?);
                }
                Ok(devices)
            }
        }
    }

    /// Whether the source of `kind` is registered and has an active probe
    pub fn can_probe(&self, kind: DeviceKind) -> bool {
        self.sources.get(&kind).is_some_and(|s| s.can_probe())
    }

    /// Actively probe `hosts` through the source of `kind`
    pub async fn probe(&mut self, kind: DeviceKind, hosts: &[String]) -> bool {
        match self.sources.get_mut(&kind) {
            Some(source) => source.probe(hosts).await,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use roster_core::{AddressBook, LanDevice, UsbDevice};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        kind: DeviceKind,
        devices: Vec<Device>,
        cache: Vec<Device>,
        scans: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DiscoverySource for Counting {
        fn kind(&self) -> DeviceKind {
            self.kind
        }

        async fn list(&mut self, rescan: bool) -> Result<Vec<Device>> {
            if rescan || self.cache.is_empty() {
                self.scans.fetch_add(1, Ordering::SeqCst);
                self.cache = self.devices.clone();
            }
            Ok(self.cache.clone())
        }
    }

    fn with_address(mut device: Device, address: &str) -> Device {
        *device.addresses_mut() = AddressBook::new(Some(address.to_string()), Vec::new());
        device
    }

    fn sources() -> (DeviceSources, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let usb_scans = Arc::new(AtomicUsize::new(0));
        let lan_scans = Arc::new(AtomicUsize::new(0));
        let sources = DeviceSources::new()
            .with(Box::new(Counting {
                kind: DeviceKind::Lan,
                devices: vec![with_address(LanDevice::new().into(), "10.0.0.1")],
                cache: Vec::new(),
                scans: Arc::clone(&lan_scans),
            }))
            .with(Box::new(Counting {
                kind: DeviceKind::Usb,
                devices: vec![with_address(UsbDevice::new().into(), "/devices/usb1/1-1")],
                cache: Vec::new(),
                scans: Arc::clone(&usb_scans),
            }));
        (sources, usb_scans, lan_scans)
    }

    #[tokio::test]
    async fn test_fan_out_in_kind_order() {
        let (mut sources, usb_scans, lan_scans) = sources();
        let devices = sources.list(None, false).await.unwrap();
        let kinds: Vec<DeviceKind> = devices.iter().map(Device::kind).collect();
        assert_eq!(kinds, vec![DeviceKind::Usb, DeviceKind::Lan]);

        sources.list(None, true).await.unwrap();
        assert_eq!(usb_scans.load(Ordering::SeqCst), 2);
        assert_eq!(lan_scans.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_kind_query() {
        let (mut sources, usb_scans, _) = sources();
        let found = sources
            .find(Some(DeviceKind::Lan), true, &Filter::address("10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(usb_scans.load(Ordering::SeqCst), 0);

        let any = sources.find(None, false, &Filter::address("/devices/usb1/1-1")).await.unwrap();
        assert_eq!(any[0].kind(), DeviceKind::Usb);
    }

    #[tokio::test]
    async fn test_unregistered_kind() {
        let mut sources = DeviceSources::new();
        let err = sources.list(Some(DeviceKind::Usb), false).await.unwrap_err();
        assert!(matches!(err, Error::SourceNotRegistered(DeviceKind::Usb)));
        assert!(err.is_not_found());
        assert!(!sources.can_probe(DeviceKind::Lan));
        assert!(!sources.probe(DeviceKind::Lan, &["10.0.0.1".to_string()]).await);
    }
}
