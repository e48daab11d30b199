//! Named device registry

use roster_core::{
    codec, Device, DeviceKind, DeviceTable, DeviceValue, Error, Filter, KindMap, Result,
};
use roster_discovery::DeviceSources;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::reconcile;

/// Result of reading a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// The name holds a single kind
    Device(Device),
    /// The name holds several kinds
    Kinds(KindMap),
}

impl Resolved {
    pub fn get(&self, kind: DeviceKind) -> Option<&Device> {
        match self {
            Self::Device(device) => (device.kind() == kind).then_some(device),
            Self::Kinds(devices) => devices.get(kind),
        }
    }

    pub fn devices(&self) -> Vec<&Device> {
        match self {
            Self::Device(device) => vec![device],
            Self::Kinds(devices) => devices.values().collect(),
        }
    }
}

/// User-chosen names mapped to devices kept current through discovery
///
/// Reads and writes run identity reconciliation before they return. With
/// `scan == false` a device that still holds a current address is trusted
/// as is; `scan == true` always asks the discovery sources.
pub struct Registry {
    table: DeviceTable,
    sources: DeviceSources,
}

impl Registry {
    pub fn new(sources: DeviceSources) -> Self {
        Self::with_table(DeviceTable::new(), sources)
    }

    pub fn with_table(table: DeviceTable, sources: DeviceSources) -> Self {
        Self { table, sources }
    }

    /// Open the registry stored at `path`, or an empty one if there is no file yet
    pub fn open(path: &Path, sources: DeviceSources) -> Result<Self> {
        let table = codec::load_or_default(path)?;
        info!(path = %path.display(), entries = table.len(), "Opened device registry");
        Ok(Self::with_table(table, sources))
    }

    pub fn table(&self) -> &DeviceTable {
        &self.table
    }

    pub fn sources(&self) -> &DeviceSources {
        &self.sources
    }

    pub fn sources_mut(&mut self) -> &mut DeviceSources {
        &mut self.sources
    }

    /// Resolve a bare address to the device currently holding it
    ///
    /// Tries the cached batches first, then a rescan, then (for LAN or
    /// unspecified kinds) an active probe of the address itself.
    pub async fn find_by_address(
        &mut self,
        address: &str,
        kind: Option<DeviceKind>,
    ) -> Result<Device> {
        let filter = Filter::address(address);
        let mut devices = self.sources.find(kind, false, &filter).await?;
        if devices.is_empty() {
            devices = self.sources.find(kind, true, &filter).await?;
        }

        let lan_wanted = kind.map_or(true, |k| k == DeviceKind::Lan);
        if devices.is_empty() && lan_wanted && self.sources.can_probe(DeviceKind::Lan) {
            self.sources
                .probe(DeviceKind::Lan, &[address.to_string()])
                .await;
            devices = self.sources.find(Some(DeviceKind::Lan), false, &filter).await?;
        }

        if devices.len() > 1 {
            warn!(
                address = %address,
                candidates = devices.len(),
                "Expected only one device as search result"
            );
        }
        devices.into_iter().next().ok_or_else(|| Error::DeviceNotFound {
            address: address.to_string(),
            kind,
        })
    }

    /// Assign `value` to `name`
    ///
    /// An address is resolved through discovery and the device found there
    /// replaces whatever was stored. A device is checked against `kind`,
    /// reconciled, then stored under its own kind. Nothing is written on
    /// error.
    pub async fn set(
        &mut self,
        name: &str,
        kind: Option<DeviceKind>,
        value: impl Into<DeviceValue>,
        scan: bool,
    ) -> Result<Device> {
        let device = match value.into() {
            DeviceValue::Address(address) => self.find_by_address(&address, kind).await?,
            DeviceValue::Device(mut device) => {
                if let Some(expected) = kind {
                    if expected != device.kind() {
                        return Err(Error::KindMismatch {
                            expected,
                            actual: device.kind(),
                        });
                    }
                }
                let connected = reconcile::refresh(&mut self.sources, &mut device, scan).await?;
                if !connected {
                    debug!(name = %name, kind = %device.kind(), "Storing disconnected device");
                }
                device
            }
        };

        info!(name = %name, kind = %device.kind(), address = ?device.address(), "Stored device");
        self.table.insert(name, device.clone());
        Ok(device)
    }

    /// Assign a JSON value: an address string or a device record
    pub async fn set_json(
        &mut self,
        name: &str,
        kind: Option<DeviceKind>,
        value: &Value,
        scan: bool,
    ) -> Result<Device> {
        let value = DeviceValue::from_json(value, kind)?;
        self.set(name, kind, value, scan).await
    }

    /// Read `name`, reconciling every stored kind first
    pub async fn get(&mut self, name: &str, kind: Option<DeviceKind>, scan: bool) -> Result<Resolved> {
        if let Some(kind) = kind {
            let device = self.table.get_kind_mut(name, kind)?;
            reconcile::refresh(&mut self.sources, device, scan).await?;
            return Ok(Resolved::Device(device.clone()));
        }

        let kinds: Vec<DeviceKind> = self.table.get(name)?.kinds().collect();
        for kind in kinds {
            let device = self.table.get_kind_mut(name, kind)?;
            reconcile::refresh(&mut self.sources, device, scan).await?;
        }

        let devices = self.table.get(name)?;
        Ok(match devices.single() {
            Some(device) => Resolved::Device(device.clone()),
            None => Resolved::Kinds(devices.clone()),
        })
    }

    /// Remove a name, or one kind of it
    pub fn remove(&mut self, name: &str, kind: Option<DeviceKind>) -> Result<KindMap> {
        let removed = self.table.remove(name, kind)?;
        info!(name = %name, kinds = removed.len(), "Removed device");
        Ok(removed)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.table.names()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &KindMap)> {
        self.table.iter()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Presume every stored device disconnected so the next read rescans
    pub fn reset_addresses(&mut self) {
        for device in self.table.devices_mut() {
            device.reset_addresses();
        }
    }

    /// Load a serialized table, replacing or merging into the current one
    ///
    /// Loaded addresses are historical until a read finds the device again.
    /// Malformed content leaves the registry untouched.
    pub fn load(&mut self, content: &str, clear: bool) -> Result<()> {
        let table = codec::decode(content)?;
        self.apply_loaded(table, clear);
        Ok(())
    }

    pub fn load_file(&mut self, path: &Path, clear: bool) -> Result<()> {
        let table = codec::load(path)?;
        self.apply_loaded(table, clear);
        Ok(())
    }

    fn apply_loaded(&mut self, table: DeviceTable, clear: bool) {
        debug!(entries = table.len(), clear, "Loaded device table");
        if clear {
            self.table = table;
        } else {
            self.table.merge(table);
        }
    }

    pub fn dump(&self, pretty: bool) -> Result<String> {
        codec::encode(&self.table, pretty)
    }

    pub fn save_to(&self, path: &Path, pretty: bool) -> Result<()> {
        codec::save(&self.table, path, pretty)?;
        debug!(path = %path.display(), entries = self.table.len(), "Saved device registry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{lan, registry_sources, usb, World};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn registry(usb_world: &Arc<Mutex<World>>, lan_world: &Arc<Mutex<World>>, probe: bool) -> Registry {
        Registry::new(registry_sources(usb_world, lan_world, probe))
    }

    #[tokio::test]
    async fn test_set_by_address() {
        let (usb_world, lan_world) = (World::shared(), World::shared());
        usb_world.lock().unwrap().devices = vec![usb(Some("/devices/usb1/1-1"), 0x1122, 0xABAB, "A")];
        let mut reg = registry(&usb_world, &lan_world, false);

        let stored = reg.set("cam", None, "/devices/usb1/1-1", false).await.unwrap();
        assert_eq!(stored.kind(), DeviceKind::Usb);

        let Resolved::Device(device) = reg.get("cam", None, false).await.unwrap() else {
            panic!("expected a single device");
        };
        assert_eq!(device, stored);
        assert_eq!(usb_world.lock().unwrap().scans, 1);
    }

    #[tokio::test]
    async fn test_set_unknown_address_writes_nothing() {
        let (usb_world, lan_world) = (World::shared(), World::shared());
        let mut reg = registry(&usb_world, &lan_world, true);

        let err = reg.set("ghost", None, "10.0.0.50", false).await.unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound { kind: None, .. }));
        assert!(err.is_not_found());
        assert!(!reg.contains("ghost"));
        assert_eq!(lan_world.lock().unwrap().probes, vec![vec!["10.0.0.50".to_string()]]);

        // USB-only lookups never probe
        let err = reg
            .set("ghost", Some(DeviceKind::Usb), "/devices/usb1/1-9", false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound { kind: Some(DeviceKind::Usb), .. }));
        assert_eq!(lan_world.lock().unwrap().probes.len(), 1);
    }

    #[tokio::test]
    async fn test_set_lan_address_found_by_probe() {
        let (usb_world, lan_world) = (World::shared(), World::shared());
        lan_world.lock().unwrap().probe_devices = vec![lan("10.0.0.9", "00:11:22:33:44:55")];
        let mut reg = registry(&usb_world, &lan_world, true);

        let device = reg.set("pi", Some(DeviceKind::Lan), "10.0.0.9", false).await.unwrap();
        assert_eq!(device.address(), Some("10.0.0.9"));
        assert_eq!(lan_world.lock().unwrap().scans, 2);
        assert_eq!(usb_world.lock().unwrap().scans, 0);
    }

    #[tokio::test]
    async fn test_kind_mismatch_leaves_name_absent() {
        let (usb_world, lan_world) = (World::shared(), World::shared());
        let mut reg = registry(&usb_world, &lan_world, false);

        let device = usb(Some("/devices/usb1/1-1"), 1, 2, "A");
        let err = reg.set("k", Some(DeviceKind::Lan), device, false).await.unwrap_err();
        assert!(matches!(
            err,
            Error::KindMismatch {
                expected: DeviceKind::Lan,
                actual: DeviceKind::Usb
            }
        ));
        assert!(err.is_validation());
        assert!(!reg.contains("k"));
    }

    #[tokio::test]
    async fn test_get_cheap_path_then_rescan() {
        let (usb_world, lan_world) = (World::shared(), World::shared());
        usb_world.lock().unwrap().devices = vec![usb(Some("/devices/usb1/1-4"), 0x1122, 0xABAB, "A")];
        let mut reg = registry(&usb_world, &lan_world, false);

        reg.set("cam", None, usb(Some("/devices/usb1/1-1"), 0x1122, 0xABAB, "A"), false)
            .await
            .unwrap();
        let cheap = reg.get("cam", Some(DeviceKind::Usb), false).await.unwrap();
        assert_eq!(cheap.get(DeviceKind::Usb).unwrap().address(), Some("/devices/usb1/1-1"));
        assert_eq!(usb_world.lock().unwrap().scans, 0);

        let fresh = reg.get("cam", Some(DeviceKind::Usb), true).await.unwrap();
        let device = fresh.get(DeviceKind::Usb).unwrap();
        assert_eq!(device.address(), Some("/devices/usb1/1-4"));
        assert_eq!(device.historical_addresses(), ["/devices/usb1/1-1"]);
        assert_eq!(usb_world.lock().unwrap().scans, 1);
    }

    #[tokio::test]
    async fn test_get_disconnected_moves_to_history() {
        let (usb_world, lan_world) = (World::shared(), World::shared());
        let mut reg = registry(&usb_world, &lan_world, false);

        reg.set("pi", None, lan("10.0.0.7", "00:11:22:33:44:55"), false)
            .await
            .unwrap();
        let resolved = reg.get("pi", None, true).await.unwrap();
        let device = resolved.get(DeviceKind::Lan).unwrap();
        assert!(!device.has_current_address());
        assert_eq!(device.historical_addresses(), ["10.0.0.7"]);

        // The stored device is updated too
        let stored = reg.table().get_kind("pi", DeviceKind::Lan).unwrap();
        assert_eq!(stored.historical_addresses(), ["10.0.0.7"]);
    }

    #[tokio::test]
    async fn test_set_disconnected_device_rotates_addresses() {
        let (usb_world, lan_world) = (World::shared(), World::shared());
        let mut reg = registry(&usb_world, &lan_world, false);

        let device = reg
            .set("cam", None, usb(Some("/devices/usb1/1-1"), 1, 2, "A"), true)
            .await
            .unwrap();
        assert!(!device.has_current_address());
        assert_eq!(device.historical_addresses(), ["/devices/usb1/1-1"]);
        assert!(reg.contains("cam"));
    }

    #[tokio::test]
    async fn test_multiple_kinds_under_one_name() {
        let (usb_world, lan_world) = (World::shared(), World::shared());
        let mut reg = registry(&usb_world, &lan_world, false);

        reg.set("board", None, usb(Some("/devices/usb1/1-1"), 1, 2, "A"), false)
            .await
            .unwrap();
        reg.set("board", None, lan("10.0.0.7", "00:11:22:33:44:55"), false)
            .await
            .unwrap();
        assert_eq!(reg.len(), 1);

        let Resolved::Kinds(kinds) = reg.get("board", None, false).await.unwrap() else {
            panic!("expected a kind map");
        };
        assert_eq!(kinds.len(), 2);

        let only_lan = reg.get("board", Some(DeviceKind::Lan), false).await.unwrap();
        assert!(matches!(only_lan, Resolved::Device(ref d) if d.kind() == DeviceKind::Lan));
        assert_eq!(only_lan.devices().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_name_and_kind() {
        let (usb_world, lan_world) = (World::shared(), World::shared());
        let mut reg = registry(&usb_world, &lan_world, false);
        assert!(matches!(
            reg.get("nope", None, false).await,
            Err(Error::UnknownName(_))
        ));

        reg.set("cam", None, usb(Some("/devices/usb1/1-1"), 1, 2, "A"), false)
            .await
            .unwrap();
        let err = reg.get("cam", Some(DeviceKind::Lan), false).await.unwrap_err();
        assert!(matches!(err, Error::UnknownKind { .. }));
        assert!(reg.remove("cam", Some(DeviceKind::Lan)).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_remove() {
        let (usb_world, lan_world) = (World::shared(), World::shared());
        let mut reg = registry(&usb_world, &lan_world, false);
        reg.set("board", None, usb(Some("/devices/usb1/1-1"), 1, 2, "A"), false)
            .await
            .unwrap();
        reg.set("board", None, lan("10.0.0.7", "00:11:22:33:44:55"), false)
            .await
            .unwrap();

        let removed = reg.remove("board", Some(DeviceKind::Usb)).unwrap();
        assert!(removed.contains(DeviceKind::Usb));
        assert!(reg.contains("board"));

        reg.remove("board", Some(DeviceKind::Lan)).unwrap();
        assert!(!reg.contains("board"));
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn test_reset_addresses_forces_rescan() {
        let (usb_world, lan_world) = (World::shared(), World::shared());
        let device = usb(Some("/devices/usb1/1-1"), 1, 2, "A");
        usb_world.lock().unwrap().devices = vec![device.clone()];
        let mut reg = registry(&usb_world, &lan_world, false);
        reg.set("cam", None, device, false).await.unwrap();

        reg.reset_addresses();
        let stored = reg.table().get_kind("cam", DeviceKind::Usb).unwrap();
        assert!(!stored.has_current_address());

        let resolved = reg.get("cam", None, false).await.unwrap();
        let device = resolved.get(DeviceKind::Usb).unwrap();
        assert_eq!(device.address(), Some("/devices/usb1/1-1"));
        assert!(device.historical_addresses().is_empty());
        assert_eq!(usb_world.lock().unwrap().scans, 1);
    }

    #[tokio::test]
    async fn test_set_json() {
        let (usb_world, lan_world) = (World::shared(), World::shared());
        let mut reg = registry(&usb_world, &lan_world, false);

        let record = json!({"address": "10.0.0.7", "mac_address": "00-11-22-33-44-55"});
        let device = reg
            .set_json("pi", Some(DeviceKind::Lan), &record, false)
            .await
            .unwrap();
        assert_eq!(device.address(), Some("10.0.0.7"));

        let err = reg.set_json("n", None, &json!(42), false).await.unwrap_err();
        assert!(err.is_validation());
        assert!(!reg.contains("n"));
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn test_save_open_rescans_on_first_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry").join("devices.json");
        let (usb_world, lan_world) = (World::shared(), World::shared());
        let device = usb(Some("/devices/usb1/1-1"), 0x1122, 0xABAB, "AB1234CD");
        usb_world.lock().unwrap().devices = vec![device.clone()];

        let mut reg = registry(&usb_world, &lan_world, false);
        reg.set("cam", None, device, false).await.unwrap();
        reg.save_to(&path, true).unwrap();

        let mut reopened = Registry::open(&path, registry_sources(&usb_world, &lan_world, false)).unwrap();
        let stored = reopened.table().get_kind("cam", DeviceKind::Usb).unwrap();
        assert!(!stored.has_current_address());
        assert_eq!(stored.historical_addresses(), ["/devices/usb1/1-1"]);

        let resolved = reopened.get("cam", None, false).await.unwrap();
        let device = resolved.get(DeviceKind::Usb).unwrap();
        assert_eq!(device.address(), Some("/devices/usb1/1-1"));
        assert!(device.historical_addresses().is_empty());
        assert_eq!(usb_world.lock().unwrap().scans, 1);
    }

    #[tokio::test]
    async fn test_open_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let (usb_world, lan_world) = (World::shared(), World::shared());
        let reg = Registry::open(
            &dir.path().join("absent.json"),
            registry_sources(&usb_world, &lan_world, false),
        )
        .unwrap();
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn test_load_merge_and_clear() {
        let (usb_world, lan_world) = (World::shared(), World::shared());
        let mut reg = registry(&usb_world, &lan_world, false);
        reg.set("cam", None, usb(Some("/devices/usb1/1-1"), 1, 2, "A"), false)
            .await
            .unwrap();

        let content = r#"{"pi": {"lan": {"address": "10.0.0.7", "address_aliases": [], "mac_address": "00:11:22:33:44:55"}}}"#;
        reg.load(content, false).unwrap();
        let names: Vec<&str> = reg.names().collect();
        assert_eq!(names, vec!["cam", "pi"]);

        assert!(reg.load("{\"broken\": ", true).is_err());
        assert_eq!(reg.len(), 2);

        reg.load(content, true).unwrap();
        let names: Vec<&str> = reg.names().collect();
        assert_eq!(names, vec!["pi"]);

        let dumped = reg.dump(false).unwrap();
        assert!(dumped.contains("historical_addresses"));
        reg.clear();
        assert!(reg.is_empty());
    }
}
