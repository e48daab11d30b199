//! Named device storage: name -> kind -> device
//!
//! A name holds at most one device per kind. The entry for a name is
//! created by its first insert and disappears with its last kind.

use std::collections::btree_map;
use std::collections::BTreeMap;

use crate::device::{Device, DeviceKind};
use crate::error::{Error, Result};

/// Devices stored under one name, keyed by their kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindMap {
    devices: BTreeMap<DeviceKind, Device>,
}

impl KindMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a device under its own kind, returning the one it replaced
    pub fn insert(&mut self, device: Device) -> Option<Device> {
        self.devices.insert(device.kind(), device)
    }

    pub fn get(&self, kind: DeviceKind) -> Option<&Device> {
        self.devices.get(&kind)
    }

    pub fn get_mut(&mut self, kind: DeviceKind) -> Option<&mut Device> {
        self.devices.get_mut(&kind)
    }

    pub fn remove(&mut self, kind: DeviceKind) -> Option<Device> {
        self.devices.remove(&kind)
    }

    pub fn contains(&self, kind: DeviceKind) -> bool {
        self.devices.contains_key(&kind)
    }

    /// The only stored device, if exactly one kind is present
    pub fn single(&self) -> Option<&Device> {
        match self.devices.len() {
            1 => self.devices.values().next(),
            _ => None,
        }
    }

    pub fn kinds(&self) -> impl Iterator<Item = DeviceKind> + '_ {
        self.devices.keys().copied()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, DeviceKind, Device> {
        self.devices.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.devices.values_mut()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl<'a> IntoIterator for &'a KindMap {
    type Item = (&'a DeviceKind, &'a Device);
    type IntoIter = btree_map::Iter<'a, DeviceKind, Device>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.iter()
    }
}

impl FromIterator<Device> for KindMap {
    fn from_iter<I: IntoIterator<Item = Device>>(iter: I) -> Self {
        let mut map = Self::new();
        for device in iter {
            map.insert(device);
        }
        map
    }
}

/// Every named entry of a registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceTable {
    entries: BTreeMap<String, KindMap>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `device` under `name` and its own kind
    pub fn insert(&mut self, name: impl Into<String>, device: Device) -> Option<Device> {
        self.entries.entry(name.into()).or_default().insert(device)
    }

    pub fn get(&self, name: &str) -> Result<&KindMap> {
        self.entries
            .get(name)
            .ok_or_else(|| Error::UnknownName(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut KindMap> {
        self.entries
            .get_mut(name)
            .ok_or_else(|| Error::UnknownName(name.to_string()))
    }

    pub fn get_kind(&self, name: &str, kind: DeviceKind) -> Result<&Device> {
        self.get(name)?.get(kind).ok_or_else(|| Error::UnknownKind {
            name: name.to_string(),
            kind,
        })
    }

    pub fn get_kind_mut(&mut self, name: &str, kind: DeviceKind) -> Result<&mut Device> {
        self.get_mut(name)?
            .get_mut(kind)
            .ok_or_else(|| Error::UnknownKind {
                name: name.to_string(),
                kind,
            })
    }

    /// Remove a whole entry, or a single kind of it
    pub fn remove(&mut self, name: &str, kind: Option<DeviceKind>) -> Result<KindMap> {
        let Some(kind) = kind else {
            return self
                .entries
                .remove(name)
                .ok_or_else(|| Error::UnknownName(name.to_string()));
        };

        let devices = self.get_mut(name)?;
        let removed = devices.remove(kind).ok_or_else(|| Error::UnknownKind {
            name: name.to_string(),
            kind,
        })?;
        if devices.is_empty() {
            self.entries.remove(name);
        }
        Ok(KindMap::from_iter([removed]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, KindMap> {
        self.entries.iter()
    }

    pub fn devices_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.entries.values_mut().flat_map(KindMap::values_mut)
    }

    /// Move every entry of `other` in, replacing same name/kind pairs
    pub fn merge(&mut self, other: DeviceTable) {
        for (name, devices) in other.entries {
            let entry = self.entries.entry(name).or_default();
            for (_, device) in devices.devices {
                entry.insert(device);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a DeviceTable {
    type Item = (&'a String, &'a KindMap);
    type IntoIter = btree_map::Iter<'a, String, KindMap>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
