//! Identity reconciliation against discovery results
//!
//! A stored device is trusted as long as it holds a current address and no
//! scan is requested. Otherwise its kind's source is rescanned for the
//! device's unique identifier; LAN devices that still do not show up get a
//! one-shot active probe over every address they ever had. A device that is
//! found takes over the fresh addresses; one that is not is presumed
//! disconnected and its addresses move into history.

use roster_core::{Device, DeviceKind, Filter, Result};
use roster_discovery::DeviceSources;
use tracing::{debug, warn};

/// Find the up-to-date version of `reference`
///
/// Returns a copy of `reference` merged with the observation that matches
/// its identity, the unchanged reference on the cheap path, or `None` if
/// the device is not connected.
pub async fn find_current(
    sources: &mut DeviceSources,
    reference: &Device,
    scan: bool,
) -> Result<Option<Device>> {
    if reference.has_current_address() && !scan {
        return Ok(Some(reference.clone()));
    }

    let kind = reference.kind();
    let filter = Filter::identity(&reference.identifier());
    let mut candidates = sources.find(Some(kind), true, &filter).await?;

    if candidates.is_empty() && kind == DeviceKind::Lan && sources.can_probe(kind) {
        let hosts: Vec<String> = reference
            .addresses()
            .known()
            .into_iter()
            .map(String::from)
            .collect();
        if hosts.is_empty() {
            debug!(filter = %filter, "No known addresses to probe");
        } else {
            sources.probe(kind, &hosts).await;
            candidates = sources.find(Some(kind), false, &filter).await?;
        }
    }

    let Some(found) = pick_candidate(reference, candidates) else {
        debug!(kind = %kind, filter = %filter, "Device not found");
        return Ok(None);
    };
    let mut current = reference.clone();
    current.merge_from(&found)?;
    Ok(Some(current))
}

/// Bring `device` up to date in place; returns whether it is connected
pub async fn refresh(sources: &mut DeviceSources, device: &mut Device, scan: bool) -> Result<bool> {
    match find_current(sources, device, scan).await? {
        Some(current) => {
            *device = current;
            Ok(true)
        }
        None => {
            if device.has_current_address() {
                debug!(kind = %device.kind(), addresses = ?device.all_addresses(), "Device disconnected");
                device.reset_addresses();
            }
            Ok(false)
        }
    }
}

/// Choose among identity matches
///
/// Sources deduplicate by identity, so more than one match is unexpected.
/// The first candidate sharing any address with the reference wins,
/// otherwise the first one in source order.
pub fn pick_candidate(reference: &Device, mut candidates: Vec<Device>) -> Option<Device> {
    if candidates.len() > 1 {
        warn!(
            kind = %reference.kind(),
            candidates = candidates.len(),
            "Expected only one device as search result"
        );
        let known = reference.addresses().known();
        if let Some(index) = candidates
            .iter()
            .position(|c| c.all_addresses().iter().any(|a| known.contains(a)))
        {
            return Some(candidates.swap_remove(index));
        }
    }
    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{lan, registry_sources, usb, World};

    #[tokio::test]
    async fn test_cheap_path_skips_scan() {
        let (usb_world, lan_world) = (World::shared(), World::shared());
        let mut sources = registry_sources(&usb_world, &lan_world, false);
        let device = usb(Some("/devices/usb1/1-1"), 0x1122, 0xABAB, "A");

        let found = find_current(&mut sources, &device, false).await.unwrap();
        assert_eq!(found, Some(device));
        assert_eq!(usb_world.lock().unwrap().scans, 0);
    }

    #[tokio::test]
    async fn test_rescan_merges_match() {
        let (usb_world, lan_world) = (World::shared(), World::shared());
        usb_world.lock().unwrap().devices = vec![usb(Some("/devices/usb1/1-4"), 0x1122, 0xABAB, "A")];
        let mut sources = registry_sources(&usb_world, &lan_world, false);

        let mut device = usb(Some("/devices/usb1/1-1"), 0x1122, 0xABAB, "A");
        assert!(refresh(&mut sources, &mut device, true).await.unwrap());
        assert_eq!(device.address(), Some("/devices/usb1/1-4"));
        assert_eq!(device.historical_addresses(), ["/devices/usb1/1-1"]);
        assert_eq!(usb_world.lock().unwrap().scans, 1);
    }

    #[tokio::test]
    async fn test_missing_device_rotated_into_history() {
        let (usb_world, lan_world) = (World::shared(), World::shared());
        let mut sources = registry_sources(&usb_world, &lan_world, false);

        let mut device = usb(Some("/devices/usb1/1-1"), 0x1122, 0xABAB, "A");
        assert!(!refresh(&mut sources, &mut device, true).await.unwrap());
        assert!(!device.has_current_address());
        assert_eq!(device.historical_addresses(), ["/devices/usb1/1-1"]);

        // Nothing to rotate the second time
        assert!(!refresh(&mut sources, &mut device, false).await.unwrap());
        assert_eq!(device.historical_addresses().len(), 1);
    }

    #[tokio::test]
    async fn test_lan_probe_over_known_addresses() {
        let (usb_world, lan_world) = (World::shared(), World::shared());
        lan_world.lock().unwrap().probe_devices = vec![lan("10.0.0.9", "00:11:22:33:44:55")];
        let mut sources = registry_sources(&usb_world, &lan_world, true);

        let mut device = lan("10.0.0.7", "00-11-22-33-44-55");
        device.addresses_mut().extend_historical(["10.0.0.3"]);
        assert!(refresh(&mut sources, &mut device, true).await.unwrap());

        let world = lan_world.lock().unwrap();
        assert_eq!(world.probes, vec![vec!["10.0.0.7".to_string(), "10.0.0.3".to_string()]]);
        assert_eq!(world.scans, 1);
        assert_eq!(device.address(), Some("10.0.0.9"));
        assert_eq!(device.historical_addresses(), ["10.0.0.3", "10.0.0.7"]);
    }

    #[tokio::test]
    async fn test_usb_never_probes() {
        let (usb_world, lan_world) = (World::shared(), World::shared());
        let mut sources = registry_sources(&usb_world, &lan_world, true);
        let device = usb(Some("/devices/usb1/1-1"), 1, 2, "A");
        assert!(find_current(&mut sources, &device, true).await.unwrap().is_none());
        assert!(lan_world.lock().unwrap().probes.is_empty());
    }

    #[test]
    fn test_ambiguous_prefers_shared_address() {
        let mut reference = lan("10.0.0.2", "00:11:22:33:44:55");
        reference.reset_addresses();
        let candidates = vec![
            lan("10.0.0.1", "00:11:22:33:44:55"),
            lan("10.0.0.2", "00:11:22:33:44:55"),
        ];
        let picked = pick_candidate(&reference, candidates).unwrap();
        assert_eq!(picked.address(), Some("10.0.0.2"));

        let unrelated = vec![
            lan("10.0.0.5", "00:11:22:33:44:55"),
            lan("10.0.0.6", "00:11:22:33:44:55"),
        ];
        assert_eq!(pick_candidate(&reference, unrelated).unwrap().address(), Some("10.0.0.5"));
        assert!(pick_candidate(&reference, Vec::new()).is_none());
    }
}
