//! The discovery contract implemented once per transport

use async_trait::async_trait;
use roster_core::{Device, DeviceKind, Filter, Result};

/// Produces a cached, deduplicated batch of observed devices of one kind
///
/// `list(false)` hands out the cached batch when there is one and only
/// scans when the cache is empty; `list(true)` always scans and replaces
/// the cache.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    fn kind(&self) -> DeviceKind;

    async fn list(&mut self, rescan: bool) -> Result<Vec<Device>>;

    /// Devices of the (possibly refreshed) batch matching every criterion
    async fn find(&mut self, rescan: bool, filter: &Filter) -> Result<Vec<Device>> {
        let devices = self.list(rescan).await?;
        Ok(devices.into_iter().filter(|d| filter.matches(d)).collect())
    }

    /// Whether [`DiscoverySource::probe`] can do anything
    fn can_probe(&self) -> bool {
        false
    }

    /// Actively probe `hosts` and fold the results into the next listing
    ///
    /// Returns whether the probe succeeded. Sources without an active
    /// probe return `false`.
    async fn probe(&mut self, _hosts: &[String]) -> bool {
        false
    }
}
