//! Contract for active network probe backends

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One host reported by an active probe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeHost {
    /// Hardware address as reported, not yet canonicalized
    pub mac_address: Option<String>,
    /// Network addresses, most relevant first
    pub addresses: Vec<String>,
    pub vendor: Option<String>,
    pub hostname: Option<String>,
}

impl ProbeHost {
    /// Same reported hardware address and address list
    pub fn same_host(&self, other: &ProbeHost) -> bool {
        self.mac_address == other.mac_address && self.addresses == other.addresses
    }
}

#[derive(Error, Debug)]
pub enum ProbeError {
    /// The probe executable could not be found or started
    #[error("probe unavailable: {0}")]
    Unavailable(String),
    #[error("probe failed: {0}")]
    Failed(String),
    #[error("failed to decode probe output: {0}")]
    Decode(String),
}

/// A facility that actively sweeps hosts or subnets
#[async_trait]
pub trait ProbeBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Probe `hosts`, a space separated list of host or subnet expressions
    async fn probe(&self, hosts: &str) -> Result<Vec<ProbeHost>, ProbeError>;
}
