//! nmap XML report (`-oX`) decoding

use quick_xml::de::from_str;
use roster_core::ProbeHost;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::DeError),
    #[error("nmap reported an error: {0}")]
    ScanError(String),
}

/// Root `<nmaprun>` element, reduced to what host discovery needs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NmapReport {
    #[serde(rename = "@args", default)]
    pub args: Option<String>,
    #[serde(rename = "host", default)]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub runstats: Option<RunStats>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Host {
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(rename = "address", default)]
    pub addresses: Vec<Address>,
    #[serde(default)]
    pub hostnames: Option<Hostnames>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Address {
    #[serde(rename = "@addr")]
    pub addr: String,
    #[serde(rename = "@addrtype", default)]
    pub addrtype: Option<String>,
    #[serde(rename = "@vendor", default)]
    pub vendor: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Hostnames {
    #[serde(rename = "hostname", default)]
    pub names: Vec<Hostname>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostname {
    #[serde(rename = "@name")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunStats {
    #[serde(default)]
    pub finished: Option<Finished>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Finished {
    #[serde(rename = "@exit", default)]
    pub exit: Option<String>,
    #[serde(rename = "@errormsg", default)]
    pub errormsg: Option<String>,
}

impl NmapReport {
    /// Error message of a run that nmap itself flagged as failed
    pub fn error(&self) -> Option<String> {
        let finished = self.runstats.as_ref()?.finished.as_ref()?;
        if finished.exit.as_deref() != Some("error") {
            return None;
        }
        Some(
            finished
                .errormsg
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
        )
    }

    /// Hosts that were up, as probe results
    pub fn probe_hosts(&self) -> Vec<ProbeHost> {
        self.hosts
            .iter()
            .filter(|h| h.status.as_ref().map_or(true, |s| s.state == "up"))
            .map(Host::to_probe_host)
            .collect()
    }
}

impl Host {
    fn address_of(&self, kind: &'static str) -> impl Iterator<Item = &Address> {
        self.addresses
            .iter()
            .filter(move |a| a.addrtype.as_deref() == Some(kind))
    }

    /// IPv4 addresses first, then IPv6
    pub fn to_probe_host(&self) -> ProbeHost {
        let mac = self.address_of("mac").next();
        let addresses = self
            .address_of("ipv4")
            .chain(self.address_of("ipv6"))
            .map(|a| a.addr.clone())
            .collect();
        ProbeHost {
            mac_address: mac.map(|a| a.addr.clone()),
            addresses,
            vendor: mac.and_then(|a| a.vendor.clone()),
            hostname: self
                .hostnames
                .as_ref()
                .and_then(|h| h.names.first())
                .map(|h| h.name.clone()),
        }
    }
}

/// Decode a report and reject runs nmap marked as failed
pub fn parse_report(xml: &str) -> Result<NmapReport, ReportError> {
    let report: NmapReport = from_str(xml)?;
    if let Some(message) = report.error() {
        return Err(ReportError::ScanError(message));
    }
    Ok(report)
}
