//! Neighbor (ARP) table reading for LAN discovery

use async_trait::async_trait;
use roster_core::{Error, MacAddress, Result};
use std::net::Ipv4Addr;
use std::str::FromStr;
use tokio::process::Command;
use tracing::{debug, warn};

/// Command printing the neighbor table
#[cfg(windows)]
pub const DEFAULT_NEIGHBOR_COMMAND: &[&str] = &["arp", "-a"];
#[cfg(not(windows))]
pub const DEFAULT_NEIGHBOR_COMMAND: &[&str] = &["arp", "-n"];

/// Neighbor table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddress,
}

/// Source of neighbor table entries
#[async_trait]
pub trait NeighborBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Current entries; backend failures yield an empty table
    async fn read(&self) -> Result<Vec<NeighborEntry>>;
}

/// Parse one line of `arp` output
///
/// Accepted forms are `<ip> <hw-type> <mac> ...` (`arp -n`) and
/// `<ip> <mac> ...` (`arp -a` on Windows), with any mix of tabs and spaces.
pub fn parse_neighbor_line(line: &str) -> Option<NeighborEntry> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let ip = Ipv4Addr::from_str(parts.first()?).ok()?;

    // MAC sits in the third column when the hardware type is present
    let mac = [2, 1]
        .iter()
        .filter_map(|&i| parts.get(i))
        .find_map(|p| p.parse::<MacAddress>().ok())?;

    Some(NeighborEntry { ip, mac })
}

/// Parse a whole table, skipping headers and malformed lines
pub fn parse_neighbor_table(output: &str) -> Vec<NeighborEntry> {
    output.lines().filter_map(parse_neighbor_line).collect()
}

/// Neighbor table read by running an external command
#[derive(Debug, Clone)]
pub struct CommandNeighborTable {
    program: String,
    args: Vec<String>,
}

impl Default for CommandNeighborTable {
    fn default() -> Self {
        Self {
            program: DEFAULT_NEIGHBOR_COMMAND[0].to_string(),
            args: DEFAULT_NEIGHBOR_COMMAND[1..].iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl CommandNeighborTable {
    /// Program followed by its arguments
    pub fn new<S: AsRef<str>>(command: &[S]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::InvalidValue("neighbor command must not be empty".to_string()))?;
        Ok(Self {
            program: program.as_ref().to_string(),
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
        })
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl NeighborBackend for CommandNeighborTable {
    fn name(&self) -> &str {
        &self.program
    }

    async fn read(&self) -> Result<Vec<NeighborEntry>> {
        let output = match Command::new(&self.program).args(&self.args).output().await {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::backend_unavailable(&self.program, e));
            }
            Err(e) => return Err(e.into()),
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() || !stderr.trim().is_empty() {
            warn!(
                command = %self.command_line(),
                status = %output.status,
                stderr = %stderr.trim(),
                "Failed to read neighbor table"
            );
            return Ok(Vec::new());
        }

        let entries = parse_neighbor_table(&String::from_utf8_lossy(&output.stdout));
        debug!("Found {} neighbor entries", entries.len());
        Ok(entries)
    }
}
