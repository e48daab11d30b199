//! Hardware (MAC) addresses in canonical form
//!
//! Input may use `:`, `-` or `.` between octets, in any letter case.
//! The canonical rendering is uppercase with `:` separators, so two
//! differently formatted spellings of one address compare equal.

use pnet_base::MacAddr;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress(MacAddr);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        let [a, b, c, d, e, g] = octets;
        Self(MacAddr(a, b, c, d, e, g))
    }

    pub fn octets(&self) -> [u8; 6] {
        let MacAddr(a, b, c, d, e, g) = self.0;
        [a, b, c, d, e, g]
    }

    /// Parse and return the canonical string in one step
    pub fn canonicalize(input: &str) -> Result<String, Error> {
        input.parse::<MacAddress>().map(|mac| mac.to_string())
    }
}

impl From<MacAddr> for MacAddress {
    fn from(mac: MacAddr) -> Self {
        Self(mac)
    }
}

impl From<MacAddress> for MacAddr {
    fn from(mac: MacAddress) -> Self {
        mac.0
    }
}

impl FromStr for MacAddress {
    type Err = Error;

    // Six groups of exactly two hex digits; MacAddr itself only takes ":"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidMacAddress(s.to_string());
        let groups: Vec<&str> = s.split([':', '-', '.']).collect();
        let well_formed = groups.len() == 6
            && groups
                .iter()
                .all(|g| g.len() == 2 && g.bytes().all(|b| b.is_ascii_hexdigit()));
        if !well_formed {
            return Err(invalid());
        }
        groups
            .join(":")
            .parse::<MacAddr>()
            .map(Self)
            .map_err(|_| invalid())
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let MacAddr(a, b, c, d, e, g) = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
