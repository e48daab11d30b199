//! Roster nmap - active network probing through the nmap executable
//!
//! This crate drives `nmap` as an external process and decodes its XML
//! report into [`roster_core::ProbeHost`] records.

pub mod report;
pub mod scanner;

pub use report::{parse_report, NmapReport};
pub use scanner::{NmapBackend, DEFAULT_ARGUMENT_SETS};
