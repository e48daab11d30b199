//! Probe backend running the nmap executable

use async_trait::async_trait;
use roster_core::{ProbeBackend, ProbeError, ProbeHost};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::report::{parse_report, ReportError};

/// Scan arguments, tried in order until one succeeds
///
/// A TCP-ACK scan is the fastest but needs raw sockets; the TCP-connect
/// scan works unprivileged.
pub const DEFAULT_ARGUMENT_SETS: &[&[&str]] = &[
    &["-sA", "-F", "--min-parallelism", "1024", "--privileged"],
    &["-sT", "-F", "--min-parallelism", "1024"],
];

#[cfg(windows)]
const EXECUTABLE: &str = "nmap.exe";
#[cfg(not(windows))]
const EXECUTABLE: &str = "nmap";

#[derive(Debug, Clone)]
pub struct NmapBackend {
    program: PathBuf,
    /// Arguments placed before the scan arguments, e.g. when run through a wrapper
    leading_args: Vec<String>,
    argument_sets: Vec<Vec<String>>,
}

impl NmapBackend {
    /// Find nmap in `search_path`, or in `PATH` when no directory is given
    pub fn locate<P: AsRef<Path>>(search_path: &[P]) -> Result<Self, ProbeError> {
        let directories: Vec<PathBuf> = if search_path.is_empty() {
            std::env::var_os("PATH")
                .map(|path| std::env::split_paths(&path).collect())
                .unwrap_or_default()
        } else {
            search_path.iter().map(|p| p.as_ref().to_path_buf()).collect()
        };

        directories
            .iter()
            .map(|dir| dir.join(EXECUTABLE))
            .find(|candidate| candidate.is_file())
            .map(|program| {
                debug!(program = %program.display(), "Found nmap executable");
                Self::with_program(program)
            })
            .ok_or_else(|| {
                ProbeError::Unavailable(format!(
                    "{EXECUTABLE} not found in {} search director{}",
                    directories.len(),
                    if directories.len() == 1 { "y" } else { "ies" }
                ))
            })
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self::with_command(program, Vec::<String>::new())
    }

    /// Run nmap through another program, e.g. `sudo -n nmap`
    pub fn with_command(
        program: impl Into<PathBuf>,
        leading_args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            leading_args: leading_args.into_iter().map(Into::into).collect(),
            argument_sets: DEFAULT_ARGUMENT_SETS
                .iter()
                .map(|set| set.iter().map(|a| a.to_string()).collect())
                .collect(),
        }
    }

    pub fn with_argument_sets(mut self, argument_sets: Vec<Vec<String>>) -> Self {
        self.argument_sets = argument_sets;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn argument_sets(&self) -> &[Vec<String>] {
        &self.argument_sets
    }

    async fn run(&self, hosts: &str, arguments: &[String]) -> Result<Vec<ProbeHost>, ProbeError> {
        let output = Command::new(&self.program)
            .args(&self.leading_args)
            .args(arguments)
            .args(["-oX", "-"])
            .args(hosts.split_whitespace())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    ProbeError::Unavailable(format!("{}: {e}", self.program.display()))
                }
                _ => ProbeError::Failed(e.to_string()),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            return Err(ProbeError::Failed(stderr.trim().to_string()));
        }
        if !output.status.success() {
            return Err(ProbeError::Failed(format!("nmap exited with {}", output.status)));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| ProbeError::Decode(format!("report is not UTF-8: {e}")))?;
        let report = parse_report(&stdout).map_err(|e| match e {
            ReportError::Xml(e) => ProbeError::Decode(e.to_string()),
            ReportError::ScanError(message) => ProbeError::Failed(message),
        })?;
        Ok(report.probe_hosts())
    }
}

#[async_trait]
impl ProbeBackend for NmapBackend {
    fn name(&self) -> &str {
        "nmap"
    }

    async fn probe(&self, hosts: &str) -> Result<Vec<ProbeHost>, ProbeError> {
        let mut last_error = ProbeError::Failed("no scan arguments configured".to_string());

        for arguments in &self.argument_sets {
            match self.run(hosts, arguments).await {
                Ok(found) => {
                    let mut unique: Vec<ProbeHost> = Vec::with_capacity(found.len());
                    for host in found {
                        if !unique.iter().any(|h| h.same_host(&host)) {
                            unique.push(host);
                        }
                    }
                    info!(hosts = %hosts, found = unique.len(), "nmap scan finished");
                    return Ok(unique);
                }
                Err(ProbeError::Unavailable(reason)) => return Err(ProbeError::Unavailable(reason)),
                Err(e) => {
                    warn!(arguments = %arguments.join(" "), error = %e, "nmap scan attempt failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}
