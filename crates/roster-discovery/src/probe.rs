//! Background network probing
//!
//! A [`NetworkProbe`] runs an active probe backend over host or subnet
//! expressions, either awaited in place ([`NetworkProbe::scan`]) or on a
//! background task ([`NetworkProbe::scan_async`]). At most one background
//! scan runs per probe. Results accumulate across scans until
//! [`NetworkProbe::clear`] is called.

use roster_core::{LanDevice, ProbeBackend, ProbeHost};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::lan::fold_by_mac;

/// Called with the success flag after every scan
///
/// The probe only holds listeners weakly: dropping the last `Arc`
/// unregisters the listener.
pub type ProbeListener = Arc<dyn Fn(bool) + Send + Sync>;

/// One-shot completion callback of a single background scan
pub type OnDone = Box<dyn FnOnce(bool) + Send>;

/// Probe lifecycle notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeEvent {
    Started { hosts: String },
    /// `hosts` is the number of results held after the scan
    Completed { success: bool, hosts: usize },
}

struct Shared {
    backend: Arc<dyn ProbeBackend>,
    results: RwLock<Vec<ProbeHost>>,
    listeners: Mutex<Vec<Weak<dyn Fn(bool) + Send + Sync>>>,
    event_tx: broadcast::Sender<ProbeEvent>,
}

impl Shared {
    async fn run(&self, hosts: String, on_done: Option<OnDone>) -> bool {
        let _ = self.event_tx.send(ProbeEvent::Started {
            hosts: hosts.clone(),
        });
        debug!(backend = self.backend.name(), hosts = %hosts, "Network probe started");

        let success = match self.backend.probe(&hosts).await {
            Ok(found) => {
                let mut results = self.results.write().await;
                let before = results.len();
                for host in found {
                    if !results.iter().any(|known| known.same_host(&host)) {
                        results.push(host);
                    }
                }
                info!(
                    backend = self.backend.name(),
                    hosts = %hosts,
                    new = results.len() - before,
                    total = results.len(),
                    "Network probe completed"
                );
                true
            }
            Err(e) => {
                warn!(backend = self.backend.name(), hosts = %hosts, error = %e, "Network probe failed");
                false
            }
        };

        for listener in self.live_listeners() {
            listener(success);
        }
        if let Some(on_done) = on_done {
            on_done(success);
        }

        let total = self.results.read().await.len();
        let _ = self.event_tx.send(ProbeEvent::Completed {
            success,
            hosts: total,
        });
        success
    }

    /// Upgrade every listener still alive, forgetting dropped ones
    fn live_listeners(&self) -> Vec<ProbeListener> {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|l| l.strong_count() > 0);
        listeners.iter().filter_map(Weak::upgrade).collect()
    }
}

/// A background scan and its completion signal
struct Task {
    handle: JoinHandle<bool>,
    done: watch::Receiver<bool>,
}

impl Task {
    /// Finished normally, or ended without signalling (panicked)
    fn finished(&self) -> bool {
        *self.done.borrow() || self.done.has_changed().is_err()
    }
}

pub struct NetworkProbe {
    shared: Arc<Shared>,
    /// Only ever locked briefly, never across a wait
    task: AsyncMutex<Option<Task>>,
}

impl NetworkProbe {
    pub fn new(backend: Arc<dyn ProbeBackend>) -> Self {
        let (event_tx, _) = broadcast::channel(16);
        Self {
            shared: Arc::new(Shared {
                backend,
                results: RwLock::new(Vec::new()),
                listeners: Mutex::new(Vec::new()),
                event_tx,
            }),
            task: AsyncMutex::new(None),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.shared.backend.name()
    }

    /// Register a listener called after every scan, before any `on_done`
    ///
    /// The caller keeps `listener` alive for as long as it wants calls.
    pub fn register_listener(&self, listener: &ProbeListener) {
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(listener));
    }

    /// Number of registered listeners still alive
    pub fn listener_count(&self) -> usize {
        self.shared.live_listeners().len()
    }

    /// Subscribe to probe events
    pub fn subscribe(&self) -> broadcast::Receiver<ProbeEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Scan `hosts` and wait for the result
    ///
    /// Backend errors count as a failed scan and are never returned.
    pub async fn scan<S: AsRef<str>>(&self, hosts: &[S]) -> bool {
        self.shared.run(join_hosts(hosts), None).await
    }

    /// Start a scan on a background task
    ///
    /// Returns `false` without doing anything if a scan is already running.
    pub async fn scan_async<S: AsRef<str>>(&self, hosts: &[S], on_done: Option<OnDone>) -> bool {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.finished()) {
            debug!("Network probe already running");
            return false;
        }
        let shared = Arc::clone(&self.shared);
        let hosts = join_hosts(hosts);
        let (done_tx, done) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let success = shared.run(hosts, on_done).await;
            let _ = done_tx.send(true);
            success
        });
        *task = Some(Task { handle, done });
        true
    }

    /// Whether a background scan is running; forgets finished ones
    pub async fn is_alive(&self) -> bool {
        let mut task = self.task.lock().await;
        match task.as_ref() {
            Some(t) if !t.finished() => true,
            Some(_) => {
                *task = None;
                false
            }
            None => false,
        }
    }

    /// Wait for the running scan, at most `timeout` if given
    ///
    /// Returns whether the scan is still running. A timed-out wait leaves
    /// the scan running. Other callers are not blocked while waiting.
    pub async fn wait_for(&self, timeout: Option<Duration>) -> bool {
        let mut done = match self.task.lock().await.as_ref() {
            Some(t) => t.done.clone(),
            None => return false,
        };

        let finished = done.wait_for(|finished| *finished);
        match timeout {
            Some(timeout) => {
                if tokio::time::timeout(timeout, finished).await.is_err() {
                    return true;
                }
            }
            None => {
                let _ = finished.await;
            }
        }

        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| t.finished() && t.handle.is_finished()) {
            if let Some(t) = task.take() {
                if let Err(e) = t.handle.await {
                    warn!(error = %e, "Network probe task ended abnormally");
                }
            }
        }
        false
    }

    /// Every host found so far
    pub async fn raw_hosts(&self) -> Vec<ProbeHost> {
        self.shared.results.read().await.clone()
    }

    /// One device per hardware address; further addresses become aliases
    pub async fn devices(&self) -> Vec<LanDevice> {
        let results = self.shared.results.read().await;
        let mut devices = Vec::new();
        for host in results.iter() {
            if let Some(device) = device_from_host(host) {
                fold_by_mac(&mut devices, device);
            }
        }
        devices
    }

    pub async fn clear(&self) {
        self.shared.results.write().await.clear();
    }
}

fn join_hosts<S: AsRef<str>>(hosts: &[S]) -> String {
    hosts
        .iter()
        .map(|h| h.as_ref().trim())
        .filter(|h| !h.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn device_from_host(host: &ProbeHost) -> Option<LanDevice> {
    let raw_mac = host.mac_address.as_deref()?;
    let (address, aliases) = host.addresses.split_first()?;

    let mut device = LanDevice::new();
    if let Err(e) = device.set_mac_address(Some(raw_mac)) {
        debug!(mac = raw_mac, error = %e, "Skipping probe result");
        return None;
    }
    device.addresses.set_address(Some(address.clone()));
    device.addresses.set_aliases(aliases.iter().cloned());
    Some(device)
}
