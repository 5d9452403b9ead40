// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Port binding manager.
//!
//! Keeps a live subscription to the one input port matching a selector,
//! re-establishing it as devices come and go, and fans every received
//! message out to the registered listeners.

use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::{InputConnection, MidiDriver, PortInfo};
use crate::error::Result;

/// Criterion used to pick one port out of the enumerated ones
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSelector {
    /// Exact port number
    Number(usize),
    /// Case-insensitive substring of the port name (stored lowercased)
    Name(String),
}

impl PortSelector {
    pub fn by_number(number: usize) -> Self {
        PortSelector::Number(number)
    }

    pub fn by_name(keyword: &str) -> Self {
        PortSelector::Name(keyword.to_lowercase())
    }

    /// Check if a port satisfies this selector
    pub fn matches(&self, port: &PortInfo) -> bool {
        match self {
            PortSelector::Number(number) => port.number == *number,
            PortSelector::Name(keyword) => port.name.to_lowercase().contains(keyword.as_str()),
        }
    }

    /// First matching port in enumeration order
    pub fn select<'a>(&self, ports: &'a [PortInfo]) -> Option<&'a PortInfo> {
        ports.iter().find(|port| self.matches(port))
    }
}

impl fmt::Display for PortSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSelector::Number(number) => write!(f, "port number {}", number),
            PortSelector::Name(keyword) => write!(f, "port keyword \"{}\"", keyword),
        }
    }
}

/// Receiver of messages from the bound port.
///
/// Called synchronously on the driver's delivery thread, so implementations
/// must return quickly.
pub trait PortListener: Send + Sync {
    /// `elapsed` is the time since the previous message on the same binding.
    fn on_message(&self, message: &[u8], elapsed: Duration);
}

/// Insertion-ordered set of listeners, safe to mutate while dispatching.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<Arc<dyn PortListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn PortListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Remove a listener by identity. Returns true if it was registered.
    pub fn remove(&self, listener: &Arc<dyn PortListener>) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a message to every registered listener
    pub fn dispatch(&self, message: &[u8], elapsed: Duration) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener.on_message(message, elapsed);
        }
    }
}

fn same_listener(a: &Arc<dyn PortListener>, b: &Arc<dyn PortListener>) -> bool {
    // Compare data pointers only; vtable pointers are not unique
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Options for the port manager
#[derive(Debug, Clone)]
pub struct PortManagerOptions {
    /// Which port to bind
    pub selector: PortSelector,
    /// Time between port scans
    pub poll_interval: Duration,
}

/// Binds the port matching a selector and keeps the binding current.
pub struct PortManager {
    listeners: Arc<ListenerRegistry>,
    active: Arc<Mutex<Option<PortInfo>>>,
    stop_tx: Mutex<Option<Sender<()>>>,
    scanner: Mutex<Option<JoinHandle<()>>>,
}

impl PortManager {
    /// Start scanning for ports in the background.
    ///
    /// The first scan runs immediately; later scans run every
    /// `poll_interval` until `stop` is called.
    pub fn start<D: MidiDriver + 'static>(driver: D, options: PortManagerOptions) -> Result<Self> {
        let listeners = Arc::new(ListenerRegistry::new());
        let active = Arc::new(Mutex::new(None));
        let (stop_tx, stop_rx) = mpsc::channel();

        let selector = options.selector;
        let poll_interval = options.poll_interval;
        let scanner_listeners = Arc::clone(&listeners);
        let scanner_active = Arc::clone(&active);
        // Connections need not be Send, so the scanner is built on its own thread
        let handle = thread::Builder::new()
            .name("port-scanner".to_string())
            .spawn(move || {
                let scanner = Scanner {
                    driver: Box::new(driver),
                    selector,
                    listeners: scanner_listeners,
                    active: scanner_active,
                    binding: None,
                };
                scanner.run(poll_interval, stop_rx)
            })?;

        Ok(Self {
            listeners,
            active,
            stop_tx: Mutex::new(Some(stop_tx)),
            scanner: Mutex::new(Some(handle)),
        })
    }

    /// Register a listener; it receives messages arriving from now on
    pub fn add_listener(&self, listener: Arc<dyn PortListener>) {
        self.listeners.add(listener);
    }

    /// Unregister a listener. Returns true if it was registered.
    pub fn remove_listener(&self, listener: &Arc<dyn PortListener>) -> bool {
        self.listeners.remove(listener)
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// The currently bound port, if any
    pub fn active_port(&self) -> Option<PortInfo> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Release the bound port and end the scan loop.
    ///
    /// Blocks until the scanner has unbound. Calling it again is a no-op.
    pub fn stop(&self) {
        if let Some(tx) = self.stop_tx.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.scanner.lock().unwrap_or_else(PoisonError::into_inner).take() {
            if handle.join().is_err() {
                error!("port scanner thread panicked");
            }
        }
    }
}

impl Drop for PortManager {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Binding {
    port: PortInfo,
    connection: Box<dyn InputConnection>,
}

/// Owner of the binding; lives on the scanner thread only.
struct Scanner {
    driver: Box<dyn MidiDriver>,
    selector: PortSelector,
    listeners: Arc<ListenerRegistry>,
    active: Arc<Mutex<Option<PortInfo>>>,
    binding: Option<Binding>,
}

impl Scanner {
    fn run(mut self, poll_interval: Duration, stop_rx: Receiver<()>) {
        loop {
            self.scan();

            match stop_rx.recv_timeout(poll_interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                // Stop requested or manager dropped
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.unbind();
        debug!("port scanner stopped");
    }

    fn scan(&mut self) {
        let ports = match self.driver.input_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!("failed to query midi ports: {}", e);
                return;
            }
        };

        match self.selector.select(&ports) {
            Some(found) => {
                let unchanged = self.binding.as_ref().map(|b| &b.port == found).unwrap_or(false);
                if !unchanged {
                    let found = found.clone();
                    self.unbind();
                    self.bind(found);
                }
            }
            None => {
                if self.binding.is_some() {
                    self.unbind();
                    info!("no active ports for now.");
                }
            }
        }
    }

    fn bind(&mut self, port: PortInfo) {
        let listeners = Arc::clone(&self.listeners);
        let mut last_stamp = 0u64;
        let callback = Box::new(move |stamp: u64, message: &[u8]| {
            let elapsed = Duration::from_micros(stamp.saturating_sub(last_stamp));
            last_stamp = last_stamp.max(stamp);
            listeners.dispatch(message, elapsed);
        });

        match self.driver.connect(&port, callback) {
            Ok(connection) => {
                info!("switched to port: {}", port);
                self.set_active(Some(port.clone()));
                self.binding = Some(Binding { port, connection });
            }
            Err(e) => {
                // Retried on the next scan
                error!("got error while switching midi ports: {}", e);
            }
        }
    }

    fn unbind(&mut self) {
        if let Some(binding) = self.binding.take() {
            binding.connection.close();
            self.set_active(None);
            info!("released port: {}", binding.port);
        }
    }

    fn set_active(&self, port: Option<PortInfo>) {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = port;
    }
}
