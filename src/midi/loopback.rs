// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! In-process loopback driver.
//!
//! Ports are plugged and unplugged by hand and messages are injected with
//! explicit timestamps, which makes device churn reproducible without
//! hardware.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{InputCallback, InputConnection, MidiDriver, PortInfo};
use crate::error::{RecorderError, Result};

#[derive(Default)]
struct LoopbackState {
    ports: Vec<PortInfo>,
    subscribers: HashMap<usize, Subscriber>,
    next_id: u64,
    fail_enumeration: bool,
    fail_connect: bool,
}

struct Subscriber {
    id: u64,
    callback: InputCallback,
}

/// Software MIDI driver whose ports live in memory.
#[derive(Clone, Default)]
pub struct LoopbackDriver {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make a port visible to enumeration
    pub fn plug(&self, port: PortInfo) {
        let mut state = self.lock();
        state.ports.retain(|p| p.number != port.number);
        state.ports.push(port);
        state.ports.sort_by_key(|p| p.number);
    }

    /// Remove a port; any subscription to it stops receiving messages
    pub fn unplug(&self, number: usize) {
        let mut state = self.lock();
        state.ports.retain(|p| p.number != number);
        state.subscribers.remove(&number);
    }

    /// Make enumeration fail until reset
    pub fn fail_enumeration(&self, fail: bool) {
        self.lock().fail_enumeration = fail;
    }

    /// Make subscription attempts fail until reset
    pub fn fail_connect(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    /// Check whether a port currently has a subscriber
    pub fn is_subscribed(&self, number: usize) -> bool {
        self.lock().subscribers.contains_key(&number)
    }

    /// Deliver a message on a port.
    ///
    /// `stamp_us` is the time since the subscription started. Returns
    /// false if nobody is listening on the port.
    pub fn send(&self, number: usize, stamp_us: u64, message: &[u8]) -> bool {
        let mut state = self.lock();
        match state.subscribers.get_mut(&number) {
            Some(subscriber) => {
                (subscriber.callback)(stamp_us, message);
                true
            }
            None => false,
        }
    }
}

impl MidiDriver for LoopbackDriver {
    fn input_ports(&self) -> Result<Vec<PortInfo>> {
        let state = self.lock();
        if state.fail_enumeration {
            return Err(RecorderError::Driver("loopback enumeration failure".to_string()));
        }
        Ok(state.ports.clone())
    }

    fn connect(&self, port: &PortInfo, callback: InputCallback) -> Result<Box<dyn InputConnection>> {
        let mut state = self.lock();
        if state.fail_connect {
            return Err(RecorderError::Bind {
                port: port.to_string(),
                reason: "loopback connect failure".to_string(),
            });
        }
        if !state.ports.contains(port) {
            return Err(RecorderError::PortNotFound(port.to_string()));
        }

        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.insert(port.number, Subscriber { id, callback });

        Ok(Box::new(LoopbackConnection {
            state: Arc::clone(&self.state),
            number: port.number,
            id,
        }))
    }
}

struct LoopbackConnection {
    state: Arc<Mutex<LoopbackState>>,
    number: usize,
    id: u64,
}

impl InputConnection for LoopbackConnection {
    fn close(self: Box<Self>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        // The port may have been unplugged and re-subscribed since
        if state.subscribers.get(&self.number).map(|s| s.id) == Some(self.id) {
            state.subscribers.remove(&self.number);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_plug_and_enumerate() {
        let driver = LoopbackDriver::new();
        driver.plug(PortInfo::new(1, "Keyboard B"));
        driver.plug(PortInfo::new(0, "USB MIDI A"));

        let ports = driver.input_ports().unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].number, 0);
        assert_eq!(ports[1].name, "Keyboard B");
    }

    #[test]
    fn test_send_reaches_subscriber() {
        let driver = LoopbackDriver::new();
        let port = PortInfo::new(0, "USB MIDI A");
        driver.plug(port.clone());

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let conn = driver
            .connect(
                &port,
                Box::new(move |_, _| {
                    count_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        assert!(driver.send(0, 0, &[0x90, 60, 100]));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        conn.close();
        assert!(!driver.is_subscribed(0));
        assert!(!driver.send(0, 10, &[0x80, 60, 0]));
    }

    #[test]
    fn test_connect_to_unplugged_port_fails() {
        let driver = LoopbackDriver::new();
        let result = driver.connect(&PortInfo::new(3, "Gone"), Box::new(|_, _| {}));
        assert!(matches!(result, Err(RecorderError::PortNotFound(_))));
    }

    #[test]
    fn test_stale_close_keeps_new_subscription() {
        let driver = LoopbackDriver::new();
        let port = PortInfo::new(0, "USB MIDI A");
        driver.plug(port.clone());

        let old = driver.connect(&port, Box::new(|_, _| {})).unwrap();
        driver.unplug(0);
        driver.plug(port.clone());
        let _new = driver.connect(&port, Box::new(|_, _| {})).unwrap();

        old.close();
        assert!(driver.is_subscribed(0));
    }
}
