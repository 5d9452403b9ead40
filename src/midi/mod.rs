// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! MIDI input abstraction layer.
//!
//! This module provides a trait-based abstraction over MIDI input drivers,
//! allowing different backends (midir, the in-process loopback, etc.) to
//! feed the port manager interchangeably.

pub mod loopback;
pub mod midir_backend;
pub mod ports;

use std::fmt;

use crate::error::Result;

pub use loopback::LoopbackDriver;
pub use midir_backend::MidirDriver;
pub use ports::{ListenerRegistry, PortListener, PortManager, PortManagerOptions, PortSelector};

/// An input port as reported by the driver's enumeration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortInfo {
    /// Position in the driver's enumeration order
    pub number: usize,
    /// Human readable port name
    pub name: String,
}

impl PortInfo {
    pub fn new(number: usize, name: impl Into<String>) -> Self {
        Self {
            number,
            name: name.into(),
        }
    }
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {}", self.number, self.name)
    }
}

/// Callback invoked by a driver for every received message.
///
/// The first argument is the time in microseconds since the subscription
/// was established, the second the raw message bytes.
pub type InputCallback = Box<dyn FnMut(u64, &[u8]) + Send + 'static>;

/// A live subscription to an input port.
pub trait InputConnection {
    /// Stop delivering messages and release the port.
    fn close(self: Box<Self>);
}

/// Trait for MIDI input drivers.
pub trait MidiDriver: Send {
    /// Enumerate the input ports currently visible to the driver.
    fn input_ports(&self) -> Result<Vec<PortInfo>>;

    /// Subscribe to a port, delivering every message to `callback`.
    fn connect(&self, port: &PortInfo, callback: InputCallback) -> Result<Box<dyn InputConnection>>;
}

/// Print all available MIDI input ports to stdout
pub fn print_ports(driver: &dyn MidiDriver) -> Result<()> {
    let ports = driver.input_ports()?;
    if ports.is_empty() {
        println!("No MIDI input ports found.");
    } else {
        for port in ports {
            println!("{}", port);
        }
    }
    Ok(())
}

/// MIDI status byte constants
pub mod messages {
    // System Common Messages
    pub const SYSEX_START: u8 = 0xF0;
    pub const SYSEX_END: u8 = 0xF7;

    /// First status byte that is not a channel message
    pub const SYSTEM: u8 = 0xF0;

    /// First system real-time status byte (clock, start, stop, active sensing)
    pub const REALTIME: u8 = 0xF8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_info_display() {
        let port = PortInfo::new(1, "Keyboard B");
        assert_eq!(port.to_string(), "1 | Keyboard B");
    }

    #[test]
    fn test_print_ports_from_loopback() {
        let driver = LoopbackDriver::new();
        driver.plug(PortInfo::new(0, "USB MIDI A"));
        assert!(print_ports(&driver).is_ok());
    }

    #[test]
    fn test_print_ports_propagates_enumeration_error() {
        let driver = LoopbackDriver::new();
        driver.fail_enumeration(true);
        assert!(print_ports(&driver).is_err());
    }
}
