// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! midir backend.
//!
//! This module provides a cross-platform implementation of the `MidiDriver`
//! trait on top of midir (ALSA, Core MIDI, WinMM).

use std::time::Instant;

use midir::{Ignore, MidiInput, MidiInputConnection};

use super::{InputCallback, InputConnection, MidiDriver, PortInfo};
use crate::error::{RecorderError, Result};

/// midir-backed input driver.
pub struct MidirDriver {
    client_name: String,
}

impl MidirDriver {
    /// Create a driver that registers with the system under `client_name`.
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }

    fn client(&self) -> Result<MidiInput> {
        let mut input = MidiInput::new(&self.client_name)?;
        // Record everything the device sends, including SysEx
        input.ignore(Ignore::None);
        Ok(input)
    }
}

impl MidiDriver for MidirDriver {
    fn input_ports(&self) -> Result<Vec<PortInfo>> {
        let input = self.client()?;

        let ports = input
            .ports()
            .iter()
            .enumerate()
            .filter_map(|(i, port)| input.port_name(port).ok().map(|name| PortInfo::new(i, name)))
            .collect();

        Ok(ports)
    }

    fn connect(&self, port: &PortInfo, mut callback: InputCallback) -> Result<Box<dyn InputConnection>> {
        let input = self.client()?;

        // Enumeration order may have shifted since the scan; require the name to match too
        let target = input
            .ports()
            .get(port.number)
            .filter(|p| input.port_name(p).map(|name| name == port.name).unwrap_or(false))
            .cloned()
            .ok_or_else(|| RecorderError::PortNotFound(port.to_string()))?;

        // midir timestamps have a backend-specific origin; measure from the subscription instead
        let started = Instant::now();
        let connection = input
            .connect(
                &target,
                &format!("{} input", self.client_name),
                move |_stamp, message, _| {
                    callback(started.elapsed().as_micros() as u64, message);
                },
                (),
            )
            .map_err(|e| RecorderError::Bind {
                port: port.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(MidirConnection(connection)))
    }
}

struct MidirConnection(MidiInputConnection<()>);

impl InputConnection for MidirConnection {
    fn close(self: Box<Self>) {
        let _ = self.0.close();
    }
}
