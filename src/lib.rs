// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! autorec - always-on MIDI recorder.
//!
//! Listens to one MIDI input port, collects everything played into a
//! sequence and writes it out as a Standard MIDI File once the device has
//! been idle for a while.

pub mod config;
pub mod error;
pub mod midi;
pub mod recording;
pub mod timing;

pub use error::{RecorderError, Result};
