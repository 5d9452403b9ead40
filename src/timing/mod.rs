// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Timing module.
//!
//! Converts wall-clock gaps between incoming MIDI messages into the
//! metrical ticks stored in recorded sequences.

pub mod ticks;

pub use ticks::{MetricTicks, DEFAULT_RESOLUTION};
