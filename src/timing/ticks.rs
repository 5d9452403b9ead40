// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Metrical tick conversion.
//!
//! A recording uses one fixed resolution (ticks per quarter note) for the
//! lifetime of the process. Real-time gaps are scaled by the session tempo
//! and rounded to the nearest whole tick.

use std::time::Duration;

/// Ticks Per Quarter Note written to every recording
pub const DEFAULT_RESOLUTION: u16 = 96;

/// Metrical time base (ticks per quarter note)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricTicks(u16);

impl MetricTicks {
    /// Create a time base with the given resolution (minimum 1)
    pub fn new(resolution: u16) -> Self {
        Self(resolution.max(1))
    }

    /// Ticks per quarter note
    pub fn resolution(&self) -> u16 {
        self.0
    }

    /// Length of one tick in milliseconds at the given tempo
    pub fn tick_duration_ms(&self, tempo: f64) -> f64 {
        60_000.0 / tempo / self.0 as f64
    }

    /// Convert an elapsed real-time gap into whole ticks.
    ///
    /// Rounds to the nearest tick, so the error per event is at most half
    /// a tick. Degenerate tempos yield 0.
    pub fn ticks(&self, tempo: f64, elapsed: Duration) -> u32 {
        let tick_ms = self.tick_duration_ms(tempo);
        if !tick_ms.is_finite() || tick_ms <= 0.0 {
            return 0;
        }

        let ticks = (elapsed.as_secs_f64() * 1000.0 / tick_ms).round();
        if ticks.is_nan() || ticks <= 0.0 {
            0
        } else {
            ticks.min(u32::MAX as f64) as u32
        }
    }
}

impl Default for MetricTicks {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLUTION)
    }
}
