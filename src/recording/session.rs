// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Recording sessions.
//!
//! A session is everything played between two idle periods: fixed track
//! metadata plus the received messages with their tick deltas, in arrival
//! order.

use std::io::{self, Write};

use super::export::SmfWriter;
use crate::timing::MetricTicks;

/// Metadata written at the start of every recording
#[derive(Debug, Clone, PartialEq)]
pub struct TrackOptions {
    /// Time signature numerator
    pub meter_numerator: u8,
    /// Time signature denominator (power of two)
    pub meter_denominator: u8,
    /// Tempo in BPM
    pub tempo: f64,
    /// Instrument name meta event
    pub instrument: String,
}

impl Default for TrackOptions {
    fn default() -> Self {
        Self {
            meter_numerator: 4,
            meter_denominator: 4,
            tempo: 120.0,
            instrument: "Piano".to_string(),
        }
    }
}

/// A received message and its distance from the previous one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    /// Ticks since the previous event (or session start)
    pub delta: u32,
    /// Raw MIDI bytes as delivered by the device
    pub data: Vec<u8>,
}

/// An open recording
#[derive(Debug, Clone)]
pub struct Session {
    options: TrackOptions,
    events: Vec<SessionEvent>,
}

impl Session {
    /// Open a session with the given metadata
    pub fn new(options: TrackOptions) -> Self {
        Self {
            options,
            events: Vec::new(),
        }
    }

    /// Append a message
    pub fn push(&mut self, delta: u32, data: Vec<u8>) {
        self.events.push(SessionEvent { delta, data });
    }

    pub fn options(&self) -> &TrackOptions {
        &self.options
    }

    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Total length of the session in ticks
    pub fn total_ticks(&self) -> u64 {
        self.events.iter().map(|e| e.delta as u64).sum()
    }

    /// Serialize as a Standard MIDI File
    pub fn write_to<W: Write>(&self, writer: &mut W, ticks: MetricTicks) -> io::Result<()> {
        SmfWriter::new(ticks).write(writer, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_track_options() {
        let options = TrackOptions::default();
        assert_eq!(options.meter_numerator, 4);
        assert_eq!(options.meter_denominator, 4);
        assert_eq!(options.tempo, 120.0);
        assert_eq!(options.instrument, "Piano");
    }

    #[test]
    fn test_push_keeps_arrival_order() {
        let mut session = Session::new(TrackOptions::default());
        assert!(session.is_empty());

        session.push(0, vec![0x90, 60, 100]);
        session.push(96, vec![0x80, 60, 0]);
        session.push(48, vec![0x90, 64, 90]);

        assert_eq!(session.len(), 3);
        let notes: Vec<u8> = session.events().iter().map(|e| e.data[1]).collect();
        assert_eq!(notes, vec![60, 60, 64]);
        assert_eq!(session.total_ticks(), 144);
    }

    #[test]
    fn test_write_to_produces_midi_file() {
        let mut session = Session::new(TrackOptions::default());
        session.push(0, vec![0x90, 60, 100]);

        let mut bytes = Vec::new();
        session.write_to(&mut bytes, MetricTicks::default()).unwrap();
        assert_eq!(&bytes[0..4], b"MThd");
    }
}
