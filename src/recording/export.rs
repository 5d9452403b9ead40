// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Standard MIDI file export.
//!
//! Writes one session as a Type 0 MIDI file: a single track holding the
//! session metadata followed by every recorded message.

use std::io::{self, Write};

use super::session::{Session, TrackOptions};
use crate::midi::messages;
use crate::timing::MetricTicks;

/// Largest delta a variable-length quantity can hold (28 bits)
const MAX_DELTA: u32 = 0x0FFF_FFFF;

/// Largest tempo value a tempo meta event can hold (24 bits)
const MAX_TEMPO_MICROS: u32 = 0x00FF_FFFF;

/// Track event ready for writing
#[derive(Debug, Clone, PartialEq)]
struct TrackEvent {
    /// Ticks since the previous written event
    delta: u32,
    /// Event bytes after the delta
    data: Vec<u8>,
}

impl TrackEvent {
    fn tempo(bpm: f64) -> Self {
        let microseconds = (60_000_000.0 / bpm).round().clamp(1.0, MAX_TEMPO_MICROS as f64) as u32;
        Self {
            delta: 0,
            data: vec![
                0xFF, 0x51, 0x03,
                ((microseconds >> 16) & 0xFF) as u8,
                ((microseconds >> 8) & 0xFF) as u8,
                (microseconds & 0xFF) as u8,
            ],
        }
    }

    fn time_signature(numerator: u8, denominator: u8) -> Self {
        // Denominator is expressed as power of 2
        let denom_power = denominator.max(1).trailing_zeros() as u8;
        Self {
            delta: 0,
            data: vec![
                0xFF, 0x58, 0x04,
                numerator,
                denom_power,
                24, // MIDI clocks per metronome click
                8,  // 32nd notes per MIDI quarter note
            ],
        }
    }

    fn instrument_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut data = vec![0xFF, 0x04];
        write_variable_length(&mut data, bytes.len() as u32);
        data.extend_from_slice(bytes);
        Self { delta: 0, data }
    }

    fn end_of_track() -> Self {
        Self {
            delta: 0,
            data: vec![0xFF, 0x2F, 0x00],
        }
    }

    /// Convert a raw device packet into file events.
    ///
    /// A packet may hold several channel messages, with or without running
    /// status. Only the first event carries `delta`; the rest follow at 0.
    /// Messages that have no place in a file (real-time, system common,
    /// truncated or stray data bytes) are dropped.
    fn from_message(delta: u32, message: &[u8]) -> Vec<Self> {
        let mut events: Vec<Self> = split_message(message)
            .into_iter()
            .map(|data| Self { delta: 0, data })
            .collect();
        if let Some(first) = events.first_mut() {
            first.delta = delta;
        }
        events
    }
}

/// Split a packet into storable messages, in file encoding
fn split_message(message: &[u8]) -> Vec<Vec<u8>> {
    if message.first() == Some(&messages::SYSEX_START) {
        return encode_sysex(message).into_iter().collect();
    }

    let mut found = Vec::new();
    let mut running: Option<u8> = None;
    let mut pending: Vec<u8> = Vec::with_capacity(2);

    for &byte in message {
        if byte >= messages::REALTIME {
            // Real-time bytes may interleave with anything and do not cancel running status
            continue;
        }
        if byte >= messages::SYSTEM {
            running = None;
            pending.clear();
            continue;
        }
        if byte >= 0x80 {
            running = Some(byte);
            pending.clear();
            continue;
        }

        let Some(status) = running else {
            continue;
        };
        pending.push(byte);
        if pending.len() == channel_data_len(status) {
            let mut data = Vec::with_capacity(3);
            data.push(status);
            data.append(&mut pending);
            found.push(data);
        }
    }

    found
}

/// F0 <length> <bytes after F0, up to and including F7>; unterminated SysEx is dropped
fn encode_sysex(message: &[u8]) -> Option<Vec<u8>> {
    let end = message.iter().position(|&b| b == messages::SYSEX_END)?;
    let body = &message[1..=end];
    let mut data = vec![messages::SYSEX_START];
    write_variable_length(&mut data, body.len() as u32);
    data.extend_from_slice(body);
    Some(data)
}

/// Data bytes following a channel status byte
fn channel_data_len(status: u8) -> usize {
    match status & 0xF0 {
        0xC0 | 0xD0 => 1,
        _ => 2,
    }
}

/// Session to MIDI file writer
pub struct SmfWriter {
    ticks: MetricTicks,
}

impl SmfWriter {
    pub fn new(ticks: MetricTicks) -> Self {
        Self { ticks }
    }

    /// Ticks per quarter note written to the header
    pub fn resolution(&self) -> u16 {
        self.ticks.resolution()
    }

    /// Write a complete MIDI file for the session
    pub fn write<W: Write>(&self, writer: &mut W, session: &Session) -> io::Result<()> {
        let events = self.track_events(session);
        self.write_header(writer)?;
        self.write_track(writer, &events)
    }

    /// Export to bytes
    pub fn to_bytes(&self, session: &Session) -> Vec<u8> {
        let mut buffer = Vec::new();
        // Writing to a Vec cannot fail
        let _ = self.write(&mut buffer, session);
        buffer
    }

    fn track_events(&self, session: &Session) -> Vec<TrackEvent> {
        let options: &TrackOptions = session.options();
        let mut events = vec![
            TrackEvent::time_signature(options.meter_numerator, options.meter_denominator),
            TrackEvent::tempo(options.tempo),
            TrackEvent::instrument_name(&options.instrument),
        ];

        // Time of skipped messages moves onto the next written event
        let mut carried = 0u32;
        for event in session.events() {
            let delta = carried.saturating_add(event.delta);
            let converted = TrackEvent::from_message(delta, &event.data);
            carried = if converted.is_empty() { delta } else { 0 };
            events.extend(converted);
        }

        let mut end = TrackEvent::end_of_track();
        end.delta = carried;
        events.push(end);
        events
    }

    /// Write MIDI file header chunk
    fn write_header<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        // MThd
        writer.write_all(b"MThd")?;
        // Chunk length (always 6)
        writer.write_all(&[0, 0, 0, 6])?;
        // Format 0
        writer.write_all(&0u16.to_be_bytes())?;
        // One track
        writer.write_all(&1u16.to_be_bytes())?;
        // PPQN
        writer.write_all(&self.resolution().to_be_bytes())?;
        Ok(())
    }

    /// Write a track chunk
    fn write_track<W: Write>(&self, writer: &mut W, events: &[TrackEvent]) -> io::Result<()> {
        let mut track_data = Vec::new();
        for event in events {
            write_variable_length(&mut track_data, event.delta);
            track_data.extend_from_slice(&event.data);
        }

        // MTrk
        writer.write_all(b"MTrk")?;
        // Track length
        let length = track_data.len() as u32;
        writer.write_all(&length.to_be_bytes())?;
        // Track data
        writer.write_all(&track_data)?;

        Ok(())
    }
}

/// Write variable-length quantity, saturating at 28 bits
fn write_variable_length(buffer: &mut Vec<u8>, value: u32) {
    let mut value = value.min(MAX_DELTA);
    let mut bytes = Vec::with_capacity(4);

    bytes.push((value & 0x7F) as u8);
    value >>= 7;

    while value > 0 {
        bytes.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }

    bytes.reverse();
    buffer.extend_from_slice(&bytes);
}
