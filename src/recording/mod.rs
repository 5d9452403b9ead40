// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Recording and export system.
//!
//! This module provides:
//! - The queued, idle-segmented recorder
//! - Sessions and their metadata
//! - Standard MIDI file export
//! - Output sinks for finished recordings

pub mod export;
pub mod recorder;
pub mod session;
pub mod sink;

pub use export::SmfWriter;
pub use recorder::{EventUnit, Recorder, RecorderOptions, RecorderStats, DEFAULT_QUEUE_CAPACITY};
pub use session::{Session, SessionEvent, TrackOptions};
pub use sink::{DatedFileSink, MemorySink, SessionOutput, SessionSink};
