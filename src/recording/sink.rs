// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Output targets for finished recordings.
//!
//! A sink hands out one fresh writer per session. The recorder writes a
//! complete MIDI file into it, flushes it and drops it; where the bytes end
//! up is entirely the sink's business.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Datelike, Local, Timelike};
use tracing::info;

/// Writer for one recording
pub type SessionOutput = Box<dyn Write + Send>;

/// Factory for recording outputs
pub trait SessionSink: Send + 'static {
    /// Open the destination for the next recording
    fn open(&mut self) -> io::Result<SessionOutput>;
}

impl<F> SessionSink for F
where
    F: FnMut() -> io::Result<SessionOutput> + Send + 'static,
{
    fn open(&mut self) -> io::Result<SessionOutput> {
        self()
    }
}

/// Writes each recording to `<root>/<year>/<month>/<day>/<H>h_<M>m_<S>s.midi`
#[derive(Debug, Clone)]
pub struct DatedFileSink {
    root: PathBuf,
}

impl DatedFileSink {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// File path for a recording started at `now`
    pub fn path_for(&self, now: &DateTime<Local>) -> PathBuf {
        self.day_dir(now).join(format!(
            "{}h_{}m_{}s.midi",
            now.hour(),
            now.minute(),
            now.second()
        ))
    }

    fn day_dir(&self, now: &DateTime<Local>) -> PathBuf {
        self.root
            .join(now.year().to_string())
            .join(now.format("%B").to_string())
            .join(now.day().to_string())
    }

    /// Create the file without clobbering one from the same second
    fn create_unique(path: &Path) -> io::Result<(File, PathBuf)> {
        let mut candidate = path.to_path_buf();
        for attempt in 1u32.. {
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(file) => return Ok((file, candidate)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempt < 1000 => {
                    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("recording");
                    candidate = path.with_file_name(format!("{}_{}.midi", stem, attempt));
                }
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(io::ErrorKind::AlreadyExists, "no free file name"))
    }

    fn open_at(&self, now: &DateTime<Local>) -> io::Result<(SessionOutput, PathBuf)> {
        fs::create_dir_all(self.day_dir(now))?;
        let (file, path) = Self::create_unique(&self.path_for(now))?;
        Ok((Box::new(BufWriter::new(file)), path))
    }
}

impl SessionSink for DatedFileSink {
    fn open(&mut self) -> io::Result<SessionOutput> {
        let (output, path) = self.open_at(&Local::now())?;
        info!("new recording at {:?}", path);
        Ok(output)
    }
}

/// Keeps finished recordings in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    recordings: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recordings closed so far, oldest first
    pub fn recordings(&self) -> Vec<Vec<u8>> {
        self.recordings.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.recordings.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionSink for MemorySink {
    fn open(&mut self) -> io::Result<SessionOutput> {
        Ok(Box::new(MemoryOutput {
            buffer: Vec::new(),
            recordings: Arc::clone(&self.recordings),
        }))
    }
}

/// Buffer that files itself with its sink when closed
struct MemoryOutput {
    buffer: Vec<u8>,
    recordings: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MemoryOutput {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        self.recordings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(buffer);
    }
}
