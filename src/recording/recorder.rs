// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Idle-segmented MIDI recorder.
//!
//! Messages from the port manager are queued into a bounded channel and
//! consumed by a single worker thread, which owns the open session. When
//! no message arrives for the idle timeout, the session is written to the
//! sink and the next message starts a new one.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use super::session::{Session, TrackOptions};
use super::sink::SessionSink;
use crate::error::{RecorderError, Result};
use crate::midi::PortListener;
use crate::timing::MetricTicks;

/// Default event queue size
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Options for the recorder
#[derive(Debug, Clone)]
pub struct RecorderOptions {
    /// Metadata for every session
    pub track: TrackOptions,
    /// Inactivity after which the open session is saved
    pub idle_timeout: Duration,
    /// Bounded queue size between the device callback and the worker
    pub queue_capacity: usize,
    /// Time base of the recordings
    pub ticks: MetricTicks,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            track: TrackOptions::default(),
            idle_timeout: Duration::from_secs(10),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            ticks: MetricTicks::default(),
        }
    }
}

/// A received message waiting to be recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventUnit {
    /// Raw MIDI bytes
    pub message: Vec<u8>,
    /// Time since the previous message on the same port binding
    pub elapsed: Duration,
}

impl EventUnit {
    pub fn new(message: Vec<u8>, elapsed: Duration) -> Self {
        Self { message, elapsed }
    }
}

/// Counters reported when the recorder shuts down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    /// Messages appended to a session
    pub events_recorded: u64,
    /// Sessions written and closed successfully
    pub sessions_flushed: u64,
    /// Sessions lost to sink, write or close errors
    pub sessions_failed: u64,
}

enum Command {
    Record(EventUnit),
    Shutdown,
}

/// Handle to the recording worker.
///
/// Dropping the handle shuts the worker down the same way `shutdown` does.
pub struct Recorder {
    queue: SyncSender<Command>,
    worker: Option<JoinHandle<RecorderStats>>,
}

impl Recorder {
    /// Spawn the worker thread
    pub fn start<S: SessionSink>(options: RecorderOptions, sink: S) -> Result<Self> {
        let (queue, commands) = mpsc::sync_channel(options.queue_capacity.max(1));

        let worker = Worker {
            options,
            sink,
            session: None,
            stats: RecorderStats::default(),
        };
        let handle = thread::Builder::new()
            .name("recorder".to_string())
            .spawn(move || worker.run(commands))?;

        Ok(Self {
            queue,
            worker: Some(handle),
        })
    }

    /// Listener that feeds this recorder, for registration with a port manager
    pub fn listener(&self) -> Arc<dyn PortListener> {
        Arc::new(RecorderInput {
            queue: self.queue.clone(),
        })
    }

    /// Queue a message, blocking while the queue is full
    pub fn submit(&self, unit: EventUnit) -> Result<()> {
        self.queue
            .send(Command::Record(unit))
            .map_err(|_| RecorderError::Stopped)
    }

    /// Record everything still queued, save the open session and stop
    pub fn shutdown(mut self) -> RecorderStats {
        self.finish()
    }

    fn finish(&mut self) -> RecorderStats {
        let Some(handle) = self.worker.take() else {
            return RecorderStats::default();
        };

        let _ = self.queue.send(Command::Shutdown);
        handle.join().unwrap_or_else(|_| {
            error!("recorder worker panicked");
            RecorderStats::default()
        })
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.finish();
    }
}

/// The recorder's side of the port listener interface
struct RecorderInput {
    queue: SyncSender<Command>,
}

impl PortListener for RecorderInput {
    fn on_message(&self, message: &[u8], elapsed: Duration) {
        // Blocks when the queue is full; nothing is dropped while the worker runs
        let unit = EventUnit::new(message.to_vec(), elapsed);
        if self.queue.send(Command::Record(unit)).is_err() {
            debug!("recorder stopped, dropping message");
        }
    }
}

/// Sole owner of the open session
struct Worker<S> {
    options: RecorderOptions,
    sink: S,
    session: Option<Session>,
    stats: RecorderStats,
}

impl<S: SessionSink> Worker<S> {
    fn run(mut self, commands: Receiver<Command>) -> RecorderStats {
        // Armed only while a session is open
        let mut deadline: Option<Instant> = None;

        loop {
            let command = match deadline {
                Some(at) => {
                    match commands.recv_timeout(at.saturating_duration_since(Instant::now())) {
                        Ok(command) => command,
                        Err(RecvTimeoutError::Timeout) => {
                            self.flush();
                            deadline = None;
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match commands.recv() {
                    Ok(command) => command,
                    Err(_) => break,
                },
            };

            match command {
                Command::Record(unit) => {
                    self.record(unit);
                    deadline = Some(Instant::now() + self.options.idle_timeout);
                }
                Command::Shutdown => break,
            }
        }

        self.flush();
        debug!("recorder stopped");
        self.stats
    }

    fn record(&mut self, unit: EventUnit) {
        let delta = self.options.ticks.ticks(self.options.track.tempo, unit.elapsed);

        let session = self.session.get_or_insert_with(|| {
            debug!("starting new session");
            Session::new(self.options.track.clone())
        });
        debug!(delta, bytes = unit.message.len(), "recorded message");
        session.push(delta, unit.message);
        self.stats.events_recorded += 1;
    }

    fn flush(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        let mut output = match self.sink.open() {
            Ok(output) => output,
            Err(e) => {
                error!("got error while attempting to open recording output: {}", e);
                self.stats.sessions_failed += 1;
                return;
            }
        };

        let written = session.write_to(&mut output, self.options.ticks);
        if let Err(e) = &written {
            error!("got error while attempting to save recording: {}", e);
        }

        let closed = output.flush();
        if let Err(e) = &closed {
            error!("got error while attempting to close output file: {}", e);
        }
        drop(output);

        if written.is_ok() && closed.is_ok() {
            self.stats.sessions_flushed += 1;
            info!(
                events = session.len(),
                ticks = session.total_ticks(),
                "saved recording"
            );
        } else {
            self.stats.sessions_failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::sink::{MemorySink, SessionOutput};
    use midly::{MetaMessage, MidiMessage, Smf, TrackEventKind};
    use std::io;

    fn options(idle_timeout: Duration) -> RecorderOptions {
        RecorderOptions {
            idle_timeout,
            ..Default::default()
        }
    }

    fn note_on(key: u8) -> Vec<u8> {
        vec![0x90, key, 100]
    }

    /// (delta, key) of every Note On in a recording
    fn notes(bytes: &[u8]) -> Vec<(u32, u8)> {
        let smf = Smf::parse(bytes).unwrap();
        smf.tracks[0]
            .iter()
            .filter_map(|event| match event.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { key, .. },
                    ..
                } => Some((event.delta.as_int(), key.as_int())),
                _ => None,
            })
            .collect()
    }

    fn has_metadata(bytes: &[u8]) -> bool {
        let smf = Smf::parse(bytes).unwrap();
        let track = &smf.tracks[0];
        let tempo = track
            .iter()
            .any(|e| matches!(e.kind, TrackEventKind::Meta(MetaMessage::Tempo(_))));
        let meter = track
            .iter()
            .any(|e| matches!(e.kind, TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, _, _))));
        let instrument = track
            .iter()
            .any(|e| matches!(e.kind, TrackEventKind::Meta(MetaMessage::InstrumentName(b"Piano"))));
        tempo && meter && instrument
    }

    #[test]
    fn test_ticks_follow_elapsed_time() {
        let sink = MemorySink::new();
        let recorder = Recorder::start(options(Duration::from_secs(10)), sink.clone()).unwrap();

        recorder.submit(EventUnit::new(note_on(60), Duration::ZERO)).unwrap();
        recorder.submit(EventUnit::new(note_on(62), Duration::from_millis(500))).unwrap();
        recorder.submit(EventUnit::new(note_on(64), Duration::from_millis(250))).unwrap();
        recorder.shutdown();

        let recordings = sink.recordings();
        assert_eq!(recordings.len(), 1);
        assert_eq!(notes(&recordings[0]), vec![(0, 60), (96, 62), (48, 64)]);
    }

    #[test]
    fn test_idle_timeout_splits_sessions() {
        let sink = MemorySink::new();
        let recorder = Recorder::start(options(Duration::from_millis(100)), sink.clone()).unwrap();

        recorder.submit(EventUnit::new(note_on(60), Duration::ZERO)).unwrap();
        recorder.submit(EventUnit::new(note_on(61), Duration::from_millis(10))).unwrap();
        thread::sleep(Duration::from_millis(300));
        assert_eq!(sink.len(), 1);

        recorder.submit(EventUnit::new(note_on(72), Duration::from_secs(12))).unwrap();
        let stats = recorder.shutdown();

        let recordings = sink.recordings();
        assert_eq!(recordings.len(), 2);
        assert_eq!(notes(&recordings[0]), vec![(0, 60), (2, 61)]);
        // 12 s at 120 BPM
        assert_eq!(notes(&recordings[1]), vec![(2304, 72)]);
        assert_eq!(stats.sessions_flushed, 2);
        assert_eq!(stats.events_recorded, 3);
    }

    #[test]
    fn test_session_opening_message_keeps_its_gap() {
        let sink = MemorySink::new();
        let recorder = Recorder::start(options(Duration::from_millis(50)), sink.clone()).unwrap();

        recorder.submit(EventUnit::new(note_on(60), Duration::from_millis(500))).unwrap();
        thread::sleep(Duration::from_millis(200));
        recorder.submit(EventUnit::new(note_on(62), Duration::from_millis(500))).unwrap();
        recorder.shutdown();

        let recordings = sink.recordings();
        assert_eq!(recordings.len(), 2);
        assert_eq!(notes(&recordings[0]), vec![(96, 60)]);
        assert_eq!(notes(&recordings[1]), vec![(96, 62)]);
    }

    #[test]
    fn test_every_session_has_metadata() {
        let sink = MemorySink::new();
        let recorder = Recorder::start(options(Duration::from_millis(50)), sink.clone()).unwrap();

        recorder.submit(EventUnit::new(note_on(60), Duration::ZERO)).unwrap();
        thread::sleep(Duration::from_millis(200));
        recorder.submit(EventUnit::new(note_on(60), Duration::ZERO)).unwrap();
        recorder.shutdown();

        let recordings = sink.recordings();
        assert_eq!(recordings.len(), 2);
        assert!(recordings.iter().all(|r| has_metadata(r)));
    }

    #[test]
    fn test_idle_without_session_writes_nothing() {
        let sink = MemorySink::new();
        let recorder = Recorder::start(options(Duration::from_millis(20)), sink.clone()).unwrap();

        thread::sleep(Duration::from_millis(100));
        let stats = recorder.shutdown();

        assert!(sink.is_empty());
        assert_eq!(stats, RecorderStats::default());
    }

    #[test]
    fn test_shutdown_flushes_open_session() {
        let sink = MemorySink::new();
        let recorder = Recorder::start(options(Duration::from_secs(60)), sink.clone()).unwrap();

        for key in 60..63 {
            recorder.submit(EventUnit::new(note_on(key), Duration::ZERO)).unwrap();
        }
        assert!(sink.is_empty());

        let stats = recorder.shutdown();
        assert_eq!(stats.sessions_flushed, 1);
        assert_eq!(sink.len(), 1);
        assert_eq!(notes(&sink.recordings()[0]).len(), 3);
    }

    #[test]
    fn test_drop_flushes_open_session() {
        let sink = MemorySink::new();
        {
            let recorder = Recorder::start(options(Duration::from_secs(60)), sink.clone()).unwrap();
            recorder.submit(EventUnit::new(note_on(60), Duration::ZERO)).unwrap();
        }
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_order_is_preserved() {
        let sink = MemorySink::new();
        let recorder = Recorder::start(options(Duration::from_secs(60)), sink.clone()).unwrap();

        for key in 0..120u8 {
            recorder.submit(EventUnit::new(note_on(key), Duration::from_millis(1))).unwrap();
        }
        recorder.shutdown();

        let keys: Vec<u8> = notes(&sink.recordings()[0]).into_iter().map(|(_, k)| k).collect();
        assert_eq!(keys, (0..120u8).collect::<Vec<_>>());
    }

    #[test]
    fn test_full_queue_blocks_instead_of_dropping() {
        let sink = MemorySink::new();
        let recorder = Recorder::start(
            RecorderOptions {
                queue_capacity: 2,
                ..options(Duration::from_secs(60))
            },
            sink.clone(),
        )
        .unwrap();

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let listener = recorder.listener();
                thread::spawn(move || {
                    for _ in 0..500 {
                        listener.on_message(&[0x90, 60, 100], Duration::ZERO);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let stats = recorder.shutdown();
        assert_eq!(stats.events_recorded, 2000);
        assert_eq!(notes(&sink.recordings()[0]).len(), 2000);
    }

    #[test]
    fn test_sink_failure_drops_session_and_continues() {
        let memory = MemorySink::new();
        let mut inner = memory.clone();
        let mut attempts = 0;
        let sink = move || -> io::Result<SessionOutput> {
            attempts += 1;
            if attempts == 1 {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
            } else {
                inner.open()
            }
        };

        let recorder = Recorder::start(options(Duration::from_millis(50)), sink).unwrap();
        recorder.submit(EventUnit::new(note_on(60), Duration::ZERO)).unwrap();
        thread::sleep(Duration::from_millis(200));
        recorder.submit(EventUnit::new(note_on(64), Duration::ZERO)).unwrap();
        let stats = recorder.shutdown();

        assert_eq!(stats.sessions_failed, 1);
        assert_eq!(stats.sessions_flushed, 1);
        let recordings = memory.recordings();
        assert_eq!(recordings.len(), 1);
        assert_eq!(notes(&recordings[0]), vec![(0, 64)]);
    }

    #[test]
    fn test_write_failure_counts_as_failed() {
        struct Broken;

        impl io::Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "disk full"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let sink = || -> io::Result<SessionOutput> { Ok(Box::new(Broken)) };
        let recorder = Recorder::start(options(Duration::from_secs(60)), sink).unwrap();
        recorder.submit(EventUnit::new(note_on(60), Duration::ZERO)).unwrap();

        let stats = recorder.shutdown();
        assert_eq!(stats.sessions_failed, 1);
        assert_eq!(stats.sessions_flushed, 0);
    }

    #[test]
    fn test_listener_outlives_recorder() {
        let recorder = Recorder::start(options(Duration::from_secs(60)), MemorySink::new()).unwrap();
        let listener = recorder.listener();
        recorder.shutdown();

        // Must not panic or block
        listener.on_message(&[0x90, 60, 100], Duration::ZERO);
    }
}
