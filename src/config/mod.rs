// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Configuration system for the recorder.
//!
//! This module provides data structures for loading the recorder settings
//! from TOML: which port to follow, the metadata stamped on every
//! recording, and where and when recordings are written.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::midi::{PortManagerOptions, PortSelector};
use crate::recording::{RecorderOptions, TrackOptions, DEFAULT_QUEUE_CAPACITY};
use crate::timing::MetricTicks;

/// Settings that cannot be used to start the recorder
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("no port selected; set a port number or a port name")]
    MissingPort,

    #[error("port number and port name are mutually exclusive")]
    ConflictingPort,

    #[error("port poll interval must be at least one second")]
    PollInterval,

    #[error("idle timeout must be at least one second")]
    Timeout,

    #[error("invalid tempo: {0}")]
    Tempo(f64),

    #[error("invalid meter: {numerator}/{denominator}")]
    Meter { numerator: u8, denominator: u8 },

    #[error("queue capacity must be greater than zero")]
    QueueCapacity,
}

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecorderConfig {
    /// Port selection and scanning
    #[serde(default)]
    pub port: PortConfig,
    /// Metadata for every recording
    #[serde(default)]
    pub track: TrackConfig,
    /// Output location and idle segmentation
    #[serde(default)]
    pub recording: RecordingConfig,
}

impl RecorderConfig {
    /// Load a configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml(&contents)
    }

    /// Parse a configuration from TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse TOML configuration")
    }

    /// Check every setting, reporting the first problem found
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.selector()?;

        if self.port.poll_interval == 0 {
            return Err(ConfigError::PollInterval);
        }
        if self.recording.timeout == 0 {
            return Err(ConfigError::Timeout);
        }
        if self.recording.queue_capacity == 0 {
            return Err(ConfigError::QueueCapacity);
        }

        let tempo = self.track.tempo;
        if !tempo.is_finite() || tempo <= 0.0 {
            return Err(ConfigError::Tempo(tempo));
        }

        let numerator = self.track.meter_numerator;
        let denominator = self.track.meter_denominator;
        if numerator == 0 || !denominator.is_power_of_two() {
            return Err(ConfigError::Meter { numerator, denominator });
        }

        Ok(())
    }

    /// The port selector; an empty name counts as unset
    pub fn selector(&self) -> std::result::Result<PortSelector, ConfigError> {
        let name = self.port.name.as_deref().filter(|name| !name.is_empty());
        match (self.port.number, name) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingPort),
            (Some(number), None) => Ok(PortSelector::by_number(number)),
            (None, Some(name)) => Ok(PortSelector::by_name(name)),
            (None, None) => Err(ConfigError::MissingPort),
        }
    }

    pub fn manager_options(&self) -> std::result::Result<PortManagerOptions, ConfigError> {
        Ok(PortManagerOptions {
            selector: self.selector()?,
            poll_interval: Duration::from_secs(self.port.poll_interval),
        })
    }

    pub fn track_options(&self) -> TrackOptions {
        TrackOptions {
            meter_numerator: self.track.meter_numerator,
            meter_denominator: self.track.meter_denominator,
            tempo: self.track.tempo,
            instrument: self.track.instrument.clone(),
        }
    }

    pub fn recorder_options(&self) -> RecorderOptions {
        RecorderOptions {
            track: self.track_options(),
            idle_timeout: Duration::from_secs(self.recording.timeout),
            queue_capacity: self.recording.queue_capacity,
            ticks: MetricTicks::default(),
        }
    }
}

/// Port selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortConfig {
    /// Port number in enumeration order
    #[serde(default)]
    pub number: Option<usize>,
    /// Case-insensitive keyword matched against port names
    #[serde(default)]
    pub name: Option<String>,
    /// Seconds between port scans
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

fn default_poll_interval() -> u64 {
    5
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            number: None,
            name: None,
            poll_interval: default_poll_interval(),
        }
    }
}

/// Recording metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackConfig {
    /// Time signature numerator
    #[serde(default = "default_meter_numerator")]
    pub meter_numerator: u8,
    /// Time signature denominator
    #[serde(default = "default_meter_denominator")]
    pub meter_denominator: u8,
    /// Tempo in BPM
    #[serde(default = "default_tempo")]
    pub tempo: f64,
    /// Instrument name
    #[serde(default = "default_instrument")]
    pub instrument: String,
}

fn default_meter_numerator() -> u8 {
    4
}
fn default_meter_denominator() -> u8 {
    4
}
fn default_tempo() -> f64 {
    120.0
}
fn default_instrument() -> String {
    "Piano".to_string()
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            meter_numerator: default_meter_numerator(),
            meter_denominator: default_meter_denominator(),
            tempo: default_tempo(),
            instrument: default_instrument(),
        }
    }
}

/// Output and segmentation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordingConfig {
    /// Root directory for recordings
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// Idle seconds before a recording is closed
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Messages buffered between the device and the recorder
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_output() -> PathBuf {
    PathBuf::from("output")
}
fn default_timeout() -> u64 {
    10
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            timeout: default_timeout(),
            queue_capacity: default_queue_capacity(),
        }
    }
}
