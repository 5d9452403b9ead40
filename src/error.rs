// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Error types for the recorder core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MIDI driver error: {0}")]
    Driver(String),

    #[error("MIDI port not found: {0}")]
    PortNotFound(String),

    #[error("failed to bind MIDI port {port}: {reason}")]
    Bind { port: String, reason: String },

    #[error("recorder is no longer running")]
    Stopped,
}

impl From<midir::InitError> for RecorderError {
    fn from(e: midir::InitError) -> Self {
        RecorderError::Driver(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;
