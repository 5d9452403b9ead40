// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! autorec - always-on MIDI recorder
//!
//! Follows one MIDI input port and writes everything played on it to
//! dated MIDI files, starting a new file after a period of silence.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use autorec::config::RecorderConfig;
use autorec::midi::{print_ports, MidirDriver, PortManager};
use autorec::recording::{DatedFileSink, Recorder};

#[derive(Parser, Debug)]
#[command(name = "autorec")]
#[command(about = "Always-on MIDI recorder")]
#[command(version)]
struct Cli {
    /// List the available MIDI input ports and exit
    #[arg(long)]
    show_ports: bool,

    /// TOML configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root directory for recordings
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Port number to record from (see --show-ports)
    #[arg(long, conflicts_with = "port_name")]
    port_number: Option<usize>,

    /// Keyword matched case-insensitively against port names
    #[arg(long)]
    port_name: Option<String>,

    /// Seconds between port scans
    #[arg(long)]
    port_poll_timeout: Option<u64>,

    /// Time signature numerator
    #[arg(long)]
    meter_numerator: Option<u8>,

    /// Time signature denominator
    #[arg(long)]
    meter_denominator: Option<u8>,

    /// Tempo in BPM
    #[arg(long)]
    tempo: Option<f64>,

    /// Instrument name stored in each recording
    #[arg(long)]
    instrument: Option<String>,

    /// Seconds of silence before a recording is closed
    #[arg(long)]
    timeout: Option<u64>,
}

impl Cli {
    /// Configuration file (or defaults) with command line overrides applied
    fn resolve(&self) -> Result<RecorderConfig> {
        let mut config = match &self.config {
            Some(path) => RecorderConfig::load(path)?,
            None => RecorderConfig::default(),
        };

        if let Some(number) = self.port_number {
            config.port.number = Some(number);
            config.port.name = None;
        }
        if let Some(name) = &self.port_name {
            config.port.name = Some(name.clone());
            config.port.number = None;
        }
        if let Some(poll_interval) = self.port_poll_timeout {
            config.port.poll_interval = poll_interval;
        }
        if let Some(numerator) = self.meter_numerator {
            config.track.meter_numerator = numerator;
        }
        if let Some(denominator) = self.meter_denominator {
            config.track.meter_denominator = denominator;
        }
        if let Some(tempo) = self.tempo {
            config.track.tempo = tempo;
        }
        if let Some(instrument) = &self.instrument {
            config.track.instrument = instrument.clone();
        }
        if let Some(output) = &self.output {
            config.recording.output = output.clone();
        }
        if let Some(timeout) = self.timeout {
            config.recording.timeout = timeout;
        }

        Ok(config)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let driver = MidirDriver::new("autorec");
    if cli.show_ports {
        print_ports(&driver)?;
        return Ok(());
    }

    let config = cli.resolve()?;
    config.validate()?;
    let manager_options = config.manager_options()?;

    let output = &config.recording.output;
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {:?}", output))?;

    let recorder = Recorder::start(config.recorder_options(), DatedFileSink::new(output))?;
    info!("searching for {}", manager_options.selector);
    let manager = PortManager::start(driver, manager_options)?;
    let listener = recorder.listener();
    manager.add_listener(Arc::clone(&listener));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for interrupt signal")?;
    info!("stopping...");

    let stats = tokio::task::spawn_blocking(move || {
        manager.remove_listener(&listener);
        let stats = recorder.shutdown();
        manager.stop();
        stats
    })
    .await?;

    info!(
        events = stats.events_recorded,
        saved = stats.sessions_flushed,
        failed = stats.sessions_failed,
        "stopped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use autorec::midi::PortSelector;

    #[test]
    fn test_flags_without_config_file() {
        let cli = Cli::try_parse_from([
            "autorec",
            "--port-name",
            "Keystation",
            "--tempo",
            "100",
            "--timeout",
            "30",
        ])
        .unwrap();

        let config = cli.resolve().unwrap();
        assert_eq!(config.selector(), Ok(PortSelector::by_name("keystation")));
        assert_eq!(config.track.tempo, 100.0);
        assert_eq!(config.recording.timeout, 30);
        assert_eq!(config.recording.output, PathBuf::from("output"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flag_overrides_config_port() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autorec.toml");
        fs::write(&path, "[port]\nname = \"usb\"\n\n[track]\ninstrument = \"Organ\"\n").unwrap();

        let cli = Cli::try_parse_from([
            "autorec",
            "--config",
            path.to_str().unwrap(),
            "--port-number",
            "0",
        ])
        .unwrap();

        let config = cli.resolve().unwrap();
        assert_eq!(config.selector(), Ok(PortSelector::by_number(0)));
        assert_eq!(config.track.instrument, "Organ");
    }

    #[test]
    fn test_port_flags_conflict() {
        let result = Cli::try_parse_from(["autorec", "--port-number", "1", "--port-name", "keys"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_show_ports_needs_no_selector() {
        let cli = Cli::try_parse_from(["autorec", "--show-ports"]).unwrap();
        assert!(cli.show_ports);
    }
}
