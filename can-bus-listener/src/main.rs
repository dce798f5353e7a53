//! CAN Bus Listener
//!
//! Listens for J1939 messages on a SocketCAN interface and republishes them
//! to a named FIFO. It uses the pgn-decoder library and adds:
//! - Interface bring-up wait and teardown
//! - Message counting and quiet-time tracking
//! - Periodic heartbeat records
//! - Best-effort JSON-lines publishing for a local dashboard

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use can_bus_listener::{
    config, interface, AppConfig, BusLifecycle, CanProcessor, HeartbeatTracker, InterruptFlag,
    IpLinkControl, LifecycleSettings, StatusPublisher,
};

/// CAN Bus Listener - Decode J1939 PGNs and publish readings to a FIFO
#[derive(Parser, Debug)]
#[command(name = "can-bus-listener")]
#[command(about = "Decode J1939 PGNs from a CAN bus and publish them to a named pipe", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// CAN interface to listen on (overrides config)
    #[arg(short, long, value_name = "IFACE")]
    interface: Option<String>,

    /// Named pipe to publish records to (overrides config)
    #[arg(short, long, value_name = "FILE")]
    pipe: Option<PathBuf>,

    /// Write logs to this file instead of stderr (overrides config)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => {
            init_logging(args.verbose, args.quiet, None);
            log::error!("Critical error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(args.verbose, args.quiet, config.logging.file.as_deref());

    log::info!("CAN Bus Listener v{}", can_bus_listener::VERSION);
    log::info!("Using decoder library v{}", pgn_decoder::VERSION);

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Critical error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Load the config file (if any) and apply command-line overrides
fn resolve_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => AppConfig::default(),
    };

    if let Some(interface) = &args.interface {
        config.bus.interface = interface.clone();
    }
    if let Some(pipe) = &args.pipe {
        config.publisher.pipe_path = pipe.clone();
    }
    if let Some(log_file) = &args.log_file {
        config.logging.file = Some(log_file.clone());
    }

    Ok(config)
}

fn run(config: &AppConfig) -> Result<()> {
    let interrupt = InterruptFlag::install().context("Failed to install signal handlers")?;

    let table = config.build_table()?;
    log::info!("PGN table loaded: {} definitions", table.len());

    let publisher = StatusPublisher::new(&config.publisher.pipe_path)
        .with_context(|| format!("Failed to create pipe {:?}", config.publisher.pipe_path))?;
    log::info!("Publishing records to {:?}", publisher.path());

    let tracker = HeartbeatTracker::new(config.publisher.heartbeat_interval());
    log::info!("Heartbeat interval: {:?}", tracker.interval());

    let mut processor = CanProcessor::new(pgn_decoder::PgnDecoder::new(table), tracker, publisher);

    log::info!(
        "Interface {} (bitrate {} set externally)",
        config.bus.interface,
        config.bus.bitrate
    );
    let mut lifecycle = BusLifecycle::new(
        LifecycleSettings::from_config(&config.bus),
        IpLinkControl::new(config.bus.teardown_with_sudo),
    );

    lifecycle.run(open_bus, &mut processor, &interrupt)?;
    Ok(())
}

#[cfg(target_os = "linux")]
fn open_bus(ifname: &str) -> Result<interface::SocketCanSource, interface::BusError> {
    interface::SocketCanSource::open(ifname)
}

#[cfg(not(target_os = "linux"))]
fn open_bus(_ifname: &str) -> Result<UnsupportedSource, interface::BusError> {
    Err(interface::BusError::Unsupported(
        "SocketCAN is only available on Linux".to_string(),
    ))
}

#[cfg(not(target_os = "linux"))]
enum UnsupportedSource {}

#[cfg(not(target_os = "linux"))]
impl interface::FrameSource for UnsupportedSource {
    fn recv(
        &mut self,
        _timeout: std::time::Duration,
    ) -> Result<Option<pgn_decoder::RawFrame>, interface::BusError> {
        match *self {}
    }
}

/// Initialize logging based on verbosity level and optional log file
fn init_logging(verbose: u8, quiet: bool, log_file: Option<&Path>) {
    use env_logger::{Builder, Target};
    use log::LevelFilter;
    use std::fs::OpenOptions;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    let mut builder = Builder::new();
    builder.filter_level(level).format(|buf, record| {
        writeln!(
            buf,
            "{} - {} - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            record.level(),
            record.args()
        )
    });

    let mut file_error = None;
    if let Some(path) = log_file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => file_error = Some((path.to_path_buf(), e)),
        }
    }

    builder.init();

    if let Some((path, e)) = file_error {
        log::warn!("Cannot open log file {:?} ({}), logging to stderr", path, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "can-bus-listener",
            "--interface",
            "vcan0",
            "--pipe",
            "/tmp/test_pipe",
            "-vv",
        ]);
        assert_eq!(args.verbose, 2);

        let config = resolve_config(&args).unwrap();
        assert_eq!(config.bus.interface, "vcan0");
        assert_eq!(config.publisher.pipe_path, PathBuf::from("/tmp/test_pipe"));
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let args = Args::parse_from(["can-bus-listener", "--config", "/nonexistent/config.toml"]);
        assert!(resolve_config(&args).is_err());
    }
}
