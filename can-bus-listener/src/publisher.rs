//! Status publishing over a named FIFO
//!
//! Every record is one JSON object on one line. Writes are fire-and-forget:
//! if no reader is attached the record is dropped, never queued.

use crate::heartbeat::HeartbeatSnapshot;
use pgn_decoder::{DecodedReading, UNKNOWN_NAME};
use serde::Serialize;
use std::ffi::CString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

/// One published line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StatusRecord {
    /// A decoded parameter, value rendered with two decimals
    Reading {
        #[serde(rename = "PGNname")]
        name: String,
        value: String,
    },
    /// A frame whose PGN could not be decoded
    Unknown {
        #[serde(rename = "PGNname")]
        name: String,
        arbitration_id: String,
    },
    /// Periodic liveness statistics
    Heartbeat {
        uptime: String,
        messages_received: String,
        quiet_seconds: String,
    },
}

impl StatusRecord {
    pub fn from_reading(reading: &DecodedReading) -> Self {
        match reading {
            DecodedReading::Known { name, value } => StatusRecord::Reading {
                name: name.clone(),
                value: format!("{:.2}", value),
            },
            DecodedReading::Unknown { arbitration_id } => StatusRecord::Unknown {
                name: UNKNOWN_NAME.to_string(),
                arbitration_id: arbitration_id.to_string(),
            },
        }
    }

    pub fn from_snapshot(snapshot: &HeartbeatSnapshot) -> Self {
        StatusRecord::Heartbeat {
            uptime: snapshot.uptime_hms(),
            messages_received: snapshot.messages_received.to_string(),
            quiet_seconds: snapshot.quiet_seconds().to_string(),
        }
    }

    /// Render as a newline-terminated JSON line
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Whether a record reached a reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    Dropped,
}

/// Destination for status records
pub trait RecordSink {
    /// Publish one record without blocking; failures are absorbed
    fn publish(&mut self, record: &StatusRecord) -> PublishOutcome;
}

/// Publishes records to a named FIFO
#[derive(Debug)]
pub struct StatusPublisher {
    path: PathBuf,
}

impl StatusPublisher {
    /// Create the FIFO at `path` if absent and return a publisher for it
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        ensure_fifo(&path)?;
        log::info!("Publishing status records to {:?}", path);
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        // ENXIO here means no reader has the FIFO open
        let mut fifo = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path)?;
        fifo.write_all(line.as_bytes())
    }
}

impl RecordSink for StatusPublisher {
    fn publish(&mut self, record: &StatusRecord) -> PublishOutcome {
        let line = match record.to_line() {
            Ok(line) => line,
            Err(e) => {
                log::error!("Failed to serialize status record {:?}: {}", record, e);
                return PublishOutcome::Dropped;
            }
        };

        match self.write_line(&line) {
            Ok(()) => PublishOutcome::Delivered,
            Err(e) => {
                log::trace!("Dropped status record ({}): {}", e, line.trim_end());
                PublishOutcome::Dropped
            }
        }
    }
}

/// Create a FIFO at `path` unless one already exists
pub fn ensure_fifo(path: &Path) -> io::Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.file_type().is_fifo() => return Ok(()),
        Ok(_) => {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{:?} exists and is not a FIFO", path),
            ))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let c_path = CString::new(path.as_os_str().as_bytes())?;
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o666) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        // Lost a race with another creator
        if err.kind() == io::ErrorKind::AlreadyExists {
            return Ok(());
        }
        return Err(err);
    }

    log::info!("Created FIFO {:?}", path);
    Ok(())
}

/// Sink that keeps every record in memory
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<StatusRecord>,
}

#[cfg(test)]
impl RecordSink for MemorySink {
    fn publish(&mut self, record: &StatusRecord) -> PublishOutcome {
        self.records.push(record.clone());
        PublishOutcome::Delivered
    }
}
