//! CAN bus interface abstraction.
//!
//! `FrameSource` yields received frames, `LinkControl` queries and releases
//! the network link. Implementations:
//! - `SocketCanSource`: Linux-only, wraps `socketcan::CanSocket`
//! - `IpLinkControl`: shells out to the `ip` command

use pgn_decoder::RawFrame;
use std::io;
use std::process::{Command, Stdio};
use std::time::Duration;

/// Errors raised by the bus transport and lifecycle
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("CAN interface {interface} did not come up within {timeout:?}")]
    InterfaceTimeout { interface: String, timeout: Duration },

    #[error("Error opening CAN interface {interface}: {source}")]
    Open {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("Error receiving from CAN bus: {0}")]
    Receive(#[source] io::Error),

    #[error("Link command `{command}` failed: {reason}")]
    LinkCommand { command: String, reason: String },

    #[error("Interrupted by user")]
    Interrupted,

    #[error("{0}")]
    Unsupported(String),
}

/// Source of received CAN frames
pub trait FrameSource {
    /// Wait up to `timeout` for the next frame; `Ok(None)` on timeout
    fn recv(&mut self, timeout: Duration) -> Result<Option<RawFrame>, BusError>;
}

/// Readiness query and teardown for a named network link
pub trait LinkControl {
    /// True if the named link exists and can be opened
    fn is_up(&self, interface: &str) -> bool;

    /// Take the named link down
    fn bring_down(&self, interface: &str) -> Result<(), BusError>;
}

/// Link control through the `ip` command
#[derive(Debug, Clone)]
pub struct IpLinkControl {
    use_sudo: bool,
}

impl IpLinkControl {
    pub fn new(use_sudo: bool) -> Self {
        Self { use_sudo }
    }

    fn teardown_command(&self, interface: &str) -> Command {
        let args = ["link", "set", interface, "down"];
        if self.use_sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg("ip").args(args);
            cmd
        } else {
            let mut cmd = Command::new("ip");
            cmd.args(args);
            cmd
        }
    }
}

impl Default for IpLinkControl {
    fn default() -> Self {
        Self::new(true)
    }
}

impl LinkControl for IpLinkControl {
    fn is_up(&self, interface: &str) -> bool {
        Command::new("ip")
            .args(["link", "show", interface])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn bring_down(&self, interface: &str) -> Result<(), BusError> {
        let mut cmd = self.teardown_command(interface);
        let command = format!("{:?}", cmd);
        let status = cmd.status().map_err(|e| BusError::LinkCommand {
            command: command.clone(),
            reason: e.to_string(),
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(BusError::LinkCommand {
                command,
                reason: status.to_string(),
            })
        }
    }
}

/// True for read errors that only mean "nothing arrived in time"
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

// ── SocketCAN (Linux-only) ──────────────────────────────────────

#[cfg(target_os = "linux")]
pub use socket_can::SocketCanSource;

#[cfg(target_os = "linux")]
mod socket_can {
    use super::{is_timeout, BusError, FrameSource};
    use pgn_decoder::RawFrame;
    use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Id, Socket};
    use std::time::Duration;

    /// SocketCAN frame source for Linux hosts
    pub struct SocketCanSource {
        socket: CanSocket,
        read_timeout: Option<Duration>,
    }

    impl SocketCanSource {
        /// Bind a raw CAN socket to `interface`
        pub fn open(interface: &str) -> Result<Self, BusError> {
            let socket = CanSocket::open(interface).map_err(|source| BusError::Open {
                interface: interface.to_string(),
                source,
            })?;
            Ok(Self {
                socket,
                read_timeout: None,
            })
        }
    }

    impl FrameSource for SocketCanSource {
        fn recv(&mut self, timeout: Duration) -> Result<Option<RawFrame>, BusError> {
            if self.read_timeout != Some(timeout) {
                self.socket.set_read_timeout(timeout).map_err(BusError::Receive)?;
                self.read_timeout = Some(timeout);
            }

            match self.socket.read_frame() {
                Ok(frame) => Ok(Some(raw_frame(&frame))),
                Err(e) if is_timeout(&e) => Ok(None),
                Err(e) => Err(BusError::Receive(e)),
            }
        }
    }

    /// Convert a received SocketCAN frame into the decoder's frame type
    fn raw_frame(frame: &CanFrame) -> RawFrame {
        let (arbitration_id, is_extended_id) = match frame.id() {
            Id::Standard(id) => (id.as_raw() as u32, false),
            Id::Extended(id) => (id.as_raw(), true),
        };
        RawFrame {
            arbitration_id,
            is_extended_id,
            data: frame.data().to_vec(),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use socketcan::{ExtendedId, StandardId};

        #[test]
        fn test_standard_frame_conversion() {
            let id = StandardId::new(0x7E8).unwrap();
            let frame = CanFrame::new(id, &[0x02, 0x41, 0x0C]).unwrap();

            let raw = raw_frame(&frame);
            assert_eq!(raw.arbitration_id, 0x7E8);
            assert!(!raw.is_extended_id);
            assert_eq!(raw.data, vec![0x02, 0x41, 0x0C]);
        }

        #[test]
        fn test_extended_frame_conversion() {
            let id = ExtendedId::new(0x18FEEE00).unwrap();
            let frame = CanFrame::new(id, &[0x4B, 0, 0, 0, 0, 0, 0, 0]).unwrap();

            let raw = raw_frame(&frame);
            assert_eq!(raw.arbitration_id, 0x18FEEE00);
            assert!(raw.is_extended_id);
            assert_eq!(raw.data, vec![0x4B, 0, 0, 0, 0, 0, 0, 0]);

            let decoder = pgn_decoder::PgnDecoder::default();
            let decoded = decoder.decode(&raw);
            assert_eq!(decoded, Some(("Coolant Temperature", 35.0)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_kinds() {
        assert!(is_timeout(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(is_timeout(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(is_timeout(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(!is_timeout(&io::Error::from(io::ErrorKind::BrokenPipe)));
    }

    #[test]
    fn test_teardown_command() {
        let with_sudo = format!("{:?}", IpLinkControl::new(true).teardown_command("can0"));
        assert!(with_sudo.starts_with("\"sudo\" \"ip\""));
        assert!(with_sudo.ends_with("\"can0\" \"down\""));

        let without = format!("{:?}", IpLinkControl::new(false).teardown_command("vcan1"));
        assert!(without.starts_with("\"ip\" \"link\" \"set\" \"vcan1\""));
    }

    #[test]
    fn test_missing_interface_is_not_up() {
        assert!(!IpLinkControl::default().is_up("no-such-can-interface"));
    }

    #[test]
    fn test_bus_error_messages() {
        let err = BusError::InterfaceTimeout {
            interface: "can0".to_string(),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "CAN interface can0 did not come up within 10s");
        assert_eq!(BusError::Interrupted.to_string(), "Interrupted by user");
    }
}
