//! CAN Bus Listener Library
//!
//! The stateful half of the system: everything that sits between the bus and
//! the dashboard pipe.
//!
//! # Architecture
//!
//! - [`lifecycle::BusLifecycle`] waits for the interface, opens it, runs the
//!   blocking receive loop and tears the link down
//! - [`processor::CanProcessor`] decodes each frame with `pgn-decoder` and
//!   checks the heartbeat once per loop iteration
//! - [`heartbeat::HeartbeatTracker`] owns the message counters
//! - [`publisher::StatusPublisher`] writes JSON lines to a FIFO, dropping them
//!   when nobody is reading
//!
//! Everything runs on one thread; the only suspension point is the bounded
//! wait for the next frame.

pub mod config;
pub mod heartbeat;
pub mod interface;
pub mod interrupt;
pub mod lifecycle;
pub mod processor;
pub mod publisher;

// Re-export main types for convenience
pub use config::{load_config, AppConfig};
pub use heartbeat::{HeartbeatSnapshot, HeartbeatTracker};
pub use interface::{BusError, FrameSource, IpLinkControl, LinkControl};
pub use interrupt::InterruptFlag;
pub use lifecycle::{BusLifecycle, BusState, LifecycleSettings};
pub use processor::CanProcessor;
pub use publisher::{PublishOutcome, RecordSink, StatusPublisher, StatusRecord};

#[cfg(target_os = "linux")]
pub use interface::SocketCanSource;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
