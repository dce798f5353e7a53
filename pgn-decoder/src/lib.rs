//! J1939 PGN Decoder Library
//!
//! A stateless, reusable library for turning single-frame J1939 CAN messages
//! into named, scaled physical values.
//!
//! # Architecture
//!
//! This library is intentionally minimal and focused on decoding:
//! - Derives the PGN from 29-bit (or 11-bit) arbitration IDs
//! - Looks the PGN up in a static [`PgnTable`]
//! - Extracts 1- or 2-byte little-endian fields and applies scale and offset
//!
//! The library does NOT:
//! - Reassemble multi-packet transport messages
//! - Take part in address claiming
//! - Track message counts, heartbeats or bus liveness
//! - Talk to the bus or publish readings
//!
//! All higher-level functionality is in the application layer (can-bus-listener).
//!
//! # Example Usage
//!
//! ```
//! use pgn_decoder::{PgnDecoder, PgnTable, RawFrame};
//!
//! let decoder = PgnDecoder::new(PgnTable::standard());
//! let frame = RawFrame::extended(0x00F00400, vec![0, 0, 0, 0x10, 0x27, 0, 0, 0]);
//!
//! assert_eq!(decoder.decode(&frame), Some(("Engine RPM", 1250.0)));
//! ```

// Public modules
pub mod decoder;
pub mod table;
pub mod types;

// Re-export main types for convenience
pub use decoder::{extract_value, pgn_from_id, PgnDecoder};
pub use table::{PgnDefinition, PgnTable};
pub use types::{DecodedReading, DecoderError, RawFrame, Result, MAX_PAYLOAD_LEN, UNKNOWN_NAME};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
