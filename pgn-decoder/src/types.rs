//! Core types for the PGN decoder library
//!
//! This module defines the frame the decoder consumes and the reading it
//! produces. Neither is retained by the decoder: a frame goes in, a reading
//! comes out, and both are dropped by the caller once published.

use std::fmt;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Name reported for frames whose PGN could not be decoded
pub const UNKNOWN_NAME: &str = "unknown";

/// Maximum payload length of a classic CAN frame
pub const MAX_PAYLOAD_LEN: usize = 8;

/// Raw CAN frame as delivered by the bus transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// CAN arbitration ID (11-bit or 29-bit)
    pub arbitration_id: u32,
    /// True if this is an extended (29-bit) CAN ID
    pub is_extended_id: bool,
    /// Frame data bytes (0-8 bytes)
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Create a frame with an extended (29-bit) identifier
    pub fn extended(arbitration_id: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            arbitration_id,
            is_extended_id: true,
            data: data.into(),
        }
    }

    /// Create a frame with a standard (11-bit) identifier
    pub fn standard(arbitration_id: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            arbitration_id,
            is_extended_id: false,
            data: data.into(),
        }
    }

    /// Get the data length code (DLC) - number of data bytes
    pub fn dlc(&self) -> usize {
        self.data.len()
    }
}

/// Errors that can occur while building or using a PGN table
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Invalid PGN definition '{name}': {reason}")]
    InvalidDefinition { name: String, reason: String },
}

/// Outcome of decoding a single frame
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedReading {
    /// The frame's PGN was in the table and its value could be extracted
    Known {
        /// Parameter name from the table
        name: String,
        /// Physical value after scaling and offset
        value: f64,
    },
    /// The PGN was not in the table, or the payload was too short for it
    Unknown {
        /// Arbitration ID of the undecoded frame
        arbitration_id: u32,
    },
}

impl DecodedReading {
    /// Parameter name, or `"unknown"` for undecoded frames
    pub fn name(&self) -> &str {
        match self {
            DecodedReading::Known { name, .. } => name,
            DecodedReading::Unknown { .. } => UNKNOWN_NAME,
        }
    }

    /// Physical value if the frame was decoded
    pub fn value(&self) -> Option<f64> {
        match self {
            DecodedReading::Known { value, .. } => Some(*value),
            DecodedReading::Unknown { .. } => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, DecodedReading::Known { .. })
    }
}

impl fmt::Display for DecodedReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedReading::Known { name, value } => write!(f, "{} = {:.2}", name, value),
            DecodedReading::Unknown { arbitration_id } => {
                write!(f, "{} (ID 0x{:X})", UNKNOWN_NAME, arbitration_id)
            }
        }
    }
}
