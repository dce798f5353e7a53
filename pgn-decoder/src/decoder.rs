//! PGN decoding engine
//!
//! Extracts the PGN from a frame's arbitration ID, looks it up in the
//! [`PgnTable`] and converts the raw little-endian field into a physical value.

use crate::table::{PgnDefinition, PgnTable};
use crate::types::{DecodedReading, RawFrame};
use byteorder::{ByteOrder, LittleEndian};

/// Derive the PGN from a CAN arbitration ID
///
/// Extended (29-bit) IDs carry the PGN in bits 8..23. Standard (11-bit) IDs
/// are used directly as the PGN, masked to 11 bits.
pub fn pgn_from_id(arbitration_id: u32, is_extended_id: bool) -> u32 {
    if is_extended_id {
        (arbitration_id >> 8) & 0xFFFF
    } else {
        arbitration_id & 0x7FF
    }
}

/// Extract the physical value described by `definition` from a payload
///
/// Returns `None` if the payload is too short or the definition cannot be
/// decoded (unsupported width, zero scale).
pub fn extract_value(data: &[u8], definition: &PgnDefinition) -> Option<f64> {
    if definition.validate().is_err() {
        return None;
    }

    let bytes = data.get(definition.start_index..definition.end_index())?;

    let raw = match (definition.byte_count, definition.is_signed) {
        (1, false) => bytes[0] as f64,
        (1, true) => bytes[0] as i8 as f64,
        (2, false) => LittleEndian::read_u16(bytes) as f64,
        (2, true) => LittleEndian::read_i16(bytes) as f64,
        _ => return None,
    };

    Some(raw / definition.scale_factor + definition.value_offset)
}

/// Why `extract_value` returned `None` for this payload and definition
fn failure_reason(data: &[u8], definition: &PgnDefinition) -> String {
    match definition.validate() {
        Err(e) => e.to_string(),
        Ok(()) => format!(
            "requires bytes {}..{} but frame only has {} bytes",
            definition.start_index,
            definition.end_index(),
            data.len()
        ),
    }
}

/// Decoder over a fixed PGN table
#[derive(Debug, Clone)]
pub struct PgnDecoder {
    table: PgnTable,
}

impl PgnDecoder {
    /// Create a decoder for the given table
    pub fn new(table: PgnTable) -> Self {
        Self { table }
    }

    /// The table this decoder looks PGNs up in
    pub fn table(&self) -> &PgnTable {
        &self.table
    }

    /// Decode a frame into its parameter name and physical value
    ///
    /// # Returns
    /// * `Some((name, value))` if the PGN is in the table and the payload holds the field
    /// * `None` if the PGN is unknown or its field cannot be read from the payload
    pub fn decode(&self, frame: &RawFrame) -> Option<(&str, f64)> {
        let pgn = pgn_from_id(frame.arbitration_id, frame.is_extended_id);
        let definition = self.table.get(pgn)?;

        match extract_value(&frame.data, definition) {
            Some(value) => Some((definition.name.as_str(), value)),
            None => {
                log::warn!(
                    "PGN {} ('{}') not decoded: {}",
                    pgn,
                    definition.name,
                    failure_reason(&frame.data, definition)
                );
                None
            }
        }
    }

    /// Decode a frame, reporting failures as [`DecodedReading::Unknown`]
    pub fn decode_reading(&self, frame: &RawFrame) -> DecodedReading {
        match self.decode(frame) {
            Some((name, value)) => DecodedReading::Known {
                name: name.to_string(),
                value,
            },
            None => DecodedReading::Unknown {
                arbitration_id: frame.arbitration_id,
            },
        }
    }
}

impl Default for PgnDecoder {
    fn default() -> Self {
        Self::new(PgnTable::standard())
    }
}
