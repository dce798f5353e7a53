//! PGN lookup table
//!
//! Maps a Parameter Group Number to the metadata needed to pull one scaled
//! value out of a single-frame message. The table is plain data: adding a PGN
//! means adding an entry, never touching the decode algorithm.

use crate::types::{DecoderError, Result, MAX_PAYLOAD_LEN};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decode metadata for one PGN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PgnDefinition {
    /// Parameter name published with each reading
    pub name: String,
    /// First payload byte of the value
    pub start_index: usize,
    /// Number of bytes holding the value (1 or 2)
    pub byte_count: usize,
    /// Raw value is divided by this factor
    pub scale_factor: f64,
    /// Interpret the raw bytes as two's complement
    #[serde(default)]
    pub is_signed: bool,
    /// Added after scaling
    #[serde(default)]
    pub value_offset: f64,
}

impl PgnDefinition {
    /// Create an unsigned definition with no offset
    pub fn new(name: impl Into<String>, start_index: usize, byte_count: usize, scale_factor: f64) -> Self {
        Self {
            name: name.into(),
            start_index,
            byte_count,
            scale_factor,
            is_signed: false,
            value_offset: 0.0,
        }
    }

    /// Builder method: set the additive offset
    pub fn with_offset(mut self, value_offset: f64) -> Self {
        self.value_offset = value_offset;
        self
    }

    /// Builder method: interpret the raw value as signed
    pub fn signed(mut self) -> Self {
        self.is_signed = true;
        self
    }

    /// Index one past the last byte this definition reads
    pub fn end_index(&self) -> usize {
        self.start_index.saturating_add(self.byte_count)
    }

    /// Check the definition can be decoded from a classic CAN payload
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| DecoderError::InvalidDefinition {
            name: self.name.clone(),
            reason,
        };

        if !matches!(self.byte_count, 1 | 2) {
            return Err(invalid(format!("byte_count must be 1 or 2, got {}", self.byte_count)));
        }
        if self.end_index() > MAX_PAYLOAD_LEN {
            return Err(invalid(format!(
                "bytes {}..{} exceed the {}-byte payload",
                self.start_index,
                self.end_index(),
                MAX_PAYLOAD_LEN
            )));
        }
        if self.scale_factor == 0.0 || !self.scale_factor.is_finite() {
            return Err(invalid(format!("scale_factor must be finite and non-zero, got {}", self.scale_factor)));
        }
        if !self.value_offset.is_finite() {
            return Err(invalid("value_offset must be finite".to_string()));
        }
        Ok(())
    }
}

/// Immutable-after-startup mapping from PGN to its definition
#[derive(Debug, Clone, Default)]
pub struct PgnTable {
    entries: HashMap<u32, PgnDefinition>,
}

impl PgnTable {
    /// Create a table with no entries
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create the built-in table of engine parameters
    pub fn standard() -> Self {
        let entries = [
            (61444, PgnDefinition::new("Engine RPM", 3, 2, 8.0)),
            (65253, PgnDefinition::new("Engine Hours", 0, 2, 20.0)),
            (65262, PgnDefinition::new("Coolant Temperature", 0, 1, 1.0).with_offset(-40.0)),
            (65271, PgnDefinition::new("Alternator Voltage", 6, 2, 20.0)),
        ];

        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Add or replace a definition after validating it
    ///
    /// Returns the definition previously registered for `pgn`, if any.
    pub fn insert(&mut self, pgn: u32, definition: PgnDefinition) -> Result<Option<PgnDefinition>> {
        definition.validate()?;
        let previous = self.entries.insert(pgn, definition);
        if let Some(ref old) = previous {
            log::debug!("PGN {} redefined: '{}' replaced", pgn, old.name);
        }
        Ok(previous)
    }

    /// Look up the definition for a PGN
    pub fn get(&self, pgn: u32) -> Option<&PgnDefinition> {
        self.entries.get(&pgn)
    }

    pub fn contains(&self, pgn: u32) -> bool {
        self.entries.contains_key(&pgn)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries in ascending PGN order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &PgnDefinition)> {
        let mut pgns: Vec<u32> = self.entries.keys().copied().collect();
        pgns.sort_unstable();
        pgns.into_iter().filter_map(move |pgn| self.entries.get(&pgn).map(|def| (pgn, def)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table() {
        let table = PgnTable::standard();
        assert_eq!(table.len(), 4);

        let rpm = table.get(61444).unwrap();
        assert_eq!(rpm.name, "Engine RPM");
        assert_eq!(rpm.start_index, 3);
        assert_eq!(rpm.byte_count, 2);
        assert_eq!(rpm.scale_factor, 8.0);

        let coolant = table.get(65262).unwrap();
        assert_eq!(coolant.value_offset, -40.0);
        assert!(!coolant.is_signed);

        assert!(table.contains(65253));
        assert!(table.contains(65271));
        assert!(table.get(12345).is_none());
    }

    #[test]
    fn test_standard_entries_are_valid() {
        for (pgn, def) in PgnTable::standard().iter() {
            assert!(def.validate().is_ok(), "PGN {} should be valid", pgn);
        }
    }

    #[test]
    fn test_iter_is_sorted() {
        let pgns: Vec<u32> = PgnTable::standard().iter().map(|(pgn, _)| pgn).collect();
        assert_eq!(pgns, vec![61444, 65253, 65262, 65271]);
    }

    #[test]
    fn test_insert_replaces() {
        let mut table = PgnTable::standard();
        let previous = table
            .insert(61444, PgnDefinition::new("Engine Speed", 3, 2, 8.0))
            .unwrap();
        assert_eq!(previous.unwrap().name, "Engine RPM");
        assert_eq!(table.get(61444).unwrap().name, "Engine Speed");
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_insert_rejects_out_of_bounds() {
        let mut table = PgnTable::empty();
        let result = table.insert(1, PgnDefinition::new("Too Far", 7, 2, 1.0));
        assert!(matches!(result, Err(DecoderError::InvalidDefinition { .. })));
        assert!(table.is_empty());
    }

    #[test]
    fn test_validate_rules() {
        assert!(PgnDefinition::new("Three Bytes", 0, 3, 1.0).validate().is_err());
        assert!(PgnDefinition::new("Zero Bytes", 0, 0, 1.0).validate().is_err());
        assert!(PgnDefinition::new("Zero Scale", 0, 1, 0.0).validate().is_err());
        assert!(PgnDefinition::new("Last Byte", 7, 1, 1.0).validate().is_ok());
        assert!(PgnDefinition::new("Last Word", 6, 2, 1.0).signed().validate().is_ok());
    }
}
