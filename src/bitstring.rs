//! # Bitstring
//!
//! A packed array of status cells, each `statusSize` ∈ {1, 2, 4, 8} bits
//! wide, big-endian within each byte: cell index 0 occupies the high bits of
//! byte 0. Follows the bitstring layout of
//! [Bitstring Status List v1.0](https://www.w3.org/TR/vc-bitstring-status-list/).

use serde::{Deserialize, Serialize};

use crate::error::BitstringError;

/// Minimum number of entries in a status list. This is the privacy floor
/// from the spec: shorter lists would let a verifier correlate credentials
/// by list membership.
pub const MIN_ENTRIES: usize = 131_072;

/// Width of a status cell in bits.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub enum StatusSize {
    /// One bit per entry (plain revocation/suspension lists).
    #[default]
    One = 1,
    /// Two bits per entry.
    Two = 2,
    /// Four bits per entry.
    Four = 4,
    /// Eight bits per entry.
    Eight = 8,
}

impl StatusSize {
    /// Cell width in bits.
    #[must_use]
    pub const fn bits(self) -> usize {
        self as usize
    }

    /// Largest value a cell can hold.
    #[must_use]
    pub const fn max_value(self) -> u8 {
        (((1u16) << (self as usize)) - 1) as u8
    }

    /// Number of distinct statuses a cell can express.
    #[must_use]
    pub const fn status_count(self) -> usize {
        1 << (self as usize)
    }
}

impl TryFrom<u8> for StatusSize {
    type Error = BitstringError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            4 => Ok(Self::Four),
            8 => Ok(Self::Eight),
            other => Err(BitstringError::InvalidStatusSize(other)),
        }
    }
}

impl From<StatusSize> for u8 {
    fn from(size: StatusSize) -> Self {
        size as Self
    }
}

/// A mutable packed buffer of `total_entries` status cells.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitstring {
    bytes: Vec<u8>,
    size: StatusSize,
    capacity: usize,
}

impl Bitstring {
    /// Create a zero-filled bitstring.
    ///
    /// # Errors
    ///
    /// Returns an error if `total_entries` is below [`MIN_ENTRIES`].
    pub fn new(total_entries: usize, size: StatusSize) -> Result<Self, BitstringError> {
        if total_entries < MIN_ENTRIES {
            return Err(BitstringError::TooFewEntries {
                min: MIN_ENTRIES,
                got: total_entries,
            });
        }
        Ok(Self {
            bytes: vec![0; Self::byte_len(total_entries, size)],
            size,
            capacity: total_entries,
        })
    }

    /// Rehydrate a bitstring from a decoded buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer length does not match
    /// `ceil(total_entries * size / 8)` or the entry count is below the
    /// floor.
    pub fn from_bytes(
        bytes: Vec<u8>, total_entries: usize, size: StatusSize,
    ) -> Result<Self, BitstringError> {
        if total_entries < MIN_ENTRIES {
            return Err(BitstringError::TooFewEntries {
                min: MIN_ENTRIES,
                got: total_entries,
            });
        }
        let expected = Self::byte_len(total_entries, size);
        if bytes.len() != expected {
            return Err(BitstringError::LengthMismatch {
                expected,
                got: bytes.len(),
            });
        }
        Ok(Self {
            bytes,
            size,
            capacity: total_entries,
        })
    }

    /// Buffer length in bytes for a list of `total_entries` cells.
    #[must_use]
    pub const fn byte_len(total_entries: usize, size: StatusSize) -> usize {
        (total_entries * size.bits()).div_ceil(8)
    }

    /// Read the cell at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is past the end of the list.
    pub fn get(&self, index: usize) -> Result<u8, BitstringError> {
        let (byte_idx, first_shift, first_bits, remaining) = self.locate(index)?;

        let head = (self.bytes[byte_idx] >> first_shift) & mask(first_bits);
        if remaining == 0 {
            return Ok(head);
        }

        // cell straddles into the high bits of the next byte
        let next = self
            .bytes
            .get(byte_idx + 1)
            .ok_or(BitstringError::IndexOutOfBounds {
                index,
                capacity: self.capacity,
            })?;
        let tail = (next >> (8 - remaining)) & mask(remaining);
        Ok((head << remaining) | tail)
    }

    /// Write `value` into the cell at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is past the end of the list or `value`
    /// does not fit in the cell width.
    pub fn set(&mut self, index: usize, value: u8) -> Result<(), BitstringError> {
        if value > self.size.max_value() {
            return Err(BitstringError::ValueOutOfRange {
                value,
                bits: self.size.bits() as u8,
            });
        }
        let (byte_idx, first_shift, first_bits, remaining) = self.locate(index)?;

        let head = (value >> remaining) & mask(first_bits);
        self.bytes[byte_idx] &= !(mask(first_bits) << first_shift);
        self.bytes[byte_idx] |= head << first_shift;

        if remaining > 0 {
            if byte_idx + 1 >= self.bytes.len() {
                return Err(BitstringError::IndexOutOfBounds {
                    index,
                    capacity: self.capacity,
                });
            }
            let tail_shift = 8 - remaining;
            let tail = value & mask(remaining);
            self.bytes[byte_idx + 1] &= !(mask(remaining) << tail_shift);
            self.bytes[byte_idx + 1] |= tail << tail_shift;
        }

        Ok(())
    }

    /// The packed buffer.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the bitstring, returning the packed buffer.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Number of cells.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cell width.
    #[must_use]
    pub const fn status_size(&self) -> StatusSize {
        self.size
    }

    // Split a cell position into (byte index, shift for the first part,
    // first-part width, remaining bits carried into the next byte). Both
    // shifts derived from these are non-negative by construction:
    // first_bits = min(k, 8 - bit_offset) keeps 8 - bit_offset - first_bits
    // at or above zero even when a cell sits at the tail of a byte.
    fn locate(&self, index: usize) -> Result<(usize, u8, u8, u8), BitstringError> {
        let k = self.size.bits();
        if index >= self.capacity || index >= (self.bytes.len() * 8) / k {
            return Err(BitstringError::IndexOutOfBounds {
                index,
                capacity: self.capacity,
            });
        }

        let bit_pos = index * k;
        let byte_idx = bit_pos / 8;
        let bit_offset = bit_pos % 8;

        let first_bits = k.min(8 - bit_offset);
        let first_shift = 8 - bit_offset - first_bits;
        let remaining = k - first_bits;

        Ok((byte_idx, first_shift as u8, first_bits as u8, remaining as u8))
    }
}

const fn mask(bits: u8) -> u8 {
    (((1u16) << bits) - 1) as u8
}

#[cfg(test)]
mod test {
    use bitvec::field::BitField;
    use bitvec::order::Msb0;
    use bitvec::vec::BitVec;

    use super::*;

    #[test]
    fn rejects_short_lists() {
        let err = Bitstring::new(MIN_ENTRIES - 1, StatusSize::One).unwrap_err();
        assert_eq!(
            err,
            BitstringError::TooFewEntries {
                min: MIN_ENTRIES,
                got: MIN_ENTRIES - 1
            }
        );
    }

    #[test]
    fn rejects_invalid_status_size() {
        for invalid in [0u8, 3, 5, 6, 7, 9, 16] {
            assert!(StatusSize::try_from(invalid).is_err());
        }
        assert_eq!(StatusSize::try_from(4).unwrap(), StatusSize::Four);
    }

    #[test]
    fn empty_list_shape() {
        let bits = Bitstring::new(MIN_ENTRIES, StatusSize::One).unwrap();
        assert_eq!(bits.as_bytes().len(), 16384);
        assert!(bits.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn single_bit_revocation() {
        let mut bits = Bitstring::new(MIN_ENTRIES, StatusSize::One).unwrap();
        bits.set(0, 1).unwrap();
        assert_eq!(bits.as_bytes()[0], 0x80);
        assert_eq!(bits.get(0).unwrap(), 1);
        assert_eq!(bits.get(1).unwrap(), 0);
    }

    // statusSize=2, index 3 sits at bit offset 6: the write lands in the low
    // two bits of byte 0 and the shift stays non-negative.
    #[test]
    fn tail_of_byte_write() {
        let mut bits = Bitstring::new(MIN_ENTRIES, StatusSize::Two).unwrap();
        bits.set(3, 3).unwrap();
        assert_eq!(bits.as_bytes()[0], 0x03);
        assert_eq!(bits.get(3).unwrap(), 3);
        for j in [0, 1, 2, 4, 5] {
            assert_eq!(bits.get(j).unwrap(), 0);
        }
    }

    #[test]
    fn set_then_get_all_offsets() {
        for size in [StatusSize::One, StatusSize::Two, StatusSize::Four, StatusSize::Eight] {
            let mut bits = Bitstring::new(MIN_ENTRIES, size).unwrap();
            // every bit offset within the first few bytes, plus the last cell
            for index in (0..32).chain([MIN_ENTRIES - 1]) {
                let value = size.max_value();
                bits.set(index, value).unwrap();
                assert_eq!(bits.get(index).unwrap(), value, "size {size:?} index {index}");
            }
        }
    }

    #[test]
    fn bounds_are_enforced() {
        let mut bits = Bitstring::new(MIN_ENTRIES, StatusSize::One).unwrap();
        assert!(matches!(
            bits.get(MIN_ENTRIES),
            Err(BitstringError::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            bits.set(MIN_ENTRIES, 1),
            Err(BitstringError::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            bits.set(0, 2),
            Err(BitstringError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn from_bytes_checks_length() {
        let err = Bitstring::from_bytes(vec![0; 100], MIN_ENTRIES, StatusSize::One).unwrap_err();
        assert_eq!(
            err,
            BitstringError::LengthMismatch {
                expected: 16384,
                got: 100
            }
        );
    }

    // Cross-check the byte layout against bitvec's big-endian field store.
    #[test]
    fn matches_bitvec_layout() {
        for size in [StatusSize::One, StatusSize::Two, StatusSize::Four, StatusSize::Eight] {
            let k = size.bits();
            let mut bits = Bitstring::new(MIN_ENTRIES, size).unwrap();
            let mut oracle: BitVec<u8, Msb0> = BitVec::repeat(false, MIN_ENTRIES * k);

            for (i, value) in [(0usize, 1u8), (3, 1), (7, 1), (100, 1), (8191, 1)] {
                let value = value & size.max_value() | 1;
                bits.set(i, value).unwrap();
                oracle[i * k..(i + 1) * k].store_be(value);
            }

            assert_eq!(bits.as_bytes(), oracle.as_raw_slice(), "size {size:?}");
        }
    }
}
