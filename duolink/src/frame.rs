//! CRC-protected frame views
//!
//! A frame is one chunk of the shared buffer: a single header word holding the CRC,
//! followed by the payload words it covers. The memory layout is the wire layout;
//! on the wire every word travels most significant byte first.

use crate::config::HEADER_WORDS;
use crate::crc::CrcTable;

/// Stored CRC disagrees with the payload
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CrcMismatch {
    pub stored: u16,
    pub computed: u16,
}

/// Read-only frame
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    words: &'a [u16],
}

impl<'a> Frame<'a> {
    /// Returns `None` if the chunk has no room for a payload.
    pub fn new(words: &'a [u16]) -> Option<Self> {
        (words.len() > HEADER_WORDS).then_some(Self { words })
    }

    pub fn crc(&self) -> u16 {
        self.words[0]
    }

    pub fn payload(&self) -> &'a [u16] {
        &self.words[HEADER_WORDS..]
    }

    pub fn compute_crc(&self, table: &CrcTable) -> u16 {
        table.compute(self.payload())
    }

    pub fn verify(&self, table: &CrcTable) -> Result<(), CrcMismatch> {
        let stored = self.crc();
        let computed = self.compute_crc(table);
        if stored == computed {
            Ok(())
        } else {
            Err(CrcMismatch { stored, computed })
        }
    }

    /// Serializes the frame for a byte-oriented peer.
    ///
    /// Returns the number of bytes written, or `None` if `out` is too short.
    pub fn write_wire_bytes(&self, out: &mut [u8]) -> Option<usize> {
        let len = self.words.len() * 2;
        let out = out.get_mut(..len)?;
        for (bytes, word) in out.chunks_exact_mut(2).zip(self.words) {
            bytes.copy_from_slice(&word.to_be_bytes());
        }
        Some(len)
    }
}

/// Writable frame
pub struct FrameMut<'a> {
    words: &'a mut [u16],
}

impl<'a> FrameMut<'a> {
    /// Returns `None` if the chunk has no room for a payload.
    pub fn new(words: &'a mut [u16]) -> Option<Self> {
        if words.len() > HEADER_WORDS {
            Some(Self { words })
        } else {
            None
        }
    }

    pub fn as_frame(&self) -> Frame<'_> {
        Frame { words: self.words }
    }

    pub fn payload_mut(&mut self) -> &mut [u16] {
        &mut self.words[HEADER_WORDS..]
    }

    /// Recomputes the CRC over the payload and stores it in the header.
    pub fn stamp(&mut self, table: &CrcTable) -> u16 {
        let crc = self.as_frame().compute_crc(table);
        self.words[0] = crc;
        crc
    }
}
