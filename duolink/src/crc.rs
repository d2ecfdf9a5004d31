//! CRC-16/IBM-3740 over 16-bit words
//!
//! Polynomial 0x1021, initial value 0xffff, no reflection, no final XOR.
//! Words are fed high byte first, so the result over `[0x3132, 0x3300]` equals the
//! standard byte-wise CRC over `31 32 33 00`.

/// Byte-indexed remainder table
///
/// The table is built at compile time and never changes afterwards, so one instance
/// can be shared between the main loop and interrupt handlers.
pub struct CrcTable([u16; 256]);

/// Shared table instance
pub static TABLE: CrcTable = CrcTable::new();

impl CrcTable {
    pub const INIT_VALUE: u16 = 0xffff;
    pub const POLYNOMIAL: u16 = 0x1021;

    pub const fn new() -> Self {
        let mut table = [0u16; 256];
        let mut dividend = 0;
        while dividend < 256 {
            let mut remainder = (dividend as u16) << 8;
            let mut bit = 0;
            while bit < 8 {
                if remainder & 0x8000 != 0 {
                    remainder = (remainder << 1) ^ Self::POLYNOMIAL;
                } else {
                    remainder <<= 1;
                }
                bit += 1;
            }
            table[dividend] = remainder;
            dividend += 1;
        }
        Self(table)
    }

    /// Computes the CRC of a word sequence.
    pub fn compute(&self, words: &[u16]) -> u16 {
        let mut crc = Crc::new(self);
        crc.add_words(words);
        crc.get()
    }

    /// Computes the CRC of a byte sequence.
    pub fn compute_bytes(&self, bytes: &[u8]) -> u16 {
        let mut crc = Crc::new(self);
        crc.add_bytes(bytes);
        crc.get()
    }
}

impl Default for CrcTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Running CRC state
#[derive(Clone, Copy)]
pub struct Crc<'a> {
    table: &'a CrcTable,
    remainder: u16,
}

impl<'a> Crc<'a> {
    pub fn new(table: &'a CrcTable) -> Self {
        Self {
            table,
            remainder: CrcTable::INIT_VALUE,
        }
    }

    pub fn add(&mut self, byte: u8) {
        let index = byte ^ (self.remainder >> 8) as u8;
        self.remainder = self.table.0[usize::from(index)] ^ (self.remainder << 8);
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        bytes.iter().for_each(|&byte| self.add(byte));
    }

    pub fn add_word(&mut self, word: u16) {
        let [high, low] = word.to_be_bytes();
        self.add(high);
        self.add(low);
    }

    pub fn add_words(&mut self, words: &[u16]) {
        words.iter().for_each(|&word| self.add_word(word));
    }

    pub fn get(&self) -> u16 {
        self.remainder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bit-serial reference implementation
    fn reference(bytes: &[u8]) -> u16 {
        let mut crc = CrcTable::INIT_VALUE;
        for &byte in bytes {
            crc ^= u16::from(byte) << 8;
            for _bit in 0..8 {
                if (crc & 0x8000) != 0 {
                    crc = (crc << 1) ^ CrcTable::POLYNOMIAL;
                } else {
                    crc <<= 1;
                }
            }
        }
        crc
    }

    #[test]
    fn test_check_value() {
        assert_eq!(TABLE.compute_bytes(b"123456789"), 0x29b1);
        assert_eq!(TABLE.compute_bytes(&[]), 0xffff);
    }

    #[test]
    fn test_table_matches_reference() {
        let mut bytes = [0u8; 64];
        let mut seed: u32 = 7;
        for byte in bytes.iter_mut() {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            *byte = (seed >> 24) as u8;
        }
        for len in 0..bytes.len() {
            assert_eq!(TABLE.compute_bytes(&bytes[..len]), reference(&bytes[..len]));
        }
    }

    #[test]
    fn test_words_are_fed_high_byte_first() {
        let words = [0x3132, 0x3334, 0x3536, 0x3738];
        assert_eq!(TABLE.compute(&words), TABLE.compute_bytes(b"12345678"));
        assert_eq!(TABLE.compute(&words), reference(b"12345678"));
    }

    #[test]
    fn test_single_bit_flip_is_detected() {
        let mut words: [u16; 31] = core::array::from_fn(|i| i as u16 + 1);
        let crc = TABLE.compute(&words);
        assert_eq!(TABLE.compute(&words), crc);

        for word in 0..words.len() {
            for bit in 0..16 {
                words[word] ^= 1 << bit;
                assert_ne!(TABLE.compute(&words), crc);
                words[word] ^= 1 << bit;
            }
        }
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut crc = Crc::new(&TABLE);
        crc.add_words(&[0x0102]);
        crc.add_bytes(&[0x03, 0x04]);
        crc.add_word(0x0506);
        assert_eq!(crc.get(), TABLE.compute(&[0x0102, 0x0304, 0x0506]));
    }
}
