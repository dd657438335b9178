//! CRC-64 used for the trailer's communication verification field.
//!
//! ISO 3309 polynomial (`x^64 + x^4 + x^3 + x + 1`), reflected, zero initial
//! value, no final XOR.

const POLY_REFLECTED: u64 = 0xD800_0000_0000_0000;

const TABLE: [u64; 256] = build_table();

const fn build_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u64;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 == 1 {
                (crc >> 1) ^ POLY_REFLECTED
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Incremental CRC-64 state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc64 {
    value: u64,
}

impl Crc64 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        let mut crc = self.value;
        for &byte in data {
            crc = TABLE[((crc ^ u64::from(byte)) & 0xFF) as usize] ^ (crc >> 8);
        }
        self.value = crc;
    }

    pub fn finish(&self) -> u64 {
        self.value
    }
}

/// One-shot CRC-64 of `data`.
pub fn crc64(data: &[u8]) -> u64 {
    let mut crc = Crc64::new();
    crc.update(data);
    crc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitwise(data: &[u8]) -> u64 {
        let mut crc = 0u64;
        for &byte in data {
            crc ^= u64::from(byte);
            for _ in 0..8 {
                crc = if crc & 1 == 1 {
                    (crc >> 1) ^ POLY_REFLECTED
                } else {
                    crc >> 1
                };
            }
        }
        crc
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(crc64(&[]), 0);
    }

    #[test]
    fn table_matches_bitwise_reference() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        assert_eq!(crc64(&data), bitwise(&data));
        assert_eq!(crc64(b"123456789"), bitwise(b"123456789"));
    }

    #[test]
    fn incremental_equals_one_shot() {
        let mut crc = Crc64::new();
        crc.update(b"CD-1.1 ");
        crc.update(b"frame");
        assert_eq!(crc.finish(), crc64(b"CD-1.1 frame"));
    }

    #[test]
    fn single_bit_flip_changes_checksum() {
        let mut data = b"seismic telemetry".to_vec();
        let before = crc64(&data);
        data[3] ^= 0x01;
        assert_ne!(crc64(&data), before);
    }
}
