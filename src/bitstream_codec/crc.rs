/*
    FluxFox
    https://github.com/dbalsom/fluxfox

    Copyright 2024 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    src/bitstream_codec/crc.rs

    CRC-CCITT as used by FM and MFM address and data fields.
*/
use crate::bitstream_codec::CRC_INITIAL_VALUE;

const POLYNOMIAL: u16 = 0x1021;

const fn make_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut value = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            value = if value & 0x8000 != 0 {
                (value << 1) ^ POLYNOMIAL
            }
            else {
                value << 1
            };
            bit += 1;
        }
        table[i] = value;
        i += 1;
    }
    table
}

static CRC_TABLE: [u16; 256] = make_table();

/// A running 16-bit CCITT CRC, most significant bit first.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Crc16 {
    value: u16,
}

impl Default for Crc16 {
    fn default() -> Self {
        Self {
            value: CRC_INITIAL_VALUE,
        }
    }
}

impl Crc16 {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn reset(&mut self) {
        self.value = CRC_INITIAL_VALUE;
    }

    #[inline]
    pub fn add(&mut self, byte: u8) {
        self.value = (self.value << 8) ^ CRC_TABLE[((self.value >> 8) as u8 ^ byte) as usize];
    }

    pub fn add_slice(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.add(b);
        }
    }

    #[inline]
    pub fn set_value(&mut self, value: u16) {
        self.value = value;
    }

    #[inline]
    pub fn value(&self) -> u16 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream_codec::{ID_ADDRESS_BYTE, MFM_POST_SYNC_CRC_VALUE, MFM_SYNC_BYTE};

    #[test]
    fn test_three_syncs_seed() {
        let mut crc = Crc16::new();
        crc.add_slice(&[MFM_SYNC_BYTE; 3]);
        assert_eq!(crc.value(), MFM_POST_SYNC_CRC_VALUE);
    }

    #[test]
    fn test_check_value() {
        // CRC-16/IBM-3740 check value.
        let mut crc = Crc16::new();
        crc.add_slice(b"123456789");
        assert_eq!(crc.value(), 0x29B1);
    }

    #[test]
    fn test_field_with_crc_checks_to_zero() {
        let field = [MFM_SYNC_BYTE, MFM_SYNC_BYTE, MFM_SYNC_BYTE, ID_ADDRESS_BYTE, 0, 0, 1, 2];
        let mut crc = Crc16::new();
        crc.add_slice(&field);
        let value = crc.value();
        crc.add((value >> 8) as u8);
        crc.add(value as u8);
        assert_eq!(crc.value(), 0);
    }
}
