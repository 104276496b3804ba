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

    src/bitstream_codec/mfm.rs

    MFM encoder.
*/
use crate::bitstream_codec::{
    push_short,
    spread_byte,
    Crc16,
    Encoder,
    DATA_ADDRESS_BYTE,
    DELETED_DATA_ADDRESS_BYTE,
    ID_ADDRESS_BYTE,
    INDEX_ADDRESS_BYTE,
    MFM_INDEX_SYNC,
    MFM_POST_SYNC_CRC_VALUE,
    MFM_SYNC,
};
use bit_vec::BitVec;

/// The number of bit cells used to record one byte in MFM.
pub const MFM_BYTE_LEN: usize = 16;

/// Encodes bytes and marks as MFM.
///
/// A clock bit is written between two data bits only when both are zero. The last data bit
/// written is remembered across calls so that a byte following a mark or a previous byte is clocked
/// correctly.
#[derive(Clone, Debug, Default)]
pub struct MfmEncoder {
    bits: BitVec,
    last_output: u16,
    crc: Crc16,
}

impl MfmEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a byte without touching the CRC.
    pub fn encode_byte(&self, byte: u8) -> u16 {
        let spread = spread_byte(byte);
        // A clock bit is set where neither neighbouring data bit is.
        let or_bits = (spread << 1) | (spread >> 1) | (self.last_output << 15);
        spread | (!or_bits & 0xAAAA)
    }

    fn output_sync(&mut self) {
        for _ in 0..3 {
            self.output_short(MFM_SYNC);
        }
        self.crc.set_value(MFM_POST_SYNC_CRC_VALUE);
    }
}

impl Encoder for MfmEncoder {
    fn add_byte(&mut self, byte: u8) {
        self.crc.add(byte);
        let encoded = self.encode_byte(byte);
        self.output_short(encoded);
    }

    fn add_index_address_mark(&mut self) {
        for _ in 0..3 {
            self.output_short(MFM_INDEX_SYNC);
        }
        self.add_byte(INDEX_ADDRESS_BYTE);
    }

    fn add_id_address_mark(&mut self) {
        self.output_sync();
        self.add_byte(ID_ADDRESS_BYTE);
    }

    fn add_data_address_mark(&mut self) {
        self.output_sync();
        self.add_byte(DATA_ADDRESS_BYTE);
    }

    fn add_deleted_data_address_mark(&mut self) {
        self.output_sync();
        self.add_byte(DELETED_DATA_ADDRESS_BYTE);
    }

    fn output_short(&mut self, value: u16) {
        self.last_output = value;
        push_short(&mut self.bits, value);
    }

    fn crc(&self) -> &Crc16 {
        &self.crc
    }

    fn take_bits(&mut self) -> BitVec {
        std::mem::take(&mut self.bits)
    }
}
