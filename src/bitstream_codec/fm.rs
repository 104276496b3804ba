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

    src/bitstream_codec/fm.rs

    FM encoder.
*/
use crate::bitstream_codec::{
    push_short,
    spread_byte,
    Crc16,
    Encoder,
    DATA_ADDRESS_BYTE,
    DELETED_DATA_ADDRESS_BYTE,
    FM_DATA_ADDRESS_MARK,
    FM_DELETED_DATA_ADDRESS_MARK,
    FM_ID_ADDRESS_MARK,
    FM_INDEX_ADDRESS_MARK,
    ID_ADDRESS_BYTE,
    INDEX_ADDRESS_BYTE,
};
use bit_vec::BitVec;

/// Encodes bytes and marks as FM. Every data bit is preceded by a clock bit of 1; address marks
/// are written with specific clock bits missing.
#[derive(Clone, Debug, Default)]
pub struct FmEncoder {
    bits: BitVec,
    crc: Crc16,
}

impl FmEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_mark(&mut self, pattern: u16, mark_byte: u8) {
        self.crc.reset();
        self.crc.add(mark_byte);
        self.output_short(pattern);
    }
}

impl Encoder for FmEncoder {
    fn add_byte(&mut self, byte: u8) {
        self.crc.add(byte);
        self.output_short(spread_byte(byte) | 0xAAAA);
    }

    fn add_index_address_mark(&mut self) {
        self.add_mark(FM_INDEX_ADDRESS_MARK, INDEX_ADDRESS_BYTE);
    }

    fn add_id_address_mark(&mut self) {
        self.add_mark(FM_ID_ADDRESS_MARK, ID_ADDRESS_BYTE);
    }

    fn add_data_address_mark(&mut self) {
        self.add_mark(FM_DATA_ADDRESS_MARK, DATA_ADDRESS_BYTE);
    }

    fn add_deleted_data_address_mark(&mut self) {
        self.add_mark(FM_DELETED_DATA_ADDRESS_MARK, DELETED_DATA_ADDRESS_BYTE);
    }

    fn output_short(&mut self, value: u16) {
        push_short(&mut self.bits, value);
    }

    fn crc(&self) -> &Crc16 {
        &self.crc
    }

    fn take_bits(&mut self) -> BitVec {
        std::mem::take(&mut self.bits)
    }
}
