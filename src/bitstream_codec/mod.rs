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

    src/bitstream_codec/mod.rs

    Line codes: FM and MFM shifting and encoding, the CCITT CRC, and Commodore GCR.
*/

//! The `bitstream_codec` module converts between bit cells and bytes.
//!
//! * [Shifter] is the read side for FM and MFM. It consumes one bit at a time from clock recovery
//!   and produces [Token]s: address marks, syncs and bytes.
//! * [FmEncoder] and [MfmEncoder] are the write side, producing bit cells from bytes and marks via
//!   the [Encoder] trait.
//! * [crc::Crc16] is the CCITT CRC used by both FM and MFM address and data fields.
//! * [gcr] holds the Commodore 4-to-5 group code.
//!
//! The mark patterns below are shared by the encoders, the shifter and every image format. They
//! must agree exactly; a mismatch is invisible until a sector fails to decode.

pub mod crc;
pub mod fm;
pub mod gcr;
pub mod mfm;
pub mod shifter;

use bit_vec::BitVec;
pub use crc::Crc16;
pub use fm::FmEncoder;
pub use mfm::MfmEncoder;
pub use shifter::Shifter;

use std::fmt::{Display, Formatter};

// FM address marks, as 16 interleaved clock and data bits. Each has missing clock bits, so it
// cannot occur in ordinary FM data.
pub const FM_INDEX_ADDRESS_MARK: u16 = 0xF77A;
pub const FM_ID_ADDRESS_MARK: u16 = 0xF57E;
pub const FM_DATA_ADDRESS_MARK: u16 = 0xF56F;
pub const FM_DELETED_DATA_ADDRESS_MARK: u16 = 0xF56A;

// MFM syncs. 0x4489 is 0xA1 with a missing clock bit; 0x5224 is 0xC2 with a missing clock bit.
pub const MFM_SYNC: u16 = 0x4489;
pub const MFM_INDEX_SYNC: u16 = 0x5224;
pub const MFM_SYNC_BYTE: u8 = 0xA1;
pub const MFM_INDEX_SYNC_BYTE: u8 = 0xC2;

// Address mark bytes. In FM these are the data bits of the marks above; in MFM they are the byte
// following three syncs.
pub const INDEX_ADDRESS_BYTE: u8 = 0xFC;
pub const ID_ADDRESS_BYTE: u8 = 0xFE;
pub const DATA_ADDRESS_BYTE: u8 = 0xFB;
pub const DELETED_DATA_ADDRESS_BYTE: u8 = 0xF8;

/// The CRC register value at the start of every field.
pub const CRC_INITIAL_VALUE: u16 = 0xFFFF;
/// The CRC register value after three 0xA1 syncs have been added to [CRC_INITIAL_VALUE].
pub const MFM_POST_SYNC_CRC_VALUE: u16 = 0xCDB4;

/// A single unit of [Shifter] output.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Token {
    Index,
    Id,
    Data,
    DeletedData,
    Sync,
    Byte(u8),
}

impl Token {
    /// Return the byte value this token represents on disk.
    pub fn byte_value(&self) -> u8 {
        match self {
            Token::Index => INDEX_ADDRESS_BYTE,
            Token::Id => ID_ADDRESS_BYTE,
            Token::Data => DATA_ADDRESS_BYTE,
            Token::DeletedData => DELETED_DATA_ADDRESS_BYTE,
            Token::Sync => MFM_SYNC_BYTE,
            Token::Byte(b) => *b,
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Index => write!(f, "IAM"),
            Token::Id => write!(f, "IDAM"),
            Token::Data => write!(f, "DAM"),
            Token::DeletedData => write!(f, "DDAM"),
            Token::Sync => write!(f, "SYNC"),
            Token::Byte(b) => write!(f, "{:02X}", b),
        }
    }
}

/// An `Encoder` produces FM or MFM bit cells from bytes and address marks, keeping a running CRC of
/// everything written since the last mark.
pub trait Encoder {
    /// Encode one data byte and add it to the CRC.
    fn add_byte(&mut self, byte: u8);
    /// Write an index address mark.
    fn add_index_address_mark(&mut self);
    /// Write an ID address mark, resetting the CRC.
    fn add_id_address_mark(&mut self);
    /// Write a data address mark, resetting the CRC.
    fn add_data_address_mark(&mut self);
    /// Write a deleted data address mark, resetting the CRC.
    fn add_deleted_data_address_mark(&mut self);
    /// Append 16 raw bit cells, most significant first. The CRC is not affected.
    fn output_short(&mut self, value: u16);

    fn crc(&self) -> &Crc16;

    /// Return the bits written so far and clear the output buffer. Encoder state, including the
    /// CRC and the last written bit, is retained.
    fn take_bits(&mut self) -> BitVec;

    /// Write the current CRC, high byte first. If `incorrectly` is set, the low bit of the CRC is
    /// inverted so the field will fail its check when read.
    fn add_crc(&mut self, incorrectly: bool) {
        let value = self.crc().value();
        self.add_byte((value >> 8) as u8);
        self.add_byte((value & 0xFF) as u8 ^ (incorrectly as u8));
    }

    /// Write `count` copies of `byte`.
    fn add_bytes(&mut self, byte: u8, count: usize) {
        for _ in 0..count {
            self.add_byte(byte);
        }
    }
}

/// Spread the bits of `byte` into the even bit positions of a u16.
#[inline]
pub(crate) fn spread_byte(byte: u8) -> u16 {
    let mut spread = 0u16;
    for i in 0..8 {
        spread |= (((byte >> i) & 1) as u16) << (i * 2);
    }
    spread
}

/// Collect the bits at even positions of `value` into a byte. This is the data byte of an FM or
/// MFM encoded short.
#[inline]
pub(crate) fn gather_byte(value: u16) -> u8 {
    let mut byte = 0u8;
    for i in 0..8 {
        byte |= (((value >> (i * 2)) & 1) as u8) << i;
    }
    byte
}

#[inline]
pub(crate) fn push_short(bits: &mut BitVec, value: u16) {
    for i in (0..16).rev() {
        bits.push(value & (1 << i) != 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_data_bits() {
        assert_eq!(gather_byte(FM_INDEX_ADDRESS_MARK), INDEX_ADDRESS_BYTE);
        assert_eq!(gather_byte(FM_ID_ADDRESS_MARK), ID_ADDRESS_BYTE);
        assert_eq!(gather_byte(FM_DATA_ADDRESS_MARK), DATA_ADDRESS_BYTE);
        assert_eq!(gather_byte(FM_DELETED_DATA_ADDRESS_MARK), DELETED_DATA_ADDRESS_BYTE);
        assert_eq!(gather_byte(MFM_SYNC), MFM_SYNC_BYTE);
        assert_eq!(gather_byte(MFM_INDEX_SYNC), MFM_INDEX_SYNC_BYTE);
    }

    #[test]
    fn test_spread_gather() {
        for b in [0x00u8, 0x01, 0x80, 0x4E, 0xA1, 0xFF] {
            assert_eq!(gather_byte(spread_byte(b)), b);
        }
        assert_eq!(spread_byte(0xFF), 0x5555);
    }
}
