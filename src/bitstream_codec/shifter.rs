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

    src/bitstream_codec/shifter.rs

    The read side of FM and MFM: bits in, tokens out.
*/

//! A [Shifter] accumulates recovered bits and recognises address marks, syncs and bytes.
//!
//! In FM mode the four address marks are recognised as 16-bit patterns; each resets the CRC and
//! adds its mark byte. In MFM mode the sync pattern is recognised and the 16 bits that follow are
//! classified as a mark byte. In both modes a byte is produced every 16 bits after the last token
//! and added to the CRC, unless those 16 cells hold no transitions at all. No FM or MFM byte
//! encodes to sixteen empty cells, so unformatted stretches of a track produce no tokens.
//!
//! Sync detection can be suspended with [Shifter::set_should_obey_syncs]. A sector reader does this
//! while consuming a header so header bytes are never misread as syncs.

use crate::bitstream_codec::{
    gather_byte,
    Crc16,
    Token,
    DATA_ADDRESS_BYTE,
    DELETED_DATA_ADDRESS_BYTE,
    FM_DATA_ADDRESS_MARK,
    FM_DELETED_DATA_ADDRESS_MARK,
    FM_ID_ADDRESS_MARK,
    FM_INDEX_ADDRESS_MARK,
    ID_ADDRESS_BYTE,
    INDEX_ADDRESS_BYTE,
    MFM_INDEX_SYNC,
    MFM_POST_SYNC_CRC_VALUE,
    MFM_SYNC,
};

#[derive(Clone, Debug)]
pub struct Shifter {
    shift_register: u32,
    bits_since_token: u32,
    is_mfm: bool,
    should_obey_syncs: bool,
    is_awaiting_marker_value: bool,
    crc: Crc16,
    latest_token: Option<Token>,
}

impl Default for Shifter {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Shifter {
    pub fn new(is_mfm: bool) -> Self {
        Self {
            shift_register: 0,
            bits_since_token: 0,
            is_mfm,
            should_obey_syncs: true,
            is_awaiting_marker_value: false,
            crc: Crc16::new(),
            latest_token: None,
        }
    }

    #[inline]
    pub fn is_mfm(&self) -> bool {
        self.is_mfm
    }

    pub fn set_is_mfm(&mut self, is_mfm: bool) {
        self.is_mfm = is_mfm;
        self.is_awaiting_marker_value = false;
    }

    pub fn set_should_obey_syncs(&mut self, obey: bool) {
        self.should_obey_syncs = obey;
    }

    #[inline]
    pub fn crc(&self) -> &Crc16 {
        &self.crc
    }

    /// Return the data byte held in the low 16 bits of the shift register.
    #[inline]
    pub fn get_byte(&self) -> u8 {
        gather_byte(self.shift_register as u16)
    }

    /// Return the most recent token produced, if any.
    #[inline]
    pub fn latest_token(&self) -> Option<Token> {
        self.latest_token
    }

    /// Shift in one recovered bit, returning a token if one was completed.
    pub fn add_input_bit(&mut self, bit: bool) -> Option<Token> {
        self.shift_register = (self.shift_register << 1) | bit as u32;
        self.bits_since_token += 1;

        let token = self.detect_marks();
        let token = token.or_else(|| self.detect_byte());
        if token.is_some() {
            self.latest_token = token;
        }
        token
    }

    fn detect_marks(&mut self) -> Option<Token> {
        if !self.should_obey_syncs {
            return None;
        }
        let pattern = self.shift_register as u16;

        if !self.is_mfm {
            let (token, mark_byte) = match pattern {
                FM_INDEX_ADDRESS_MARK => (Token::Index, INDEX_ADDRESS_BYTE),
                FM_ID_ADDRESS_MARK => (Token::Id, ID_ADDRESS_BYTE),
                FM_DATA_ADDRESS_MARK => (Token::Data, DATA_ADDRESS_BYTE),
                FM_DELETED_DATA_ADDRESS_MARK => (Token::DeletedData, DELETED_DATA_ADDRESS_BYTE),
                _ => return None,
            };
            self.crc.reset();
            self.crc.add(mark_byte);
            self.bits_since_token = 0;
            return Some(token);
        }

        match pattern {
            MFM_INDEX_SYNC if !self.is_awaiting_marker_value && self.bits_since_token & 1 != 0 => {
                // An index sync at an odd offset from the last token. Disk controllers of the era
                // emit the byte in flight and realign to the sync; some titles rely on it.
                self.bits_since_token = 0;
                Some(Token::Byte(self.get_byte()))
            }
            MFM_INDEX_SYNC | MFM_SYNC => {
                self.bits_since_token = 0;
                self.is_awaiting_marker_value = true;
                self.crc.set_value(MFM_POST_SYNC_CRC_VALUE);
                Some(Token::Sync)
            }
            _ => None,
        }
    }

    fn detect_byte(&mut self) -> Option<Token> {
        if self.bits_since_token < 16 {
            return None;
        }
        self.bits_since_token = 0;
        if self.shift_register as u16 == 0 && !self.is_awaiting_marker_value {
            return None;
        }

        let byte = self.get_byte();
        let mut token = Token::Byte(byte);
        if self.is_mfm && self.is_awaiting_marker_value {
            self.is_awaiting_marker_value = false;
            token = match byte {
                INDEX_ADDRESS_BYTE => Token::Index,
                ID_ADDRESS_BYTE => Token::Id,
                DATA_ADDRESS_BYTE => Token::Data,
                DELETED_DATA_ADDRESS_BYTE => Token::DeletedData,
                _ => token,
            };
        }
        self.crc.add(byte);
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream_codec::{push_short, Encoder, FmEncoder, MfmEncoder, MFM_SYNC_BYTE};
    use bit_vec::BitVec;

    fn collect_tokens(shifter: &mut Shifter, bits: &BitVec) -> Vec<Token> {
        bits.iter().filter_map(|b| shifter.add_input_bit(b)).collect()
    }

    #[test]
    fn test_mfm_id_field() {
        let mut encoder = MfmEncoder::new();
        encoder.add_bytes(0x4E, 4);
        encoder.add_bytes(0x00, 12);
        encoder.add_id_address_mark();
        for b in [1u8, 0, 3, 2] {
            encoder.add_byte(b);
        }
        let crc = encoder.crc().value();
        encoder.add_crc(false);

        let mut shifter = Shifter::new(true);
        let tokens = collect_tokens(&mut shifter, &encoder.take_bits());
        let sync_pos = tokens.iter().position(|t| *t == Token::Sync).unwrap();
        assert_eq!(
            tokens[sync_pos..].to_vec(),
            vec![
                Token::Sync,
                Token::Sync,
                Token::Sync,
                Token::Id,
                Token::Byte(1),
                Token::Byte(0),
                Token::Byte(3),
                Token::Byte(2),
                Token::Byte((crc >> 8) as u8),
                Token::Byte(crc as u8),
            ]
        );
        // After the ID, its header and its CRC, the running CRC checks to zero.
        assert_eq!(shifter.crc().value(), 0);
    }

    #[test]
    fn test_crc_seeded_after_every_sync() {
        let mut encoder = MfmEncoder::new();
        encoder.add_bytes(0x00, 8);
        encoder.add_data_address_mark();
        let mut shifter = Shifter::new(true);
        for bit in encoder.take_bits().iter() {
            if let Some(Token::Sync) = shifter.add_input_bit(bit) {
                assert_eq!(shifter.crc().value(), 0xCDB4);
            }
        }
        assert_eq!(shifter.latest_token(), Some(Token::Data));
    }

    #[test]
    fn test_fm_marks() {
        let mut encoder = FmEncoder::new();
        encoder.add_bytes(0xFF, 4);
        encoder.add_index_address_mark();
        encoder.add_bytes(0x00, 2);
        encoder.add_deleted_data_address_mark();
        encoder.add_byte(0x5A);
        encoder.add_crc(false);

        let mut shifter = Shifter::new(false);
        let tokens = collect_tokens(&mut shifter, &encoder.take_bits());
        let index_pos = tokens.iter().position(|t| *t == Token::Index).unwrap();
        assert_eq!(
            &tokens[index_pos..index_pos + 5],
            &[
                Token::Index,
                Token::Byte(0),
                Token::Byte(0),
                Token::DeletedData,
                Token::Byte(0x5A)
            ]
        );
        assert_eq!(shifter.crc().value(), 0);
    }

    #[test]
    fn test_syncs_ignored_when_not_obeyed() {
        let mut encoder = MfmEncoder::new();
        encoder.add_bytes(0x00, 4);
        encoder.add_id_address_mark();
        let mut shifter = Shifter::new(true);
        shifter.set_should_obey_syncs(false);
        let tokens = collect_tokens(&mut shifter, &encoder.take_bits());
        assert!(tokens.iter().all(|t| matches!(t, Token::Byte(_))));
    }

    #[test]
    fn test_empty_cells_make_no_bytes() {
        let mut shifter = Shifter::new(true);
        let mut bits = BitVec::from_elem(160, false);
        let mut encoder = MfmEncoder::new();
        encoder.add_byte(0x00);
        bits.extend(encoder.take_bits().iter());
        bits.extend(BitVec::from_elem(64, false).iter());

        // Only the recorded 0x00 is a byte; the empty cells around it are not.
        assert_eq!(collect_tokens(&mut shifter, &bits), vec![Token::Byte(0)]);
        assert_eq!(shifter.crc().value(), {
            let mut crc = Crc16::new();
            crc.add(0x00);
            crc.value()
        });
    }

    #[test]
    fn test_odd_index_sync_yields_byte() {
        let mut shifter = Shifter::new(true);
        let mut bits = BitVec::new();
        // Three bits of noise put the index sync at an odd offset from the last byte.
        for b in [true, false, true] {
            bits.push(b);
        }
        push_short(&mut bits, MFM_INDEX_SYNC);
        let tokens = collect_tokens(&mut shifter, &bits);
        assert_eq!(tokens.len(), 2);
        assert!(tokens.iter().all(|t| matches!(t, Token::Byte(_))));

        // The next index sync lands 16 bits later, an even offset, and is a proper sync.
        let mut bits = BitVec::new();
        push_short(&mut bits, MFM_INDEX_SYNC);
        let tokens = collect_tokens(&mut shifter, &bits);
        assert_eq!(tokens, vec![Token::Sync]);
        assert_eq!(Token::Sync.byte_value(), MFM_SYNC_BYTE);
    }
}
