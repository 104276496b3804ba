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

    src/bitstream_codec/gcr.rs

    Commodore 4-to-5 group code recording.
*/

//! Commodore drives record each nibble as a five-bit group chosen so that no more than two zero
//! bits ever occur in a row and no group is all ones. Ten or more consecutive ones can therefore
//! only be a sync.
//!
//! The 1541 also divides the disk into four speed zones. Outer tracks are longer, so they are
//! written with a shorter bit cell and hold more sectors.

use crate::types::{time::time, Time};

/// Five-bit group for each nibble value.
pub const GCR_ENCODE: [u8; 16] = [
    0x0A, 0x0B, 0x12, 0x13, 0x0E, 0x0F, 0x16, 0x17, 0x09, 0x19, 0x1A, 0x1B, 0x0D, 0x1D, 0x1E, 0x15,
];

const GCR_INVALID: u8 = 0xFF;

const fn make_decode_table() -> [u8; 32] {
    let mut table = [GCR_INVALID; 32];
    let mut i = 0;
    while i < 16 {
        table[GCR_ENCODE[i] as usize] = i as u8;
        i += 1;
    }
    table
}

/// Nibble value for each five-bit group, or 0xFF for groups that are not valid GCR.
pub static GCR_DECODE: [u8; 32] = make_decode_table();

/// The number of one bits that signal a sync when read.
pub const GCR_SYNC_BITS: usize = 10;

/// Return the speed zone (0-3, slowest to fastest) for a 1-based track number.
pub fn zone_for_track(track: u8) -> u8 {
    match track {
        0..=17 => 3,
        18..=24 => 2,
        25..=30 => 1,
        _ => 0,
    }
}

/// Return the number of sectors on a 1-based track.
pub fn sectors_in_track(track: u8) -> u8 {
    match zone_for_track(track) {
        3 => 21,
        2 => 19,
        1 => 18,
        _ => 17,
    }
}

/// Return the length of a bit cell in `zone` as a fraction of a rotation at 300RPM.
///
/// The 1541 derives its bit clock by dividing 16MHz by (16 - zone) and again by 4, so a cell is
/// (16 - zone) / 4,000,000 seconds, and there are 5 rotations per second.
pub fn bit_length_for_zone(zone: u8) -> Time {
    time(16 - zone.min(3) as u64, 800_000)
}

/// Encode four bytes as five GCR bytes.
pub fn encode_block(input: &[u8; 4]) -> [u8; 5] {
    let mut bits: u64 = 0;
    for &byte in input {
        bits = (bits << 5) | GCR_ENCODE[(byte >> 4) as usize] as u64;
        bits = (bits << 5) | GCR_ENCODE[(byte & 0x0F) as usize] as u64;
    }
    let mut out = [0u8; 5];
    for (i, o) in out.iter_mut().enumerate() {
        *o = (bits >> (32 - i * 8)) as u8;
    }
    out
}

/// Decode five GCR bytes into four bytes. Returns None if any group is not valid GCR.
pub fn decode_block(input: &[u8; 5]) -> Option<[u8; 4]> {
    let bits = input.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
    let mut out = [0u8; 4];
    for (i, o) in out.iter_mut().enumerate() {
        let hi = GCR_DECODE[((bits >> (35 - i * 10)) & 0x1F) as usize];
        let lo = GCR_DECODE[((bits >> (30 - i * 10)) & 0x1F) as usize];
        if hi == GCR_INVALID || lo == GCR_INVALID {
            return None;
        }
        *o = (hi << 4) | lo;
    }
    Some(out)
}

/// Encode a byte slice whose length is a multiple of four.
pub fn encode_bytes(input: &[u8]) -> Vec<u8> {
    debug_assert!(input.len() % 4 == 0);
    let mut out = Vec::with_capacity(input.len() / 4 * 5);
    for chunk in input.chunks_exact(4) {
        let mut block = [0u8; 4];
        block.copy_from_slice(chunk);
        out.extend_from_slice(&encode_block(&block));
    }
    out
}

/// Decode a GCR byte slice whose length is a multiple of five.
pub fn decode_bytes(input: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() / 5 * 4);
    for chunk in input.chunks_exact(5) {
        let mut block = [0u8; 5];
        block.copy_from_slice(chunk);
        out.extend_from_slice(&decode_block(&block)?);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_has_no_long_zero_runs() {
        for group in GCR_ENCODE {
            // No two leading zeros, no two trailing zeros, never three zeros inside a group.
            assert!(group & 0x18 != 0);
            assert!(group & 0x03 != 0);
            for shift in 0..3 {
                assert_ne!((group >> shift) & 0x07, 0);
            }
        }
    }

    #[test]
    fn test_known_block() {
        // A 1541 header block begins 0x08; a data block begins 0x07.
        assert_eq!(encode_block(&[0x08, 0x00, 0x00, 0x00])[0], 0x52);
        assert_eq!(encode_block(&[0x07, 0x00, 0x00, 0x00])[0], 0x55);
        assert_eq!(encode_block(&[0x00, 0x00, 0x00, 0x00]), [0x52, 0x94, 0xA5, 0x29, 0x4A]);
    }

    #[test]
    fn test_block_round_trip() {
        let input = [0xDE, 0xAD, 0x01, 0x7F];
        assert_eq!(decode_block(&encode_block(&input)), Some(input));
        assert_eq!(decode_block(&[0x00; 5]), None);
    }

    #[test]
    fn test_zones() {
        assert_eq!(sectors_in_track(1), 21);
        assert_eq!(sectors_in_track(18), 19);
        assert_eq!(sectors_in_track(30), 18);
        assert_eq!(sectors_in_track(35), 17);
        assert_eq!(bit_length_for_zone(0), time(1, 50_000));
        assert!(bit_length_for_zone(3) < bit_length_for_zone(0));
    }
}
