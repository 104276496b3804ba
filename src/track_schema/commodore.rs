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

    src/track_schema/commodore.rs

    The Commodore 1541 sector <-> track codec.
*/

//! Encode and decode Commodore 1541 tracks.
//!
//! Each sector is recorded as two blocks, each preceded by a sync of at least ten consecutive one
//! bits:
//!
//! ```text
//! [sync] header: 08 chk s t id2 id1 0F 0F  [gap] [sync] data: 07 (256 bytes) chk 00 00  [gap]
//! ```
//!
//! Both blocks are GCR encoded. Checksums are the XOR of the covered bytes, and a mismatch is
//! reported as a CRC error flag on the [Sector].

use crate::{
    bitstream_codec::gcr::{bit_length_for_zone, decode_bytes, encode_bytes, zone_for_track, GCR_SYNC_BITS},
    track::{serialize_track, PcmSegment, PcmTrack, Track},
    types::{Sector, SectorAddress, SectorFlags, Time},
};
use bit_vec::BitVec;
use num_traits::One;

/// The data payload of every 1541 sector.
pub const GCR_SECTOR_SIZE: usize = 256;
/// The size code recorded on decoded sectors.
pub const GCR_SECTOR_SIZE_CODE: u8 = 1;

const HEADER_BLOCK_ID: u8 = 0x08;
const DATA_BLOCK_ID: u8 = 0x07;
const HEADER_PAD: u8 = 0x0F;
const GAP_BYTE: u8 = 0x55;
const SYNC_BYTES: usize = 5;
const HEADER_GAP_BYTES: usize = 9;
const MIN_SECTOR_GAP_BYTES: usize = 4;

const HEADER_BLOCK_LEN: usize = 8;
const DATA_BLOCK_LEN: usize = GCR_SECTOR_SIZE + 4;

fn gcr_len(len: usize) -> usize {
    len / 4 * 5
}

fn push_byte(bits: &mut BitVec, byte: u8) {
    for i in (0..8).rev() {
        bits.push(byte & (1 << i) != 0);
    }
}

fn push_raw(bits: &mut BitVec, bytes: &[u8]) {
    for &byte in bytes {
        push_byte(bits, byte);
    }
}

fn read_raw(bits: &BitVec, start: usize, count: usize) -> Option<Vec<u8>> {
    if start + count * 8 > bits.len() {
        return None;
    }
    Some(
        (0..count)
            .map(|i| (0..8).fold(0u8, |acc, b| (acc << 1) | bits[start + i * 8 + b] as u8))
            .collect(),
    )
}

fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Return the number of whole bit cells in one rotation of a 1-based track.
pub fn bits_in_track(track_number: u8) -> usize {
    (Time::one() / bit_length_for_zone(zone_for_track(track_number))).to_integer() as usize
}

/// Encode `sectors` onto a new track.
///
/// `track_number` is 1-based and selects the speed zone. `disk_id` is the two byte id recorded in
/// every header. Sector addresses are taken from each sector's `s` field; the `c` field is ignored
/// in favour of `track_number`. Data is padded or truncated to 256 bytes. The CRC error flags write
/// a deliberately wrong checksum.
pub fn encode_track(track_number: u8, disk_id: [u8; 2], sectors: &[Sector]) -> Track {
    let zone = zone_for_track(track_number);
    let track_bits = bits_in_track(track_number);
    let track_bytes = track_bits / 8;

    let sector_bytes = SYNC_BYTES + gcr_len(HEADER_BLOCK_LEN) + HEADER_GAP_BYTES + SYNC_BYTES + gcr_len(DATA_BLOCK_LEN);
    let gap_bytes = match sectors.len() {
        0 => 0,
        n => (track_bytes.saturating_sub(n * sector_bytes) / n).max(MIN_SECTOR_GAP_BYTES),
    };

    let mut bits = BitVec::with_capacity(track_bits);
    for sector in sectors {
        let s = sector.address.s();
        let mut checksum = s ^ track_number ^ disk_id[1] ^ disk_id[0];
        if sector.has_header_crc_error() {
            checksum ^= 0xFF;
        }
        let header = [
            HEADER_BLOCK_ID,
            checksum,
            s,
            track_number,
            disk_id[1],
            disk_id[0],
            HEADER_PAD,
            HEADER_PAD,
        ];
        push_raw(&mut bits, &[0xFF; SYNC_BYTES]);
        push_raw(&mut bits, &encode_bytes(&header));
        push_raw(&mut bits, &[GAP_BYTE; HEADER_GAP_BYTES]);

        let mut block = Vec::with_capacity(DATA_BLOCK_LEN);
        block.push(DATA_BLOCK_ID);
        block.extend((0..GCR_SECTOR_SIZE).map(|i| sector.data.get(i).copied().unwrap_or(0)));
        let mut checksum = xor_checksum(&block[1..]);
        if sector.has_data_crc_error() {
            checksum ^= 0xFF;
        }
        block.extend_from_slice(&[checksum, 0x00, 0x00]);

        push_raw(&mut bits, &[0xFF; SYNC_BYTES]);
        push_raw(&mut bits, &encode_bytes(&block));
        push_raw(&mut bits, &vec![GAP_BYTE; gap_bytes]);
    }

    while bits.len() + 8 <= track_bits {
        push_byte(&mut bits, GAP_BYTE);
    }
    if bits.len() > track_bits {
        log::warn!(
            "encode_track(): track {} overran its nominal length by {} bits; truncating",
            track_number,
            bits.len() - track_bits
        );
        bits.truncate(track_bits);
    }

    log::trace!(
        "encode_track(): track {} zone {}: {} sectors, {} bit cells",
        track_number,
        zone,
        sectors.len(),
        bits.len()
    );
    Track::from(PcmTrack::new(PcmSegment::new(bit_length_for_zone(zone), bits)))
}

/// Decode every sector on `track`, which is the 1-based track `track_number`.
pub fn decode_track(track: &Track, track_number: u8) -> Vec<Sector> {
    let segment = serialize_track(track, bit_length_for_zone(zone_for_track(track_number)));
    sectors_from_bits(&segment.data)
}

/// Return the bit offset of the first bit following each sync in `bits`.
fn find_syncs(bits: &BitVec) -> Vec<usize> {
    let mut syncs = Vec::new();
    let mut ones = 0;
    for (i, bit) in bits.iter().enumerate() {
        if bit {
            ones += 1;
            continue;
        }
        if ones >= GCR_SYNC_BITS {
            syncs.push(i);
        }
        ones = 0;
    }
    syncs
}

fn sectors_from_bits(bits: &BitVec) -> Vec<Sector> {
    let mut sectors = Vec::new();
    let mut pending: Option<Sector> = None;

    for start in find_syncs(bits) {
        let Some(first) = read_raw(bits, start, 5).and_then(|raw| decode_bytes(&raw))
        else {
            continue;
        };

        match first[0] {
            HEADER_BLOCK_ID => {
                let Some(header) = read_raw(bits, start, gcr_len(HEADER_BLOCK_LEN)).and_then(|raw| decode_bytes(&raw))
                else {
                    continue;
                };
                if let Some(sector) = pending.take() {
                    sectors.push(sector);
                }
                let mut sector = Sector::new(
                    SectorAddress::new(header[3], 0, header[2]),
                    GCR_SECTOR_SIZE_CODE,
                    Vec::new(),
                );
                if xor_checksum(&header[2..6]) != header[1] {
                    sector.flags |= SectorFlags::HEADER_CRC_ERROR;
                }
                log::trace!("sectors_from_bits(): header {} at bit {}", sector.address, start);
                pending = Some(sector);
            }
            DATA_BLOCK_ID => {
                let Some(mut sector) = pending.take()
                else {
                    log::debug!("sectors_from_bits(): data block at bit {} with no header", start);
                    continue;
                };
                match read_raw(bits, start, gcr_len(DATA_BLOCK_LEN)).and_then(|raw| decode_bytes(&raw)) {
                    Some(block) => {
                        let data = &block[1..=GCR_SECTOR_SIZE];
                        if xor_checksum(data) != block[GCR_SECTOR_SIZE + 1] {
                            sector.flags |= SectorFlags::DATA_CRC_ERROR;
                        }
                        sector.data = data.to_vec();
                    }
                    None => {
                        sector.flags |= SectorFlags::DATA_CRC_ERROR;
                    }
                }
                sectors.push(sector);
            }
            _ => {}
        }
    }

    if let Some(sector) = pending.take() {
        sectors.push(sector);
    }
    sectors
}
