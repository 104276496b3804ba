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

    src/track_schema/system34.rs

    The IBM System 34 sector <-> track codec.
*/

//! An implementation of the IBM System 34 track schema, in both its FM and MFM variants.
//!
//! A System 34 track begins with an index address mark and a gap, followed by one record per
//! sector:
//!
//! ```text
//! [sync] IDAM c h s n CRC [gap 2] [sync] DAM|DDAM data.. CRC [gap 3]
//! ```
//!
//! and is then filled to the nominal length of a rotation.

use crate::{
    bitstream_codec::{Encoder, FmEncoder, MfmEncoder, Shifter, Token},
    track::{serialize_track, PcmSegment, PcmTrack, Track},
    types::{Sector, SectorAddress, SectorFlags, TrackDensity},
};
use bit_vec::BitVec;

/// Gap byte written between fields in MFM.
pub const MFM_GAP_BYTE: u8 = 0x4E;
/// Gap byte written between fields in FM.
pub const FM_GAP_BYTE: u8 = 0xFF;
/// Byte written in the sync run before each mark.
pub const SYNC_BYTE: u8 = 0x00;

/// The number of bytes after the nominal track length that an encoded track may run to before it
/// is truncated, as a divisor of the nominal length.
const OVERRUN_DIVISOR: usize = 10;

/// Gap and sync lengths, in bytes, used when laying out a track.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackEncodeParams {
    /// Gap following the index address mark (gap 1).
    pub post_index_gap: usize,
    pub post_index_gap_byte: u8,
    /// Sync run before each ID address mark.
    pub pre_id_sync: usize,
    /// Gap between the ID field and the data field (gap 2).
    pub post_id_gap: usize,
    pub post_id_gap_byte: u8,
    /// Sync run before each data address mark.
    pub pre_data_sync: usize,
    /// Gap following each data field (gap 3).
    pub post_data_gap: usize,
    /// Byte used for gap 3 and to fill the track to its nominal length.
    pub filler: u8,
    /// The nominal length of the track in bytes.
    pub track_bytes: usize,
}

impl Default for TrackEncodeParams {
    fn default() -> Self {
        Self::default_for(TrackDensity::Double)
    }
}

impl TrackEncodeParams {
    /// Return the standard layout for `density`.
    pub fn default_for(density: TrackDensity) -> Self {
        let track_bytes = density.bitcells_per_rotation() / 16;
        match density {
            TrackDensity::Single => TrackEncodeParams {
                post_index_gap: 26,
                post_index_gap_byte: FM_GAP_BYTE,
                pre_id_sync: 6,
                post_id_gap: 11,
                post_id_gap_byte: FM_GAP_BYTE,
                pre_data_sync: 6,
                post_data_gap: 27,
                filler: FM_GAP_BYTE,
                track_bytes,
            },
            TrackDensity::Double | TrackDensity::High => TrackEncodeParams {
                post_index_gap: 50,
                post_index_gap_byte: MFM_GAP_BYTE,
                pre_id_sync: 12,
                post_id_gap: 22,
                post_id_gap_byte: MFM_GAP_BYTE,
                pre_data_sync: 12,
                post_data_gap: 54,
                filler: MFM_GAP_BYTE,
                track_bytes,
            },
        }
    }
}

/// Encode `sectors` onto a new track at `density` using the standard layout.
pub fn encode_track(sectors: &[Sector], density: TrackDensity) -> Track {
    encode_track_with_params(sectors, density, &TrackEncodeParams::default_for(density))
}

/// Encode `sectors` onto a new track at `density` using the layout in `params`.
///
/// Each sector's data is padded with zeros or truncated to the length its size code declares. A
/// sector with no data is written as an ID field only. The sector's flags are honoured:
/// `DELETED` writes a deleted data mark, and the CRC error flags write a deliberately wrong CRC.
pub fn encode_track_with_params(sectors: &[Sector], density: TrackDensity, params: &TrackEncodeParams) -> Track {
    let bits = match density.is_mfm() {
        true => layout_track(&mut MfmEncoder::new(), sectors, params),
        false => layout_track(&mut FmEncoder::new(), sectors, params),
    };
    log::trace!(
        "encode_track(): {} sectors, {} density, {} bit cells",
        sectors.len(),
        density,
        bits.len()
    );
    Track::from(PcmTrack::new(PcmSegment::new(density.bit_length(), bits)))
}

fn layout_track<E: Encoder>(encoder: &mut E, sectors: &[Sector], params: &TrackEncodeParams) -> BitVec {
    encoder.add_index_address_mark();
    encoder.add_bytes(params.post_index_gap_byte, params.post_index_gap);

    for sector in sectors {
        encoder.add_bytes(SYNC_BYTE, params.pre_id_sync);
        encoder.add_id_address_mark();
        encoder.add_byte(sector.address.c());
        encoder.add_byte(sector.address.h());
        encoder.add_byte(sector.address.s());
        encoder.add_byte(sector.size);
        encoder.add_crc(sector.has_header_crc_error());

        encoder.add_bytes(params.post_id_gap_byte, params.post_id_gap);
        encoder.add_bytes(SYNC_BYTE, params.pre_data_sync);

        if !sector.data.is_empty() {
            if sector.is_deleted() {
                encoder.add_deleted_data_address_mark();
            }
            else {
                encoder.add_data_address_mark();
            }
            let declared_len = sector.declared_len();
            for i in 0..declared_len {
                encoder.add_byte(sector.data.get(i).copied().unwrap_or(0));
            }
            encoder.add_crc(sector.has_data_crc_error());
        }

        encoder.add_bytes(params.filler, params.post_data_gap);
    }

    let mut bits = encoder.take_bits();
    let nominal_len = params.track_bytes * 16;
    let max_len = nominal_len + nominal_len / OVERRUN_DIVISOR;
    if bits.len() < nominal_len {
        let shortfall = (nominal_len - bits.len()) / 16;
        encoder.add_bytes(params.filler, shortfall);
        bits.extend(encoder.take_bits().iter());
    }
    else if bits.len() > max_len {
        log::warn!(
            "encode_track(): track overran its nominal length by {} bits; truncating",
            bits.len() - nominal_len
        );
        bits.truncate(max_len);
    }
    bits
}

/// Decode every sector on `track`, in track order, reading it at the bit rate of `density`.
///
/// CRC mismatches and deleted marks are reported through each sector's flags. A track with no
/// recognisable marks decodes to no sectors.
pub fn decode_sectors(track: &Track, density: TrackDensity) -> Vec<Sector> {
    let segment = serialize_track(track, density.bit_length());
    sectors_from_segment(&segment, density.is_mfm())
}

#[derive(Debug)]
enum ReadState {
    Idle,
    Header(Vec<u8>),
    AwaitingData,
    Data { bytes: Vec<u8>, deleted: bool },
}

/// Decode every sector in a PCM segment already at the nominal bit rate.
pub fn sectors_from_segment(segment: &PcmSegment, is_mfm: bool) -> Vec<Sector> {
    let mut shifter = Shifter::new(is_mfm);
    let mut sectors = Vec::new();
    let mut pending: Option<Sector> = None;
    let mut state = ReadState::Idle;

    for bit in segment.data.iter() {
        let Some(token) = shifter.add_input_bit(bit)
        else {
            continue;
        };

        state = match (state, token) {
            (_, Token::Id) => {
                // A header with no data field is still reported.
                if let Some(sector) = pending.take() {
                    sectors.push(sector);
                }
                shifter.set_should_obey_syncs(false);
                ReadState::Header(Vec::with_capacity(6))
            }
            (ReadState::Header(mut bytes), Token::Byte(b)) => {
                bytes.push(b);
                if bytes.len() < 6 {
                    ReadState::Header(bytes)
                }
                else {
                    let mut sector = Sector::new(SectorAddress::new(bytes[0], bytes[1], bytes[2]), bytes[3], Vec::new());
                    if shifter.crc().value() != 0 {
                        sector.flags |= SectorFlags::HEADER_CRC_ERROR;
                    }
                    log::trace!("sectors_from_segment(): ID {}", sector.address);
                    pending = Some(sector);
                    shifter.set_should_obey_syncs(true);
                    ReadState::AwaitingData
                }
            }
            (ReadState::AwaitingData, Token::Data | Token::DeletedData) => {
                shifter.set_should_obey_syncs(false);
                let capacity = pending.as_ref().map(|s| s.declared_len()).unwrap_or(0) + 2;
                ReadState::Data {
                    bytes: Vec::with_capacity(capacity),
                    deleted: token == Token::DeletedData,
                }
            }
            (
                ReadState::Data {
                    mut bytes,
                    deleted,
                },
                Token::Byte(b),
            ) => {
                bytes.push(b);
                match pending.take() {
                    Some(mut sector) if bytes.len() == sector.declared_len() + 2 => {
                        bytes.truncate(sector.declared_len());
                        sector.data = bytes;
                        if deleted {
                            sector.flags |= SectorFlags::DELETED;
                        }
                        if shifter.crc().value() != 0 {
                            sector.flags |= SectorFlags::DATA_CRC_ERROR;
                        }
                        log::trace!("sectors_from_segment(): sector {}", sector);
                        sectors.push(sector);
                        shifter.set_should_obey_syncs(true);
                        ReadState::Idle
                    }
                    Some(sector) => {
                        pending = Some(sector);
                        ReadState::Data { bytes, deleted }
                    }
                    None => {
                        shifter.set_should_obey_syncs(true);
                        ReadState::Idle
                    }
                }
            }
            (state, _) => state,
        };
    }

    if let Some(sector) = pending.take() {
        sectors.push(sector);
    }
    sectors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::time::time;

    fn make_sector(c: u8, h: u8, s: u8, n: u8) -> Sector {
        let len = SectorAddress::n_to_bytes(n);
        let data = (0..len).map(|i| (i as u8).wrapping_mul(s.wrapping_add(7))).collect();
        Sector::new(SectorAddress::new(c, h, s), n, data)
    }

    #[test]
    fn test_single_sector_mfm() {
        let sector = make_sector(0, 0, 0, 1);
        let track = encode_track(std::slice::from_ref(&sector), TrackDensity::Double);
        let decoded = decode_sectors(&track, TrackDensity::Double);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].address, SectorAddress::new(0, 0, 0));
        assert_eq!(decoded[0].size, 1);
        assert_eq!(decoded[0].data.len(), 256);
        assert!(!decoded[0].has_data_crc_error());
        assert_eq!(decoded[0], sector);
    }

    #[test]
    fn test_round_trip_each_density() {
        let layouts = [
            (TrackDensity::Single, 8u8, 1u8),
            (TrackDensity::Double, 9, 2),
            (TrackDensity::High, 18, 2),
        ];
        for (density, count, n) in layouts {
            let sectors: Vec<Sector> = (1..=count).map(|s| make_sector(5, 1, s, n)).collect();
            let track = encode_track(&sectors, density);
            let decoded = decode_sectors(&track, density);
            assert_eq!(decoded, sectors, "{} density", density);
        }
    }

    #[test]
    fn test_corrupt_payload_byte() {
        let sector = make_sector(0, 0, 0, 1);
        let params = TrackEncodeParams::default_for(TrackDensity::Double);
        let track = encode_track(std::slice::from_ref(&sector), TrackDensity::Double);

        let Track::Pcm(pcm) = track
        else {
            panic!("expected a PCM track");
        };
        let mut segment = pcm.segments().next().unwrap().clone();

        // Offset of the first data byte: index mark, gap 1, sync, IDAM, header, CRC, gap 2, sync,
        // DAM.
        let data_start =
            4 + params.post_index_gap + params.pre_id_sync + 4 + 4 + 2 + params.post_id_gap + params.pre_data_sync + 4;
        let target = data_start + 10;
        // The last cell of an encoded byte is its least significant data bit.
        let cell = target * 16 + 15;
        let bit = segment.data[cell];
        segment.data.set(cell, !bit);

        let decoded = decode_sectors(&Track::from(segment), TrackDensity::Double);
        assert_eq!(decoded.len(), 1);
        assert!(decoded[0].has_data_crc_error());
        assert!(!decoded[0].has_header_crc_error());
        assert_eq!(decoded[0].data.len(), 256);
        assert_eq!(decoded[0].data[10], sector.data[10] ^ 1);
        assert_eq!(decoded[0].data[11..], sector.data[11..]);
    }

    #[test]
    fn test_flags_are_reproduced() {
        let mut sectors: Vec<Sector> = (1..=4).map(|s| make_sector(1, 0, s, 2)).collect();
        sectors[0].flags = SectorFlags::DELETED;
        sectors[1].flags = SectorFlags::HEADER_CRC_ERROR;
        sectors[2].flags = SectorFlags::DATA_CRC_ERROR;
        for density in [TrackDensity::Single, TrackDensity::Double] {
            let decoded = decode_sectors(&encode_track(&sectors, density), density);
            assert_eq!(decoded, sectors);
        }
    }

    #[test]
    fn test_short_data_is_padded_and_id_only_kept() {
        let mut short = Sector::new(SectorAddress::new(2, 0, 1), 0, vec![0xE5; 100]);
        let id_only = Sector::new(SectorAddress::new(2, 0, 2), 0, Vec::new());
        let decoded = decode_sectors(&encode_track(&[short.clone(), id_only.clone()], TrackDensity::Double), TrackDensity::Double);
        short.data.resize(128, 0);
        assert_eq!(decoded, vec![short, id_only]);
    }

    #[test]
    fn test_unformatted_track_has_no_sectors() {
        let blank = Track::from(PcmSegment::new(time(1, 100_000), BitVec::from_elem(100_000, false)));
        assert!(decode_sectors(&blank, TrackDensity::Double).is_empty());
        let mut shifter = Shifter::new(true);
        let tokens = BitVec::from_elem(1000, false)
            .iter()
            .filter_map(|b| shifter.add_input_bit(b))
            .count();
        assert_eq!(tokens, 0);
    }
}
