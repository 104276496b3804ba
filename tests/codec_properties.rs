mod common;

use bit_vec::BitVec;
use common::*;
use fluxfox_drive::{
    bitstream_codec::{Encoder, MfmEncoder, MFM_POST_SYNC_CRC_VALUE},
    prelude::*,
    track::serialize_track,
    track_schema::{commodore, system34::TrackEncodeParams},
    types::time::time,
};
use proptest::prelude::*;

/// Index mark and gap 1, rounded up.
const TRACK_PREAMBLE_BYTES: usize = 60;
/// Syncs, marks, ID, CRCs and gaps around one sector's data, rounded up for both FM and MFM.
const SECTOR_OVERHEAD_BYTES: usize = 120;

fn sector_strategy(c: u8, h: u8) -> impl Strategy<Value = Sector> {
    (any::<u8>(), 0u8..=3, any::<u8>()).prop_map(move |(s, n, seed)| {
        let len = SectorAddress::n_to_bytes(n);
        let data = (0..len).map(|i| seed.wrapping_add((i as u8).wrapping_mul(31))).collect();
        Sector::new(SectorAddress::new(c, h, s), n, data)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn system34_round_trip(
        sectors in proptest::collection::vec(sector_strategy(3, 1), 1..=8),
        mfm in any::<bool>()
    ) {
        init();
        let density = if mfm { TrackDensity::Double } else { TrackDensity::Single };
        // Keep only as many sectors as fit in one rotation, counting marks, gaps and CRCs.
        let mut room = TrackEncodeParams::default_for(density).track_bytes - TRACK_PREAMBLE_BYTES;
        let sectors: Vec<Sector> = sectors
            .into_iter()
            .take_while(|sector| {
                let needed = sector.declared_len() + SECTOR_OVERHEAD_BYTES;
                let fits = needed <= room;
                room = room.saturating_sub(needed);
                fits
            })
            .collect();
        let track = encode_track(&sectors, density);
        prop_assert_eq!(decode_sectors(&track, density), sectors);
    }

    #[test]
    fn crc_is_seeded_after_every_sync(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let mut encoder = MfmEncoder::new();
        encoder.add_bytes(0x4E, 8);
        encoder.add_bytes(0x00, 12);
        encoder.add_id_address_mark();
        for byte in &bytes {
            encoder.add_byte(*byte);
        }
        encoder.add_crc(false);
        encoder.add_bytes(0x00, 12);
        encoder.add_data_address_mark();

        // Header bytes are read with syncs suspended, the way a sector reader consumes them.
        let mut shifter = Shifter::new(true);
        let mut tokens = Vec::new();
        let mut header_left = 0;
        for bit in encoder.take_bits().iter() {
            let Some(token) = shifter.add_input_bit(bit)
            else {
                continue;
            };
            match token {
                Token::Sync => {
                    prop_assert_eq!(shifter.crc().value(), MFM_POST_SYNC_CRC_VALUE);
                }
                Token::Id => {
                    header_left = bytes.len() + 2;
                    shifter.set_should_obey_syncs(false);
                }
                Token::Byte(_) if header_left > 0 => {
                    header_left -= 1;
                    if header_left == 0 {
                        prop_assert_eq!(shifter.crc().value(), 0);
                        shifter.set_should_obey_syncs(true);
                    }
                }
                _ => {}
            }
            tokens.push(token);
        }

        for mark in [Token::Id, Token::Data] {
            let position = tokens.iter().position(|t| *t == mark);
            prop_assert!(matches!(position, Some(p) if p >= 3), "{} not preceded by syncs", mark);
            let position = position.unwrap_or_default();
            prop_assert_eq!(&tokens[position - 3..position], &[Token::Sync; 3]);
        }
    }

    #[test]
    fn gcr_round_trip(track_number in 1u8..=35, seed in any::<u8>()) {
        let count = fluxfox_drive::bitstream_codec::gcr::sectors_in_track(track_number);
        let sectors: Vec<Sector> = (0..count)
            .map(|s| {
                let data = (0..256).map(|i| seed ^ (i as u8).wrapping_add(s)).collect();
                Sector::new(SectorAddress::new(track_number, 0, s), 1, data)
            })
            .collect();
        let track = commodore::encode_track(track_number, [seed, !seed], &sectors);
        prop_assert_eq!(commodore::decode_track(&track, track_number), sectors);
    }
}

#[test]
fn single_sector_round_trip_and_corruption() {
    init();
    let sector = Sector::new(SectorAddress::new(0, 0, 0), 1, (0..=255).collect());
    let track = encode_track(std::slice::from_ref(&sector), TrackDensity::Double);
    assert_eq!(decode_sectors(&track, TrackDensity::Double), vec![sector.clone()]);

    let mut corrupted = sector.clone();
    corrupted.flags |= SectorFlags::DATA_CRC_ERROR;
    let decoded = decode_sectors(&encode_track(&[corrupted], TrackDensity::Double), TrackDensity::Double);
    assert_eq!(decoded.len(), 1);
    assert!(decoded[0].has_data_crc_error());
    assert!(!decoded[0].has_header_crc_error());
    assert_eq!(decoded[0].data, sector.data);
}

#[test]
fn all_zero_segment_has_no_tokens() {
    init();
    let mut shifter = Shifter::new(true);
    let zeros = BitVec::from_elem(100_000, false);
    assert_eq!(zeros.iter().filter_map(|bit| shifter.add_input_bit(bit)).count(), 0);

    // The same holds for the cells the serializer recovers from an all-zero track.
    let track = Track::from(PcmSegment::new(time(1, 100_000), zeros.clone()));
    let recovered = serialize_track(&track, TrackDensity::Double.bit_length());
    let mut shifter = Shifter::new(true);
    assert_eq!(recovered.data.iter().filter_map(|bit| shifter.add_input_bit(bit)).count(), 0);

    let track = Track::from(PcmSegment::new(time(1, 100_000), zeros));
    for density in [TrackDensity::Single, TrackDensity::Double, TrackDensity::High] {
        assert!(decode_sectors(&track, density).is_empty());
    }
}

#[test]
fn pll_locks_to_periodic_pulses() {
    init();
    let mut pll = DigitalPll::new(100, 3);
    let mut ones = 0;
    let mut zeros = 0;
    // A transition every second cell, slightly fast.
    for i in 0..2000 {
        zeros += pll.run_for(196);
        if pll.add_pulse() {
            ones += 1;
        }
        if i == 100 {
            ones = 0;
            zeros = 0;
        }
    }
    assert_eq!(ones, 1899);
    assert_eq!(zeros, 1899);
}
