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

    src/track/serializer.rs

    Serialize any track into a single PCM segment at a given bit rate.
*/

//! Serializing a track replays it through a [DigitalPll] at a chosen nominal bit length and
//! records the recovered bits. This is how arbitrary tracks (patched tracks, zoned tracks, tracks
//! captured at a different rate) are brought to a single uniform bit cell for sector decoding or
//! for writing to a bitstream image.

use crate::{
    flux::pll::DigitalPll,
    track::{PcmSegment, Track, TrackEventKind},
    types::Time,
};
use bit_vec::BitVec;
use num_traits::{One, Zero};

/// PLL cycles per nominal bit. A bit of exactly the expected length is 100 cycles long.
pub const SERIALIZER_CLOCKS_PER_BIT: u64 = 100;
/// Number of pulse spacings the serializer's PLL averages over.
pub const SERIALIZER_HISTORY_LEN: usize = 16;

/// Recover one rotation of bits from `track` at nominal cell length `bit_length`.
///
/// The track is replayed from the index hole for one full rotation to let the PLL lock, then bits
/// are recorded from the next index hole until the one after. The source track is not disturbed;
/// a private copy is replayed.
pub fn serialize_track(track: &Track, bit_length: Time) -> PcmSegment {
    let mut track = track.clone();
    track.seek_to(Time::zero());

    let mut pll = DigitalPll::new(SERIALIZER_CLOCKS_PER_BIT, SERIALIZER_HISTORY_LEN);
    // Cycles per rotation, as an exact fraction.
    let multiplier = Time::from_integer(SERIALIZER_CLOCKS_PER_BIT) / bit_length;
    let expected_bits = (Time::one() / bit_length).to_integer() as usize;

    let mut bits = BitVec::with_capacity(expected_bits + expected_bits / 20);
    let mut recording = false;
    let mut skip_bits = 0;
    let mut time_error = Time::zero();

    loop {
        let event = track.next_event();

        let extended = event.length * multiplier + time_error;
        time_error = extended.fract();
        let mut zeros = pll.run_for(extended.to_integer());
        if recording {
            let skipped = zeros.min(skip_bits);
            skip_bits -= skipped;
            zeros -= skipped;
            bits.grow(zeros as usize, false);
        }

        match event.kind {
            TrackEventKind::FluxTransition => {
                if pll.add_pulse() && recording {
                    bits.push(true);
                }
            }
            TrackEventKind::IndexHole => {
                // An empty window that is mostly elapsed at the index hole belongs to the rotation
                // just ending.
                let straddling = !pll.is_window_filled() && pll.cycles_until_window_end() < pll.window_length() / 2;
                if recording {
                    if straddling {
                        bits.push(false);
                    }
                    break;
                }
                recording = true;
                if straddling {
                    skip_bits = 1;
                }
            }
        }
    }

    log::trace!(
        "serialize_track(): recovered {} bits, expected {}",
        bits.len(),
        expected_bits
    );
    PcmSegment::new(bit_length, bits)
}
