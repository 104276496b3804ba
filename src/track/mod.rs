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

    src/track/mod.rs

    Defines the Track sum type and its event stream.
*/

//! A [Track] records what physically happens under the head during one rotation: an ordered,
//! restartable sequence of [TrackEvent]s, each either the index hole passing or a flux transition,
//! each carrying the exact [Time] elapsed since the previous event.
//!
//! Three representations are supported:
//! * [PcmTrack] - one or more [PcmSegment]s of bit cells, possibly at different bit rates.
//! * [UnformattedTrack] - a track with no flux transitions at all.
//! * [PatchedTrack] - an underlying track with time-ranged PCM patches laid over it, which is how
//!   writes are recorded without re-encoding a whole track.
//!
//! Whatever the representation, one traversal from index hole to index hole sums to exactly one
//! rotation.

pub mod patched;
pub mod pcm;
pub mod serializer;
pub mod unformatted;

pub use patched::PatchedTrack;
pub use pcm::{PcmSegment, PcmSegmentEventSource, PcmTrack};
pub use serializer::serialize_track;
pub use unformatted::UnformattedTrack;

use crate::types::Time;
use std::fmt::{Display, Formatter};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrackEventKind {
    IndexHole,
    FluxTransition,
}

/// A single event on a track. `length` is the time since the previous event, as a fraction of a
/// rotation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TrackEvent {
    pub kind: TrackEventKind,
    pub length: Time,
}

impl TrackEvent {
    #[inline]
    pub fn index_hole(length: Time) -> Self {
        Self {
            kind: TrackEventKind::IndexHole,
            length,
        }
    }

    #[inline]
    pub fn flux_transition(length: Time) -> Self {
        Self {
            kind: TrackEventKind::FluxTransition,
            length,
        }
    }

    #[inline]
    pub fn is_index_hole(&self) -> bool {
        matches!(self.kind, TrackEventKind::IndexHole)
    }
}

impl Display for TrackEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TrackEventKind::IndexHole => write!(f, "Index({})", self.length),
            TrackEventKind::FluxTransition => write!(f, "Flux({})", self.length),
        }
    }
}

/// A track, in one of its three representations. Every variant exposes the same cursor interface:
/// [Track::next_event] and [Track::seek_to]. Cloning a track clones its cursor too, so independent
/// cursors can be handed out while another copy is being patched.
#[derive(Clone, Debug)]
pub enum Track {
    Pcm(PcmTrack),
    Unformatted(UnformattedTrack),
    Patched(PatchedTrack),
}

impl Track {
    /// Return the next event on the track and advance the cursor. After the final flux transition
    /// of a rotation, the index hole is returned and the cursor wraps to the start of the track.
    pub fn next_event(&mut self) -> TrackEvent {
        match self {
            Track::Pcm(track) => track.next_event(),
            Track::Unformatted(track) => track.next_event(),
            Track::Patched(track) => track.next_event(),
        }
    }

    /// Seek the cursor to `time` after the index hole. The cursor is placed at the closest
    /// representable position at or before `time`, which is returned.
    pub fn seek_to(&mut self, time: Time) -> Time {
        match self {
            Track::Pcm(track) => track.seek_to(time),
            Track::Unformatted(track) => track.seek_to(time),
            Track::Patched(track) => track.seek_to(time),
        }
    }

    /// Returns `true` if this track has been written to since it was handed out.
    #[inline]
    pub fn is_patched(&self) -> bool {
        matches!(self, Track::Patched(_))
    }

    /// Returns a fresh copy of this track with its cursor at the index hole.
    pub fn rewound(&self) -> Track {
        let mut track = self.clone();
        track.seek_to(Time::from_integer(0));
        track
    }

    /// Convert this track into a [PatchedTrack], if it is not one already, and return a mutable
    /// reference to it. The cursor position is preserved.
    pub fn make_patched(&mut self) -> &mut PatchedTrack {
        if !self.is_patched() {
            let underlying = std::mem::replace(self, Track::Unformatted(UnformattedTrack::new()));
            *self = Track::Patched(PatchedTrack::new(underlying));
        }
        match self {
            Track::Patched(track) => track,
            _ => unreachable!(),
        }
    }
}

impl From<PcmTrack> for Track {
    fn from(track: PcmTrack) -> Self {
        Track::Pcm(track)
    }
}

impl From<PcmSegment> for Track {
    fn from(segment: PcmSegment) -> Self {
        Track::Pcm(PcmTrack::new(segment))
    }
}

impl From<UnformattedTrack> for Track {
    fn from(track: UnformattedTrack) -> Self {
        Track::Unformatted(track)
    }
}

impl From<PatchedTrack> for Track {
    fn from(track: PatchedTrack) -> Self {
        Track::Patched(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::time::time;
    use bit_vec::BitVec;

    /// Sum event lengths from the current cursor until the index hole recurs.
    fn rotation_sum(track: &mut Track) -> Time {
        let mut sum = Time::from_integer(0);
        loop {
            let event = track.next_event();
            sum += event.length;
            if event.is_index_hole() {
                break;
            }
        }
        sum
    }

    #[test]
    fn test_variants_sum_to_one_rotation() {
        let segment = PcmSegment::new(time(1, 16), BitVec::from_bytes(&[0b1001_0010, 0b0100_0001]));
        let mut tracks = vec![
            Track::from(segment),
            Track::from(UnformattedTrack::new()),
            Track::from(PatchedTrack::new(Track::from(UnformattedTrack::new()))),
        ];
        for track in tracks.iter_mut() {
            assert_eq!(rotation_sum(track), Time::from_integer(1));
            // The second rotation must sum identically.
            assert_eq!(rotation_sum(track), Time::from_integer(1));
        }
    }

    #[test]
    fn test_make_patched_preserves_events() {
        let segment = PcmSegment::new(time(1, 8), BitVec::from_bytes(&[0b0101_0101]));
        let mut plain = Track::from(segment);
        let mut patched = plain.clone();
        patched.make_patched();
        assert!(patched.is_patched());
        for _ in 0..12 {
            assert_eq!(plain.next_event(), patched.next_event());
        }
    }
}
