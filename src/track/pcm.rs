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

    src/track/pcm.rs

    PCM segments and tracks built from them.
*/

//! A [PcmSegment] is a run of bit cells at a single nominal bit length. A set bit is a flux
//! transition, recorded as happening in the centre of its cell; a clear bit is a cell with no
//! transition. Because of that, the first and last windows of a segment are half a cell long:
//! the first transition of a segment beginning with a set bit is half a cell after its start,
//! and the half cell after the final transition is added to whatever follows.
//!
//! A [PcmTrack] is one or more segments laid end to end. Segments may have different bit lengths
//! (zoned recording), so on construction the track normalizes them to sum to exactly one rotation
//! and finds the least common multiple of every segment's half-bit clock. All event arithmetic
//! is then done in integer ticks of that common clock.

use crate::types::{time::time, Time};
use bit_vec::BitVec;
use num_integer::Integer;
use num_traits::Zero;
use std::sync::Arc;

use super::TrackEvent;

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PcmSegment {
    /// The nominal length of one bit cell. Only the ratio between segments is significant once
    /// segments are joined into a [PcmTrack].
    pub length_of_a_bit: Time,
    pub data: BitVec,
}

impl Default for PcmSegment {
    fn default() -> Self {
        Self {
            length_of_a_bit: time(1, 1),
            data: BitVec::new(),
        }
    }
}

impl PcmSegment {
    pub fn new(length_of_a_bit: Time, data: BitVec) -> Self {
        Self { length_of_a_bit, data }
    }

    /// Create a segment from a byte slice, most significant bit first. If `bit_ct` is provided
    /// the segment is truncated to that many bits.
    pub fn from_bytes(bytes: &[u8], bit_ct: Option<usize>, length_of_a_bit: Time) -> Self {
        let mut data = BitVec::from_bytes(bytes);
        if let Some(bit_ct) = bit_ct {
            data.truncate(bit_ct);
        }
        Self { length_of_a_bit, data }
    }

    /// Return the number of bit cells in this segment.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Return the total duration of this segment.
    #[inline]
    pub fn length(&self) -> Time {
        self.length_of_a_bit * Time::from_integer(self.data.len() as u64)
    }

    #[inline]
    pub fn push(&mut self, bit: bool) {
        self.data.push(bit);
    }

    /// Return the segment's bits packed MSB-first into bytes. A trailing partial byte is padded
    /// with zeros.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.to_bytes()
    }

    /// Count the flux transitions in the segment.
    pub fn transition_ct(&self) -> usize {
        self.data.iter().filter(|b| *b).count()
    }
}

/// A cursor over the events of a single [PcmSegment].
///
/// Internally time is counted in integer ticks; `bit_ticks` is the length of one cell and is
/// always even so that the half-cell offset of a transition is exact.
#[derive(Clone, Debug)]
pub struct PcmSegmentEventSource {
    segment: Arc<PcmSegment>,
    ticks_per_rotation: u64,
    bit_ticks: u64,
    /// The next bit that might produce an event.
    bit_pointer: usize,
    /// Tick position of the most recent event, or of the last seek.
    last_ticks: u64,
}

impl PcmSegmentEventSource {
    /// Create an event source for a stand-alone segment, using the segment's own bit length.
    pub fn new(segment: Arc<PcmSegment>) -> Self {
        let half_bit = segment.length_of_a_bit / Time::from_integer(2);
        let ticks_per_rotation = *half_bit.denom();
        let bit_ticks = 2 * *half_bit.numer();
        Self::with_ticks(segment, bit_ticks, ticks_per_rotation)
    }

    pub(crate) fn with_ticks(segment: Arc<PcmSegment>, bit_ticks: u64, ticks_per_rotation: u64) -> Self {
        debug_assert!(bit_ticks % 2 == 0);
        Self {
            segment,
            ticks_per_rotation,
            bit_ticks,
            bit_pointer: 0,
            last_ticks: 0,
        }
    }

    #[inline]
    pub fn segment(&self) -> &PcmSegment {
        &self.segment
    }

    #[inline]
    pub(crate) fn length_ticks(&self) -> u64 {
        self.segment.len() as u64 * self.bit_ticks
    }

    /// The duration of the underlying segment as a [Time].
    #[inline]
    pub fn length(&self) -> Time {
        self.to_time(self.length_ticks())
    }

    #[inline]
    fn to_time(&self, ticks: u64) -> Time {
        time(ticks, self.ticks_per_rotation)
    }

    /// Return the next event as (is_index, ticks since previous event). The 'index' here is the
    /// end of the segment; the half cell following the final transition is included in it.
    pub(crate) fn next_event_ticks(&mut self) -> (bool, u64) {
        let data = &self.segment.data;
        while self.bit_pointer < data.len() {
            let bit_index = self.bit_pointer;
            self.bit_pointer += 1;
            if data[bit_index] {
                let event_ticks = bit_index as u64 * self.bit_ticks + self.bit_ticks / 2;
                let length = event_ticks - self.last_ticks;
                self.last_ticks = event_ticks;
                return (false, length);
            }
        }

        let end_ticks = self.length_ticks();
        let length = end_ticks.saturating_sub(self.last_ticks);
        self.last_ticks = end_ticks;
        (true, length)
    }

    /// Seek to `ticks` from the start of the segment. Returns the tick position reached, which is
    /// the centre of the last cell at or before `ticks`, the start of the segment, or its end.
    pub(crate) fn seek_ticks(&mut self, ticks: u64) -> u64 {
        let length = self.length_ticks();
        let half_bit = self.bit_ticks / 2;

        if ticks >= length {
            self.bit_pointer = self.segment.len();
            self.last_ticks = length;
        }
        else if ticks < half_bit {
            self.bit_pointer = 0;
            self.last_ticks = 0;
        }
        else {
            // bit_pointer always records the next bit that might produce an event, so it is one
            // beyond the cell whose centre was reached.
            self.bit_pointer = 1 + ((ticks - half_bit) / self.bit_ticks) as usize;
            self.last_ticks = half_bit + (self.bit_pointer as u64 - 1) * self.bit_ticks;
        }
        self.last_ticks
    }

    /// Return the next event from this segment. At the end of the segment an index hole is
    /// returned; further calls keep returning zero-length index holes until the source is
    /// seeked or reset.
    pub fn next_event(&mut self) -> TrackEvent {
        let (is_end, ticks) = self.next_event_ticks();
        match is_end {
            true => TrackEvent::index_hole(self.to_time(ticks)),
            false => TrackEvent::flux_transition(self.to_time(ticks)),
        }
    }

    /// Seek to `time` from the start of the segment, returning the time actually reached.
    pub fn seek_to(&mut self, time: Time) -> Time {
        let ticks = (time * Time::from_integer(self.ticks_per_rotation)).to_integer();
        let reached = self.seek_ticks(ticks);
        self.to_time(reached)
    }

    #[inline]
    pub fn reset(&mut self) {
        self.bit_pointer = 0;
        self.last_ticks = 0;
    }
}

/// A track built from one or more [PcmSegment]s.
#[derive(Clone, Debug)]
pub struct PcmTrack {
    sources: Vec<PcmSegmentEventSource>,
    /// Tick offset of the start of each segment.
    starts: Vec<u64>,
    ticks_per_rotation: u64,
    segment_index: usize,
}

impl PcmTrack {
    /// Create a track from a single segment. The segment is stretched to exactly one rotation.
    pub fn new(segment: PcmSegment) -> Self {
        Self::from_segments(vec![segment])
    }

    /// Create a track from a list of segments, in order. The segments' durations are normalized
    /// so the whole track is exactly one rotation while retaining their relative lengths.
    pub fn from_segments(segments: Vec<PcmSegment>) -> Self {
        let mut segments: Vec<PcmSegment> = segments.into_iter().filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            log::warn!("PcmTrack::from_segments(): No non-empty segments provided; creating a blank track.");
            segments.push(PcmSegment::new(time(1, 1), BitVec::from_elem(1, false)));
        }

        let total_length = segments
            .iter()
            .fold(Time::zero(), |acc, segment| acc + segment.length());

        // Every normalized half bit must be a whole number of ticks, so the tick rate is the LCM
        // of the half-bit denominators.
        let half = Time::from_integer(2);
        let ticks_per_rotation = segments.iter().fold(1u64, |acc, segment| {
            let half_bit = segment.length_of_a_bit / total_length / half;
            acc.lcm(half_bit.denom())
        });

        let mut sources = Vec::with_capacity(segments.len());
        let mut starts = Vec::with_capacity(segments.len());
        let mut cursor = 0u64;
        for segment in segments {
            let normalized = segment.length_of_a_bit / total_length;
            let bit_ticks = (normalized * Time::from_integer(ticks_per_rotation)).to_integer();
            starts.push(cursor);
            cursor += bit_ticks * segment.len() as u64;
            sources.push(PcmSegmentEventSource::with_ticks(
                Arc::new(segment),
                bit_ticks,
                ticks_per_rotation,
            ));
        }
        debug_assert_eq!(cursor, ticks_per_rotation);

        log::trace!(
            "PcmTrack::from_segments(): {} segment(s), {} ticks per rotation",
            sources.len(),
            ticks_per_rotation
        );

        Self {
            sources,
            starts,
            ticks_per_rotation,
            segment_index: 0,
        }
    }

    /// Return the number of ticks of the track's common clock in one rotation.
    #[inline]
    pub fn ticks_per_rotation(&self) -> u64 {
        self.ticks_per_rotation
    }

    /// Iterate over the track's segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &PcmSegment> {
        self.sources.iter().map(|s| s.segment())
    }

    pub fn next_event(&mut self) -> TrackEvent {
        let mut carried = 0u64;
        loop {
            let (is_end, ticks) = self.sources[self.segment_index].next_event_ticks();
            if !is_end {
                return TrackEvent::flux_transition(time(carried + ticks, self.ticks_per_rotation));
            }

            // End of this segment: carry its tail into the next one, or wrap at the end of the track.
            carried += ticks;
            self.segment_index += 1;
            if self.segment_index == self.sources.len() {
                self.segment_index = 0;
                self.sources[0].reset();
                return TrackEvent::index_hole(time(carried, self.ticks_per_rotation));
            }
            self.sources[self.segment_index].reset();
        }
    }

    pub fn seek_to(&mut self, t: Time) -> Time {
        let ticks = (t * Time::from_integer(self.ticks_per_rotation)).to_integer();
        if ticks >= self.ticks_per_rotation {
            // Park at the very end of the final segment; the next event is a zero-length index hole.
            self.segment_index = self.sources.len() - 1;
            let last = &mut self.sources[self.segment_index];
            let reached = last.seek_ticks(u64::MAX);
            return time(self.starts[self.segment_index] + reached, self.ticks_per_rotation);
        }

        // Find the segment containing the requested time.
        let index = self.starts.iter().rposition(|&start| start <= ticks).unwrap_or(0);
        self.segment_index = index;
        let reached = self.sources[index].seek_ticks(ticks - self.starts[index]);
        time(self.starts[index] + reached, self.ticks_per_rotation)
    }
}
