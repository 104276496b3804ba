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

    src/track/patched.rs

    A track with PCM patches laid over an underlying track.
*/

//! A [PatchedTrack] is how writes are recorded. Rather than re-encoding an entire track when a
//! controller rewrites a single sector, the written bits are kept as a [PcmSegment] covering a
//! span of rotation time, and reads of that span are served from the patch instead of from the
//! underlying track.
//!
//! The track is kept as an ordered list of non-overlapping periods that exactly cover one
//! rotation. Each period is served either by the underlying track or by a patch segment, starting
//! at some offset into that segment.
//!
//! Sources are only able to seek to cell boundaries, so when a period is entered its source will
//! usually land slightly before the period's start. The difference is held as a pending error and
//! subtracted from the first event read from the period.

use std::sync::Arc;

use crate::{
    track::{PcmSegment, PcmSegmentEventSource, Track, TrackEvent},
    types::{time::time, Time},
};
use num_traits::Zero;

#[derive(Clone, Debug)]
struct Period {
    start: Time,
    end: Time,
    /// Offset into the patch segment corresponding to `start`.
    segment_start: Time,
    /// The patch serving this period, or None for the underlying track.
    source: Option<PcmSegmentEventSource>,
}

impl Period {
    fn underlying(start: Time, end: Time) -> Self {
        Self {
            start,
            end,
            segment_start: Time::zero(),
            source: None,
        }
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

#[inline]
fn sub_sat(a: Time, b: Time) -> Time {
    if a > b {
        a - b
    }
    else {
        Time::zero()
    }
}

#[derive(Clone, Debug)]
pub struct PatchedTrack {
    underlying: Box<Track>,
    periods: Vec<Period>,
    active_period: usize,
    /// Track time of the most recent event or seek, at or after the start of the active period.
    current_time: Time,
    /// How far the active period's source sits before `current_time`.
    period_error: Time,
}

impl PatchedTrack {
    /// Create a patched track over `underlying`, initially with no patches. The cursor is placed
    /// at the index hole.
    pub fn new(underlying: Track) -> Self {
        let mut track = Self {
            underlying: Box::new(underlying),
            periods: vec![Period::underlying(Time::zero(), time(1, 1))],
            active_period: 0,
            current_time: Time::zero(),
            period_error: Time::zero(),
        };
        track.underlying.seek_to(Time::zero());
        track
    }

    /// Return a reference to the underlying, unpatched track.
    pub fn underlying(&self) -> &Track {
        &self.underlying
    }

    /// Return the number of periods currently served by a patch.
    pub fn patch_ct(&self) -> usize {
        self.periods.iter().filter(|p| p.source.is_some()).count()
    }

    /// Lay `segment` over the track beginning at `start_time`. If the segment runs past the index
    /// hole it wraps to the start of the track, unless `clamp_to_index_hole` is set, in which case
    /// the overrun is discarded.
    pub fn add_segment(&mut self, start_time: Time, segment: PcmSegment, clamp_to_index_hole: bool) {
        if segment.is_empty() {
            return;
        }
        let start_time = start_time.fract();
        let source = PcmSegmentEventSource::new(Arc::new(segment));
        let end_time = start_time + source.length();
        let one = time(1, 1);

        // Remember where the cursor actually is, so it can be restored against the new periods.
        let position = sub_sat(self.current_time, self.period_error);

        log::trace!(
            "PatchedTrack::add_segment(): start: {} end: {} clamp: {}",
            crate::format_rot!(start_time),
            crate::format_rot!(end_time),
            clamp_to_index_hole
        );

        self.insert_period(Period {
            start: start_time,
            end: end_time.min(one),
            segment_start: Time::zero(),
            source: Some(source.clone()),
        });

        if end_time > one && !clamp_to_index_hole {
            // The tail of the segment wraps around past the index hole. It may not overwrite the
            // head of itself.
            let tail_end = (end_time - one).min(start_time);
            self.insert_period(Period {
                start: Time::zero(),
                end: tail_end,
                segment_start: one - start_time,
                source: Some(source),
            });
        }

        self.seek_to(position);
    }

    /// Insert `new_period`, trimming or splitting whatever periods it overlaps.
    fn insert_period(&mut self, new_period: Period) {
        if new_period.is_empty() {
            return;
        }

        let mut periods = Vec::with_capacity(self.periods.len() + 2);
        for period in self.periods.drain(..) {
            if period.end <= new_period.start || period.start >= new_period.end {
                periods.push(period);
                continue;
            }

            // Keep the part of this period before the new one.
            if period.start < new_period.start {
                let mut head = period.clone();
                head.end = new_period.start;
                periods.push(head);
            }

            // Keep the part after it, advancing into the segment by however much was cut off.
            if period.end > new_period.end {
                let mut tail = period;
                tail.segment_start = tail.segment_start + (new_period.end - tail.start);
                tail.start = new_period.end;
                periods.push(tail);
            }
        }
        periods.push(new_period);
        periods.retain(|p| !p.is_empty());
        periods.sort_by(|a, b| a.start.cmp(&b.start));

        self.periods = periods;
        self.active_period = 0;
    }

    /// Position the active period's source at `period_time`, where `period_time` is at or after the
    /// start of the period, and set the pending error for that position.
    fn seek_in_active_period(&mut self, period_time: Time) -> Time {
        let period = &mut self.periods[self.active_period];
        let reached = match period.source.as_mut() {
            Some(source) => {
                let segment_time = period_time - period.start + period.segment_start;
                let segment_reached = source.seek_to(segment_time);
                // Translate back to track time, clamping to the start of the period.
                if segment_reached >= period.segment_start {
                    period.start + (segment_reached - period.segment_start)
                }
                else {
                    self.current_time = period.start;
                    self.period_error = period.segment_start - segment_reached;
                    return period.start;
                }
            }
            None => self.underlying.seek_to(period_time),
        };

        if reached >= period.start {
            self.current_time = reached;
            self.period_error = Time::zero();
        }
        else {
            self.current_time = period.start;
            self.period_error = period.start - reached;
        }
        self.current_time
    }

    pub fn next_event(&mut self) -> TrackEvent {
        let mut extra_time = Time::zero();
        loop {
            let period = &mut self.periods[self.active_period];
            let event = match period.source.as_mut() {
                Some(source) => source.next_event(),
                None => self.underlying.next_event(),
            };

            // Where this event falls in track time; if still within the period, return it.
            let event_time = self.current_time + event.length - self.period_error;
            if event_time < period.end {
                self.current_time = event_time;
                let length = event.length + extra_time - self.period_error;
                self.period_error = Time::zero();
                return TrackEvent { length, ..event };
            }

            // The period ends before the event. Account for the rest of the period and move on.
            extra_time += period.end - self.current_time;
            self.current_time = period.end;
            self.active_period += 1;

            if self.active_period == self.periods.len() {
                // End of the rotation.
                self.active_period = 0;
                self.seek_in_active_period(Time::zero());
                return TrackEvent::index_hole(extra_time);
            }

            let start = self.periods[self.active_period].start;
            self.seek_in_active_period(start);
        }
    }

    pub fn seek_to(&mut self, t: Time) -> Time {
        let one = time(1, 1);
        if t >= one {
            // Park at the very end of the track.
            self.active_period = self.periods.len() - 1;
            self.seek_in_active_period(self.periods[self.active_period].start);
            self.current_time = one;
            self.period_error = Time::zero();
            return one;
        }

        self.active_period = self.periods.iter().position(|p| p.end > t).unwrap_or(0);
        self.seek_in_active_period(t)
    }
}
