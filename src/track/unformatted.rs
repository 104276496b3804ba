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

    src/track/unformatted.rs

    A track with no flux transitions.
*/
use crate::{
    track::TrackEvent,
    types::{time::time, Time},
};

/// A track containing no flux transitions. Its only event is the index hole, once per rotation.
#[derive(Clone, Debug, Default)]
pub struct UnformattedTrack {
    position: Time,
}

impl UnformattedTrack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_event(&mut self) -> TrackEvent {
        let remaining = time(1, 1) - self.position;
        self.position = time(0, 1);
        TrackEvent::index_hole(remaining)
    }

    pub fn seek_to(&mut self, t: Time) -> Time {
        self.position = t.min(time(1, 1));
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unformatted_remaining_after_seek() {
        let mut track = UnformattedTrack::new();
        assert_eq!(track.seek_to(time(1, 4)), time(1, 4));
        assert_eq!(track.next_event(), TrackEvent::index_hole(time(3, 4)));
        assert_eq!(track.next_event(), TrackEvent::index_hole(time(1, 1)));
    }
}
