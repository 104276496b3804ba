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

    src/controller/drive.rs

    A floppy drive mechanism.
*/

//! A [Drive] tracks where its head is, both across the disk and around the current rotation.
//!
//! Time within a rotation is advanced in internal clock cycles. The drive keeps the next event on
//! the track under the head and the number of cycles until it arrives; fractional cycles are
//! carried exactly so that a rotation of events adds up to exactly one rotation of cycles.
//!
//! When the head moves, the track being left is handed back to the [Disk] if it was written, and a
//! fresh copy of the new track is taken and positioned at the same rotational offset.

use crate::{
    controller::INTERNAL_CLOCK_RATE,
    diskimage::Disk,
    track::{PcmSegment, Track, TrackEvent, TrackEventKind, UnformattedTrack},
    types::{Time, TrackAddress},
};
use num_traits::Zero;

pub const DEFAULT_RPM: u32 = 300;
pub const DEFAULT_HEAD_COUNT: u8 = 2;
/// 80 tracks plus the few positions most mechanisms can overstep to.
pub const DEFAULT_TRACK_POSITIONS: u16 = 84;

/// The fraction of a rotation for which the index hole sensor reads active.
const INDEX_HOLE_DURATION: Time = Time::new_raw(1, 100);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepDirection {
    /// Toward the spindle, to higher track numbers.
    Inward,
    /// Toward the edge, to track 0.
    Outward,
}

pub struct Drive {
    disk: Option<Disk>,
    head_count: u8,
    track_positions: u16,
    rpm: u32,

    head_position: u16,
    head: u8,
    motor_on: bool,

    track: Track,
    track_written: bool,
    next_event: Option<TrackEvent>,
    cycles_until_event: u64,
    cycle_error: Time,
    /// Rotational time at which `cycles_since_event` was last zero.
    event_time: Time,
    cycles_since_event: u64,
}

impl Default for Drive {
    fn default() -> Self {
        Drive::new(DEFAULT_HEAD_COUNT, DEFAULT_TRACK_POSITIONS, DEFAULT_RPM)
    }
}

impl Drive {
    pub fn new(head_count: u8, track_positions: u16, rpm: u32) -> Self {
        Drive {
            disk: None,
            head_count: head_count.max(1),
            track_positions: track_positions.max(1),
            rpm: rpm.max(1),
            head_position: 0,
            head: 0,
            motor_on: false,
            track: Track::from(UnformattedTrack::new()),
            track_written: false,
            next_event: None,
            cycles_until_event: 0,
            cycle_error: Time::zero(),
            event_time: Time::zero(),
            cycles_since_event: 0,
        }
    }

    /// Insert `disk`, ejecting and returning any disk already present.
    pub fn insert_disk(&mut self, disk: Disk) -> Option<Disk> {
        let previous = self.eject_disk();
        log::debug!(
            "Drive::insert_disk(): inserted disk with {} heads, {} tracks",
            disk.head_count(),
            disk.track_count()
        );
        self.disk = Some(disk);
        self.load_track();
        previous
    }

    /// Remove and return the disk, after handing back the track under the head if it was written.
    pub fn eject_disk(&mut self) -> Option<Disk> {
        self.return_track();
        let disk = self.disk.take();
        if disk.is_some() {
            self.load_track();
        }
        disk
    }

    #[inline]
    pub fn has_disk(&self) -> bool {
        self.disk.is_some()
    }

    pub fn disk_mut(&mut self) -> Option<&mut Disk> {
        self.disk.as_mut()
    }

    #[inline]
    pub fn rpm(&self) -> u32 {
        self.rpm
    }

    /// Return the number of internal clock cycles in one rotation.
    #[inline]
    pub fn cycles_per_rotation(&self) -> u64 {
        INTERNAL_CLOCK_RATE * 60 / self.rpm as u64
    }

    #[inline]
    pub fn is_motor_on(&self) -> bool {
        self.motor_on
    }

    pub fn set_motor_on(&mut self, on: bool) {
        if on != self.motor_on {
            log::trace!("Drive::set_motor_on(): motor {}", if on { "on" } else { "off" });
        }
        self.motor_on = on;
    }

    /// Returns `true` if a disk is present and spinning.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.motor_on && self.disk.is_some()
    }

    /// Returns `true` if nothing can happen on this drive until its state changes.
    #[inline]
    pub fn should_sleep(&self) -> bool {
        !self.is_ready()
    }

    #[inline]
    pub fn head_position(&self) -> u16 {
        self.head_position
    }

    #[inline]
    pub fn head(&self) -> u8 {
        self.head
    }

    #[inline]
    pub fn is_track_zero(&self) -> bool {
        self.head_position == 0
    }

    /// Returns `true` while the index hole is over the sensor.
    pub fn is_index_hole(&self) -> bool {
        self.is_ready() && self.rotation_time() < INDEX_HOLE_DURATION
    }

    #[inline]
    pub fn track_address(&self) -> TrackAddress {
        TrackAddress::new(self.head, self.head_position)
    }

    /// Select head `head`. Heads the drive does not have are clamped to the last one.
    pub fn set_head(&mut self, head: u8) {
        let head = head.min(self.head_count - 1);
        if head != self.head {
            self.return_track();
            self.head = head;
            self.load_track();
        }
    }

    /// Move the head one position. Stepping outward from track 0, or inward from the last
    /// position, leaves the head where it is.
    pub fn step(&mut self, direction: StepDirection) {
        let new_position = match direction {
            StepDirection::Inward => (self.head_position + 1).min(self.track_positions - 1),
            StepDirection::Outward => self.head_position.saturating_sub(1),
        };
        if new_position != self.head_position {
            self.return_track();
            self.head_position = new_position;
            log::trace!("Drive::step(): head now at {}", self.head_position);
            self.load_track();
        }
    }

    /// Return the current offset into the rotation.
    pub fn rotation_time(&self) -> Time {
        let t = self.event_time + Time::new(self.cycles_since_event, self.cycles_per_rotation());
        if t >= Time::from_integer(1) {
            t.fract()
        }
        else {
            t
        }
    }

    /// Return the number of cycles until the next event, or `None` if the disk is not turning.
    pub fn cycles_until_event(&self) -> Option<u64> {
        match self.is_ready() && self.next_event.is_some() {
            true => Some(self.cycles_until_event),
            false => None,
        }
    }

    /// Advance the disk by up to `cycles`, stopping at the next event. Returns the kind of event
    /// reached, if one was. At most [Drive::cycles_until_event] cycles are consumed.
    pub fn advance(&mut self, cycles: u64) -> Option<TrackEventKind> {
        if !self.is_ready() {
            return None;
        }
        let event = self.next_event?;

        if cycles < self.cycles_until_event {
            self.cycles_until_event -= cycles;
            self.cycles_since_event += cycles;
            return None;
        }

        self.event_time = match event.kind {
            TrackEventKind::IndexHole => Time::zero(),
            TrackEventKind::FluxTransition => {
                let elapsed = self.cycles_since_event + self.cycles_until_event;
                self.event_time + Time::new(elapsed, self.cycles_per_rotation())
            }
        };
        self.cycles_since_event = 0;
        self.load_next_event();
        Some(event.kind)
    }

    /// Lay `segment` over the track under the head, starting at rotational offset `start_time`.
    pub fn write_segment(&mut self, start_time: Time, segment: PcmSegment, clamp_to_index_hole: bool) {
        let now = self.rotation_time();
        log::trace!(
            "Drive::write_segment(): {} bits at {} on track {}",
            segment.len(),
            start_time,
            self.track_address()
        );
        self.track
            .make_patched()
            .add_segment(start_time, segment, clamp_to_index_hole);
        self.track_written = true;
        self.seek_to(now);
    }

    /// Return a copy of the track under the head, including anything written to it.
    pub fn current_track(&self) -> Track {
        self.track.rewound()
    }

    fn load_next_event(&mut self) {
        let event = self.track.next_event();
        let exact = event.length * Time::from_integer(self.cycles_per_rotation()) + self.cycle_error;
        self.cycles_until_event = exact.to_integer();
        self.cycle_error = exact.fract();
        self.next_event = Some(event);
    }

    fn seek_to(&mut self, t: Time) {
        let reached = self.track.seek_to(t);
        let event = self.track.next_event();
        // The cursor may land before `t`; the difference is already behind us.
        let behind = t - reached;
        let remaining = if event.length > behind { event.length - behind } else { Time::zero() };

        let exact = remaining * Time::from_integer(self.cycles_per_rotation());
        self.cycles_until_event = exact.to_integer();
        self.cycle_error = exact.fract();
        self.event_time = t;
        self.cycles_since_event = 0;
        self.next_event = Some(event);
    }

    fn load_track(&mut self) {
        let now = self.rotation_time();
        let address = self.track_address();
        self.track = match self.disk.as_mut() {
            Some(disk) => disk.track_at(address),
            None => Track::from(UnformattedTrack::new()),
        };
        self.track_written = false;
        self.seek_to(now);
    }

    fn return_track(&mut self) {
        if !self.track_written {
            return;
        }
        self.track_written = false;
        let address = self.track_address();
        let track = self.track.rewound();
        if let Some(disk) = self.disk.as_mut() {
            disk.store_track(address, track);
        }
    }
}

impl Drop for Drive {
    fn drop(&mut self) {
        self.return_track();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{diskimage::DiskImage, types::time::time, DiskImageError};
    use bit_vec::BitVec;
    use std::collections::BTreeMap;

    /// An image holding the same single-transition track at every location.
    struct PulseImage;

    impl DiskImage for PulseImage {
        fn head_count(&self) -> u8 {
            2
        }
        fn track_count(&self) -> u16 {
            40
        }
        fn track_at(&mut self, _address: TrackAddress) -> Result<Option<Track>, DiskImageError> {
            let mut bits = BitVec::from_elem(4, false);
            bits.set(1, true);
            Ok(Some(Track::from(PcmSegment::new(time(1, 4), bits))))
        }
        fn set_tracks(&mut self, _tracks: BTreeMap<TrackAddress, Track>) -> Result<(), DiskImageError> {
            Ok(())
        }
    }

    #[test]
    fn test_events_at_exact_cycles() {
        let mut drive = Drive::default();
        drive.insert_disk(Disk::new(PulseImage));
        drive.set_motor_on(true);
        let cpr = drive.cycles_per_rotation();
        assert_eq!(cpr, 25_600_000);

        // The transition is at the centre of the second of four cells: 3/8 of a rotation.
        assert_eq!(drive.cycles_until_event(), Some(cpr * 3 / 8));
        assert_eq!(drive.advance(cpr * 3 / 8), Some(TrackEventKind::FluxTransition));
        assert_eq!(drive.rotation_time(), time(3, 8));
        assert_eq!(drive.cycles_until_event(), Some(cpr * 5 / 8));
        assert_eq!(drive.advance(cpr), Some(TrackEventKind::IndexHole));
        assert!(drive.is_index_hole());
    }

    #[test]
    fn test_stepping_clamps() {
        let mut drive = Drive::new(2, 40, DEFAULT_RPM);
        assert!(drive.is_track_zero());
        drive.step(StepDirection::Outward);
        assert_eq!(drive.head_position(), 0);
        for _ in 0..50 {
            drive.step(StepDirection::Inward);
        }
        assert_eq!(drive.head_position(), 39);
        drive.set_head(5);
        assert_eq!(drive.head(), 1);
    }

    #[test]
    fn test_not_ready_without_disk_or_motor() {
        let mut drive = Drive::default();
        drive.set_motor_on(true);
        assert!(!drive.is_ready());
        assert_eq!(drive.cycles_until_event(), None);
        assert_eq!(drive.advance(1000), None);

        drive.insert_disk(Disk::new(PulseImage));
        drive.set_motor_on(false);
        assert!(drive.should_sleep());
        drive.set_motor_on(true);
        assert!(!drive.should_sleep());
        assert!(drive.eject_disk().is_some());
        assert!(!drive.is_ready());
    }

    #[test]
    fn test_written_track_returned_on_step() {
        let mut drive = Drive::default();
        drive.insert_disk(Disk::new(PulseImage));
        drive.set_motor_on(true);
        drive.step(StepDirection::Inward);

        drive.write_segment(time(1, 2), PcmSegment::new(time(1, 8), BitVec::from_elem(2, true)), false);
        assert!(drive.current_track().is_patched());
        drive.step(StepDirection::Inward);

        let disk = drive.disk_mut().unwrap();
        assert!(disk.is_dirty());
        assert!(disk.track_at(TrackAddress::new(0, 1)).is_patched());
        assert!(!disk.track_at(TrackAddress::new(0, 2)).is_patched());
    }
}
