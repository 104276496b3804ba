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

    src/controller/disk_controller.rs

    The bit level disk controller: drive selection, PLL and write collection.
*/

//! A [DiskController] owns a set of [Drive]s and the PLL that recovers bits from whichever is
//! selected.
//!
//! The controller is stepped by [EventSource::run_until_event]. Each step advances by the
//! smallest of: the remaining budget, the cycles until the drive's next flux event, the cycles
//! until the PLL's current bit window closes, and the cycles until pending written bits reach the
//! disk. Stepping that way means at most one bit and one track event occur per step, so events are
//! reported exactly when they happen.
//!
//! Writing goes through a [Writer], returned by [DiskController::begin_writing]. The writer holds
//! the controller mutably for as long as the write lasts, so bits can only be written while writing
//! and the drive cannot be changed underneath a write. While writing, flux from the disk is ignored
//! and written bits are collected into a [PcmSegment]. Ending the write, or dropping the writer,
//! lays that segment over the current track.

use crate::{
    controller::{drive::Drive, ControllerEvent, EventSource, StepDirection, INTERNAL_CLOCK_RATE},
    diskimage::Disk,
    flux::pll::{DigitalPll, DEFAULT_HISTORY_LEN},
    track::{PcmSegment, TrackEventKind},
    types::{Time, TrackDensity},
};
use bit_vec::BitVec;
use num_traits::Zero;
use std::collections::VecDeque;

/// A write in progress.
#[derive(Clone, Debug)]
pub struct WriteState {
    /// The bits written so far.
    pub segment: PcmSegment,
    /// Rotational offset of the first written bit.
    pub start_time: Time,
    /// If set, the write stops at the index hole rather than wrapping onto the start of the track.
    pub clamp_to_index_hole: bool,
    /// Internal cycles until every written bit has reached the disk.
    pub cycles_until_flushed: u64,
    /// Exact internal cycles per written bit.
    bit_cycles: Time,
    /// Fraction of a cycle carried between written bits.
    cycle_error: Time,
}

impl WriteState {
    fn push(&mut self, bit: bool) {
        self.segment.push(bit);
        let exact = self.bit_cycles + self.cycle_error;
        self.cycles_until_flushed += exact.to_integer();
        self.cycle_error = exact.fract();
    }
}

#[derive(Clone, Debug)]
pub enum ControllerState {
    NotReading,
    Reading,
    Writing(WriteState),
}

pub struct DiskController {
    clock_rate: u64,
    clock_rate_multiplier: u64,
    carried_cycles: u64,

    state: ControllerState,
    pll: DigitalPll,
    expected_bit_length: Time,

    drives: Vec<Drive>,
    empty_drive: Drive,
    selected: Option<usize>,

    is_sleeping: bool,
    sleep_observer: Option<Box<dyn FnMut(bool)>>,
    pending: VecDeque<ControllerEvent>,
}

impl DiskController {
    /// Create a controller driven by a clock of `clock_rate` cycles per second. The controller
    /// starts in the reading state, expecting double density bits, with no drives.
    pub fn new(clock_rate: u64) -> Self {
        let clock_rate = clock_rate.clamp(1, INTERNAL_CLOCK_RATE);
        let clock_rate_multiplier = INTERNAL_CLOCK_RATE / clock_rate;
        log::debug!(
            "DiskController::new(): clock rate {}Hz, multiplier {}",
            clock_rate,
            clock_rate_multiplier
        );

        let mut controller = DiskController {
            clock_rate,
            clock_rate_multiplier,
            carried_cycles: 0,
            state: ControllerState::Reading,
            pll: DigitalPll::default(),
            expected_bit_length: TrackDensity::Double.bit_length(),
            drives: Vec::new(),
            empty_drive: Drive::default(),
            selected: None,
            is_sleeping: true,
            sleep_observer: None,
            pending: VecDeque::new(),
        };
        controller.set_expected_bit_length(TrackDensity::Double.bit_length());
        controller
    }

    #[inline]
    pub fn clock_rate(&self) -> u64 {
        self.clock_rate
    }

    #[inline]
    pub fn clock_rate_multiplier(&self) -> u64 {
        self.clock_rate_multiplier
    }

    #[inline]
    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    #[inline]
    pub fn is_writing(&self) -> bool {
        matches!(self.state, ControllerState::Writing(_))
    }

    #[inline]
    pub fn pll(&self) -> &DigitalPll {
        &self.pll
    }

    #[inline]
    pub fn expected_bit_length(&self) -> Time {
        self.expected_bit_length
    }

    /// Set the nominal bit cell length, as a fraction of a rotation, and restart the PLL at that
    /// rate.
    pub fn set_expected_bit_length(&mut self, bit_length: Time) {
        self.expected_bit_length = bit_length;
        let cycles_per_rotation = Time::from_integer(self.drive().cycles_per_rotation());
        let clocks_per_bit = (bit_length * cycles_per_rotation).to_integer().max(1);
        log::trace!(
            "DiskController::set_expected_bit_length(): {} rotations, {} clocks per bit",
            bit_length,
            clocks_per_bit
        );
        self.pll = DigitalPll::new(clocks_per_bit, DEFAULT_HISTORY_LEN);
    }

    /// Stop or resume reading.
    pub fn set_is_reading(&mut self, reading: bool) {
        self.state = match reading {
            true => ControllerState::Reading,
            false => ControllerState::NotReading,
        };
    }

    /// Add a drive, returning its index.
    pub fn insert_drive(&mut self, drive: Drive) -> usize {
        self.drives.push(drive);
        self.drives.len() - 1
    }

    #[inline]
    pub fn drive_count(&self) -> usize {
        self.drives.len()
    }

    /// Return the drive at `index`, if there is one.
    pub fn drive_at(&self, index: usize) -> Option<&Drive> {
        self.drives.get(index)
    }

    /// Return the selected drive. If no drive is selected, or the selection names a drive that
    /// does not exist, this is a permanently empty stand-in.
    pub fn drive(&self) -> &Drive {
        match self.selected {
            Some(index) if index < self.drives.len() => &self.drives[index],
            _ => &self.empty_drive,
        }
    }

    fn drive_mut(&mut self) -> &mut Drive {
        match self.selected {
            Some(index) if index < self.drives.len() => &mut self.drives[index],
            _ => &mut self.empty_drive,
        }
    }

    /// Insert `disk` into drive `index`, returning any disk it replaced. If there is no such drive
    /// the disk is handed straight back.
    pub fn insert_disk(&mut self, index: usize, disk: Disk) -> Result<Option<Disk>, Disk> {
        let Some(drive) = self.drives.get_mut(index)
        else {
            return Err(disk);
        };
        let previous = drive.insert_disk(disk);
        self.update_sleep_state();
        Ok(previous)
    }

    /// Eject the disk from drive `index`.
    pub fn eject_disk(&mut self, index: usize) -> Option<Disk> {
        let disk = self.drives.get_mut(index)?.eject_disk();
        self.update_sleep_state();
        disk
    }

    /// Select drive `index`, or deselect all drives with `None`.
    pub fn set_drive(&mut self, index: Option<usize>) {
        if index == self.selected {
            return;
        }
        if let Some(index) = index.filter(|i| *i >= self.drives.len()) {
            log::debug!("DiskController::set_drive(): drive {} is absent", index);
        }
        self.selected = index;
        // Bit length is relative to rotation speed, which may differ between drives.
        self.set_expected_bit_length(self.expected_bit_length);
        self.update_sleep_state();
    }

    /// Select a drive from a select line mask. The lowest set bit wins; a mask of 0 deselects.
    pub fn set_drive_selection_mask(&mut self, mask: u8) {
        let index = match mask {
            0 => None,
            mask => Some(mask.trailing_zeros() as usize),
        };
        self.set_drive(index);
    }

    /// Register `observer` to be called with the new value whenever [DiskController::should_sleep]
    /// changes.
    pub fn set_sleep_observer(&mut self, observer: Box<dyn FnMut(bool)>) {
        self.sleep_observer = Some(observer);
    }

    /// Returns `true` if running the controller cannot currently produce any drive event: there is
    /// no disk in the selected drive, or its motor is off.
    #[inline]
    pub fn should_sleep(&self) -> bool {
        self.drive().should_sleep()
    }

    fn update_sleep_state(&mut self) {
        let sleeping = self.should_sleep();
        if sleeping != self.is_sleeping {
            self.is_sleeping = sleeping;
            log::trace!("DiskController::update_sleep_state(): sleeping: {}", sleeping);
            if let Some(observer) = self.sleep_observer.as_mut() {
                observer(sleeping);
            }
        }
    }

    pub fn set_motor_on(&mut self, on: bool) {
        self.drive_mut().set_motor_on(on);
        self.update_sleep_state();
    }

    pub fn set_head(&mut self, head: u8) {
        self.drive_mut().set_head(head);
    }

    pub fn step(&mut self, direction: StepDirection) {
        self.drive_mut().step(direction);
    }

    #[inline]
    pub fn is_track_zero(&self) -> bool {
        self.drive().is_track_zero()
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.drive().is_ready()
    }

    #[inline]
    pub fn is_index_hole(&self) -> bool {
        self.drive().is_index_hole()
    }

    /// Begin collecting written bits at the current rotational position. The write lasts until
    /// the returned [Writer] is ended or dropped.
    pub fn begin_writing(&mut self, clamp_to_index_hole: bool) -> Writer<'_> {
        // A writer leaked with mem::forget leaves its write open; commit it first.
        self.finish_writing();

        let start_time = self.drive().rotation_time();
        let cycles_per_rotation = Time::from_integer(self.drive().cycles_per_rotation());
        let bit_cycles = self.expected_bit_length * cycles_per_rotation;
        log::trace!("DiskController::begin_writing(): starting at {}", start_time);
        self.state = ControllerState::Writing(WriteState {
            segment: PcmSegment::new(self.expected_bit_length, BitVec::new()),
            start_time,
            clamp_to_index_hole,
            cycles_until_flushed: 0,
            bit_cycles,
            cycle_error: Time::zero(),
        });
        Writer { controller: self }
    }

    /// Lay everything written over the current track and resume reading.
    fn finish_writing(&mut self) {
        let state = std::mem::replace(&mut self.state, ControllerState::Reading);
        let ControllerState::Writing(write) = state
        else {
            self.state = state;
            return;
        };

        log::trace!(
            "DiskController::finish_writing(): {} bits from {}",
            write.segment.len(),
            write.start_time
        );
        if !write.segment.is_empty() {
            self.drive_mut()
                .write_segment(write.start_time, write.segment, write.clamp_to_index_hole);
        }
        self.pll = DigitalPll::new(self.pll.clocks_per_bit(), DEFAULT_HISTORY_LEN);
    }

    fn step_until_event(&mut self, budget: &mut u64) -> Option<ControllerEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }

        let mut cycles = budget
            .saturating_mul(self.clock_rate_multiplier)
            .saturating_add(self.carried_cycles);

        let event = loop {
            let drive = match self.selected {
                Some(index) if index < self.drives.len() => &mut self.drives[index],
                _ => &mut self.empty_drive,
            };

            let mut step = cycles;
            if let Some(drive_cycles) = drive.cycles_until_event() {
                step = step.min(drive_cycles);
            }
            match &self.state {
                ControllerState::Reading => step = step.min(self.pll.cycles_until_window_end()),
                ControllerState::Writing(write) if write.cycles_until_flushed > 0 => {
                    step = step.min(write.cycles_until_flushed)
                }
                _ => {}
            }
            cycles -= step;

            match &mut self.state {
                ControllerState::Reading => {
                    for _ in 0..self.pll.run_for(step) {
                        self.pending.push_back(ControllerEvent::Bit(false));
                    }
                }
                ControllerState::Writing(write) if write.cycles_until_flushed > 0 => {
                    write.cycles_until_flushed -= step;
                    if write.cycles_until_flushed == 0 {
                        self.pending.push_back(ControllerEvent::DataWritten);
                    }
                }
                _ => {}
            }

            match drive.advance(step) {
                Some(TrackEventKind::IndexHole) => self.pending.push_back(ControllerEvent::IndexHole),
                Some(TrackEventKind::FluxTransition) => {
                    if matches!(self.state, ControllerState::Reading) && self.pll.add_pulse() {
                        self.pending.push_back(ControllerEvent::Bit(true));
                    }
                }
                None => {}
            }

            if let Some(event) = self.pending.pop_front() {
                break Some(event);
            }
            if cycles == 0 {
                break None;
            }
        };

        *budget = cycles / self.clock_rate_multiplier;
        self.carried_cycles = cycles % self.clock_rate_multiplier;
        event
    }
}

impl EventSource for DiskController {
    /// Run until the next event or until `budget` controller clock cycles have passed. On return
    /// `budget` holds the cycles that were not used.
    fn run_until_event(&mut self, budget: &mut u64) -> Option<ControllerEvent> {
        self.step_until_event(budget)
    }
}

/// A write in progress on a [DiskController].
///
/// Bits are written with [Writer::write_bit]. The controller keeps running through the writer, which
/// reports [ControllerEvent::DataWritten] once every bit written so far has reached the disk.
/// [Writer::end_writing] commits the write; dropping the writer does the same.
pub struct Writer<'a> {
    controller: &'a mut DiskController,
}

impl Writer<'_> {
    /// Write one bit cell.
    pub fn write_bit(&mut self, bit: bool) {
        if let ControllerState::Writing(write) = &mut self.controller.state {
            write.push(bit);
        }
    }

    #[inline]
    pub fn controller(&self) -> &DiskController {
        self.controller
    }

    /// Finish writing, laying everything written over the current track, and resume reading.
    pub fn end_writing(self) {}
}

impl EventSource for Writer<'_> {
    fn run_until_event(&mut self, budget: &mut u64) -> Option<ControllerEvent> {
        self.controller.step_until_event(budget)
    }
}

impl Drop for Writer<'_> {
    fn drop(&mut self) {
        self.controller.finish_writing();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diskimage::DiskImage,
        track::{PcmSegment, Track, UnformattedTrack},
        types::{time::time, TrackAddress},
        DiskImageError,
    };
    use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

    /// An image whose tracks are a regular pulse every other cell at double density.
    struct ClockImage;

    impl DiskImage for ClockImage {
        fn head_count(&self) -> u8 {
            2
        }
        fn track_count(&self) -> u16 {
            80
        }
        fn track_at(&mut self, address: TrackAddress) -> Result<Option<Track>, DiskImageError> {
            if address.position > 0 {
                return Ok(Some(Track::from(UnformattedTrack::new())));
            }
            let mut bits = BitVec::from_elem(100_000, false);
            for i in (0..100_000).step_by(2) {
                bits.set(i, true);
            }
            Ok(Some(Track::from(PcmSegment::new(time(1, 100_000), bits))))
        }
        fn set_tracks(&mut self, _tracks: BTreeMap<TrackAddress, Track>) -> Result<(), DiskImageError> {
            Ok(())
        }
    }

    fn controller_with_disk() -> DiskController {
        let mut controller = DiskController::new(8_000_000);
        let index = controller.insert_drive(Drive::default());
        assert!(controller.insert_disk(index, Disk::new(ClockImage)).is_ok());
        controller.set_drive(Some(index));
        controller.set_motor_on(true);
        controller
    }

    #[test]
    fn test_multiplier() {
        let controller = DiskController::new(8_000_000);
        assert_eq!(controller.clock_rate_multiplier(), 16);
        // Double density at 300RPM: 25,600,000 cycles per rotation over 100,000 cells.
        assert_eq!(controller.pll().clocks_per_bit(), 256);
    }

    #[test]
    fn test_reads_clock_pattern() {
        let mut controller = controller_with_disk();
        let mut bits = Vec::new();
        let mut index_holes = 0;
        // Two rotations at 8MHz.
        controller.run_for(3_200_000, |event| match event {
            ControllerEvent::Bit(bit) if index_holes == 1 => bits.push(bit),
            ControllerEvent::IndexHole => index_holes += 1,
            _ => {}
        });
        assert_eq!(index_holes, 2);
        assert!(bits.len() >= 99_990 && bits.len() <= 100_010, "{} bits", bits.len());
        // Once locked the pattern alternates.
        let locked = &bits[100..bits.len() - 100];
        for pair in locked.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_budget_is_returned() {
        let mut controller = controller_with_disk();
        let mut budget = 1_000;
        let event = controller.run_until_event(&mut budget);
        assert!(event.is_some());
        assert!(budget < 1_000);

        // Nothing happens on an empty stand-in drive when not reading.
        let mut controller = DiskController::new(8_000_000);
        controller.set_drive(Some(7));
        controller.set_is_reading(false);
        let mut budget = 1_000;
        assert_eq!(controller.run_until_event(&mut budget), None);
        assert_eq!(budget, 0);
    }

    #[test]
    fn test_stand_in_drive() {
        let mut controller = DiskController::new(4_000_000);
        controller.set_drive(Some(3));
        assert!(!controller.is_ready());
        assert!(controller.is_track_zero());
        controller.step(StepDirection::Outward);
        controller.set_motor_on(true);
        assert!(controller.should_sleep());
    }

    #[test]
    fn test_sleep_observer_notified_on_change() {
        let notifications = Rc::new(RefCell::new(Vec::new()));
        let mut controller = DiskController::new(8_000_000);
        let observed = notifications.clone();
        controller.set_sleep_observer(Box::new(move |sleeping| observed.borrow_mut().push(sleeping)));

        let index = controller.insert_drive(Drive::default());
        controller.set_drive(Some(index));
        controller.set_motor_on(true);
        assert!(notifications.borrow().is_empty());

        assert!(controller.insert_disk(index, Disk::new(ClockImage)).is_ok());
        controller.set_motor_on(true);
        controller.set_motor_on(false);
        controller.set_motor_on(false);
        controller.set_drive(Some(index + 1));
        assert_eq!(*notifications.borrow(), vec![false, true]);
    }

    #[test]
    fn test_write_then_read_back() {
        let mut controller = controller_with_disk();
        controller.step(StepDirection::Inward);

        let mut budget = 10_000_000;
        while controller.run_until_event(&mut budget) != Some(ControllerEvent::IndexHole) {}

        // Write the clock pattern over the first tenth of an unformatted track.
        let mut writer = controller.begin_writing(true);
        assert!(writer.controller().is_writing());
        for i in 0..10_000 {
            writer.write_bit(i % 2 == 0);
        }
        while writer.run_until_event(&mut budget) != Some(ControllerEvent::DataWritten) {}
        writer.end_writing();
        assert!(!controller.is_writing());
        assert!(controller.drive().current_track().is_patched());

        while controller.run_until_event(&mut budget) != Some(ControllerEvent::IndexHole) {}
        let mut ones = 0;
        loop {
            match controller.run_until_event(&mut budget) {
                Some(ControllerEvent::Bit(true)) => ones += 1,
                Some(ControllerEvent::IndexHole) | None => break,
                _ => {}
            }
        }
        assert!((4_990..=5_000).contains(&ones), "{} ones", ones);
    }

    #[test]
    fn test_dropped_writer_commits() {
        let mut controller = controller_with_disk();
        controller.step(StepDirection::Inward);
        {
            let mut writer = controller.begin_writing(false);
            for _ in 0..64 {
                writer.write_bit(true);
            }
        }
        assert!(matches!(controller.state(), ControllerState::Reading));
        assert!(controller.drive().current_track().is_patched());
    }

    #[test]
    fn test_write_timing_carries_fractional_cycles() {
        // 360RPM at high density is not a whole number of internal cycles per bit.
        let mut controller = DiskController::new(8_000_000);
        let index = controller.insert_drive(Drive::new(2, 84, 360));
        controller.set_drive(Some(index));
        controller.set_expected_bit_length(TrackDensity::High.bit_length());
        let cycles_per_rotation = controller.drive().cycles_per_rotation();
        assert_eq!(controller.pll().clocks_per_bit(), cycles_per_rotation / 200_000);

        let mut writer = controller.begin_writing(true);
        for _ in 0..1000 {
            writer.write_bit(false);
        }
        let ControllerState::Writing(write) = writer.controller().state()
        else {
            panic!("expected the writing state");
        };
        assert_eq!(write.cycles_until_flushed, cycles_per_rotation * 1000 / 200_000);
        assert!(write.cycles_until_flushed > 1000 * writer.controller().pll().clocks_per_bit());
    }
}
