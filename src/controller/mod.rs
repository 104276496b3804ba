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

    src/controller/mod.rs

    Drive mechanics and disk controllers.
*/

//! The `controller` module sits between a machine's controller chip emulation and the track
//! model.
//!
//! * [Drive] models the mechanics: a disk, a head position and selected head, the spindle motor,
//!   and a cursor into the track under the head.
//! * [DiskController] steps the selected drive in controller clock cycles, feeds flux transitions
//!   through a [DigitalPll](crate::flux::DigitalPll) and reports recovered bits, index holes and
//!   write completion one at a time. Writes are collected as PCM and laid over the track as a
//!   patch when writing ends.
//! * [MfmController] adds the FM/MFM shifter and encoders on top, so callers deal in tokens and
//!   bytes rather than bits.
//!
//! Time is driven from outside. A machine calls [EventSource::run_until_event] with a budget of
//! its own clock cycles and gets back either the next event or `None` once the budget is spent.
//! Both controllers, and the writers they hand out while writing, are event sources.

pub mod disk_controller;
pub mod drive;
pub mod mfm;

pub use disk_controller::{ControllerState, DiskController, WriteState, Writer};
pub use drive::{Drive, StepDirection};
pub use mfm::{MfmController, MfmWriter};

use crate::bitstream_codec::Token;
use std::fmt::{Display, Formatter};

/// The rate of the clock all controller timing is internally expressed in. Controller input clocks
/// are scaled up to this rate by an integer multiplier.
pub const INTERNAL_CLOCK_RATE: u64 = 128_000_000;

/// Something a controller observed. Events are delivered one at a time, in the order they
/// occurred.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControllerEvent {
    /// The index hole passed the sensor.
    IndexHole,
    /// The PLL closed a bit window. Only reported while reading.
    Bit(bool),
    /// The shifter completed a token. Only reported by [MfmController].
    Token(Token),
    /// Every bit written so far has reached the disk surface.
    DataWritten,
}

impl Display for ControllerEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerEvent::IndexHole => write!(f, "IndexHole"),
            ControllerEvent::Bit(bit) => write!(f, "Bit({})", *bit as u8),
            ControllerEvent::Token(token) => write!(f, "Token({})", token),
            ControllerEvent::DataWritten => write!(f, "DataWritten"),
        }
    }
}

/// A controller that can be run in steps of controller clock cycles.
pub trait EventSource {
    /// Run until the next event or until `budget` controller clock cycles have passed. On return
    /// `budget` holds the cycles that were not used.
    fn run_until_event(&mut self, budget: &mut u64) -> Option<ControllerEvent>;

    /// Run for `cycles` controller clock cycles, passing every event to `f`.
    fn run_for(&mut self, cycles: u64, mut f: impl FnMut(ControllerEvent))
    where
        Self: Sized,
    {
        let mut budget = cycles;
        while let Some(event) = self.run_until_event(&mut budget) {
            f(event);
        }
    }
}
