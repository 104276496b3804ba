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

    src/types/time.rs

    Exact rational time, measured in rotations.
*/

//! Track time is measured as an exact fraction of one rotation. A [Time] of one is a full
//! rotation of the disk, regardless of RPM; the drive converts to real time using its rotation
//! speed.
//!
//! Floating point is not used here because thousands of event lengths per rotation must sum to
//! exactly one, and a drift of even a single tick per rotation accumulates into bit slip over
//! long emulation sessions.

use num_rational::Ratio;

/// An exact, non-negative fraction of a rotation.
pub type Time = Ratio<u64>;

/// Construct a [Time] from a numerator and denominator.
#[inline]
pub fn time(numer: u64, denom: u64) -> Time {
    Ratio::new(numer, denom)
}

#[doc(hidden)]
#[macro_export]
macro_rules! format_rot {
    ($value:expr) => {
        format!("{:.6}rot", num_traits::ToPrimitive::to_f64(&$value).unwrap_or(0.0))
    };
}

