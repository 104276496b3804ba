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

    enums.rs

    Defines common enum types
*/
use crate::types::{time::time, Time};
use std::{
    fmt,
    fmt::{Display, Formatter},
};
use strum::EnumIter;

/// The type of data encoding used by a track.
/// * Fm: Frequency Modulation encoding. Used by older 8" diskettes and single density 5.25"
///   diskettes such as the BBC Micro's DFS.
/// * Mfm: Modified Frequency Modulation encoding. Used by almost all double and high density
///   diskettes.
/// * Gcr: Group Code Recording. Used by Commodore and Apple drives.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrackDataEncoding {
    #[default]
    Fm,
    Mfm,
    Gcr,
}

impl Display for TrackDataEncoding {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            TrackDataEncoding::Fm => write!(f, "FM"),
            TrackDataEncoding::Mfm => write!(f, "MFM"),
            TrackDataEncoding::Gcr => write!(f, "GCR"),
        }
    }
}

/// The density class of a System34-style track. The density determines both the line code and
/// the number of bit cells in one rotation at 300RPM.
///
/// * `Single` density: FM at 125Kbps, 50,000 bit cells per rotation.
/// * `Double` density: MFM at 250Kbps, 100,000 bit cells per rotation.
/// * `High` density: MFM at 500Kbps, 200,000 bit cells per rotation.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrackDensity {
    Single,
    #[default]
    Double,
    High,
}

impl TrackDensity {
    /// Returns `true` if this density is recorded with MFM, `false` for FM.
    #[inline]
    pub fn is_mfm(&self) -> bool {
        !matches!(self, TrackDensity::Single)
    }

    pub fn encoding(&self) -> TrackDataEncoding {
        match self {
            TrackDensity::Single => TrackDataEncoding::Fm,
            _ => TrackDataEncoding::Mfm,
        }
    }

    /// The number of bit cells (clock and data bits both) in one rotation at 300RPM.
    pub fn bitcells_per_rotation(&self) -> usize {
        match self {
            TrackDensity::Single => 50_000,
            TrackDensity::Double => 100_000,
            TrackDensity::High => 200_000,
        }
    }

    /// The length of a single bit cell as a fraction of a rotation.
    pub fn bit_length(&self) -> Time {
        time(1, self.bitcells_per_rotation() as u64)
    }
}

impl Display for TrackDensity {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            TrackDensity::Single => write!(f, "Single"),
            TrackDensity::Double => write!(f, "Double"),
            TrackDensity::High => write!(f, "High"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_bit_length_spans_one_rotation() {
        for density in TrackDensity::iter() {
            let cells = density.bitcells_per_rotation() as u64;
            assert_eq!(density.bit_length() * Time::from_integer(cells), Time::from_integer(1));
            assert_eq!(density.is_mfm(), density.encoding() == TrackDataEncoding::Mfm);
        }
    }
}
