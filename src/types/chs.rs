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

    src/types/chs.rs

    Sector and track addressing types.
*/

//! The `chs` module defines the addressing types used to key sectors and tracks.

use crate::MAXIMUM_SECTOR_SIZE;
use std::fmt::Display;

/// A structure representing the three address components of a sector ID:
///  - Cylinder (c)
///  - Head (h)
///  - Sector ID (s)
///
/// These are the values recorded in a sector's ID field, which need not match the physical
/// location of the sector. Copy protection routinely relies on that.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SectorAddress {
    pub(crate) c: u8,
    pub(crate) h: u8,
    pub(crate) s: u8,
}

impl From<(u8, u8, u8)> for SectorAddress {
    fn from((c, h, s): (u8, u8, u8)) -> Self {
        Self { c, h, s }
    }
}

impl From<SectorAddress> for (u8, u8, u8) {
    fn from(addr: SectorAddress) -> Self {
        (addr.c, addr.h, addr.s)
    }
}

impl Display for SectorAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[c:{:2} h:{} s:{:3}]", self.c, self.h, self.s)
    }
}

impl SectorAddress {
    /// Create a new `SectorAddress` from cylinder, head and sector id components.
    pub fn new(c: u8, h: u8, s: u8) -> Self {
        Self { c, h, s }
    }
    /// Return the cylinder (c) field.
    #[inline]
    pub fn c(&self) -> u8 {
        self.c
    }
    /// Return the head (h) field.
    #[inline]
    pub fn h(&self) -> u8 {
        self.h
    }
    /// Return the sector id (s) field.
    #[inline]
    pub fn s(&self) -> u8 {
        self.s
    }

    /// Convert the value of the sector size field (n) into bytes.
    /// The formula for calculating size from n is (128 * 2^n)
    /// We enforce a maximum size of 8192 bytes for a single sector.
    #[inline]
    pub fn n_to_bytes(n: u8) -> usize {
        128usize
            .checked_shl(n as u32)
            .filter(|size| *size != 0)
            .map_or(MAXIMUM_SECTOR_SIZE, |size| size.min(MAXIMUM_SECTOR_SIZE))
    }

    /// Convert a size in bytes into a valid sector size field value (n)
    #[inline]
    pub fn bytes_to_n(size: usize) -> u8 {
        let mut n = 0;
        let mut size = size;
        while size > 128 {
            size >>= 1;
            n += 1;
        }
        n
    }
}

/// The physical location of a track: which head reads it, and at which head position.
///
/// A [TrackAddress] keys the per-image track arena. Positions are whole tracks; half-tracking
/// drives are expected to map their quarter/half steps onto whole positions before asking.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackAddress {
    pub head: u8,
    pub position: u16,
}

impl TrackAddress {
    pub fn new(head: u8, position: u16) -> Self {
        Self { head, position }
    }
}

impl Display for TrackAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[h:{} p:{:2}]", self.head, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_n_to_bytes() {
        assert_eq!(SectorAddress::n_to_bytes(0), 128);
        assert_eq!(SectorAddress::n_to_bytes(1), 256);
        assert_eq!(SectorAddress::n_to_bytes(2), 512);
        assert_eq!(SectorAddress::n_to_bytes(3), 1024);
        assert_eq!(SectorAddress::n_to_bytes(7), 8192);
        assert_eq!(SectorAddress::n_to_bytes(200), 8192);
        // Shifts past the width of usize must not wrap around to small sizes.
        for n in 6..=u8::MAX {
            assert_eq!(SectorAddress::n_to_bytes(n), 8192, "n = {}", n);
        }
    }

    #[test]
    fn test_bytes_to_n() {
        assert_eq!(SectorAddress::bytes_to_n(128), 0);
        assert_eq!(SectorAddress::bytes_to_n(256), 1);
        assert_eq!(SectorAddress::bytes_to_n(1024), 3);
    }

    #[test]
    fn test_track_address_ordering() {
        let mut addrs = vec![TrackAddress::new(1, 0), TrackAddress::new(0, 5), TrackAddress::new(0, 1)];
        addrs.sort();
        assert_eq!(addrs[0], TrackAddress::new(0, 1));
        assert_eq!(addrs[2], TrackAddress::new(1, 0));
    }
}
