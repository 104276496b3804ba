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

    src/types/sector.rs

    The Sector type.
*/

//! A [Sector] is the transient, byte-oriented view of one ID field plus its data field.
//! Sectors are produced by decoding a track and consumed when synthesizing one; they are never
//! stored independently of a track.

use crate::types::{SectorAddress, SectorFlags};
use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sector {
    pub address: SectorAddress,
    /// The size code (n) recorded in the ID field. The declared data length is `128 << size`.
    pub size: u8,
    /// Sector payload. Empty if an ID field was found with no following data field.
    pub data: Vec<u8>,
    pub flags: SectorFlags,
}

impl Sector {
    pub fn new(address: SectorAddress, size: u8, data: Vec<u8>) -> Self {
        Self {
            address,
            size,
            data,
            flags: SectorFlags::empty(),
        }
    }

    /// Return the declared length of this sector's data field in bytes.
    #[inline]
    pub fn declared_len(&self) -> usize {
        SectorAddress::n_to_bytes(self.size)
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.flags.contains(SectorFlags::DELETED)
    }

    #[inline]
    pub fn has_header_crc_error(&self) -> bool {
        self.flags.contains(SectorFlags::HEADER_CRC_ERROR)
    }

    #[inline]
    pub fn has_data_crc_error(&self) -> bool {
        self.flags.contains(SectorFlags::DATA_CRC_ERROR)
    }

    /// Returns `true` if the sector carries no error or deleted flags.
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.flags.is_empty()
    }
}

impl Display for Sector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} n:{} len:{} flags:{:?}",
            self.address,
            self.size,
            self.data.len(),
            self.flags
        )
    }
}
