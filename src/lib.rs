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

    src/lib.rs

    The fluxfox_drive library crate.
*/

//! # fluxfox_drive
//!
//! Flux-level floppy drive emulation for the fluxfox family of crates.
//!
//! Where `fluxfox` is concerned with disk images as static artifacts, this crate models what a
//! drive and its controller actually see as the disk spins: a stream of flux transitions that
//! must be turned into bits by clock recovery, into bytes and address marks by a line-code
//! shifter, and back into flux when the controller writes.
//!
//! The crate is layered, leaves first:
//!
//! * [track] - the in-memory record of a track as timed events. [Track] is a closed sum type
//!   over PCM, unformatted and patched tracks.
//! * [flux::pll] - a digital phase-locked loop that recovers a bit stream from event timing.
//! * [bitstream_codec] - the FM/MFM shifter and encoders, CRC and shared mark constants, plus
//!   Commodore GCR.
//! * [controller] - drive mechanics and a disk controller exposing a token/byte interface to
//!   machine-specific controller state machines.
//! * [track_schema] - the sector <-> track codec shared by every sector-based image format.
//!
//! Disk images live on top of these layers in [diskimage] and [file_parsers].

pub mod bitstream_codec;
pub mod controller;
pub mod diskimage;
pub mod file_parsers;
pub mod flux;
mod flush_queue;
pub mod io;
pub mod track;
pub mod track_schema;
pub mod types;

use thiserror::Error;

/// The largest sector size fluxfox_drive will encode or decode. Size codes beyond this are clamped.
pub const MAXIMUM_SECTOR_SIZE: usize = 8192;

#[derive(Clone, Debug, Error)]
pub enum DiskImageError {
    #[error("An IO error occurred reading or writing the disk image: {0}")]
    IoError(String),
    #[error("The file is not an image of this format")]
    UnknownFormat,
    #[error("The disk image is of a recognized format but an unsupported version: {0}")]
    UnsupportedVersion(String),
    #[error("The disk image format parser encountered an error")]
    FormatParseError,
    #[error("The disk image is read-only")]
    ReadOnly,
    #[error("Invalid parameters were specified to a library function")]
    ParameterError,
    #[error("The disk image lock was poisoned")]
    SyncError,
}

impl From<std::io::Error> for DiskImageError {
    fn from(err: std::io::Error) -> Self {
        DiskImageError::IoError(err.to_string())
    }
}

impl From<binrw::Error> for DiskImageError {
    fn from(err: binrw::Error) -> Self {
        match err {
            binrw::Error::BadMagic { .. } => DiskImageError::UnknownFormat,
            binrw::Error::Io(e) => DiskImageError::IoError(e.to_string()),
            _ => DiskImageError::FormatParseError,
        }
    }
}

pub use crate::{
    diskimage::{Disk, DiskImage},
    file_parsers::{detect_image_format, load_disk, open_disk, ImageFormat},
    track::{Track, TrackEvent, TrackEventKind},
    types::{Sector, SectorAddress, SectorFlags, Time, TrackAddress, TrackDensity},
};

pub mod prelude {
    pub use crate::{
        bitstream_codec::{Shifter, Token},
        controller::{ControllerEvent, DiskController, Drive, EventSource, MfmController},
        diskimage::{Disk, DiskImage},
        flux::pll::DigitalPll,
        track::{PcmSegment, PcmTrack, Track, TrackEvent, TrackEventKind},
        track_schema::system34::{decode_sectors, encode_track},
        types::{Sector, SectorAddress, SectorFlags, Time, TrackAddress, TrackDensity},
        DiskImageError,
    };
}
