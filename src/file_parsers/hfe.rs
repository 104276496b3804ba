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

    src/file_parsers/hfe.rs

    A parser for the HFEv1 disk image format.

    HFE format images are an internal bitstream-level format used by the HxC disk emulator.
*/

//! An HFE file is a 512-byte header, a track list of (offset, length) pairs, and per-track bit
//! cell data. Track data for both sides is interleaved in 512-byte blocks: 256 bytes of side 0
//! then 256 bytes of side 1. Bit cells are stored least significant bit first.
//!
//! Stored bit cells are handed out as a single PCM segment spanning one rotation. Written tracks
//! are serialized back to the track's cell count and stored in place.

use crate::{
    diskimage::DiskImage,
    file_parsers::{bitstream_flags, FormatCaps},
    io::{read_all, ReadSeek},
    track::{serialize_track, PcmSegment, Track},
    types::{time::time, TrackAddress, TrackDensity},
    DiskImageError,
};
use binrw::{binrw, BinRead, BinWrite};
use std::{
    collections::BTreeMap,
    io::Cursor,
    path::{Path, PathBuf},
};

const fn reverse_bits(mut byte: u8) -> u8 {
    byte = (byte >> 4) | (byte << 4);
    byte = ((byte & 0x33) << 2) | ((byte & 0xCC) >> 2);
    byte = ((byte & 0x55) << 1) | ((byte & 0xAA) >> 1);
    byte
}

const fn generate_reverse_table() -> [u8; 256] {
    let mut table = [0; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = reverse_bits(i as u8);
        i += 1;
    }
    table
}

const REVERSE_TABLE: [u8; 256] = generate_reverse_table();

pub const HFE_SIGNATURE: &[u8; 8] = b"HXCPICFE";
pub const HFE_V3_SIGNATURE: &[u8; 8] = b"HXCHFEV3";
pub const HFE_BLOCK_SIZE: usize = 512;
const HFE_SIDE_BLOCK_SIZE: usize = HFE_BLOCK_SIZE / 2;

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HfeFloppyEncoding {
    IsoIbmMfm = 0x00,
    AmigaMfm = 0x01,
    IsoIbmFm = 0x02,
    EmuFm = 0x03,
    Unknown = 0xFF,
}

impl From<u8> for HfeFloppyEncoding {
    fn from(value: u8) -> Self {
        match value {
            0x00 => HfeFloppyEncoding::IsoIbmMfm,
            0x01 => HfeFloppyEncoding::AmigaMfm,
            0x02 => HfeFloppyEncoding::IsoIbmFm,
            0x03 => HfeFloppyEncoding::EmuFm,
            _ => HfeFloppyEncoding::Unknown,
        }
    }
}

#[derive(Debug)]
#[binrw]
#[brw(little)]
struct HfeFileHeader {
    signature: [u8; 8],   // “HXCPICFE”
    format_revision: u8,  // Revision 0
    number_of_tracks: u8, // Number of track in the file
    number_of_sides: u8,  // Number of valid side
    track_encoding: u8,   // Track Encoding mode
    bit_rate: u16,        // Bitrate in Kbit/s. Ex : 250=250000bits/s
    rpm: u16,             // Rotation per minute
    interface_mode: u8,   // Floppy interface mode
    unused: u8,           // Reserved
    track_list_offset: u16, // Offset of the track list LUT in block of 512 bytes
    write_allowed: u8,    // 0x00 if the image is write protected
    single_step: u8,      // 0xFF : Single Step – 0x00 Double Step mode
    track0s0_altencoding: u8,
    track0s0_encoding: u8,
    track0s1_altencoding: u8,
    track0s1_encoding: u8,
}

#[derive(Copy, Clone, Debug)]
#[binrw]
#[brw(little)]
struct HfeTrackIndexEntry {
    offset: u16, // In blocks of 512 bytes
    len: u16,    // In bytes, both sides
}

impl HfeTrackIndexEntry {
    fn side_len(&self) -> usize {
        self.len as usize / 2
    }

    /// Return the file offset of byte `i` of `side`'s cell data.
    fn position_of(&self, side: u8, i: usize) -> usize {
        self.offset as usize * HFE_BLOCK_SIZE
            + (i / HFE_SIDE_BLOCK_SIZE) * HFE_BLOCK_SIZE
            + side as usize * HFE_SIDE_BLOCK_SIZE
            + i % HFE_SIDE_BLOCK_SIZE
    }
}

pub struct HfeImage {
    header: HfeFileHeader,
    track_index: Vec<HfeTrackIndexEntry>,
    file: Vec<u8>,
    path: Option<PathBuf>,
    writable: bool,
}

impl HfeImage {
    pub fn capabilities() -> FormatCaps {
        bitstream_flags() | FormatCaps::CAP_ENCODING_FM | FormatCaps::CAP_ENCODING_MFM | FormatCaps::CAP_WRITE_BACK
    }

    pub fn extensions() -> Vec<&'static str> {
        vec!["hfe"]
    }

    pub fn detect<T: ReadSeek>(image: &mut T) -> bool {
        if image.seek(std::io::SeekFrom::Start(0)).is_err() {
            return false;
        }
        matches!(HfeFileHeader::read(image), Ok(header) if &header.signature == HFE_SIGNATURE || &header.signature == HFE_V3_SIGNATURE)
    }

    /// Parse the contents of an HFE file.
    pub fn from_bytes(file: Vec<u8>) -> Result<Self, DiskImageError> {
        let mut cursor = Cursor::new(&file);
        let header = HfeFileHeader::read(&mut cursor)?;

        if &header.signature == HFE_V3_SIGNATURE {
            return Err(DiskImageError::UnsupportedVersion("HFEv3".to_string()));
        }
        if &header.signature != HFE_SIGNATURE {
            return Err(DiskImageError::UnknownFormat);
        }
        if header.format_revision != 0 {
            return Err(DiskImageError::UnsupportedVersion(format!(
                "HFE revision {}",
                header.format_revision
            )));
        }
        if header.number_of_sides == 0 || header.number_of_sides > 2 {
            log::error!("HfeImage::from_bytes(): invalid side count {}", header.number_of_sides);
            return Err(DiskImageError::FormatParseError);
        }

        log::trace!(
            "HfeImage::from_bytes(): tracks: {} sides: {} encoding: {:?} bit rate: {}",
            header.number_of_tracks,
            header.number_of_sides,
            HfeFloppyEncoding::from(header.track_encoding),
            header.bit_rate
        );

        cursor.set_position(header.track_list_offset as u64 * HFE_BLOCK_SIZE as u64);
        let mut track_index = Vec::with_capacity(header.number_of_tracks as usize);
        for ti in 0..header.number_of_tracks {
            let entry = HfeTrackIndexEntry::read(&mut cursor)?;
            if entry.len & 1 != 0 {
                log::error!("HfeImage::from_bytes(): track {} length cannot be odd, due to side interleave", ti);
                return Err(DiskImageError::FormatParseError);
            }
            if entry.side_len() > 0 && entry.position_of(1, entry.side_len() - 1) >= file.len() {
                log::error!("HfeImage::from_bytes(): track {} data runs past the end of the file", ti);
                return Err(DiskImageError::FormatParseError);
            }
            track_index.push(entry);
        }

        Ok(Self {
            header,
            track_index,
            file,
            path: None,
            writable: false,
        })
    }

    /// Create an image of `track_count` blank tracks at `density`. The image accepts written
    /// tracks.
    pub fn blank(track_count: u8, head_count: u8, density: TrackDensity) -> Result<Self, DiskImageError> {
        if track_count == 0 || !(1..=2).contains(&head_count) {
            return Err(DiskImageError::ParameterError);
        }
        let side_len = density.bitcells_per_rotation() / 8;
        let track_len = side_len * 2;
        let track_blocks = track_len.div_ceil(HFE_BLOCK_SIZE);
        let index_blocks = (track_count as usize * 4).div_ceil(HFE_BLOCK_SIZE);
        let first_track_block = 1 + index_blocks;

        let header = HfeFileHeader {
            signature: *HFE_SIGNATURE,
            format_revision: 0,
            number_of_tracks: track_count,
            number_of_sides: head_count,
            track_encoding: match density.is_mfm() {
                true => HfeFloppyEncoding::IsoIbmMfm as u8,
                false => HfeFloppyEncoding::IsoIbmFm as u8,
            },
            bit_rate: (density.bitcells_per_rotation() * 5 / 2 / 1000) as u16,
            rpm: 300,
            interface_mode: 0x07,
            unused: 0x01,
            track_list_offset: 1,
            write_allowed: 0xFF,
            single_step: 0xFF,
            track0s0_altencoding: 0xFF,
            track0s0_encoding: 0xFF,
            track0s1_altencoding: 0xFF,
            track0s1_encoding: 0xFF,
        };
        let track_index: Vec<HfeTrackIndexEntry> = (0..track_count as usize)
            .map(|t| HfeTrackIndexEntry {
                offset: (first_track_block + t * track_blocks) as u16,
                len: track_len as u16,
            })
            .collect();

        let mut cursor = Cursor::new(vec![0xFF; HFE_BLOCK_SIZE * first_track_block]);
        header.write(&mut cursor)?;
        cursor.set_position(HFE_BLOCK_SIZE as u64);
        for entry in &track_index {
            entry.write(&mut cursor)?;
        }
        let mut file = cursor.into_inner();
        file.resize(HFE_BLOCK_SIZE * (first_track_block + track_count as usize * track_blocks), 0);

        log::debug!(
            "HfeImage::blank(): {} tracks, {} sides, {} density, {} bytes",
            track_count,
            head_count,
            density,
            file.len()
        );
        let mut image = Self::from_bytes(file)?;
        image.writable = true;
        Ok(image)
    }

    pub fn load<T: ReadSeek>(image: &mut T) -> Result<Self, DiskImageError> {
        Self::from_bytes(read_all(image)?)
    }

    /// Open the file at `path`. If `writable` is set and the image is not write protected,
    /// flushed tracks are written back to it.
    pub fn open(path: &Path, writable: bool) -> Result<Self, DiskImageError> {
        let mut image = Self::from_bytes(std::fs::read(path)?)?;
        if writable && image.header.write_allowed == 0 {
            log::warn!("HfeImage::open(): {} is write protected; opening read-only", path.display());
        }
        image.path = Some(path.to_path_buf());
        image.writable = writable && image.header.write_allowed != 0;
        Ok(image)
    }

    /// Return the raw file contents, including any written tracks.
    #[inline]
    pub fn file_data(&self) -> &[u8] {
        &self.file
    }

    #[inline]
    pub fn encoding(&self) -> HfeFloppyEncoding {
        HfeFloppyEncoding::from(self.header.track_encoding)
    }

    #[inline]
    pub fn bit_rate(&self) -> u16 {
        self.header.bit_rate
    }

    fn entry_for(&self, address: TrackAddress) -> Option<HfeTrackIndexEntry> {
        if address.head >= self.header.number_of_sides {
            return None;
        }
        self.track_index.get(address.position as usize).copied()
    }
}

impl DiskImage for HfeImage {
    fn head_count(&self) -> u8 {
        self.header.number_of_sides
    }

    fn track_count(&self) -> u16 {
        self.header.number_of_tracks as u16
    }

    fn track_at(&mut self, address: TrackAddress) -> Result<Option<Track>, DiskImageError> {
        let Some(entry) = self.entry_for(address)
        else {
            return Ok(None);
        };
        let side_len = entry.side_len();
        if side_len == 0 {
            return Ok(None);
        }

        let cells: Vec<u8> = (0..side_len)
            .map(|i| REVERSE_TABLE[self.file[entry.position_of(address.head, i)] as usize])
            .collect();
        let bit_ct = side_len * 8;
        log::trace!("HfeImage::track_at(): track {}: {} bit cells", address, bit_ct);
        Ok(Some(Track::from(PcmSegment::from_bytes(&cells, None, time(1, bit_ct as u64)))))
    }

    fn set_tracks(&mut self, tracks: BTreeMap<TrackAddress, Track>) -> Result<(), DiskImageError> {
        if !self.writable {
            return Err(DiskImageError::ReadOnly);
        }
        for (address, track) in tracks {
            let Some(entry) = self.entry_for(address)
            else {
                log::warn!("HfeImage::set_tracks(): track {} is outside the image; dropped", address);
                continue;
            };
            let side_len = entry.side_len();
            if side_len == 0 {
                log::warn!("HfeImage::set_tracks(): track {} has no storage; dropped", address);
                continue;
            }

            let bit_ct = side_len * 8;
            let mut segment = serialize_track(&track, time(1, bit_ct as u64));
            if segment.len() != bit_ct {
                log::debug!(
                    "HfeImage::set_tracks(): track {}: serialized {} cells into {}",
                    address,
                    segment.len(),
                    bit_ct
                );
                segment.data.truncate(bit_ct);
                let shortfall = bit_ct - segment.len();
                segment.data.grow(shortfall, false);
            }
            for (i, byte) in segment.to_bytes().into_iter().enumerate() {
                let position = entry.position_of(address.head, i);
                self.file[position] = REVERSE_TABLE[byte as usize];
            }
        }
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        !self.writable
    }

    fn flush_tracks(&mut self) -> Result<(), DiskImageError> {
        if let Some(path) = &self.path {
            log::debug!("HfeImage::flush_tracks(): writing {}", path.display());
            std::fs::write(path, &self.file)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        track_schema::system34::{decode_sectors, encode_track},
        types::{Sector, SectorAddress},
    };

    fn simple_reverse_bits(byte: u8) -> u8 {
        let mut reversed = 0;
        for i in 0..8 {
            reversed |= ((byte >> i) & 1) << (7 - i);
        }
        reversed
    }

    #[test]
    fn test_generate_reverse_table() {
        let table = generate_reverse_table();
        for i in 0..256 {
            assert_eq!(table[i], simple_reverse_bits(i as u8), "Failed at index {}", i);
        }
    }

    #[test]
    fn test_blank_image_parses() {
        let image = HfeImage::blank(40, 2, TrackDensity::Double).unwrap();
        assert_eq!(image.head_count(), 2);
        assert_eq!(image.track_count(), 40);
        assert_eq!(image.bit_rate(), 250);
        assert_eq!(image.encoding(), HfeFloppyEncoding::IsoIbmMfm);

        let mut reparsed = HfeImage::from_bytes(image.file_data().to_vec()).unwrap();
        assert!(reparsed.is_read_only());
        let track = reparsed.track_at(TrackAddress::new(1, 39)).unwrap().unwrap();
        assert!(decode_sectors(&track, TrackDensity::Double).is_empty());
        assert!(reparsed.track_at(TrackAddress::new(0, 40)).unwrap().is_none());
        assert!(HfeImage::detect(&mut Cursor::new(image.file_data())));
    }

    #[test]
    fn test_rejects_other_files() {
        assert!(!HfeImage::detect(&mut Cursor::new(vec![0u8; 1024])));

        let mut file = HfeImage::blank(1, 1, TrackDensity::Double).unwrap().file_data().to_vec();
        file[8] = 1;
        assert!(matches!(HfeImage::from_bytes(file.clone()), Err(DiskImageError::UnsupportedVersion(_))));
        file[..8].copy_from_slice(HFE_V3_SIGNATURE);
        assert!(matches!(HfeImage::from_bytes(file), Err(DiskImageError::UnsupportedVersion(_))));
    }

    #[test]
    fn test_written_track_reads_back() {
        let mut image = HfeImage::blank(4, 2, TrackDensity::Double).unwrap();
        let sectors: Vec<Sector> = (1..=9)
            .map(|s| Sector::new(SectorAddress::new(2, 1, s), 2, vec![s.wrapping_mul(37); 512]))
            .collect();
        let address = TrackAddress::new(1, 2);
        image
            .set_tracks(BTreeMap::from([(address, encode_track(&sectors, TrackDensity::Double))]))
            .unwrap();

        let track = image.track_at(address).unwrap().unwrap();
        assert_eq!(decode_sectors(&track, TrackDensity::Double), sectors);
        // The other side of the same cylinder is untouched.
        let other = image.track_at(TrackAddress::new(0, 2)).unwrap().unwrap();
        assert!(decode_sectors(&other, TrackDensity::Double).is_empty());
    }
}
