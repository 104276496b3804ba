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

    src/file_parsers/d64.rs

    A parser for Commodore 1541 D64 sector images.
*/

//! A D64 image holds the 683 256-byte sectors of a 35 track 1541 disk, track by track, with no
//! headers. Some images append one error byte per sector, as reported by the 1541 when the disk
//! was read; these are honoured when synthesizing tracks:
//!
//! | Code | Meaning                  | Synthesized as               |
//! |------|--------------------------|------------------------------|
//! | 0x02 | header block not found   | sector omitted               |
//! | 0x03 | no sync                  | sector omitted               |
//! | 0x04 | data block not found     | sector omitted               |
//! | 0x05 | data block checksum      | bad data checksum            |
//! | 0x09 | header block checksum    | bad header checksum          |
//!
//! Head position `p` maps to 1541 track `p + 1`. There is one head.

use crate::{
    bitstream_codec::gcr::sectors_in_track,
    diskimage::DiskImage,
    file_parsers::FormatCaps,
    io::{get_length, read_all, ReadSeek},
    track::Track,
    track_schema::commodore::{decode_track, encode_track, GCR_SECTOR_SIZE, GCR_SECTOR_SIZE_CODE},
    types::{Sector, SectorAddress, SectorFlags, TrackAddress},
    DiskImageError,
};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

pub const D64_TRACK_COUNT: u8 = 35;
pub const D64_SECTOR_COUNT: usize = 683;
pub const D64_IMAGE_LEN: usize = D64_SECTOR_COUNT * GCR_SECTOR_SIZE;
pub const D64_IMAGE_LEN_WITH_ERRORS: usize = D64_IMAGE_LEN + D64_SECTOR_COUNT;

const BAM_TRACK: u8 = 18;
const BAM_DISK_ID_OFFSET: usize = 0xA2;

const ERROR_OK: u8 = 0x01;
const ERROR_NO_HEADER: u8 = 0x02;
const ERROR_NO_SYNC: u8 = 0x03;
const ERROR_NO_DATA: u8 = 0x04;
const ERROR_DATA_CHECKSUM: u8 = 0x05;
const ERROR_HEADER_CHECKSUM: u8 = 0x09;

/// Return the index of the first sector of the 1-based `track_number` within the image.
fn first_sector_of(track_number: u8) -> usize {
    (1..track_number).map(|t| sectors_in_track(t) as usize).sum()
}

pub struct D64Image {
    data: Vec<u8>,
    errors: Option<Vec<u8>>,
    path: Option<PathBuf>,
    writable: bool,
}

impl D64Image {
    pub fn capabilities() -> FormatCaps {
        FormatCaps::CAP_ENCODING_GCR | FormatCaps::CAP_ADDRESS_CRC | FormatCaps::CAP_DATA_CRC | FormatCaps::CAP_WRITE_BACK
    }

    pub fn extensions() -> Vec<&'static str> {
        vec!["d64"]
    }

    pub fn detect<T: ReadSeek>(image: &mut T) -> bool {
        get_length(image).map_or(false, |len| {
            matches!(len as usize, D64_IMAGE_LEN | D64_IMAGE_LEN_WITH_ERRORS)
        })
    }

    /// Create an image from the contents of a D64 file, with or without its error table.
    pub fn from_bytes(mut data: Vec<u8>) -> Result<Self, DiskImageError> {
        let errors = match data.len() {
            D64_IMAGE_LEN => None,
            D64_IMAGE_LEN_WITH_ERRORS => Some(data.split_off(D64_IMAGE_LEN)),
            len => {
                log::debug!("D64Image::from_bytes(): {} bytes is not a D64 size", len);
                return Err(DiskImageError::UnknownFormat);
            }
        };
        log::trace!(
            "D64Image::from_bytes(): {} error table",
            if errors.is_some() { "with" } else { "no" }
        );
        Ok(Self {
            data,
            errors,
            path: None,
            writable: false,
        })
    }

    /// Create a zero-filled image with no error table that accepts written tracks.
    pub fn blank() -> Self {
        Self {
            data: vec![0; D64_IMAGE_LEN],
            errors: None,
            path: None,
            writable: true,
        }
    }

    pub fn load<T: ReadSeek>(image: &mut T) -> Result<Self, DiskImageError> {
        Self::from_bytes(read_all(image)?)
    }

    /// Open the file at `path`. If `writable` is set, flushed tracks are written back to it.
    pub fn open(path: &Path, writable: bool) -> Result<Self, DiskImageError> {
        let mut image = Self::from_bytes(std::fs::read(path)?)?;
        image.path = Some(path.to_path_buf());
        image.writable = writable;
        Ok(image)
    }

    /// Return the sector data, without the error table.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn error_table(&self) -> Option<&[u8]> {
        self.errors.as_deref()
    }

    /// Return the two byte disk id recorded in the BAM, which every sector header repeats.
    pub fn disk_id(&self) -> [u8; 2] {
        let offset = first_sector_of(BAM_TRACK) * GCR_SECTOR_SIZE + BAM_DISK_ID_OFFSET;
        [self.data[offset], self.data[offset + 1]]
    }

    fn track_number(address: TrackAddress) -> Option<u8> {
        if address.head != 0 || address.position >= D64_TRACK_COUNT as u16 {
            return None;
        }
        Some(address.position as u8 + 1)
    }

    fn sector_error(&self, index: usize) -> u8 {
        self.errors
            .as_ref()
            .and_then(|errors| errors.get(index).copied())
            .unwrap_or(ERROR_OK)
    }

    fn store_sectors(&mut self, track_number: u8, sectors: Vec<Sector>) {
        let first = first_sector_of(track_number);
        let count = sectors_in_track(track_number);
        let mut stored = 0;

        for sector in sectors {
            let s = sector.address.s();
            if sector.address.c() != track_number || s >= count || sector.data.len() != GCR_SECTOR_SIZE {
                log::warn!(
                    "D64Image::set_tracks(): track {}: sector {} cannot be stored in a D64 image",
                    track_number,
                    sector
                );
                continue;
            }
            if !sector.is_clean() {
                log::warn!(
                    "D64Image::set_tracks(): track {}: sector {} has flags {:?}; previous contents kept",
                    track_number,
                    sector.address,
                    sector.flags
                );
                continue;
            }
            let index = first + s as usize;
            let start = index * GCR_SECTOR_SIZE;
            self.data[start..start + GCR_SECTOR_SIZE].copy_from_slice(&sector.data);
            if let Some(errors) = self.errors.as_mut() {
                errors[index] = ERROR_OK;
            }
            stored += 1;
        }
        log::trace!("D64Image::set_tracks(): track {}: stored {} sectors", track_number, stored);
    }
}

impl DiskImage for D64Image {
    fn head_count(&self) -> u8 {
        1
    }

    fn track_count(&self) -> u16 {
        D64_TRACK_COUNT as u16
    }

    fn track_at(&mut self, address: TrackAddress) -> Result<Option<Track>, DiskImageError> {
        let Some(track_number) = Self::track_number(address)
        else {
            return Ok(None);
        };

        let first = first_sector_of(track_number);
        let mut sectors = Vec::with_capacity(sectors_in_track(track_number) as usize);
        for s in 0..sectors_in_track(track_number) {
            let index = first + s as usize;
            let start = index * GCR_SECTOR_SIZE;
            let mut sector = Sector::new(
                SectorAddress::new(track_number, 0, s),
                GCR_SECTOR_SIZE_CODE,
                self.data[start..start + GCR_SECTOR_SIZE].to_vec(),
            );
            match self.sector_error(index) {
                ERROR_NO_HEADER | ERROR_NO_SYNC | ERROR_NO_DATA => {
                    log::trace!("D64Image::track_at(): track {} sector {} omitted", track_number, s);
                    continue;
                }
                ERROR_DATA_CHECKSUM => sector.flags |= SectorFlags::DATA_CRC_ERROR,
                ERROR_HEADER_CHECKSUM => sector.flags |= SectorFlags::HEADER_CRC_ERROR,
                _ => {}
            }
            sectors.push(sector);
        }

        Ok(Some(encode_track(track_number, self.disk_id(), &sectors)))
    }

    fn set_tracks(&mut self, tracks: BTreeMap<TrackAddress, Track>) -> Result<(), DiskImageError> {
        if !self.writable {
            return Err(DiskImageError::ReadOnly);
        }
        for (address, track) in tracks {
            let Some(track_number) = Self::track_number(address)
            else {
                log::warn!("D64Image::set_tracks(): track {} is outside the image; dropped", address);
                continue;
            };
            let sectors = decode_track(&track, track_number);
            self.store_sectors(track_number, sectors);
        }
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        !self.writable
    }

    fn flush_tracks(&mut self) -> Result<(), DiskImageError> {
        if let Some(path) = &self.path {
            log::debug!("D64Image::flush_tracks(): writing {}", path.display());
            let mut file_data = self.data.clone();
            if let Some(errors) = &self.errors {
                file_data.extend_from_slice(errors);
            }
            std::fs::write(path, file_data)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterned() -> Vec<u8> {
        let mut data: Vec<u8> = (0..D64_IMAGE_LEN).map(|i| (i * 7 + i / 256) as u8).collect();
        let bam = first_sector_of(BAM_TRACK) * GCR_SECTOR_SIZE;
        data[bam + BAM_DISK_ID_OFFSET] = b'4';
        data[bam + BAM_DISK_ID_OFFSET + 1] = b'2';
        data
    }

    #[test]
    fn test_geometry() {
        assert_eq!(first_sector_of(1), 0);
        assert_eq!(first_sector_of(18), 357);
        assert_eq!(first_sector_of(36), D64_SECTOR_COUNT);
        let image = D64Image::from_bytes(patterned()).unwrap();
        assert_eq!(image.disk_id(), *b"42");
        assert!(image.error_table().is_none());
    }

    #[test]
    fn test_track_holds_image_sectors() {
        let data = patterned();
        let mut image = D64Image::from_bytes(data.clone()).unwrap();
        for position in [0u16, 17, 34] {
            let track_number = position as u8 + 1;
            let track = image.track_at(TrackAddress::new(0, position)).unwrap().unwrap();
            let sectors = decode_track(&track, track_number);
            assert_eq!(sectors.len(), sectors_in_track(track_number) as usize);

            let first = first_sector_of(track_number);
            for (s, sector) in sectors.iter().enumerate() {
                assert_eq!(sector.address, SectorAddress::new(track_number, 0, s as u8));
                assert!(sector.is_clean());
                let start = (first + s) * GCR_SECTOR_SIZE;
                assert_eq!(sector.data, &data[start..start + GCR_SECTOR_SIZE]);
            }
        }
        assert!(image.track_at(TrackAddress::new(0, 35)).unwrap().is_none());
        assert!(image.track_at(TrackAddress::new(1, 0)).unwrap().is_none());
    }

    #[test]
    fn test_error_table_is_honoured() {
        let mut data = patterned();
        let mut errors = vec![ERROR_OK; D64_SECTOR_COUNT];
        errors[2] = ERROR_DATA_CHECKSUM;
        errors[4] = ERROR_HEADER_CHECKSUM;
        errors[6] = ERROR_NO_HEADER;
        data.extend_from_slice(&errors);

        let mut image = D64Image::from_bytes(data).unwrap();
        assert_eq!(image.error_table().map(|e| e.len()), Some(D64_SECTOR_COUNT));
        let track = image.track_at(TrackAddress::new(0, 0)).unwrap().unwrap();
        let sectors = decode_track(&track, 1);

        assert_eq!(sectors.len(), 20);
        assert!(sectors.iter().all(|sector| sector.address.s() != 6));
        let flags_of = |s: u8| sectors.iter().find(|sector| sector.address.s() == s).map(|sector| sector.flags);
        assert_eq!(flags_of(2), Some(SectorFlags::DATA_CRC_ERROR));
        assert_eq!(flags_of(4), Some(SectorFlags::HEADER_CRC_ERROR));
        assert_eq!(flags_of(5), Some(SectorFlags::empty()));
    }

    #[test]
    fn test_written_track_is_stored() {
        let mut image = D64Image::blank();
        let sectors: Vec<Sector> = (0..sectors_in_track(20))
            .map(|s| Sector::new(SectorAddress::new(20, 0, s), 1, vec![s.wrapping_mul(11); 256]))
            .collect();
        let track = encode_track(20, [0x30, 0x31], &sectors);
        image.set_tracks(BTreeMap::from([(TrackAddress::new(0, 19), track)])).unwrap();

        let first = first_sector_of(20);
        for s in 0..sectors_in_track(20) as usize {
            let start = (first + s) * GCR_SECTOR_SIZE;
            assert!(image.data()[start..start + 256].iter().all(|&b| b == (s as u8).wrapping_mul(11)));
        }
    }
}
