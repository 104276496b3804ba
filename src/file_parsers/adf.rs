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

    src/file_parsers/adf.rs

    A parser for Acorn ADFS sector images.
*/

//! Acorn ADFS images are raw dumps of 256-byte sectors, 16 to a track, recorded in MFM at double
//! density. The three standard sizes are distinguished by length alone:
//!
//! | Layout | Tracks | Sides | Size    |
//! |--------|--------|-------|---------|
//! | S      | 40     | 1     | 160KiB  |
//! | M      | 80     | 1     | 320KiB  |
//! | L      | 80     | 2     | 640KiB  |
//!
//! Double-sided images store the two sides of each cylinder consecutively.
//!
//! Tracks are synthesized from the sector data on demand. Written tracks are decoded back into
//! sectors; sectors that cannot be represented in a raw image are logged and dropped.

use crate::{
    diskimage::DiskImage,
    file_parsers::FormatCaps,
    io::{get_length, read_all, ReadSeek},
    track::Track,
    track_schema::system34::{decode_sectors, encode_track_with_params, TrackEncodeParams},
    types::{Sector, SectorAddress, TrackAddress, TrackDensity},
    DiskImageError,
};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

pub const ADF_SECTORS_PER_TRACK: u8 = 16;
pub const ADF_SECTOR_SIZE: usize = 256;
const ADF_SECTOR_SIZE_CODE: u8 = 1;
const ADF_TRACK_SIZE: usize = ADF_SECTORS_PER_TRACK as usize * ADF_SECTOR_SIZE;
const ADF_DENSITY: TrackDensity = TrackDensity::Double;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AdfLayout {
    S,
    M,
    L,
}

impl AdfLayout {
    pub fn from_len(len: usize) -> Option<AdfLayout> {
        [AdfLayout::S, AdfLayout::M, AdfLayout::L]
            .into_iter()
            .find(|layout| layout.image_len() == len)
    }

    pub fn head_count(&self) -> u8 {
        match self {
            AdfLayout::L => 2,
            _ => 1,
        }
    }

    pub fn track_count(&self) -> u16 {
        match self {
            AdfLayout::S => 40,
            _ => 80,
        }
    }

    pub fn image_len(&self) -> usize {
        self.track_count() as usize * self.head_count() as usize * ADF_TRACK_SIZE
    }
}

pub struct AdfImage {
    layout: AdfLayout,
    data: Vec<u8>,
    params: TrackEncodeParams,
    path: Option<PathBuf>,
    writable: bool,
}

impl AdfImage {
    pub fn capabilities() -> FormatCaps {
        FormatCaps::CAP_ENCODING_MFM | FormatCaps::CAP_WRITE_BACK
    }

    pub fn extensions() -> Vec<&'static str> {
        vec!["adf", "adl", "ads", "adm"]
    }

    pub fn detect<T: ReadSeek>(image: &mut T) -> bool {
        get_length(image).map_or(false, |len| AdfLayout::from_len(len as usize).is_some())
    }

    /// Create an image from raw sector data. Only the three standard image sizes are accepted.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, DiskImageError> {
        let Some(layout) = AdfLayout::from_len(data.len())
        else {
            log::debug!("AdfImage::from_bytes(): {} bytes is not a standard ADFS size", data.len());
            return Err(DiskImageError::UnknownFormat);
        };
        log::trace!(
            "AdfImage::from_bytes(): layout {:?}, {} tracks, {} sides",
            layout,
            layout.track_count(),
            layout.head_count()
        );
        Ok(Self {
            layout,
            data,
            params: TrackEncodeParams::default_for(ADF_DENSITY),
            path: None,
            writable: false,
        })
    }

    /// Create a zero-filled image of the given layout that accepts written tracks.
    pub fn blank(layout: AdfLayout) -> Self {
        Self {
            layout,
            data: vec![0; layout.image_len()],
            params: TrackEncodeParams::default_for(ADF_DENSITY),
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

    #[inline]
    pub fn layout(&self) -> AdfLayout {
        self.layout
    }

    /// Return the raw sector data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Replace the gap layout used when synthesizing tracks.
    pub fn set_encode_params(&mut self, params: TrackEncodeParams) {
        self.params = params;
    }

    fn track_offset(&self, address: TrackAddress) -> Option<usize> {
        if address.head >= self.layout.head_count() || address.position >= self.layout.track_count() {
            return None;
        }
        let track_index = address.position as usize * self.layout.head_count() as usize + address.head as usize;
        Some(track_index * ADF_TRACK_SIZE)
    }

    fn store_sectors(&mut self, address: TrackAddress, sectors: Vec<Sector>) {
        let Some(offset) = self.track_offset(address)
        else {
            log::warn!("AdfImage::set_tracks(): track {} is outside the image; dropped", address);
            return;
        };

        let mut stored = 0;
        for sector in sectors {
            let s = sector.address.s();
            if s >= ADF_SECTORS_PER_TRACK || sector.data.len() != ADF_SECTOR_SIZE {
                log::warn!(
                    "AdfImage::set_tracks(): track {}: sector {} cannot be stored in an ADF image",
                    address,
                    sector
                );
                continue;
            }
            if !sector.is_clean() {
                log::warn!(
                    "AdfImage::set_tracks(): track {}: sector {} has flags {:?}; previous contents kept",
                    address,
                    sector.address,
                    sector.flags
                );
                continue;
            }
            let start = offset + s as usize * ADF_SECTOR_SIZE;
            self.data[start..start + ADF_SECTOR_SIZE].copy_from_slice(&sector.data);
            stored += 1;
        }
        log::trace!("AdfImage::set_tracks(): track {}: stored {} sectors", address, stored);
    }
}

impl DiskImage for AdfImage {
    fn head_count(&self) -> u8 {
        self.layout.head_count()
    }

    fn track_count(&self) -> u16 {
        self.layout.track_count()
    }

    fn track_at(&mut self, address: TrackAddress) -> Result<Option<Track>, DiskImageError> {
        let Some(offset) = self.track_offset(address)
        else {
            return Ok(None);
        };

        let sectors: Vec<Sector> = self.data[offset..offset + ADF_TRACK_SIZE]
            .chunks_exact(ADF_SECTOR_SIZE)
            .enumerate()
            .map(|(s, data)| {
                Sector::new(
                    SectorAddress::new(address.position as u8, address.head, s as u8),
                    ADF_SECTOR_SIZE_CODE,
                    data.to_vec(),
                )
            })
            .collect();

        Ok(Some(encode_track_with_params(&sectors, ADF_DENSITY, &self.params)))
    }

    fn set_tracks(&mut self, tracks: BTreeMap<TrackAddress, Track>) -> Result<(), DiskImageError> {
        if !self.writable {
            return Err(DiskImageError::ReadOnly);
        }
        for (address, track) in tracks {
            let sectors = decode_sectors(&track, ADF_DENSITY);
            self.store_sectors(address, sectors);
        }
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        !self.writable
    }

    fn flush_tracks(&mut self) -> Result<(), DiskImageError> {
        if let Some(path) = &self.path {
            log::debug!("AdfImage::flush_tracks(): writing {}", path.display());
            std::fs::write(path, &self.data)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterned(layout: AdfLayout) -> Vec<u8> {
        (0..layout.image_len()).map(|i| (i / ADF_SECTOR_SIZE) as u8 ^ i as u8).collect()
    }

    #[test]
    fn test_layout_from_len() {
        assert_eq!(AdfLayout::from_len(163_840), Some(AdfLayout::S));
        assert_eq!(AdfLayout::from_len(327_680), Some(AdfLayout::M));
        assert_eq!(AdfLayout::from_len(655_360), Some(AdfLayout::L));
        assert_eq!(AdfLayout::from_len(655_361), None);
        assert!(matches!(AdfImage::from_bytes(vec![0; 1000]), Err(DiskImageError::UnknownFormat)));
    }

    #[test]
    fn test_track_holds_image_sectors() {
        let data = patterned(AdfLayout::L);
        let mut image = AdfImage::from_bytes(data.clone()).unwrap();
        let address = TrackAddress::new(1, 5);
        let track = image.track_at(address).unwrap().unwrap();
        let sectors = decode_sectors(&track, TrackDensity::Double);

        assert_eq!(sectors.len(), 16);
        // Cylinder 5 side 1 is the eleventh track in the file.
        let offset = 11 * ADF_TRACK_SIZE;
        for (s, sector) in sectors.iter().enumerate() {
            assert_eq!(sector.address, SectorAddress::new(5, 1, s as u8));
            assert!(sector.is_clean());
            assert_eq!(sector.data, &data[offset + s * 256..offset + (s + 1) * 256]);
        }
        assert!(image.track_at(TrackAddress::new(2, 0)).unwrap().is_none());
        assert!(image.track_at(TrackAddress::new(0, 80)).unwrap().is_none());
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let mut image = AdfImage::from_bytes(patterned(AdfLayout::S)).unwrap();
        assert!(image.is_read_only());
        assert!(matches!(image.set_tracks(BTreeMap::new()), Err(DiskImageError::ReadOnly)));
    }

    #[test]
    fn test_written_track_is_stored() {
        let mut image = AdfImage::blank(AdfLayout::M);
        let address = TrackAddress::new(0, 12);
        let mut sectors: Vec<Sector> = (0..16)
            .map(|s| Sector::new(SectorAddress::new(12, 0, s), 1, vec![s ^ 0xA5; 256]))
            .collect();
        // A sector with a bad data CRC is not stored.
        sectors[3].flags |= crate::types::SectorFlags::DATA_CRC_ERROR;
        let track = crate::track_schema::system34::encode_track(&sectors, TrackDensity::Double);

        image.set_tracks(BTreeMap::from([(address, track)])).unwrap();

        let offset = 12 * ADF_TRACK_SIZE;
        for s in 0..16usize {
            let stored = &image.data()[offset + s * 256..offset + (s + 1) * 256];
            let expected = if s == 3 { 0 } else { s as u8 ^ 0xA5 };
            assert!(stored.iter().all(|&b| b == expected), "sector {}", s);
        }
    }
}
