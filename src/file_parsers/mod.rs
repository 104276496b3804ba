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

    src/file_parsers/mod.rs

    Disk image file formats.
*/

//! Each supported format is a [DiskImage] implementation behind its own Cargo feature. Formats
//! are detected by content and size, never by file extension; extensions are only advertised for
//! use in file dialogs.
//!
//! Sector formats synthesize tracks on demand with the [track_schema](crate::track_schema) codecs
//! and decode written tracks back into sectors. Bitstream formats hand out their stored bit cells
//! directly.

use crate::{
    diskimage::{Disk, DiskImage},
    io::ReadSeek,
    DiskImageError,
};
use bitflags::bitflags;
use std::{fmt::Display, path::Path};

#[cfg(feature = "adf")]
pub mod adf;
#[cfg(feature = "d64")]
pub mod d64;
#[cfg(feature = "hfe")]
pub mod hfe;

bitflags! {
    /// Bit flags representing what a specific image format can represent.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    #[rustfmt::skip]
    pub struct FormatCaps: u32 {
        const CAP_ADDRESS_CRC       = 0b0000_0000_0001; // Encodes sector address mark CRC status
        const CAP_DATA_CRC          = 0b0000_0000_0010; // Encodes sector data CRC status
        const CAP_DATA_DELETED      = 0b0000_0000_0100; // Encodes 'Deleted address' marks
        const CAP_SID_OVERRIDE      = 0b0000_0000_1000; // Can record sector IDs independent of physical location
        const CAP_ENCODING_FM       = 0b0000_0001_0000; // Can store FM encoding
        const CAP_ENCODING_MFM      = 0b0000_0010_0000; // Can store MFM encoding
        const CAP_ENCODING_GCR      = 0b0000_0100_0000; // Can store GCR encoding
        const CAP_WRITE_BACK        = 0b0000_1000_0000; // Written tracks can be saved back to the image
    }
}

/// Return a set of FormatCaps flags implicitly supported by the nature of any bitstream format.
pub fn bitstream_flags() -> FormatCaps {
    FormatCaps::CAP_ADDRESS_CRC | FormatCaps::CAP_DATA_CRC | FormatCaps::CAP_DATA_DELETED | FormatCaps::CAP_SID_OVERRIDE
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    #[cfg(feature = "adf")]
    AcornAdf,
    #[cfg(feature = "d64")]
    CommodoreD64,
    #[cfg(feature = "hfe")]
    HfeImage,
}

impl Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            #[cfg(feature = "adf")]
            ImageFormat::AcornAdf => write!(f, "Acorn ADFS"),
            #[cfg(feature = "d64")]
            ImageFormat::CommodoreD64 => write!(f, "Commodore D64"),
            #[cfg(feature = "hfe")]
            ImageFormat::HfeImage => write!(f, "HxC HFE"),
        }
    }
}

/// Return every format compiled into this build, in detection order. Formats with a signature
/// are tried before formats detected by size alone.
pub fn image_formats() -> Vec<ImageFormat> {
    #[allow(unused_mut)]
    let mut formats = Vec::new();
    #[cfg(feature = "hfe")]
    formats.push(ImageFormat::HfeImage);
    #[cfg(feature = "d64")]
    formats.push(ImageFormat::CommodoreD64);
    #[cfg(feature = "adf")]
    formats.push(ImageFormat::AcornAdf);
    formats
}

impl ImageFormat {
    pub fn capabilities(&self) -> FormatCaps {
        match *self {
            #[cfg(feature = "adf")]
            ImageFormat::AcornAdf => adf::AdfImage::capabilities(),
            #[cfg(feature = "d64")]
            ImageFormat::CommodoreD64 => d64::D64Image::capabilities(),
            #[cfg(feature = "hfe")]
            ImageFormat::HfeImage => hfe::HfeImage::capabilities(),
        }
    }

    pub fn extensions(&self) -> Vec<&'static str> {
        match *self {
            #[cfg(feature = "adf")]
            ImageFormat::AcornAdf => adf::AdfImage::extensions(),
            #[cfg(feature = "d64")]
            ImageFormat::CommodoreD64 => d64::D64Image::extensions(),
            #[cfg(feature = "hfe")]
            ImageFormat::HfeImage => hfe::HfeImage::extensions(),
        }
    }

    /// Returns `true` if `image` looks like an image of this format.
    pub fn detect<T: ReadSeek>(&self, image: &mut T) -> bool {
        match *self {
            #[cfg(feature = "adf")]
            ImageFormat::AcornAdf => adf::AdfImage::detect(image),
            #[cfg(feature = "d64")]
            ImageFormat::CommodoreD64 => d64::D64Image::detect(image),
            #[cfg(feature = "hfe")]
            ImageFormat::HfeImage => hfe::HfeImage::detect(image),
        }
    }

    /// Load `image` as this format. The resulting image is read-only; written tracks are kept in
    /// memory by the [Disk] holding it.
    pub fn load<T: ReadSeek>(&self, image: &mut T) -> Result<Box<dyn DiskImage + Send>, DiskImageError> {
        match *self {
            #[cfg(feature = "adf")]
            ImageFormat::AcornAdf => Ok(Box::new(adf::AdfImage::load(image)?)),
            #[cfg(feature = "d64")]
            ImageFormat::CommodoreD64 => Ok(Box::new(d64::D64Image::load(image)?)),
            #[cfg(feature = "hfe")]
            ImageFormat::HfeImage => Ok(Box::new(hfe::HfeImage::load(image)?)),
        }
    }

    /// Open the image file at `path` as this format. If `writable` is set, flushed tracks are
    /// written back to the file.
    pub fn open(&self, path: &Path, writable: bool) -> Result<Box<dyn DiskImage + Send>, DiskImageError> {
        match *self {
            #[cfg(feature = "adf")]
            ImageFormat::AcornAdf => Ok(Box::new(adf::AdfImage::open(path, writable)?)),
            #[cfg(feature = "d64")]
            ImageFormat::CommodoreD64 => Ok(Box::new(d64::D64Image::open(path, writable)?)),
            #[cfg(feature = "hfe")]
            ImageFormat::HfeImage => Ok(Box::new(hfe::HfeImage::open(path, writable)?)),
        }
    }
}

/// Returns a list of advertised file extensions supported by available image format parsers.
pub fn supported_extensions() -> Vec<&'static str> {
    image_formats().iter().flat_map(|f| f.extensions()).collect()
}

/// Returns the format associated with the file extension `ext`, if any.
pub fn format_from_ext(ext: &str) -> Option<ImageFormat> {
    let ext = ext.to_lowercase();
    image_formats()
        .into_iter()
        .find(|format| format.extensions().contains(&ext.as_str()))
}

/// Returns a list of image formats that support all of the specified capabilities.
pub fn formats_from_caps(caps: FormatCaps) -> Vec<ImageFormat> {
    image_formats()
        .into_iter()
        .filter(|f| f.capabilities().contains(caps))
        .collect()
}

/// Attempt to detect the format of a disk image. If the format cannot be determined,
/// UnknownFormat is returned.
pub fn detect_image_format<T: ReadSeek>(image: &mut T) -> Result<ImageFormat, DiskImageError> {
    for format in image_formats() {
        if format.detect(image) {
            log::debug!("detect_image_format(): detected {}", format);
            return Ok(format);
        }
    }
    Err(DiskImageError::UnknownFormat)
}

/// Detect and load a disk image from `image`, returning a [Disk] ready to insert into a drive.
pub fn load_disk<T: ReadSeek>(image: &mut T) -> Result<Disk, DiskImageError> {
    let format = detect_image_format(image)?;
    Ok(Disk::from_boxed(format.load(image)?))
}

/// Detect and open the disk image file at `path`, returning a [Disk] ready to insert into a drive.
pub fn open_disk(path: impl AsRef<Path>, writable: bool) -> Result<Disk, DiskImageError> {
    let path = path.as_ref();
    let format = {
        let mut file = std::fs::File::open(path)?;
        detect_image_format(&mut file)?
    };
    log::debug!("open_disk(): opening {} as {}", path.display(), format);
    Ok(Disk::from_boxed(format.open(path, writable)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_ext() {
        #[cfg(feature = "adf")]
        assert_eq!(format_from_ext("ADL"), Some(ImageFormat::AcornAdf));
        #[cfg(feature = "d64")]
        assert_eq!(format_from_ext("d64"), Some(ImageFormat::CommodoreD64));
        #[cfg(feature = "hfe")]
        assert_eq!(format_from_ext("hfe"), Some(ImageFormat::HfeImage));
        assert_eq!(format_from_ext("xyz"), None);
    }

    #[test]
    fn test_unknown_image() {
        let mut garbage = std::io::Cursor::new(vec![0x5Au8; 1000]);
        assert!(matches!(detect_image_format(&mut garbage), Err(DiskImageError::UnknownFormat)));
    }

    #[cfg(feature = "d64")]
    #[test]
    fn test_gcr_caps() {
        assert_eq!(formats_from_caps(FormatCaps::CAP_ENCODING_GCR), vec![ImageFormat::CommodoreD64]);
    }
}
