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

    src/diskimage.rs

    The DiskImage trait and the Disk track arena.
*/

//! A [DiskImage] is a concrete image format: it knows how to produce a [Track] for a physical
//! location, and how to accept written tracks back. Everything else about an image, including
//! sector encoding, is delegated to the [track_schema](crate::track_schema) codecs.
//!
//! A [Disk] is what a drive actually holds. It wraps a [DiskImage] behind a lock and keeps an arena
//! of tracks keyed by [TrackAddress]. Drives take independent copies of tracks from the arena and
//! hand written tracks back, which marks them dirty. Dirty tracks are passed to the image on a
//! single background worker when [Disk::flush] is called and when the disk is dropped.

use crate::{
    flush_queue::FlushQueue,
    track::{Track, UnformattedTrack},
    types::TrackAddress,
    DiskImageError,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, MutexGuard},
};

/// The interface every disk image format implements.
pub trait DiskImage {
    /// Return the number of heads (sides) the image holds.
    fn head_count(&self) -> u8;

    /// Return the number of track positions per head the image holds.
    fn track_count(&self) -> u16;

    /// Return the track at `address`, or `None` if the image holds nothing there.
    fn track_at(&mut self, address: TrackAddress) -> Result<Option<Track>, DiskImageError>;

    /// Accept written tracks back into the image. Images that cannot represent a given track
    /// should store what they can and log what they drop.
    fn set_tracks(&mut self, tracks: BTreeMap<TrackAddress, Track>) -> Result<(), DiskImageError>;

    /// Returns `true` if written tracks are never persisted.
    fn is_read_only(&self) -> bool {
        true
    }

    /// Commit any tracks received through [DiskImage::set_tracks] to the image's backing store.
    fn flush_tracks(&mut self) -> Result<(), DiskImageError> {
        Ok(())
    }
}

type SharedImage = Arc<Mutex<Box<dyn DiskImage + Send>>>;

fn lock_image(image: &SharedImage) -> Result<MutexGuard<'_, Box<dyn DiskImage + Send>>, DiskImageError> {
    image.lock().map_err(|_| DiskImageError::SyncError)
}

pub struct Disk {
    image: SharedImage,
    head_count: u8,
    track_count: u16,
    read_only: bool,
    tracks: BTreeMap<TrackAddress, Track>,
    dirty: BTreeSet<TrackAddress>,
    queue: Arc<FlushQueue>,
}

impl Disk {
    /// Wrap `image` in a new arena using the shared flush queue.
    pub fn new(image: impl DiskImage + Send + 'static) -> Self {
        Self::with_queue(Box::new(image), FlushQueue::shared())
    }

    /// Wrap an already boxed image, as returned by the image format loaders.
    pub fn from_boxed(image: Box<dyn DiskImage + Send>) -> Self {
        Self::with_queue(image, FlushQueue::shared())
    }

    pub(crate) fn with_queue(image: Box<dyn DiskImage + Send>, queue: Arc<FlushQueue>) -> Self {
        let head_count = image.head_count();
        let track_count = image.track_count();
        let read_only = image.is_read_only();
        log::debug!(
            "Disk::new(): {} heads, {} tracks{}",
            head_count,
            track_count,
            if read_only { ", read-only" } else { "" }
        );
        Self {
            image: Arc::new(Mutex::new(image)),
            head_count,
            track_count,
            read_only,
            tracks: BTreeMap::new(),
            dirty: BTreeSet::new(),
            queue,
        }
    }

    #[inline]
    pub fn head_count(&self) -> u8 {
        self.head_count
    }

    #[inline]
    pub fn track_count(&self) -> u16 {
        self.track_count
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Returns `true` if any track has been written back since the last flush.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Return an independent copy of the track at `address`, with its cursor at the index hole.
    ///
    /// Locations outside the image, locations the image holds nothing for, and tracks the image
    /// fails to produce all read as unformatted.
    pub fn track_at(&mut self, address: TrackAddress) -> Track {
        if let Some(track) = self.tracks.get(&address) {
            return track.rewound();
        }

        let track = if address.head >= self.head_count || address.position >= self.track_count {
            None
        }
        else {
            match lock_image(&self.image).and_then(|mut image| image.track_at(address)) {
                Ok(track) => track,
                Err(e) => {
                    log::error!("Disk::track_at(): failed to load track {}: {}", address, e);
                    None
                }
            }
        };

        let track = track.unwrap_or_else(|| Track::from(UnformattedTrack::new()));
        self.tracks.insert(address, track.rewound());
        track.rewound()
    }

    /// Store a written track. The track replaces the arena's copy and is marked dirty.
    pub fn store_track(&mut self, address: TrackAddress, track: Track) {
        log::trace!("Disk::store_track(): storing track {}", address);
        self.tracks.insert(address, track.rewound());
        self.dirty.insert(address);
    }

    /// Hand every dirty track to the image on the background flush worker.
    ///
    /// Read-only images keep written tracks in the arena for the life of the [Disk], so software
    /// sees its own writes, but nothing is passed to the image.
    pub fn flush(&mut self) {
        if self.dirty.is_empty() {
            return;
        }
        if self.read_only {
            log::debug!("Disk::flush(): image is read-only, {} tracks not flushed", self.dirty.len());
            self.dirty.clear();
            return;
        }

        let tracks: BTreeMap<TrackAddress, Track> = std::mem::take(&mut self.dirty)
            .into_iter()
            .filter_map(|address| self.tracks.get(&address).map(|track| (address, track.rewound())))
            .collect();

        log::debug!("Disk::flush(): enqueuing {} tracks", tracks.len());
        let image = self.image.clone();
        self.queue.enqueue(Box::new(move || {
            let result = lock_image(&image).and_then(|mut image| {
                image.set_tracks(tracks)?;
                image.flush_tracks()
            });
            if let Err(e) = result {
                log::error!("Disk::flush(): failed to write tracks back: {}", e);
            }
        }));
    }

    /// Flush, then block until the flush worker has finished with this disk's tracks.
    pub fn sync(&mut self) {
        self.flush();
        self.queue.drain();
    }

    /// Run `f` with exclusive access to the underlying image.
    pub fn with_image<R>(&self, f: impl FnOnce(&mut dyn DiskImage) -> R) -> Result<R, DiskImageError> {
        let mut image = lock_image(&self.image)?;
        Ok(f(image.as_mut()))
    }
}

impl Drop for Disk {
    fn drop(&mut self) {
        self.sync();
    }
}
