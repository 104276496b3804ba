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

    tests/common/mod.rs

    Common support routines for tests
*/
#![allow(dead_code)]

use fluxfox_drive::prelude::*;
use std::path::PathBuf;

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Return a path in the system temporary directory unique to this test process.
pub fn temp_image_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("fluxfox_drive_{}_{}", std::process::id(), name))
}

/// Build `count` sectors of `size` code `n` on cylinder `c` head `h`, numbered from `first`, each
/// filled with a pattern derived from its address.
pub fn make_sectors(c: u8, h: u8, first: u8, count: u8, n: u8) -> Vec<Sector> {
    (first..first + count)
        .map(|s| {
            let len = SectorAddress::n_to_bytes(n);
            let data = (0..len).map(|i| (i as u8).wrapping_mul(s | 1) ^ c ^ (h << 7)).collect();
            Sector::new(SectorAddress::new(c, h, s), n, data)
        })
        .collect()
}

/// Return the events of one rotation, starting from wherever the track's cursor is.
pub fn collect_rotation(track: &mut Track) -> Vec<TrackEvent> {
    let mut events = Vec::new();
    loop {
        let event = track.next_event();
        events.push(event);
        if event.is_index_hole() {
            return events;
        }
    }
}

/// Run `controller` until it produces `wanted`, panicking if the budget runs out first.
pub fn wait_for(controller: &mut impl EventSource, budget: &mut u64, wanted: ControllerEvent) {
    while let Some(event) = controller.run_until_event(budget) {
        if event == wanted {
            return;
        }
    }
    panic!("ran out of time waiting for {}", wanted);
}

/// Read `count` bytes following the current token, then restore mark recognition.
pub fn read_bytes(controller: &mut MfmController, budget: &mut u64, count: usize) -> Vec<u8> {
    controller.set_should_obey_syncs(false);
    let mut bytes = Vec::with_capacity(count);
    while bytes.len() < count {
        match controller.run_until_event(budget) {
            Some(ControllerEvent::Token(Token::Byte(b))) => bytes.push(b),
            Some(_) => {}
            None => panic!("ran out of time reading {} bytes", count),
        }
    }
    controller.set_should_obey_syncs(true);
    bytes
}
