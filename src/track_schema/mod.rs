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

    src/track_schema/mod.rs

    Track schemas: the layout of marks, gaps and fields on a track.
*/

//! The `track_schema` module converts between whole tracks and the sectors recorded on them.
//!
//! A track schema is responsible for the layout of syncs, gaps, and address marks on a track. It
//! relies on the [bitstream_codec](crate::bitstream_codec) module for the underlying line code and
//! on [serialize_track](crate::track::serialize_track) to bring an arbitrary track to a uniform
//! bit cell before parsing.
//!
//! Two schemas are implemented:
//! * [system34] - the IBM System 34 layout used with FM and MFM by PCs, Acorn, Amstrad, Oric and
//!   most other WD/NEC controller based machines.
//! * [commodore] - the Commodore 1541 GCR layout.
//!
//! Disk image formats that store sectors rather than flux call only these functions plus their
//! own file I/O.

pub mod commodore;
pub mod system34;
