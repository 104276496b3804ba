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

    src/controller/mfm.rs

    An FM/MFM disk controller: tokens in, tokens out.
*/

//! [MfmController] wraps a [DiskController] with a [Shifter] for reading and an FM or MFM
//! [Encoder] for writing. Machine-specific controller chips (WD177x, uPD765 and the like) are
//! built on this: they run it until the next token and write bytes and marks back.
//!
//! Writing starts with [MfmController::begin_writing], which returns an [MfmWriter]. The writer's
//! helpers lay out fields the same way [encode_track](crate::track_schema::system34::encode_track)
//! does, so a track formatted through the controller decodes with
//! [decode_sectors](crate::track_schema::system34::decode_sectors).

use crate::{
    bitstream_codec::{Encoder, FmEncoder, MfmEncoder, Shifter, Token},
    controller::{ControllerEvent, DiskController, EventSource, Writer},
    track_schema::system34::{TrackEncodeParams, SYNC_BYTE},
    types::TrackDensity,
};

enum LineEncoder {
    Fm(FmEncoder),
    Mfm(MfmEncoder),
}

impl LineEncoder {
    fn for_density(density: TrackDensity) -> Self {
        match density.is_mfm() {
            true => LineEncoder::Mfm(MfmEncoder::new()),
            false => LineEncoder::Fm(FmEncoder::new()),
        }
    }

    fn encoder(&mut self) -> &mut dyn Encoder {
        match self {
            LineEncoder::Fm(encoder) => encoder,
            LineEncoder::Mfm(encoder) => encoder,
        }
    }
}

pub struct MfmController {
    controller: DiskController,
    density: TrackDensity,
    params: TrackEncodeParams,
    shifter: Shifter,
    encoder: LineEncoder,
}

impl MfmController {
    /// Create a controller at double density, clocked at `clock_rate` cycles per second.
    pub fn new(clock_rate: u64) -> Self {
        let density = TrackDensity::Double;
        MfmController {
            controller: DiskController::new(clock_rate),
            density,
            params: TrackEncodeParams::default_for(density),
            shifter: Shifter::new(density.is_mfm()),
            encoder: LineEncoder::for_density(density),
        }
    }

    #[inline]
    pub fn controller(&self) -> &DiskController {
        &self.controller
    }

    /// Return the underlying bit level controller, for drive selection, stepping and motor
    /// control.
    #[inline]
    pub fn controller_mut(&mut self) -> &mut DiskController {
        &mut self.controller
    }

    #[inline]
    pub fn density(&self) -> TrackDensity {
        self.density
    }

    /// Switch density. This changes the line code, the PLL's expected bit length and the gap
    /// layout used by the write helpers.
    pub fn set_density(&mut self, density: TrackDensity) {
        log::debug!("MfmController::set_density(): {} density", density);
        self.density = density;
        self.params = TrackEncodeParams::default_for(density);
        self.shifter.set_is_mfm(density.is_mfm());
        self.encoder = LineEncoder::for_density(density);
        self.controller.set_expected_bit_length(density.bit_length());
    }

    /// Replace the gap layout used by the write helpers.
    pub fn set_encode_params(&mut self, params: TrackEncodeParams) {
        self.params = params;
    }

    #[inline]
    pub fn latest_token(&self) -> Option<Token> {
        self.shifter.latest_token()
    }

    /// Return the value of the read CRC. After reading a field and its CRC this is zero if the
    /// field is intact.
    #[inline]
    pub fn crc(&self) -> u16 {
        self.shifter.crc().value()
    }

    /// Enable or disable recognition of marks while reading. Controllers disable it while
    /// consuming the body of a field.
    pub fn set_should_obey_syncs(&mut self, obey: bool) {
        self.shifter.set_should_obey_syncs(obey);
    }

    /// Begin writing at the current rotational position. Every write starts from a fresh encoder,
    /// so its first clock bit and its CRC do not depend on earlier writes.
    pub fn begin_writing(&mut self, clamp_to_index_hole: bool) -> MfmWriter<'_> {
        self.encoder = LineEncoder::for_density(self.density);
        MfmWriter {
            writer: self.controller.begin_writing(clamp_to_index_hole),
            encoder: &mut self.encoder,
            params: &self.params,
        }
    }
}

impl EventSource for MfmController {
    /// Run until the next index hole, token or write completion, or until `budget` controller
    /// cycles have passed. Recovered bits are consumed by the shifter and never returned.
    fn run_until_event(&mut self, budget: &mut u64) -> Option<ControllerEvent> {
        loop {
            match self.controller.run_until_event(budget)? {
                ControllerEvent::Bit(bit) => {
                    if let Some(token) = self.shifter.add_input_bit(bit) {
                        return Some(ControllerEvent::Token(token));
                    }
                }
                event => return Some(event),
            }
        }
    }
}

/// A write in progress on an [MfmController], encoding bytes and marks in the controller's line
/// code. Ending the write or dropping the writer commits it.
pub struct MfmWriter<'a> {
    writer: Writer<'a>,
    encoder: &'a mut LineEncoder,
    params: &'a TrackEncodeParams,
}

impl MfmWriter<'_> {
    #[inline]
    pub fn controller(&self) -> &DiskController {
        self.writer.controller()
    }

    /// Finish writing, laying everything written over the current track.
    pub fn end_writing(self) {
        self.writer.end_writing();
    }

    /// Pass everything the encoder has produced on to the disk controller.
    fn flush_encoder(&mut self) {
        let bits = self.encoder.encoder().take_bits();
        for bit in bits.iter() {
            self.writer.write_bit(bit);
        }
    }

    /// Write a data byte, adding it to the write CRC.
    pub fn write_byte(&mut self, byte: u8) {
        self.encoder.encoder().add_byte(byte);
        self.flush_encoder();
    }

    /// Write `count` copies of `byte`.
    pub fn write_n_bytes(&mut self, count: usize, byte: u8) {
        self.encoder.encoder().add_bytes(byte, count);
        self.flush_encoder();
    }

    /// Write 16 raw bit cells, bypassing the encoder's clock generation and CRC.
    pub fn write_raw_short(&mut self, value: u16) {
        self.encoder.encoder().output_short(value);
        self.flush_encoder();
    }

    /// Write the CRC of everything written since the last mark.
    pub fn write_crc(&mut self) {
        self.encoder.encoder().add_crc(false);
        self.flush_encoder();
    }

    /// Write the index address mark and the gap following it.
    pub fn write_start_of_track(&mut self) {
        let encoder = self.encoder.encoder();
        encoder.add_index_address_mark();
        encoder.add_bytes(self.params.post_index_gap_byte, self.params.post_index_gap);
        self.flush_encoder();
    }

    /// Write the sync run and ID address mark that begin an ID field.
    pub fn write_id_joiner(&mut self) {
        let encoder = self.encoder.encoder();
        encoder.add_bytes(SYNC_BYTE, self.params.pre_id_sync);
        encoder.add_id_address_mark();
        self.flush_encoder();
    }

    /// Write gap 2, the sync run and a data (or deleted data) address mark, joining an ID field
    /// to its data field.
    pub fn write_id_data_joiner(&mut self, is_deleted: bool) {
        let encoder = self.encoder.encoder();
        encoder.add_bytes(self.params.post_id_gap_byte, self.params.post_id_gap);
        encoder.add_bytes(SYNC_BYTE, self.params.pre_data_sync);
        match is_deleted {
            true => encoder.add_deleted_data_address_mark(),
            false => encoder.add_data_address_mark(),
        }
        self.flush_encoder();
    }

    /// Write gap 3, following a data field.
    pub fn write_post_data_gap(&mut self) {
        let encoder = self.encoder.encoder();
        encoder.add_bytes(self.params.filler, self.params.post_data_gap);
        self.flush_encoder();
    }
}

impl EventSource for MfmWriter<'_> {
    /// While writing the shifter is idle, so only index holes and write completion are reported.
    fn run_until_event(&mut self, budget: &mut u64) -> Option<ControllerEvent> {
        self.writer.run_until_event(budget)
    }
}
