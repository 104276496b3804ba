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

    src/flux/pll.rs

    A digital phase-locked loop for flux clock recovery.
*/

//! [DigitalPll] divides time into bit windows and reports, for each window, whether a flux
//! transition landed in it.
//!
//! The window length is not fixed. The loop keeps a short history of the spacing between recent
//! pulses, each rounded to a whole number of nominal bit cells, and sets the window to the average
//! spacing per cell across the history. That tracks slow variation in rotation speed. The phase of
//! the window is pulled half way toward centering on each pulse, which is a critically damped
//! one-pole filter.
//!
//! All quantities are integer clock cycles. The caller chooses the clock; the controller runs the
//! loop at a multiple of its input clock, and the track serializer runs it at 100 cycles per bit.

/// The default number of pulse spacings averaged to find the window length.
pub const DEFAULT_HISTORY_LEN: usize = 3;

#[derive(Copy, Clone, Debug, Default)]
struct OffsetEntry {
    spacing: i64,
    divisor: i64,
}

#[derive(Clone, Debug)]
pub struct DigitalPll {
    clocks_per_bit: i64,
    history: Vec<OffsetEntry>,
    history_pointer: usize,
    total_spacing: i64,
    total_divisor: i64,

    window_length: i64,
    /// Position within the current window. May briefly be negative after a phase correction.
    phase: i64,
    /// Cycles since the last accepted pulse.
    offset: i64,
    window_was_filled: bool,
}

impl Default for DigitalPll {
    fn default() -> Self {
        DigitalPll::new(100, DEFAULT_HISTORY_LEN)
    }
}

impl DigitalPll {
    /// Create a new loop whose nominal window is `clocks_per_bit` cycles, averaging the last
    /// `history_len` pulse spacings.
    pub fn new(clocks_per_bit: u64, history_len: usize) -> Self {
        let clocks_per_bit = (clocks_per_bit as i64).max(1);
        let history_len = history_len.max(1);
        let history = vec![
            OffsetEntry {
                spacing: clocks_per_bit,
                divisor: 1,
            };
            history_len
        ];

        DigitalPll {
            clocks_per_bit,
            history,
            history_pointer: 0,
            total_spacing: clocks_per_bit * history_len as i64,
            total_divisor: history_len as i64,
            window_length: clocks_per_bit,
            phase: 0,
            offset: 0,
            window_was_filled: false,
        }
    }

    #[inline]
    pub fn clocks_per_bit(&self) -> u64 {
        self.clocks_per_bit as u64
    }

    /// Return the current bit window length in cycles.
    #[inline]
    pub fn window_length(&self) -> u64 {
        self.window_length as u64
    }

    /// Returns `true` if a pulse has already been registered in the current window.
    #[inline]
    pub fn is_window_filled(&self) -> bool {
        self.window_was_filled
    }

    /// Return the number of cycles until the current window closes. Running for no more than this
    /// many cycles emits at most one bit.
    #[inline]
    pub fn cycles_until_window_end(&self) -> u64 {
        (self.window_length - self.phase).max(1) as u64
    }

    /// Advance time by `cycles` with no pulse. Returns the number of 0 bits emitted, one per window
    /// that closed without a pulse.
    pub fn run_for(&mut self, cycles: u64) -> u64 {
        let cycles = cycles as i64;
        self.offset += cycles;
        self.phase += cycles;

        if self.phase < self.window_length {
            return 0;
        }

        let mut windows_crossed = self.phase / self.window_length;
        if self.window_was_filled {
            // The first window closed has already produced its 1.
            windows_crossed -= 1;
        }
        self.window_was_filled = false;
        self.phase %= self.window_length;
        windows_crossed as u64
    }

    /// Register a pulse at the current time. Returns `true` if this emitted a 1 bit, or `false` if
    /// the current window already held a pulse.
    pub fn add_pulse(&mut self) -> bool {
        if self.window_was_filled {
            return false;
        }
        self.window_was_filled = true;
        self.post_phase_offset(self.phase, self.offset);
        self.offset = 0;
        true
    }

    fn post_phase_offset(&mut self, new_phase: i64, new_offset: i64) {
        // Remove the outgoing entry's contribution.
        let slot = &mut self.history[self.history_pointer];
        self.total_spacing -= slot.spacing;
        self.total_divisor -= slot.divisor;

        // Bucket the new spacing by the nearest whole number of bit cells.
        let multiple = ((new_offset + (self.clocks_per_bit >> 1)) / self.clocks_per_bit).max(1);
        slot.spacing = new_offset;
        slot.divisor = multiple;
        self.total_spacing += new_offset;
        self.total_divisor += multiple;

        self.history_pointer = (self.history_pointer + 1) % self.history.len();

        self.window_length = (self.total_spacing / self.total_divisor).max(1);

        // Nudge the window toward being centered on the pulse.
        let error = new_phase - (self.window_length >> 1);
        self.phase -= (error + 1) >> 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed a pulse every `period` cycles, returning the emitted bits.
    fn pulse_train(pll: &mut DigitalPll, period: u64, pulses: usize) -> Vec<bool> {
        let mut bits = Vec::new();
        for _ in 0..pulses {
            let zeros = pll.run_for(period);
            bits.extend(std::iter::repeat(false).take(zeros as usize));
            if pll.add_pulse() {
                bits.push(true);
            }
        }
        bits
    }

    #[test]
    fn test_lock_to_slow_clock() {
        let mut pll = DigitalPll::new(100, DEFAULT_HISTORY_LEN);
        pulse_train(&mut pll, 110, DEFAULT_HISTORY_LEN);
        assert_eq!(pll.window_length(), 110);

        // Once locked, the window holds and every pulse lands in its own window.
        let bits = pulse_train(&mut pll, 110, 1000);
        assert_eq!(pll.window_length(), 110);
        assert!(bits.iter().all(|b| *b));
        assert_eq!(bits.len(), 1000);
    }

    #[test]
    fn test_lock_holds_across_gaps() {
        let mut pll = DigitalPll::new(100, 16);
        // MFM-like spacing of two and three cells at a slightly fast clock.
        for i in 0..2000 {
            let period = if i % 3 == 0 { 285 } else { 190 };
            pll.run_for(period);
            pll.add_pulse();
            if i > 32 {
                let window = pll.window_length() as i64;
                assert!((window - 95).abs() <= 1, "window drifted to {}", window);
            }
        }
    }

    #[test]
    fn test_zero_bits_between_pulses() {
        let mut pll = DigitalPll::new(100, DEFAULT_HISTORY_LEN);
        pulse_train(&mut pll, 100, 8);
        // Three empty windows then a pulse: 0001.
        let bits = pulse_train(&mut pll, 400, 1);
        assert_eq!(bits, vec![false, false, false, true]);
    }

    #[test]
    fn test_cycles_until_window_end_emits_one_bit() {
        let mut pll = DigitalPll::new(100, DEFAULT_HISTORY_LEN);
        pulse_train(&mut pll, 100, 8);
        for _ in 0..50 {
            let step = pll.cycles_until_window_end();
            assert!(pll.run_for(step) <= 1);
        }
    }
}
