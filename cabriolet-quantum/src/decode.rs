//! Quantum decoding.

use crate::model::{Model, ModelSet};
use crate::tables::{length_base, length_extra, position_base, position_extra, FRAME_SIZE};
use cabriolet_core::bitstream::{BitRead, BitReaderMsb};
use cabriolet_core::error::{CabrioletError, Result};
use cabriolet_core::traits::Decompressor;
use cabriolet_core::window::SlidingWindow;
use std::io::{Read, Write};

/// Decoder configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuantumOptions {
    /// Pad past EOF indefinitely instead of failing on the second underrun.
    pub salvage: bool,
}

/// Incremental Quantum decoder.
///
/// An adaptive arithmetic coder over seven models plus a selector. Every
/// 32 KiB of output the coder is re-primed: the stream byte-aligns, a 0xFF
/// trailer byte is skipped, the models return to their initial state and
/// the next 16 bits become the fresh code register.
pub struct QuantumDecoder<R> {
    bits: BitReaderMsb<R>,
    window: SlidingWindow,
    models: ModelSet,
    window_bits: u32,

    high: u32,
    low: u32,
    code: u32,
    primed: bool,

    position_base: [u32; 42],
    position_extra: [u32; 42],
    length_base: [u32; 27],
    length_extra: [u32; 27],

    frame_accum: Vec<u8>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    emitted_frames_bytes: u64,
    output_limit: Option<u64>,
    finished: bool,
}

impl<R: Read> QuantumDecoder<R> {
    /// Create a decoder for a `2^window_bits` window.
    pub fn new(reader: R, window_bits: u32, options: QuantumOptions) -> Result<Self> {
        if !(10..=21).contains(&window_bits) {
            return Err(CabrioletError::argument(format!(
                "Quantum window bits {window_bits} out of range 10..=21"
            )));
        }
        let mut bits = BitReaderMsb::new(reader);
        bits.set_salvage(options.salvage);
        Ok(Self {
            bits,
            window: SlidingWindow::new(1 << window_bits),
            models: ModelSet::new(window_bits),
            window_bits,
            high: 0xFFFF,
            low: 0,
            code: 0,
            primed: false,
            position_base: position_base(),
            position_extra: position_extra(),
            length_base: length_base(),
            length_extra: length_extra(),
            frame_accum: Vec::new(),
            buffer: Vec::new(),
            buffer_pos: 0,
            emitted_frames_bytes: 0,
            output_limit: None,
            finished: false,
        })
    }

    fn buffered(&self) -> usize {
        self.buffer.len() - self.buffer_pos
    }

    fn prime(&mut self) -> Result<()> {
        self.high = 0xFFFF;
        self.low = 0;
        self.code = self.bits.read(16)?;
        self.primed = true;
        Ok(())
    }

    fn get_symbol(bits: &mut BitReaderMsb<R>, state: &mut CoderState, model: &mut Model) -> Result<u16> {
        let range = (state.high.wrapping_sub(state.low) & 0xFFFF) + 1;
        let total = u32::from(model.syms[0].cumfreq);
        if total == 0 {
            return Err(CabrioletError::decompress("Quantum model is empty"));
        }
        let scaled = state
            .code
            .wrapping_sub(state.low)
            .wrapping_add(1)
            .wrapping_mul(total)
            .wrapping_sub(1);
        let symf = (scaled / range) & 0xFFFF;

        let mut i = 1;
        while i < model.entries() {
            if u32::from(model.syms[i].cumfreq) <= symf {
                break;
            }
            i += 1;
        }
        let sym = model.syms[i - 1].sym;

        let range = state.high.wrapping_sub(state.low).wrapping_add(1);
        state.high = state
            .low
            .wrapping_add((u32::from(model.syms[i - 1].cumfreq) * range) / total)
            .wrapping_sub(1);
        state.low = state
            .low
            .wrapping_add((u32::from(model.syms[i].cumfreq) * range) / total);

        model.update(i);

        loop {
            if (state.low & 0x8000) != (state.high & 0x8000) {
                if (state.low & 0x4000) != 0 && (state.high & 0x4000) == 0 {
                    // Underflow: pinch out the middle half.
                    state.code ^= 0x4000;
                    state.low &= 0x3FFF;
                    state.high |= 0x4000;
                } else {
                    break;
                }
            }
            state.low = (state.low << 1) & 0xFFFF;
            state.high = ((state.high << 1) | 1) & 0xFFFF;
            state.code = ((state.code << 1) | bits.read(1)?) & 0xFFFF;
        }
        Ok(sym)
    }

    fn decode_element(&mut self) -> Result<u32> {
        let mut state = CoderState {
            high: self.high,
            low: self.low,
            code: self.code,
        };
        let selector = Self::get_symbol(&mut self.bits, &mut state, &mut self.models.selector)?;

        let out = match selector {
            0..=3 => {
                let model = &mut self.models.literal[usize::from(selector)];
                let literal = Self::get_symbol(&mut self.bits, &mut state, model)? as u8;
                self.window.push(literal);
                self.frame_accum.push(literal);
                1
            }
            4 | 5 | 6 => {
                let (offset, length) = match selector {
                    4 => {
                        let slot =
                            Self::get_symbol(&mut self.bits, &mut state, &mut self.models.match3)?;
                        let slot = usize::from(slot);
                        let extra = self.read_extra(self.position_extra[slot])?;
                        (self.position_base[slot] + extra + 1, 3usize)
                    }
                    5 => {
                        let slot =
                            Self::get_symbol(&mut self.bits, &mut state, &mut self.models.match4)?;
                        let slot = usize::from(slot);
                        let extra = self.read_extra(self.position_extra[slot])?;
                        (self.position_base[slot] + extra + 1, 4usize)
                    }
                    _ => {
                        let len_slot = Self::get_symbol(
                            &mut self.bits,
                            &mut state,
                            &mut self.models.match5_len,
                        )?;
                        let len_slot = usize::from(len_slot);
                        let extra = self.read_extra(self.length_extra[len_slot])?;
                        let length = self.length_base[len_slot] as usize + extra as usize + 5;
                        let slot =
                            Self::get_symbol(&mut self.bits, &mut state, &mut self.models.match5)?;
                        let slot = usize::from(slot);
                        let extra = self.read_extra(self.position_extra[slot])?;
                        (self.position_base[slot] + extra + 1, length)
                    }
                };
                self.window
                    .copy_match(offset as usize, length, &mut self.frame_accum)?;
                length as u32
            }
            _ => {
                return Err(CabrioletError::decompress(format!(
                    "invalid Quantum selector {selector}"
                )));
            }
        };

        self.high = state.high;
        self.low = state.low;
        self.code = state.code;
        Ok(out)
    }

    fn read_extra(&mut self, count: u32) -> Result<u32> {
        if count == 0 {
            Ok(0)
        } else {
            self.bits.read(count)
        }
    }

    fn decode_frame(&mut self) -> Result<bool> {
        let frame_size = match self.output_limit {
            Some(limit) => {
                let remaining = limit.saturating_sub(self.emitted_frames_bytes);
                if remaining == 0 {
                    return Ok(false);
                }
                remaining.min(FRAME_SIZE as u64) as usize
            }
            None => FRAME_SIZE,
        };

        if !self.primed {
            self.prime()?;
        }

        while self.frame_accum.len() < frame_size {
            self.decode_element()?;
        }

        let frame: Vec<u8> = self.frame_accum.drain(..frame_size).collect();
        self.buffer.extend_from_slice(&frame);
        self.emitted_frames_bytes += frame_size as u64;

        // Re-prime between frames (not after the final one).
        let more = self
            .output_limit
            .map(|limit| self.emitted_frames_bytes < limit)
            .unwrap_or(true);
        if more {
            self.bits.align();
            let trailer = self.bits.read(8)?;
            if trailer != 0xFF {
                return Err(CabrioletError::decompress(format!(
                    "bad Quantum frame trailer {trailer:#04x}"
                )));
            }
            self.models.reset();
            self.prime()?;
        }
        Ok(true)
    }
}

/// The arithmetic coder registers, split out so model borrows stay tidy.
struct CoderState {
    high: u32,
    low: u32,
    code: u32,
}

impl<R: Read> Decompressor for QuantumDecoder<R> {
    fn decompress(&mut self, out: &mut dyn Write, len: u64) -> Result<u64> {
        let mut delivered = 0u64;
        while delivered < len {
            if self.buffered() == 0 {
                if self.buffer_pos > 0 {
                    self.buffer.clear();
                    self.buffer_pos = 0;
                }
                if self.finished {
                    break;
                }
                if !self.decode_frame()? {
                    self.finished = true;
                }
                if self.buffered() == 0 {
                    break;
                }
            }
            let take = usize::try_from(len - delivered)
                .unwrap_or(usize::MAX)
                .min(self.buffered());
            out.write_all(&self.buffer[self.buffer_pos..self.buffer_pos + take])?;
            self.buffer_pos += take;
            delivered += take as u64;
        }
        Ok(delivered)
    }

    fn set_output_length(&mut self, total: u64) {
        self.output_limit = Some(total);
    }

    fn reset(&mut self) -> Result<()> {
        self.models = ModelSet::new(self.window_bits);
        self.bits.reset();
        self.primed = false;
        self.frame_accum.clear();
        self.buffer.clear();
        self.buffer_pos = 0;
        self.finished = false;
        Ok(())
    }
}
