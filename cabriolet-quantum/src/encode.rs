//! Quantum encoding (literal path).
//!
//! The encoder drives the same adaptive models as the decoder and mirrors
//! its interval arithmetic, emitting one bit per renormalisation shift with
//! classic underflow queueing. Only the literal selectors are produced;
//! match emission would require staging raw extra bits sixteen positions
//! ahead of the arithmetic stream, and the format round-trips without it.
//!
//! The decoder's code register always runs sixteen bits ahead of the
//! arithmetic decision point, so each frame ends with two disambiguation
//! bits plus fourteen padding bits before the byte-aligned 0xFF trailer —
//! that keeps both sides' bit positions equal at every frame boundary.

use crate::model::{Model, ModelSet};
use crate::tables::FRAME_SIZE;
use cabriolet_core::bitstream::BitWriterMsb;
use cabriolet_core::error::{CabrioletError, Result};
use cabriolet_core::traits::BlockCompressor;

/// Quantum block compressor.
pub struct QuantumCompressor {
    writer: BitWriterMsb<Vec<u8>>,
    models: ModelSet,
    window_bits: u32,
    high: u32,
    low: u32,
    underflow: u32,
    /// Total bits emitted since stream start (frame alignment runs on the
    /// decoder's consumption count, which this mirrors).
    bit_total: u64,
    finished: bool,
}

impl QuantumCompressor {
    /// Create a compressor for a `2^window_bits` window.
    pub fn new(window_bits: u32) -> Result<Self> {
        if !(10..=21).contains(&window_bits) {
            return Err(CabrioletError::argument(format!(
                "Quantum window bits {window_bits} out of range 10..=21"
            )));
        }
        Ok(Self {
            writer: BitWriterMsb::new(Vec::new()),
            models: ModelSet::new(window_bits),
            window_bits,
            high: 0xFFFF,
            low: 0,
            underflow: 0,
            bit_total: 0,
            finished: false,
        })
    }

    fn put_bits(&mut self, count: u32, value: u32) -> Result<()> {
        self.writer.write(count, value)?;
        self.bit_total += u64::from(count);
        Ok(())
    }

    fn emit_bit_with_underflow(&mut self, bit: u32) -> Result<()> {
        self.put_bits(1, bit)?;
        while self.underflow > 0 {
            self.put_bits(1, bit ^ 1)?;
            self.underflow -= 1;
        }
        Ok(())
    }

    fn encode_symbol(&mut self, which: Which, sym: u16) -> Result<()> {
        let (k, total, high_cum, low_cum) = {
            let model = self.model_mut(which);
            let k = model
                .index_of(sym)
                .ok_or_else(|| CabrioletError::compress(format!("symbol {sym} not in model")))?;
            (
                k,
                u32::from(model.syms[0].cumfreq),
                u32::from(model.syms[k].cumfreq),
                u32::from(model.syms[k + 1].cumfreq),
            )
        };
        let range = (self.high - self.low) + 1;
        self.high = self.low + (high_cum * range) / total - 1;
        self.low += (low_cum * range) / total;
        self.model_mut(which).update(k + 1);

        loop {
            if (self.low & 0x8000) == (self.high & 0x8000) {
                let bit = (self.low >> 15) & 1;
                self.emit_bit_with_underflow(bit)?;
            } else if (self.low & 0x4000) != 0 && (self.high & 0x4000) == 0 {
                self.underflow += 1;
                self.low &= 0x3FFF;
                self.high |= 0x4000;
            } else {
                break;
            }
            self.low = (self.low << 1) & 0xFFFF;
            self.high = ((self.high << 1) | 1) & 0xFFFF;
        }
        Ok(())
    }

    fn model_mut(&mut self, which: Which) -> &mut Model {
        match which {
            Which::Selector => &mut self.models.selector,
            Which::Literal(bucket) => &mut self.models.literal[bucket],
        }
    }

    /// Close the current frame: disambiguation bits, decoder-parity
    /// padding, byte alignment, trailer, model reset.
    fn close_frame(&mut self) -> Result<()> {
        let first = (self.low >> 14) & 1;
        self.emit_bit_with_underflow(first)?;
        self.put_bits(1, first ^ 1)?;
        // The decoder's code register consumed 16 bits this frame that no
        // symbol decision ever produced; even the score.
        self.put_bits(14, 0)?;

        let phase = (self.bit_total % 8) as u32;
        if phase != 0 {
            self.put_bits(8 - phase, 0)?;
        }
        self.put_bits(8, 0xFF)?;

        self.models.reset();
        self.high = 0xFFFF;
        self.low = 0;
        self.underflow = 0;
        Ok(())
    }

    /// Take the bytes completed so far, leaving any half-word pending.
    fn drain_bytes(&mut self) -> Vec<u8> {
        std::mem::take(self.writer.get_mut())
    }
}

#[derive(Clone, Copy)]
enum Which {
    Selector,
    Literal(usize),
}

impl BlockCompressor for QuantumCompressor {
    fn compress_block(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        if chunk.len() > FRAME_SIZE {
            return Err(CabrioletError::compress(format!(
                "Quantum frame input of {} bytes exceeds 32768",
                chunk.len()
            )));
        }
        if self.finished {
            return Err(CabrioletError::compress("compressor already finished"));
        }
        for &byte in chunk {
            let bucket = usize::from(byte >> 6);
            self.encode_symbol(Which::Selector, bucket as u16)?;
            self.encode_symbol(Which::Literal(bucket), u16::from(byte))?;
        }
        self.close_frame()?;
        Ok(self.drain_bytes())
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        self.finished = true;
        self.writer.flush()?;
        Ok(self.drain_bytes())
    }
}

impl std::fmt::Debug for QuantumCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuantumCompressor")
            .field("window_bits", &self.window_bits)
            .field("bit_total", &self.bit_total)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bits_validation() {
        assert!(QuantumCompressor::new(9).is_err());
        assert!(QuantumCompressor::new(22).is_err());
        assert!(QuantumCompressor::new(10).is_ok());
    }

    #[test]
    fn test_frames_end_byte_aligned() {
        let mut enc = QuantumCompressor::new(15).unwrap();
        enc.compress_block(b"hello quantum").unwrap();
        assert_eq!(enc.bit_total % 8, 0);
        enc.compress_block(b"another frame").unwrap();
        assert_eq!(enc.bit_total % 8, 0);
    }
}
