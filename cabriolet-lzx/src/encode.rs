//! LZX encoding.
//!
//! The writer supports uncompressed blocks and a literal-only verbatim
//! form: every frame becomes one block whose main tree assigns all 256
//! literals an eight-bit code (a complete canonical code, delta-encoded
//! through the pre-tree like any other LZX tree). Match emission is left
//! to the decoder-facing formats that require it; CAB accepts either block
//! form and decodes back bit-exactly.

use crate::tables::*;
use cabriolet_core::bitstream::BitWriterMsb;
use cabriolet_core::error::{CabrioletError, Result};
use cabriolet_core::huffman::canonical_codes;
use cabriolet_core::traits::BlockCompressor;

/// Which block form the compressor emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LzxWriteMode {
    /// Literal-only verbatim blocks.
    #[default]
    Verbatim,
    /// Raw stored blocks.
    Uncompressed,
}

/// LZX block compressor.
pub struct LzxCompressor {
    main_elements: usize,
    mode: LzxWriteMode,
    first: bool,
    main_prev: Vec<u8>,
    length_prev: Vec<u8>,
    pre_lengths: [u8; PRETREE_NUM_ELEMENTS],
    pre_codes: Vec<u32>,
}

impl LzxCompressor {
    /// Create a compressor for a `2^window_bits` window.
    pub fn new(window_bits: u32, mode: LzxWriteMode) -> Result<Self> {
        let slots = position_slots(window_bits).ok_or_else(|| {
            CabrioletError::argument(format!("LZX window bits {window_bits} out of range 15..=21"))
        })?;
        // Fixed pre-tree: the four symbols this encoder leans on get short
        // codes, the rest fill the space (16 x 5 bits + 4 x 3 bits is a
        // complete code).
        let mut pre_lengths = [5u8; PRETREE_NUM_ELEMENTS];
        for sym in [0usize, 9, 17, 18] {
            pre_lengths[sym] = 3;
        }
        let pre_codes = canonical_codes(&pre_lengths);
        Ok(Self {
            main_elements: NUM_CHARS + 8 * slots,
            mode,
            first: true,
            main_prev: vec![0; NUM_CHARS + 8 * slots],
            length_prev: vec![0; NUM_SECONDARY_LENGTHS],
            pre_lengths,
            pre_codes,
        })
    }

    fn put_pre(&self, bits: &mut BitWriterMsb<&mut Vec<u8>>, sym: usize) -> Result<()> {
        bits.write(u32::from(self.pre_lengths[sym]), self.pre_codes[sym])
    }

    /// Emit one delta-coded length section (`prev` -> `new`).
    fn write_lengths(
        &self,
        bits: &mut BitWriterMsb<&mut Vec<u8>>,
        prev: &[u8],
        new: &[u8],
    ) -> Result<()> {
        for &len in self.pre_lengths.iter() {
            bits.write(4, u32::from(len))?;
        }
        let mut i = 0usize;
        while i < new.len() {
            if new[i] == 0 {
                let mut run = 1;
                while i + run < new.len() && new[i + run] == 0 {
                    run += 1;
                }
                if run >= 20 {
                    let take = run.min(51);
                    self.put_pre(bits, 18)?;
                    bits.write(5, (take - 20) as u32)?;
                    i += take;
                    continue;
                }
                if run >= 4 {
                    let take = run.min(19);
                    self.put_pre(bits, 17)?;
                    bits.write(4, (take - 4) as u32)?;
                    i += take;
                    continue;
                }
            }
            let delta = (i32::from(prev[i]) - i32::from(new[i])).rem_euclid(17) as usize;
            self.put_pre(bits, delta)?;
            i += 1;
        }
        Ok(())
    }

    fn verbatim_block(&mut self, bits: &mut BitWriterMsb<&mut Vec<u8>>, chunk: &[u8]) -> Result<()> {
        bits.write(3, BLOCKTYPE_VERBATIM)?;
        bits.write(24, chunk.len() as u32)?;

        let mut main_new = vec![0u8; self.main_elements];
        main_new[..NUM_CHARS].fill(8);
        self.write_lengths(bits, &self.main_prev[..NUM_CHARS], &main_new[..NUM_CHARS])?;
        self.write_lengths(bits, &self.main_prev[NUM_CHARS..], &main_new[NUM_CHARS..])?;

        let length_new = vec![0u8; NUM_SECONDARY_LENGTHS];
        self.write_lengths(bits, &self.length_prev, &length_new)?;

        let codes = canonical_codes(&main_new);
        for &byte in chunk {
            bits.write(8, codes[usize::from(byte)])?;
        }

        self.main_prev = main_new;
        self.length_prev = length_new;
        Ok(())
    }

    fn uncompressed_block(
        &mut self,
        bits: &mut BitWriterMsb<&mut Vec<u8>>,
        chunk: &[u8],
    ) -> Result<()> {
        bits.write(3, BLOCKTYPE_UNCOMPRESSED)?;
        bits.write(24, chunk.len() as u32)?;
        // The reader discards 1..=16 bits to realign; guarantee at least one.
        if bits.bit_phase() == 0 {
            bits.write(16, 0)?;
        }
        for reg in [1u32, 1, 1] {
            bits.write_raw_bytes(&reg.to_le_bytes())?;
        }
        bits.write_raw_bytes(chunk)?;
        if chunk.len() & 1 != 0 {
            bits.write_raw_bytes(&[0])?;
        }
        Ok(())
    }
}

impl BlockCompressor for LzxCompressor {
    fn compress_block(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        if chunk.len() > FRAME_SIZE {
            return Err(CabrioletError::compress(format!(
                "LZX frame input of {} bytes exceeds 32768",
                chunk.len()
            )));
        }
        if chunk.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(chunk.len() + chunk.len() / 8 + 256);
        let mut bits = BitWriterMsb::new(&mut out);
        if self.first {
            bits.write(1, 0)?; // no Intel E8 translation
            self.first = false;
        }
        match self.mode {
            LzxWriteMode::Verbatim => self.verbatim_block(&mut bits, chunk)?,
            LzxWriteMode::Uncompressed => self.uncompressed_block(&mut bits, chunk)?,
        }
        bits.flush()?;
        drop(bits);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pretree_is_complete() {
        let mut kraft = 0u32;
        let enc = LzxCompressor::new(15, LzxWriteMode::Verbatim).unwrap();
        for &len in enc.pre_lengths.iter() {
            kraft += 1 << (16 - u32::from(len));
        }
        assert_eq!(kraft, 1 << 16);
    }

    #[test]
    fn test_window_bits_validation() {
        assert!(LzxCompressor::new(14, LzxWriteMode::Verbatim).is_err());
        assert!(LzxCompressor::new(22, LzxWriteMode::Verbatim).is_err());
        assert!(LzxCompressor::new(21, LzxWriteMode::Verbatim).is_ok());
    }

    #[test]
    fn test_uncompressed_block_is_padded_even() {
        let mut enc = LzxCompressor::new(15, LzxWriteMode::Uncompressed).unwrap();
        let out = enc.compress_block(&[0xAA; 7]).unwrap();
        // Header word + 12 register bytes + 7 data + 1 pad, all word-sized.
        assert_eq!(out.len() % 2, 0);
    }
}
