//! MSZIP decoding: `CK`-framed DEFLATE with a window that outlives frames.

use crate::tables::{
    CODE_LENGTH_ORDER, DIST_BASE, DIST_EXTRA, LENGTH_BASE, LENGTH_EXTRA, fixed_dist_lengths,
    fixed_litlen_lengths,
};
use crate::FRAME_SIZE;
use cabriolet_core::bitstream::{BitRead, BitReaderLsb};
use cabriolet_core::error::{CabrioletError, Result};
use cabriolet_core::huffman::HuffmanTable;
use cabriolet_core::traits::Decompressor;
use cabriolet_core::window::SlidingWindow;
use std::io::{Read, Write};

/// Behaviour switches for the decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct MszipOptions {
    /// Pad past EOF indefinitely instead of failing on the second underrun.
    pub salvage: bool,
    /// Convert in-frame errors to zero padding and resume at the next `CK`.
    pub fix_mszip: bool,
}

/// Incremental MSZIP decoder.
///
/// The 32 KiB window persists across `CK` frame boundaries and across
/// `decompress` calls, so a folder's files can be pulled out one at a time
/// without losing back-reference history.
pub struct MszipDecoder<R> {
    bits: BitReaderLsb<R>,
    window: SlidingWindow,
    buffer: Vec<u8>,
    buffer_pos: usize,
    produced: u64,
    output_limit: Option<u64>,
    finished: bool,
    options: MszipOptions,
}

impl<R: Read> MszipDecoder<R> {
    /// Create a decoder over `reader`.
    pub fn new(reader: R, options: MszipOptions) -> Self {
        let mut bits = BitReaderLsb::new(reader);
        bits.set_salvage(options.salvage);
        Self {
            bits,
            window: SlidingWindow::new(FRAME_SIZE),
            buffer: Vec::new(),
            buffer_pos: 0,
            produced: 0,
            output_limit: None,
            finished: false,
            options,
        }
    }

    fn buffered(&self) -> usize {
        self.buffer.len() - self.buffer_pos
    }

    /// Decode one `CK` frame into the buffer. Returns false at a clean end
    /// of stream.
    fn decode_frame(&mut self) -> Result<bool> {
        self.bits.align();

        let was_eof = self.bits.is_eof();
        let b0 = self.bits.read(8)?;
        if !was_eof && self.bits.is_eof() && b0 == 0 {
            // The stream ended exactly at a frame boundary.
            return Ok(false);
        }
        let b1 = self.bits.read(8)?;
        if b0 != 0x43 || b1 != 0x4B {
            return Err(CabrioletError::decompress("missing CK frame signature"));
        }

        let frame_start = self.buffer.len();
        let result = self.decode_deflate_stream(frame_start);
        match result {
            Ok(()) => Ok(true),
            Err(err) if self.options.fix_mszip => {
                self.recover_frame(frame_start)?;
                // Surface the recovery as data, not failure.
                let _ = err;
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }

    /// DEFLATE blocks until the final one, bounded to one frame of output.
    fn decode_deflate_stream(&mut self, frame_start: usize) -> Result<()> {
        loop {
            let bfinal = self.bits.read(1)? != 0;
            let btype = self.bits.read(2)?;
            match btype {
                0 => self.decode_stored(frame_start)?,
                1 => {
                    let litlen = HuffmanTable::build_lsb(&fixed_litlen_lengths(), 9)?;
                    let dist = HuffmanTable::build_lsb(&fixed_dist_lengths(), 6)?;
                    self.decode_huffman_block(&litlen, &dist, frame_start)?;
                }
                2 => {
                    let (litlen, dist) = self.read_dynamic_trees()?;
                    self.decode_huffman_block(&litlen, &dist, frame_start)?;
                }
                _ => {
                    return Err(CabrioletError::decompress("reserved DEFLATE block type"));
                }
            }
            if bfinal {
                return Ok(());
            }
        }
    }

    fn decode_stored(&mut self, frame_start: usize) -> Result<()> {
        self.bits.align();
        let len = self.bits.read_u16_le()?;
        let nlen = self.bits.read_u16_le()?;
        if nlen != !len {
            return Err(CabrioletError::decompress("length/complement mismatch"));
        }
        self.check_frame_room(frame_start, usize::from(len))?;
        let mut chunk = vec![0u8; usize::from(len)];
        self.bits.read_bytes(&mut chunk)?;
        self.window.push_slice(&chunk);
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    fn read_dynamic_trees(&mut self) -> Result<(HuffmanTable, HuffmanTable)> {
        let hlit = self.bits.read(5)? as usize + 257;
        let hdist = self.bits.read(5)? as usize + 1;
        let hclen = self.bits.read(4)? as usize + 4;

        let mut pre_lengths = [0u8; 19];
        for &slot in CODE_LENGTH_ORDER.iter().take(hclen) {
            pre_lengths[slot] = self.bits.read(3)? as u8;
        }
        let pre_tree = HuffmanTable::build_lsb(&pre_lengths, 7)?;

        let mut lengths = vec![0u8; hlit + hdist];
        let mut i = 0;
        while i < lengths.len() {
            let code = pre_tree.decode(&mut self.bits)?;
            match code {
                0..=15 => {
                    lengths[i] = code as u8;
                    i += 1;
                }
                16 => {
                    if i == 0 {
                        return Err(CabrioletError::decompress("repeat code at start of lengths"));
                    }
                    let repeat = self.bits.read(2)? as usize + 3;
                    let prev = lengths[i - 1];
                    if i + repeat > lengths.len() {
                        return Err(CabrioletError::decompress("code length overflow"));
                    }
                    lengths[i..i + repeat].fill(prev);
                    i += repeat;
                }
                17 => {
                    let repeat = self.bits.read(3)? as usize + 3;
                    if i + repeat > lengths.len() {
                        return Err(CabrioletError::decompress("code length overflow"));
                    }
                    i += repeat;
                }
                18 => {
                    let repeat = self.bits.read(7)? as usize + 11;
                    if i + repeat > lengths.len() {
                        return Err(CabrioletError::decompress("code length overflow"));
                    }
                    i += repeat;
                }
                _ => unreachable!("pre-tree has 19 symbols"),
            }
        }

        let litlen = HuffmanTable::build_lsb(&lengths[..hlit], 9)?;
        let dist = HuffmanTable::build_lsb_allow_empty(&lengths[hlit..], 6)?;
        Ok((litlen, dist))
    }

    fn decode_huffman_block(
        &mut self,
        litlen: &HuffmanTable,
        dist: &HuffmanTable,
        frame_start: usize,
    ) -> Result<()> {
        loop {
            let sym = litlen.decode(&mut self.bits)?;
            if sym < 256 {
                self.check_frame_room(frame_start, 1)?;
                self.window.push(sym as u8);
                self.buffer.push(sym as u8);
            } else if sym == 256 {
                return Ok(());
            } else if sym <= 285 {
                let idx = usize::from(sym - 257);
                let extra = LENGTH_EXTRA[idx];
                let add = if extra > 0 { self.bits.read(extra)? } else { 0 };
                let length = usize::from(LENGTH_BASE[idx]) + add as usize;

                let dist_sym = dist.decode(&mut self.bits)?;
                if dist_sym >= 30 {
                    return Err(CabrioletError::decompress(format!(
                        "invalid distance code {dist_sym}"
                    )));
                }
                let dist_idx = usize::from(dist_sym);
                let extra = DIST_EXTRA[dist_idx];
                let add = if extra > 0 { self.bits.read(extra)? } else { 0 };
                let distance = usize::from(DIST_BASE[dist_idx]) + add as usize;

                self.check_frame_room(frame_start, length)?;
                self.window.copy_match(distance, length, &mut self.buffer)?;
            } else {
                return Err(CabrioletError::decompress(format!(
                    "invalid literal/length code {sym}"
                )));
            }
        }
    }

    fn check_frame_room(&self, frame_start: usize, add: usize) -> Result<()> {
        if self.buffer.len() - frame_start + add > FRAME_SIZE {
            return Err(CabrioletError::decompress("MSZIP frame exceeds 32768 bytes"));
        }
        Ok(())
    }

    /// fix-mszip recovery: zero-pad the rest of the damaged frame, then
    /// skip forward to the next `CK` signature.
    fn recover_frame(&mut self, frame_start: usize) -> Result<()> {
        let frame_len = self.buffer.len() - frame_start;
        let mut pad = FRAME_SIZE - frame_len;
        if let Some(limit) = self.output_limit {
            let room = limit
                .saturating_sub(self.produced)
                .saturating_sub(self.buffer.len() as u64 - self.buffer_pos as u64);
            pad = pad.min(usize::try_from(room).unwrap_or(usize::MAX));
        }
        for _ in 0..pad {
            self.window.push(0);
            self.buffer.push(0);
        }

        // Scan byte-aligned input for the next frame signature.
        self.bits.align();
        let mut prev = 0u8;
        loop {
            if self.bits.is_eof() {
                self.finished = true;
                return Ok(());
            }
            let byte = match self.bits.read(8) {
                Ok(byte) => byte as u8,
                Err(_) => {
                    self.finished = true;
                    return Ok(());
                }
            };
            if self.bits.is_eof() {
                self.finished = true;
                return Ok(());
            }
            if prev == 0x43 && byte == 0x4B {
                // Re-enter frame decoding after the signature we just ate.
                let frame_start = self.buffer.len();
                if self.decode_deflate_stream(frame_start).is_err() {
                    // Nested damage: give up on recovery for this stream.
                    self.finished = true;
                }
                return Ok(());
            }
            prev = byte;
        }
    }
}

impl<R: Read> Decompressor for MszipDecoder<R> {
    fn decompress(&mut self, out: &mut dyn Write, len: u64) -> Result<u64> {
        let mut delivered = 0u64;
        while delivered < len {
            if self.buffered() == 0 {
                if self.buffer_pos > 0 {
                    self.buffer.clear();
                    self.buffer_pos = 0;
                }
                let at_limit = self
                    .output_limit
                    .is_some_and(|limit| self.produced >= limit);
                if self.finished || at_limit {
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
            self.produced += take as u64;
        }
        Ok(delivered)
    }

    fn set_output_length(&mut self, total: u64) {
        self.output_limit = Some(total);
    }

    fn reset(&mut self) -> Result<()> {
        // Frame-boundary re-arm for salvage: the window survives (the next
        // frame may still reference it), buffered bits do not.
        self.bits.reset();
        self.buffer.clear();
        self.buffer_pos = 0;
        self.finished = false;
        Ok(())
    }
}
