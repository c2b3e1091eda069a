//! LZX decoding.

use crate::tables::*;
use cabriolet_core::bitstream::{BitRead, BitReaderMsb};
use cabriolet_core::error::{CabrioletError, Result};
use cabriolet_core::huffman::HuffmanTable;
use cabriolet_core::traits::Decompressor;
use cabriolet_core::window::SlidingWindow;
use std::io::{Read, Write};

/// Decoder configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct LzxOptions {
    /// Forced state reset every N frames (CHM content sections; 0 = never).
    pub reset_interval: u32,
    /// Pad past EOF indefinitely instead of failing on the second underrun.
    pub salvage: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockType {
    Invalid,
    Verbatim,
    Aligned,
    Uncompressed,
}

/// Incremental LZX decoder.
///
/// Output is produced in 32 KiB frames: the bitstream is realigned to a
/// 16-bit boundary after each frame, and the Intel E8 post-pass rewrites
/// the frame copy (never the window, so back-references always see the
/// untranslated bytes).
pub struct LzxDecoder<R> {
    bits: BitReaderMsb<R>,
    window: SlidingWindow,
    position_base: [u32; MAX_POSITION_SLOTS + 1],
    extra_bits: [u32; MAX_POSITION_SLOTS + 1],
    main_elements: usize,

    // Persistent tree lengths: new trees are delta-coded against these.
    main_lengths: Vec<u8>,
    length_lengths: Vec<u8>,
    main_tree: Option<HuffmanTable>,
    length_tree: Option<HuffmanTable>,
    aligned_tree: Option<HuffmanTable>,

    r0: u32,
    r1: u32,
    r2: u32,

    header_read: bool,
    intel_filesize: u32,
    intel_started: bool,
    intel_curpos: u32,

    block_type: BlockType,
    block_remaining: u32,
    block_length: u32,

    frame: u32,
    options: LzxOptions,

    /// Decoded bytes of the current (and possibly next) frame.
    frame_accum: Vec<u8>,
    /// Finished frames awaiting delivery.
    buffer: Vec<u8>,
    buffer_pos: usize,
    emitted_frames_bytes: u64,
    output_limit: Option<u64>,
    finished: bool,
}

impl<R: Read> LzxDecoder<R> {
    /// Create a decoder for a `2^window_bits` window.
    pub fn new(reader: R, window_bits: u32, options: LzxOptions) -> Result<Self> {
        let slots = position_slots(window_bits).ok_or_else(|| {
            CabrioletError::argument(format!("LZX window bits {window_bits} out of range 15..=21"))
        })?;
        let mut bits = BitReaderMsb::new(reader);
        bits.set_salvage(options.salvage);
        Ok(Self {
            bits,
            window: SlidingWindow::new(1 << window_bits),
            position_base: position_base(),
            extra_bits: extra_bits(),
            main_elements: NUM_CHARS + 8 * slots,
            main_lengths: vec![0; NUM_CHARS + 8 * MAX_POSITION_SLOTS],
            length_lengths: vec![0; NUM_SECONDARY_LENGTHS],
            main_tree: None,
            length_tree: None,
            aligned_tree: None,
            r0: 1,
            r1: 1,
            r2: 1,
            header_read: false,
            intel_filesize: 0,
            intel_started: false,
            intel_curpos: 0,
            block_type: BlockType::Invalid,
            block_remaining: 0,
            block_length: 0,
            frame: 0,
            options,
            frame_accum: Vec::new(),
            buffer: Vec::new(),
            buffer_pos: 0,
            emitted_frames_bytes: 0,
            output_limit: None,
            finished: false,
        })
    }

    /// The Intel translation header, once seen (0 = disabled).
    pub fn intel_filesize(&self) -> u32 {
        self.intel_filesize
    }

    fn buffered(&self) -> usize {
        self.buffer.len() - self.buffer_pos
    }

    fn reset_state(&mut self) {
        self.r0 = 1;
        self.r1 = 1;
        self.r2 = 1;
        self.header_read = false;
        self.block_type = BlockType::Invalid;
        self.block_remaining = 0;
        self.block_length = 0;
        self.main_lengths.fill(0);
        self.length_lengths.fill(0);
        self.main_tree = None;
        self.length_tree = None;
        self.aligned_tree = None;
    }

    /// Read delta-coded code lengths for `lengths[first..last]`.
    fn read_lengths(&mut self, which: Tree, first: usize, last: usize) -> Result<()> {
        let mut pre_lengths = [0u8; PRETREE_NUM_ELEMENTS];
        for slot in pre_lengths.iter_mut() {
            *slot = self.bits.read(4)? as u8;
        }
        let pre_tree = HuffmanTable::build_msb(&pre_lengths, PRETREE_TABLE_BITS)?;

        let lengths = match which {
            Tree::Main => &mut self.main_lengths,
            Tree::Length => &mut self.length_lengths,
        };

        let mut x = first;
        while x < last {
            let z = pre_tree.decode(&mut self.bits)?;
            match z {
                17 => {
                    let run = self.bits.read(4)? as usize + 4;
                    for _ in 0..run.min(last - x) {
                        lengths[x] = 0;
                        x += 1;
                    }
                }
                18 => {
                    let run = self.bits.read(5)? as usize + 20;
                    for _ in 0..run.min(last - x) {
                        lengths[x] = 0;
                        x += 1;
                    }
                }
                19 => {
                    let run = self.bits.read(1)? as usize + 4;
                    let z = pre_tree.decode(&mut self.bits)?;
                    if z > 16 {
                        return Err(CabrioletError::decompress("bad pre-tree delta"));
                    }
                    let value = (i32::from(lengths[x]) - i32::from(z)).rem_euclid(17) as u8;
                    for _ in 0..run.min(last - x) {
                        lengths[x] = value;
                        x += 1;
                    }
                }
                0..=16 => {
                    lengths[x] = (i32::from(lengths[x]) - i32::from(z)).rem_euclid(17) as u8;
                    x += 1;
                }
                _ => return Err(CabrioletError::decompress("bad pre-tree symbol")),
            }
        }
        Ok(())
    }

    fn read_block_header(&mut self) -> Result<()> {
        if !self.header_read {
            self.header_read = true;
            if self.bits.read(1)? != 0 {
                let high = self.bits.read(16)?;
                let low = self.bits.read(16)?;
                self.intel_filesize = (high << 16) | low;
                self.intel_started = self.intel_filesize != 0;
            }
        }

        let block_type = self.bits.read(3)?;
        let length = self.bits.read(24)?;
        self.block_length = length;
        self.block_remaining = length;

        match block_type {
            BLOCKTYPE_ALIGNED => {
                let mut aligned_lengths = [0u8; ALIGNED_NUM_ELEMENTS];
                for slot in aligned_lengths.iter_mut() {
                    *slot = self.bits.read(3)? as u8;
                }
                self.aligned_tree =
                    Some(HuffmanTable::build_msb(&aligned_lengths, ALIGNED_TABLE_BITS)?);
                self.read_main_and_length_trees()?;
                self.block_type = BlockType::Aligned;
            }
            BLOCKTYPE_VERBATIM => {
                self.read_main_and_length_trees()?;
                self.block_type = BlockType::Verbatim;
            }
            BLOCKTYPE_UNCOMPRESSED => {
                self.intel_started = true;
                self.bits.align_discard()?;
                let mut regs = [0u8; 12];
                self.bits.read_raw_bytes(&mut regs)?;
                self.r0 = u32::from_le_bytes(regs[0..4].try_into().unwrap());
                self.r1 = u32::from_le_bytes(regs[4..8].try_into().unwrap());
                self.r2 = u32::from_le_bytes(regs[8..12].try_into().unwrap());
                if self.r0 == 0 || self.r1 == 0 || self.r2 == 0 {
                    return Err(CabrioletError::decompress("zero repeated-offset register"));
                }
                self.block_type = BlockType::Uncompressed;
            }
            _ => {
                return Err(CabrioletError::decompress(format!(
                    "invalid LZX block type {block_type}"
                )));
            }
        }
        Ok(())
    }

    fn read_main_and_length_trees(&mut self) -> Result<()> {
        self.read_lengths(Tree::Main, 0, NUM_CHARS)?;
        let main_elements = self.main_elements;
        self.read_lengths(Tree::Main, NUM_CHARS, main_elements)?;
        self.main_tree = Some(HuffmanTable::build_msb(
            &self.main_lengths[..main_elements],
            MAINTREE_TABLE_BITS,
        )?);

        self.read_lengths(Tree::Length, 0, NUM_SECONDARY_LENGTHS)?;
        self.length_tree = Some(HuffmanTable::build_msb_allow_empty(
            &self.length_lengths,
            LENGTH_TABLE_BITS,
        )?);
        Ok(())
    }

    /// Decode one match or literal; returns bytes output.
    fn decode_element(&mut self) -> Result<u32> {
        let main_tree = self
            .main_tree
            .as_ref()
            .ok_or_else(|| CabrioletError::decompress("LZX block has no main tree"))?;
        let sym = main_tree.decode(&mut self.bits)?;
        if usize::from(sym) < NUM_CHARS {
            self.window.push(sym as u8);
            self.frame_accum.push(sym as u8);
            return Ok(1);
        }

        let sym = usize::from(sym) - NUM_CHARS;
        let position_slot = sym >> 3;
        let mut match_length = (sym as u16) & NUM_PRIMARY_LENGTHS;
        if match_length == NUM_PRIMARY_LENGTHS {
            let length_tree = self
                .length_tree
                .as_ref()
                .ok_or_else(|| CabrioletError::decompress("LZX block has no length tree"))?;
            match_length += length_tree.decode(&mut self.bits)?;
        }
        let match_length = usize::from(match_length) + MIN_MATCH;

        let match_offset = match position_slot {
            0 => self.r0,
            1 => {
                std::mem::swap(&mut self.r0, &mut self.r1);
                self.r0
            }
            2 => {
                std::mem::swap(&mut self.r0, &mut self.r2);
                self.r0
            }
            slot => {
                let extra = self.extra_bits[slot];
                let base = self.position_base[slot].wrapping_sub(2);
                let offset = if self.block_type == BlockType::Aligned && extra >= 3 {
                    let verbatim = if extra > 3 {
                        self.bits.read(extra - 3)? << 3
                    } else {
                        0
                    };
                    let aligned_tree = self
                        .aligned_tree
                        .as_ref()
                        .ok_or_else(|| CabrioletError::decompress("LZX block has no aligned tree"))?;
                    let low = u32::from(aligned_tree.decode(&mut self.bits)?);
                    base.wrapping_add(verbatim).wrapping_add(low)
                } else if extra > 0 {
                    base.wrapping_add(self.bits.read(extra)?)
                } else {
                    base
                };
                self.r2 = self.r1;
                self.r1 = self.r0;
                self.r0 = offset;
                offset
            }
        };

        self.window
            .copy_match(match_offset as usize, match_length, &mut self.frame_accum)?;
        Ok(match_length as u32)
    }

    /// Decode one full frame into the delivery buffer. Returns false when
    /// the stream is complete.
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

        if self.options.reset_interval != 0 && self.frame % self.options.reset_interval == 0 {
            if self.block_remaining != 0 {
                return Err(CabrioletError::decompress(
                    "LZX block runs over a reset interval",
                ));
            }
            self.reset_state();
        }

        while self.frame_accum.len() < frame_size {
            if self.block_remaining == 0 {
                if self.block_type == BlockType::Uncompressed && self.block_length & 1 != 0 {
                    let mut pad = [0u8; 1];
                    self.bits.read_raw_bytes(&mut pad)?;
                }
                self.read_block_header()?;
                continue;
            }
            match self.block_type {
                BlockType::Uncompressed => {
                    let want = (self.block_remaining as usize)
                        .min(frame_size - self.frame_accum.len())
                        .min(4096);
                    let mut chunk = vec![0u8; want];
                    self.bits.read_raw_bytes(&mut chunk)?;
                    self.window.push_slice(&chunk);
                    self.frame_accum.extend_from_slice(&chunk);
                    self.block_remaining -= want as u32;
                }
                BlockType::Verbatim | BlockType::Aligned => {
                    let out = self.decode_element()?;
                    if out > self.block_remaining {
                        return Err(CabrioletError::decompress("LZX block length overrun"));
                    }
                    self.block_remaining -= out;
                }
                BlockType::Invalid => {
                    return Err(CabrioletError::decompress("LZX data before first block"));
                }
            }
        }

        // Frame completed: translate the output copy, realign the stream.
        let mut frame: Vec<u8> = self.frame_accum.drain(..frame_size).collect();
        self.apply_intel_e8(&mut frame);
        self.buffer.extend_from_slice(&frame);

        self.frame += 1;
        self.emitted_frames_bytes += frame_size as u64;
        if self.block_type != BlockType::Uncompressed {
            self.bits.align_word();
        } else if self.block_remaining == 0 && self.block_length & 1 != 0 {
            let mut pad = [0u8; 1];
            self.bits.read_raw_bytes(&mut pad)?;
            self.block_length &= !1;
        }
        Ok(true)
    }

    fn apply_intel_e8(&mut self, frame: &mut [u8]) {
        let translate = self.intel_started
            && self.intel_filesize != 0
            && self.frame <= 32768
            && frame.len() > 10;
        if translate {
            intel_e8_decode(frame, self.intel_curpos as i64, i64::from(self.intel_filesize));
        }
        self.intel_curpos = self.intel_curpos.wrapping_add(frame.len() as u32);
    }
}

/// Undo the encoder-side E8 call-offset translation over one frame.
///
/// The last ten bytes are never examined, so a rewritten offset cannot
/// straddle the frame boundary.
pub fn intel_e8_decode(frame: &mut [u8], mut curpos: i64, filesize: i64) {
    if frame.len() <= 10 {
        return;
    }
    let end = frame.len() - 10;
    let mut i = 0usize;
    while i < end {
        if frame[i] != 0xE8 {
            i += 1;
            curpos += 1;
            continue;
        }
        let abs = i32::from_le_bytes(frame[i + 1..i + 5].try_into().unwrap());
        let abs = i64::from(abs);
        if abs >= -curpos && abs < filesize {
            let rel = if abs >= 0 { abs - curpos } else { abs + filesize };
            frame[i + 1..i + 5].copy_from_slice(&(rel as i32).to_le_bytes());
        }
        i += 5;
        curpos += 5;
    }
}

/// Apply the encoder-side E8 translation (relative to absolute) over one
/// frame. Exposed for symmetry and testing.
pub fn intel_e8_encode(frame: &mut [u8], mut curpos: i64, filesize: i64) {
    if frame.len() <= 10 {
        return;
    }
    let end = frame.len() - 10;
    let mut i = 0usize;
    while i < end {
        if frame[i] != 0xE8 {
            i += 1;
            curpos += 1;
            continue;
        }
        let rel = i32::from_le_bytes(frame[i + 1..i + 5].try_into().unwrap());
        let rel = i64::from(rel);
        if rel >= -curpos && rel < filesize {
            let abs = if rel < filesize - curpos {
                rel + curpos
            } else {
                rel - filesize
            };
            frame[i + 1..i + 5].copy_from_slice(&(abs as i32).to_le_bytes());
        }
        i += 5;
        curpos += 5;
    }
}

enum Tree {
    Main,
    Length,
}

impl<R: Read> Decompressor for LzxDecoder<R> {
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
        self.reset_state();
        self.bits.reset();
        self.frame_accum.clear();
        self.buffer.clear();
        self.buffer_pos = 0;
        self.finished = false;
        Ok(())
    }
}
