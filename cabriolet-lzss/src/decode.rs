//! LZSS decoding.

use crate::{LzssMode, MIN_MATCH, WINDOW_SIZE};
use cabriolet_core::error::Result;
use cabriolet_core::traits::Decompressor;
use cabriolet_core::window::SlidingWindow;
use std::io::{Read, Write};

/// One-pass LZSS decoder.
///
/// The stream is byte-aligned, so bytes are pulled straight off the input;
/// running out of input is a normal end of stream for the Expand and MsHelp
/// dialects (QBasic additionally carries an in-band terminator).
#[derive(Debug)]
pub struct LzssDecoder<R> {
    reader: R,
    mode: LzssMode,
    window: SlidingWindow,
    /// Decoded but not yet delivered bytes.
    buffer: Vec<u8>,
    buffer_pos: usize,
    produced: u64,
    output_limit: Option<u64>,
    finished: bool,
}

impl<R: Read> LzssDecoder<R> {
    /// Create a decoder over `reader`.
    pub fn new(reader: R, mode: LzssMode) -> Self {
        let mut window = SlidingWindow::new(WINDOW_SIZE);
        window.preset(mode.fill_byte(), mode.start_position());
        Self {
            reader,
            mode,
            window,
            buffer: Vec::new(),
            buffer_pos: 0,
            produced: 0,
            output_limit: None,
            finished: false,
        }
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.reader.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Decode one flag group (up to eight items) into the buffer.
    /// Returns false when the stream is over.
    fn decode_unit(&mut self) -> Result<bool> {
        let flags = match self.next_byte()? {
            Some(byte) => {
                if self.mode.inverted_flags() {
                    !byte
                } else {
                    byte
                }
            }
            None => return Ok(false),
        };

        for bit in 0..8 {
            if flags & (1 << bit) != 0 {
                match self.next_byte()? {
                    Some(literal) => {
                        self.window.push(literal);
                        self.buffer.push(literal);
                    }
                    None => return Ok(false),
                }
            } else {
                let low = match self.next_byte()? {
                    Some(byte) => byte,
                    None => return Ok(false),
                };
                let packed = match self.next_byte()? {
                    Some(byte) => byte,
                    None => return Ok(false),
                };
                let position = usize::from(low) | (usize::from(packed & 0xF0) << 4);
                let nibble = usize::from(packed & 0x0F);
                if self.mode.has_terminator() && nibble == 0 && position == 0 {
                    return Ok(false);
                }
                let length = nibble + MIN_MATCH;
                self.window
                    .copy_from_index(position, length, &mut self.buffer);
            }
        }
        Ok(true)
    }

    fn buffered(&self) -> usize {
        self.buffer.len() - self.buffer_pos
    }
}

impl<R: Read> Decompressor for LzssDecoder<R> {
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
                    .is_some_and(|limit| self.produced + delivered >= limit);
                if self.finished || at_limit {
                    break;
                }
                if !self.decode_unit()? {
                    self.finished = true;
                }
                // A truncated unit may still have produced bytes; only a
                // completely dry buffer ends the loop.
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
        self.produced += delivered;
        Ok(delivered)
    }

    fn set_output_length(&mut self, total: u64) {
        self.output_limit = Some(total);
    }

    fn reset(&mut self) -> Result<()> {
        self.window.preset(self.mode.fill_byte(), self.mode.start_position());
        self.buffer.clear();
        self.buffer_pos = 0;
        self.produced = 0;
        self.finished = false;
        Ok(())
    }
}
