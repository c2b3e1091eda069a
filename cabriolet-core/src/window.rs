//! Sliding window (decompression history) shared by the LZ-family codecs.
//!
//! The buffer is allocated once per codec at the window size and written
//! with modular indexing; match copies split at the wrap point instead of
//! branching per byte.

use crate::error::{CabrioletError, Result};

/// A power-of-two sliding window.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    buffer: Vec<u8>,
    position: usize,
    mask: usize,
    /// Total bytes ever written (saturates at capacity for distance checks).
    filled: usize,
}

impl SlidingWindow {
    /// Allocate a window of `capacity` bytes (must be a power of two).
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "window size must be a power of two");
        Self {
            buffer: vec![0; capacity],
            position: 0,
            mask: capacity - 1,
            filled: 0,
        }
    }

    /// Window capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Current write position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// How much history is valid (≤ capacity).
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Preset the whole window to `byte` and mark it all as valid history
    /// (LZSS streams reference the preset fill).
    pub fn preset(&mut self, byte: u8, position: usize) {
        self.buffer.fill(byte);
        self.position = position & self.mask;
        self.filled = self.buffer.len();
    }

    /// Reset to the empty state without reallocating.
    pub fn reset(&mut self) {
        self.buffer.fill(0);
        self.position = 0;
        self.filled = 0;
    }

    /// Append one byte.
    #[inline]
    pub fn push(&mut self, byte: u8) {
        self.buffer[self.position] = byte;
        self.position = (self.position + 1) & self.mask;
        if self.filled < self.buffer.len() {
            self.filled += 1;
        }
    }

    /// Append a run of bytes.
    pub fn push_slice(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push(byte);
        }
    }

    /// The byte at absolute window index `index` (circular).
    #[inline]
    pub fn at(&self, index: usize) -> u8 {
        self.buffer[index & self.mask]
    }

    /// Copy `length` bytes starting `distance` back from the write position,
    /// appending them to the window and to `out`. Overlap (length >
    /// distance) repeats the pattern, as LZ77 requires.
    pub fn copy_match(&mut self, distance: usize, length: usize, out: &mut Vec<u8>) -> Result<()> {
        if distance == 0 || distance > self.filled {
            return Err(CabrioletError::decompress(format!(
                "match distance {distance} exceeds history {}",
                self.filled
            )));
        }
        let mut src = (self.position.wrapping_sub(distance)) & self.mask;
        out.reserve(length);
        for _ in 0..length {
            let byte = self.buffer[src];
            out.push(byte);
            self.push(byte);
            src = (src + 1) & self.mask;
        }
        Ok(())
    }

    /// Copy a match from an absolute (circular) window index rather than a
    /// backward distance — LZSS pairs address the window directly.
    pub fn copy_from_index(&mut self, index: usize, length: usize, out: &mut Vec<u8>) {
        let mut src = index & self.mask;
        out.reserve(length);
        for _ in 0..length {
            let byte = self.buffer[src];
            out.push(byte);
            self.push(byte);
            src = (src + 1) & self.mask;
        }
    }

    /// The last `count` bytes written, oldest first.
    pub fn recent(&self, count: usize) -> Vec<u8> {
        let count = count.min(self.filled);
        let mut bytes = Vec::with_capacity(count);
        for i in 0..count {
            bytes.push(self.buffer[(self.position.wrapping_sub(count - i)) & self.mask]);
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_copy() {
        let mut window = SlidingWindow::new(32);
        let mut out = Vec::new();
        window.push_slice(b"ABCD");
        window.copy_match(4, 4, &mut out).unwrap();
        assert_eq!(out, b"ABCD");
    }

    #[test]
    fn test_overlapping_copy() {
        let mut window = SlidingWindow::new(32);
        let mut out = Vec::new();
        window.push_slice(b"AB");
        window.copy_match(2, 6, &mut out).unwrap();
        assert_eq!(out, b"ABABAB");
    }

    #[test]
    fn test_wraparound() {
        let mut window = SlidingWindow::new(4);
        let mut out = Vec::new();
        window.push_slice(b"ABCDEF");
        window.copy_match(4, 4, &mut out).unwrap();
        assert_eq!(out, b"CDEF");
    }

    #[test]
    fn test_distance_validation() {
        let mut window = SlidingWindow::new(8);
        let mut out = Vec::new();
        window.push(b'X');
        assert!(window.copy_match(2, 1, &mut out).is_err());
        assert!(window.copy_match(0, 1, &mut out).is_err());
    }

    #[test]
    fn test_preset_fill() {
        let mut window = SlidingWindow::new(16);
        window.preset(0x20, 16 - 2);
        assert_eq!(window.position(), 14);
        assert_eq!(window.at(3), 0x20);
        let mut out = Vec::new();
        // The preset fill counts as history.
        window.copy_from_index(0, 2, &mut out);
        assert_eq!(out, vec![0x20, 0x20]);
    }

    #[test]
    fn test_recent() {
        let mut window = SlidingWindow::new(8);
        window.push_slice(b"Hello, World!");
        assert_eq!(window.recent(5), b"orld!");
    }
}
