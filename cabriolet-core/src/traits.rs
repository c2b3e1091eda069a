//! Core codec capabilities.
//!
//! Codec state types are constructed over a concrete input source but are
//! driven through object-safe traits, so a CAB folder extractor (or any
//! other container) can hold one boxed codec per folder without caring
//! which algorithm is behind it.

use crate::error::Result;
use std::io::Write;

/// An incremental decompressor.
///
/// Implementations own their input source and any sliding-window,
/// Huffman-table or arithmetic-coder state. That state survives across
/// `decompress` calls: consuming a folder's logical stream in several
/// slices (skip, file, skip, file, ...) yields the same bytes as one
/// contiguous read.
pub trait Decompressor {
    /// Extend the output by exactly `len` bytes, writing them to `out`.
    ///
    /// Returns the number of bytes actually produced. A short count is only
    /// legal at end-of-stream in salvage mode; otherwise an underrun is an
    /// error.
    fn decompress(&mut self, out: &mut dyn Write, len: u64) -> Result<u64>;

    /// Bound the total length of the decoded stream. Codecs that pad their
    /// final frame (LZX) need this before the last frame is decoded.
    fn set_output_length(&mut self, _total: u64) {}

    /// Re-arm the codec at a frame boundary, discarding damaged state.
    /// Used by salvage-mode extraction to resume after a bad block.
    fn reset(&mut self) -> Result<()>;
}

/// A block-oriented compressor.
///
/// Containers in this family frame their streams in 32 KiB uncompressed
/// chunks (CAB `CFDATA`, SZDD/KWAJ are single-stream but small); a
/// compressor turns one chunk at a time into its encoded form, carrying
/// whatever cross-block state its format allows.
pub trait BlockCompressor {
    /// Compress one chunk (at most 32768 bytes) and return its encoding.
    fn compress_block(&mut self, chunk: &[u8]) -> Result<Vec<u8>>;

    /// Flush any end-of-stream trailer. Most codecs have none.
    fn finish(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Decompress-and-discard helper for skipping within a logical stream.
pub fn discard(codec: &mut dyn Decompressor, len: u64) -> Result<u64> {
    codec.decompress(&mut std::io::sink(), len)
}

/// Statistics accumulated by an extraction job.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractStats {
    /// Files fully extracted.
    pub extracted: u64,
    /// Files skipped by the caller's filter.
    pub skipped: u64,
    /// Files that failed (salvage mode records these and continues).
    pub failed: u64,
    /// Total uncompressed bytes written.
    pub bytes: u64,
}

impl ExtractStats {
    /// Fold another job's statistics into this one.
    pub fn merge(&mut self, other: &ExtractStats) {
        self.extracted += other.extracted;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.bytes += other.bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_merge() {
        let mut a = ExtractStats {
            extracted: 2,
            skipped: 1,
            failed: 0,
            bytes: 100,
        };
        let b = ExtractStats {
            extracted: 3,
            skipped: 0,
            failed: 1,
            bytes: 50,
        };
        a.merge(&b);
        assert_eq!(a.extracted, 5);
        assert_eq!(a.skipped, 1);
        assert_eq!(a.failed, 1);
        assert_eq!(a.bytes, 150);
    }
}
