//! LZX codec.
//!
//! The decoder covers the full CAB/CHM/OAB dialect: verbatim, aligned and
//! uncompressed blocks over an MSB-first bitstream of little-endian 16-bit
//! words, delta-coded Huffman trees, three repeated-offset registers,
//! 32 KiB output frames with per-frame bitstream realignment, the Intel E8
//! call-offset post-pass, and CHM-style reset intervals. The encoder emits
//! uncompressed or literal-only verbatim blocks.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod decode;
mod encode;
mod tables;

pub use decode::{intel_e8_decode, intel_e8_encode, LzxDecoder, LzxOptions};
pub use encode::{LzxCompressor, LzxWriteMode};
pub use tables::{position_slots, FRAME_SIZE};

#[cfg(test)]
mod tests {
    use super::*;
    use cabriolet_core::traits::{BlockCompressor, Decompressor};
    use std::io::Cursor;

    fn compress_stream(data: &[u8], window_bits: u32, mode: LzxWriteMode) -> Vec<u8> {
        let mut enc = LzxCompressor::new(window_bits, mode).unwrap();
        let mut out = Vec::new();
        for chunk in data.chunks(FRAME_SIZE) {
            out.extend_from_slice(&enc.compress_block(chunk).unwrap());
        }
        out
    }

    fn roundtrip(data: &[u8], window_bits: u32, mode: LzxWriteMode) {
        let packed = compress_stream(data, window_bits, mode);
        let mut dec =
            LzxDecoder::new(Cursor::new(packed), window_bits, LzxOptions::default()).unwrap();
        dec.set_output_length(data.len() as u64);
        let mut out = Vec::new();
        let n = dec.decompress(&mut out, data.len() as u64).unwrap();
        assert_eq!(n, data.len() as u64);
        assert_eq!(out, data);
    }

    fn noise(len: usize, mut seed: u32) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            out.push((seed >> 24) as u8);
        }
        out
    }

    #[test]
    fn test_roundtrip_verbatim_small() {
        roundtrip(b"A", 15, LzxWriteMode::Verbatim);
        roundtrip(b"hello lzx hello lzx", 15, LzxWriteMode::Verbatim);
        roundtrip(&noise(5000, 11), 15, LzxWriteMode::Verbatim);
    }

    #[test]
    fn test_roundtrip_verbatim_multi_frame() {
        roundtrip(&noise(100_000, 21), 16, LzxWriteMode::Verbatim);
        let text = "a moderately compressible line of text\n".repeat(3000);
        roundtrip(text.as_bytes(), 17, LzxWriteMode::Verbatim);
    }

    #[test]
    fn test_roundtrip_uncompressed() {
        roundtrip(b"even.", 15, LzxWriteMode::Uncompressed);
        roundtrip(&noise(70_001, 31), 15, LzxWriteMode::Uncompressed);
    }

    #[test]
    fn test_uncompressed_odd_block_padding() {
        // An odd-length final block must carry its padding byte; decoding
        // again from the same bytes proves the pad was consumed in place.
        let data = noise(32768 + 33, 41);
        let packed = compress_stream(&data, 15, LzxWriteMode::Uncompressed);
        let mut dec = LzxDecoder::new(Cursor::new(packed), 15, LzxOptions::default()).unwrap();
        dec.set_output_length(data.len() as u64);
        let mut out = Vec::new();
        dec.decompress(&mut out, data.len() as u64).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_incremental_decode_matches_oneshot() {
        let data = "incremental incremental incremental ".repeat(4000);
        let data = data.as_bytes();
        let packed = compress_stream(data, 15, LzxWriteMode::Verbatim);

        let mut dec =
            LzxDecoder::new(Cursor::new(packed), 15, LzxOptions::default()).unwrap();
        dec.set_output_length(data.len() as u64);
        let mut pieces = Vec::new();
        let mut remaining = data.len() as u64;
        while remaining > 0 {
            let step = remaining.min(12345);
            assert_eq!(dec.decompress(&mut pieces, step).unwrap(), step);
            remaining -= step;
        }
        assert_eq!(pieces, data);
    }

    #[test]
    fn test_window_bits_range() {
        let data = b"x";
        assert!(LzxDecoder::new(Cursor::new(data.to_vec()), 14, LzxOptions::default()).is_err());
        assert!(LzxDecoder::new(Cursor::new(data.to_vec()), 22, LzxOptions::default()).is_err());
    }

    #[test]
    fn test_e8_translation_inverse() {
        // Frames with scattered E8 opcodes: encode-side translation then
        // decode-side translation restores the original bytes, and bytes
        // that never matched the predicate are untouched throughout.
        let filesize: i64 = 0x40000;
        for curpos in [0i64, 0x8000, 0x20000] {
            let mut frame = noise(4096, 0x77);
            for i in (100..3000).step_by(257) {
                frame[i] = 0xE8;
            }
            let original = frame.clone();
            intel_e8_encode(&mut frame, curpos, filesize);
            intel_e8_decode(&mut frame, curpos, filesize);
            assert_eq!(frame, original);
        }
    }

    #[test]
    fn test_e8_skips_frame_tail() {
        let filesize: i64 = 0x10000;
        let mut frame = vec![0u8; 64];
        frame[60] = 0xE8; // inside the last ten bytes
        let original = frame.clone();
        intel_e8_decode(&mut frame, 0, filesize);
        assert_eq!(frame, original);
    }

    #[test]
    fn test_reset_interval_decode() {
        // With a reset interval of 1 the encoder's per-frame independence
        // maps onto a decoder that resets before every frame, including
        // re-reading the header bit.
        let data = noise(90_000, 51);
        let mut enc = LzxCompressor::new(15, LzxWriteMode::Verbatim).unwrap();
        let mut packed = Vec::new();
        for chunk in data.chunks(FRAME_SIZE) {
            out_of_band_reset(&mut enc);
            packed.extend_from_slice(&enc.compress_block(chunk).unwrap());
        }
        let mut dec = LzxDecoder::new(
            Cursor::new(packed),
            15,
            LzxOptions {
                reset_interval: 1,
                ..Default::default()
            },
        )
        .unwrap();
        dec.set_output_length(data.len() as u64);
        let mut out = Vec::new();
        dec.decompress(&mut out, data.len() as u64).unwrap();
        assert_eq!(out, data);
    }

    /// Rewind the encoder to its initial tree/header state, as a
    /// reset-interval writer would between frames.
    fn out_of_band_reset(enc: &mut LzxCompressor) {
        *enc = LzxCompressor::new(15, LzxWriteMode::Verbatim).unwrap();
    }
}
