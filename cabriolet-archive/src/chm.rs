//! CHM (Compiled HTML Help) codec glue.
//!
//! Directory walking is out of scope here; what CHM needs from the engine
//! is the LZX configuration its `LZXC` control data describes, and a way
//! to run a content-section byte range through an LZX decoder honouring
//! the reset interval. Full CHM readers sit on top of these pieces.

use crate::factory::{CodecFactory, CodecKind, CodecOptions};
use cabriolet_core::error::{CabrioletError, Result};
use cabriolet_core::traits::{discard, Decompressor};
use std::io::{Read, Write};

/// `LZXC` control-data magic.
pub const LZXC_MAGIC: [u8; 4] = *b"LZXC";

/// LZX frame size used for the control data's block units.
const FRAME: u32 = 0x8000;

/// Parsed `ControlData` of a CHM content section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzxcControl {
    /// Control-data version (1 or 2).
    pub version: u32,
    /// Forced decoder reset every this many frames.
    pub reset_interval: u32,
    /// Window size exponent for the section's LZX stream.
    pub window_bits: u32,
}

impl LzxcControl {
    /// Parse the bytes of a `::DataSpace/Storage/<name>/ControlData` entry.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 24 {
            return Err(CabrioletError::parse("LZXC control data too short"));
        }
        if data[4..8] != LZXC_MAGIC {
            return Err(CabrioletError::signature(
                LZXC_MAGIC.to_vec(),
                data[4..8].to_vec(),
            ));
        }
        let version = u32::from_le_bytes(data[8..12].try_into().unwrap());
        let reset_raw = u32::from_le_bytes(data[12..16].try_into().unwrap());
        let window_raw = u32::from_le_bytes(data[16..20].try_into().unwrap());

        // Version 2 counts in 32 KiB frames, version 1 in bytes.
        let (reset_interval, window_bytes) = match version {
            1 => (reset_raw / FRAME, window_raw),
            2 => (reset_raw, window_raw.saturating_mul(FRAME)),
            other => {
                return Err(CabrioletError::format(format!(
                    "unknown LZXC version {other}"
                )));
            }
        };
        if !window_bytes.is_power_of_two() {
            return Err(CabrioletError::format(
                "LZXC window size is not a power of two",
            ));
        }
        let window_bits = window_bytes.trailing_zeros();
        Ok(Self {
            version,
            reset_interval,
            window_bits,
        })
    }
}

/// Decompress `length` bytes starting `offset` into a content section.
///
/// `reader` must be positioned at the section's compressed data. The
/// section is decoded from its start (reset-point tables are a reader
/// concern, not a codec one), discarding up to `offset`.
pub fn decompress_range<R: Read>(
    reader: R,
    control: LzxcControl,
    section_length: u64,
    offset: u64,
    length: u64,
    out: &mut dyn Write,
) -> Result<u64> {
    let factory = CodecFactory::global();
    let mut codec = factory.decompressor(
        CodecKind::Lzx {
            window_bits: control.window_bits,
        },
        reader,
        CodecOptions {
            reset_interval: control.reset_interval,
            ..Default::default()
        },
    )?;
    codec.set_output_length(section_length);
    if offset > 0 {
        let skipped = discard(codec.as_mut(), offset)?;
        if skipped < offset {
            return Err(CabrioletError::decompress(
                "CHM section shorter than requested offset",
            ));
        }
    }
    codec.decompress(out, length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cabriolet_core::traits::BlockCompressor;
    use cabriolet_lzx::{LzxCompressor, LzxWriteMode};
    use std::io::Cursor;

    fn control_bytes(version: u32, reset: u32, window: u32) -> Vec<u8> {
        let mut data = vec![0u8; 24];
        data[0..4].copy_from_slice(&24u32.to_le_bytes());
        data[4..8].copy_from_slice(&LZXC_MAGIC);
        data[8..12].copy_from_slice(&version.to_le_bytes());
        data[12..16].copy_from_slice(&reset.to_le_bytes());
        data[16..20].copy_from_slice(&window.to_le_bytes());
        data
    }

    #[test]
    fn test_parse_version2() {
        let control = LzxcControl::parse(&control_bytes(2, 2, 2)).unwrap();
        assert_eq!(control.reset_interval, 2);
        assert_eq!(control.window_bits, 16);
    }

    #[test]
    fn test_parse_version1_in_bytes() {
        let control = LzxcControl::parse(&control_bytes(1, 0x10000, 0x10000)).unwrap();
        assert_eq!(control.reset_interval, 2);
        assert_eq!(control.window_bits, 16);
    }

    #[test]
    fn test_bad_magic() {
        let mut data = control_bytes(2, 2, 2);
        data[4] = b'X';
        assert!(matches!(
            LzxcControl::parse(&data),
            Err(CabrioletError::Signature { .. })
        ));
    }

    #[test]
    fn test_range_decode_with_reset_interval() {
        // A section written frame-independently decodes through the
        // reset-interval path, including mid-section offsets.
        let section: Vec<u8> = (0..100_000u32).map(|i| (i * 31 % 251) as u8).collect();
        let mut packed = Vec::new();
        for chunk in section.chunks(0x8000) {
            let mut enc = LzxCompressor::new(16, LzxWriteMode::Verbatim).unwrap();
            packed.extend_from_slice(&enc.compress_block(chunk).unwrap());
        }
        let control = LzxcControl::parse(&control_bytes(2, 1, 2)).unwrap();

        let mut out = Vec::new();
        let n = decompress_range(
            Cursor::new(packed),
            control,
            section.len() as u64,
            40_000,
            5_000,
            &mut out,
        )
        .unwrap();
        assert_eq!(n, 5_000);
        assert_eq!(out[..], section[40_000..45_000]);
    }
}
