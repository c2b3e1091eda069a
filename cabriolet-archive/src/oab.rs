//! Offline Address Book (OAB) compressed files.
//!
//! A full OAB download opens with version words {3, 1}, the maximum block
//! size and the total uncompressed size, then a sequence of blocks each
//! headed by flags (0 = stored, 1 = LZX), compressed and uncompressed
//! sizes, and a CRC-32 of the uncompressed content. Every compressed
//! block is an independent LZX stream whose window covers the block size.

use crate::factory::{CodecFactory, CodecKind, CodecOptions};
use cabriolet_core::crc::Crc32;
use cabriolet_core::error::{CabrioletError, Result};
use cabriolet_core::traits::Decompressor;
use std::io::{Read, Write};

/// High version word opening a full OAB file.
pub const VERSION_HI: u32 = 3;
/// Low version word opening a full OAB file.
pub const VERSION_LO: u32 = 1;

/// Parsed OAB file header.
#[derive(Debug, Clone, Copy)]
pub struct OabHeader {
    /// Largest uncompressed block in the file.
    pub block_max: u32,
    /// Total uncompressed size.
    pub target_size: u32,
}

impl OabHeader {
    /// Parse the 16-byte header.
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; 16];
        reader.read_exact(&mut buf)?;
        let hi = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let lo = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        if (hi, lo) != (VERSION_HI, VERSION_LO) {
            return Err(CabrioletError::format(format!(
                "unsupported OAB version {hi}.{lo}"
            )));
        }
        let block_max = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let target_size = u32::from_le_bytes(buf[12..16].try_into().unwrap());
        if block_max == 0 {
            return Err(CabrioletError::format("OAB block size of zero"));
        }
        Ok(Self {
            block_max,
            target_size,
        })
    }

    /// The LZX window exponent covering `block_max`.
    pub fn window_bits(&self) -> u32 {
        let bits = 32 - (self.block_max - 1).leading_zeros();
        bits.clamp(15, 21)
    }
}

/// Decompress a full OAB file, verifying each block's CRC-32.
pub fn read<R: Read>(mut reader: R, out: &mut dyn Write) -> Result<u64> {
    let header = OabHeader::parse(&mut reader)?;
    let factory = CodecFactory::global();
    let mut total = 0u64;

    while total < u64::from(header.target_size) {
        let mut head = [0u8; 16];
        reader.read_exact(&mut head)?;
        let flags = u32::from_le_bytes(head[0..4].try_into().unwrap());
        let compressed = u32::from_le_bytes(head[4..8].try_into().unwrap());
        let uncompressed = u32::from_le_bytes(head[8..12].try_into().unwrap());
        let crc = u32::from_le_bytes(head[12..16].try_into().unwrap());

        if uncompressed > header.block_max {
            return Err(CabrioletError::format(format!(
                "OAB block of {uncompressed} bytes exceeds the declared maximum {}",
                header.block_max
            )));
        }
        let mut payload = vec![0u8; compressed as usize];
        reader.read_exact(&mut payload)?;

        let block = match flags {
            0 => {
                if compressed != uncompressed {
                    return Err(CabrioletError::format(
                        "stored OAB block sizes do not agree",
                    ));
                }
                payload
            }
            1 => {
                let mut codec = factory.decompressor(
                    CodecKind::Lzx {
                        window_bits: header.window_bits(),
                    },
                    std::io::Cursor::new(payload),
                    CodecOptions::default(),
                )?;
                codec.set_output_length(u64::from(uncompressed));
                let mut block = Vec::with_capacity(uncompressed as usize);
                let produced = codec.decompress(&mut block, u64::from(uncompressed))?;
                if produced != u64::from(uncompressed) {
                    return Err(CabrioletError::decompress(
                        "OAB block shorter than its header claims",
                    ));
                }
                block
            }
            other => {
                return Err(CabrioletError::unsupported(format!(
                    "OAB block flags {other:#x}"
                )));
            }
        };

        let computed = Crc32::compute(&block);
        if computed != crc {
            return Err(CabrioletError::checksum(crc, computed));
        }
        out.write_all(&block)?;
        total += block.len() as u64;
    }
    Ok(total)
}

/// Write a full OAB file from `data`, storing blocks raw (flags 0).
///
/// Stored blocks are always valid OAB; compressed writing follows the LZX
/// write path once a consumer needs it.
pub fn write<W: Write>(out: &mut W, data: &[u8], block_max: u32) -> Result<()> {
    if block_max == 0 {
        return Err(CabrioletError::argument("OAB block size must be nonzero"));
    }
    out.write_all(&VERSION_HI.to_le_bytes())?;
    out.write_all(&VERSION_LO.to_le_bytes())?;
    out.write_all(&block_max.to_le_bytes())?;
    out.write_all(&(data.len() as u32).to_le_bytes())?;
    for chunk in data.chunks(block_max as usize) {
        out.write_all(&0u32.to_le_bytes())?;
        out.write_all(&(chunk.len() as u32).to_le_bytes())?;
        out.write_all(&(chunk.len() as u32).to_le_bytes())?;
        out.write_all(&Crc32::compute(chunk).to_le_bytes())?;
        out.write_all(chunk)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cabriolet_core::traits::BlockCompressor;
    use cabriolet_lzx::{LzxCompressor, LzxWriteMode};
    use std::io::Cursor;

    #[test]
    fn test_stored_roundtrip() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut packed = Vec::new();
        write(&mut packed, &data, 4096).unwrap();

        let mut out = Vec::new();
        let n = read(Cursor::new(packed), &mut out).unwrap();
        assert_eq!(n, data.len() as u64);
        assert_eq!(out, data);
    }

    #[test]
    fn test_lzx_block() {
        // Hand-assemble a one-block compressed OAB.
        let block: Vec<u8> = b"oab oab oab oab ".repeat(100);
        let mut enc = LzxCompressor::new(15, LzxWriteMode::Verbatim).unwrap();
        let payload = enc.compress_block(&block).unwrap();

        let mut packed = Vec::new();
        packed.extend_from_slice(&VERSION_HI.to_le_bytes());
        packed.extend_from_slice(&VERSION_LO.to_le_bytes());
        packed.extend_from_slice(&32768u32.to_le_bytes());
        packed.extend_from_slice(&(block.len() as u32).to_le_bytes());
        packed.extend_from_slice(&1u32.to_le_bytes());
        packed.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        packed.extend_from_slice(&(block.len() as u32).to_le_bytes());
        packed.extend_from_slice(&Crc32::compute(&block).to_le_bytes());
        packed.extend_from_slice(&payload);

        let mut out = Vec::new();
        read(Cursor::new(packed), &mut out).unwrap();
        assert_eq!(out, block);
    }

    #[test]
    fn test_crc_mismatch() {
        let data = vec![7u8; 100];
        let mut packed = Vec::new();
        write(&mut packed, &data, 4096).unwrap();
        let last = packed.len() - 1;
        packed[last] ^= 0xFF;

        let mut out = Vec::new();
        assert!(matches!(
            read(Cursor::new(packed), &mut out),
            Err(CabrioletError::Checksum { .. })
        ));
    }

    #[test]
    fn test_bad_version() {
        let mut packed = vec![0u8; 16];
        packed[0] = 9;
        let mut out = Vec::new();
        assert!(matches!(
            read(Cursor::new(packed), &mut out),
            Err(CabrioletError::Format { .. })
        ));
    }
}
