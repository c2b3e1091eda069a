//! The algorithm factory.
//!
//! Containers name their codecs by a small numeric code (the low nibble of
//! the CAB compression word); the factory normalises those codes into
//! [`CodecKind`] values and constructs boxed codec states, so container
//! code never names a concrete codec type. A process-wide instance is
//! available as a convenience, but everything also works with an explicit
//! factory value.

use cabriolet_core::error::{CabrioletError, Result};
use cabriolet_core::traits::{BlockCompressor, Decompressor};
use cabriolet_lzss::{lzss_compress, LzssDecoder, LzssMode};
use cabriolet_lzx::{LzxCompressor, LzxDecoder, LzxOptions, LzxWriteMode};
use cabriolet_mszip::{MszipCompressor, MszipDecoder, MszipOptions};
use cabriolet_quantum::{QuantumCompressor, QuantumDecoder, QuantumOptions};
use std::io::{Read, Write};
use std::sync::OnceLock;

/// A normalised compression method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    /// Stored.
    None,
    /// MSZIP (`CK`-framed DEFLATE).
    Mszip,
    /// Quantum with its window parameter.
    Quantum {
        /// Window size exponent, 10..=21.
        window_bits: u32,
    },
    /// LZX with its window parameter.
    Lzx {
        /// Window size exponent, 15..=21.
        window_bits: u32,
    },
}

impl CodecKind {
    /// Parse a CAB `CFFOLDER` compression word (`kind | param << 8`).
    pub fn from_cab_word(word: u16) -> Result<Self> {
        let param = u32::from((word >> 8) & 0x1F);
        match word & 0x000F {
            0 => Ok(CodecKind::None),
            1 => Ok(CodecKind::Mszip),
            2 => Ok(CodecKind::Quantum { window_bits: param }),
            3 => Ok(CodecKind::Lzx { window_bits: param }),
            other => Err(CabrioletError::unsupported(format!(
                "compression kind {other}"
            ))),
        }
    }

    /// Encode back into a CAB compression word.
    pub fn to_cab_word(self) -> u16 {
        match self {
            CodecKind::None => 0,
            CodecKind::Mszip => 1,
            CodecKind::Quantum { window_bits } => 2 | ((window_bits as u16 & 0x1F) << 8),
            CodecKind::Lzx { window_bits } => 3 | ((window_bits as u16 & 0x1F) << 8),
        }
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            CodecKind::None => "none",
            CodecKind::Mszip => "mszip",
            CodecKind::Quantum { .. } => "quantum",
            CodecKind::Lzx { .. } => "lzx",
        }
    }
}

/// Options threaded from container to codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecOptions {
    /// Treat EOF as an infinite zero tail and keep going past damage.
    pub salvage: bool,
    /// MSZIP: zero-pad damaged frames and resume at the next signature.
    pub fix_mszip: bool,
    /// LZX: forced state reset every N frames (CHM).
    pub reset_interval: u32,
}

/// Which side of a codec is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Category {
    /// A [`BlockCompressor`].
    Compress,
    /// A [`Decompressor`].
    Decompress,
}

/// Constructs codec states from normalised kinds.
#[derive(Debug, Default)]
pub struct CodecFactory {
    _private: (),
}

impl CodecFactory {
    /// An explicit factory value.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide convenience instance.
    pub fn global() -> &'static CodecFactory {
        static GLOBAL: OnceLock<CodecFactory> = OnceLock::new();
        GLOBAL.get_or_init(CodecFactory::new)
    }

    /// Construct a decompressor over `reader`.
    pub fn decompressor<'r, R: Read + 'r>(
        &self,
        kind: CodecKind,
        reader: R,
        options: CodecOptions,
    ) -> Result<Box<dyn Decompressor + 'r>> {
        match kind {
            CodecKind::None => Ok(Box::new(StoredDecoder::new(reader))),
            CodecKind::Mszip => Ok(Box::new(MszipDecoder::new(
                reader,
                MszipOptions {
                    salvage: options.salvage,
                    fix_mszip: options.fix_mszip,
                },
            ))),
            CodecKind::Lzx { window_bits } => Ok(Box::new(LzxDecoder::new(
                reader,
                window_bits,
                LzxOptions {
                    reset_interval: options.reset_interval,
                    salvage: options.salvage,
                },
            )?)),
            CodecKind::Quantum { window_bits } => Ok(Box::new(QuantumDecoder::new(
                reader,
                window_bits,
                QuantumOptions {
                    salvage: options.salvage,
                },
            )?)),
        }
    }

    /// Construct a block compressor.
    pub fn compressor(&self, kind: CodecKind) -> Result<Box<dyn BlockCompressor>> {
        match kind {
            CodecKind::None => Ok(Box::new(StoredCompressor)),
            CodecKind::Mszip => Ok(Box::new(MszipCompressor::new())),
            CodecKind::Lzx { window_bits } => Ok(Box::new(LzxCompressor::new(
                window_bits,
                LzxWriteMode::Verbatim,
            )?)),
            CodecKind::Quantum { window_bits } => {
                Ok(Box::new(QuantumCompressor::new(window_bits)?))
            }
        }
    }

    /// Single-file LZSS helpers route through here too, for symmetry with
    /// the numeric kinds.
    pub fn lzss_decompressor<'r, R: Read + 'r>(
        &self,
        reader: R,
        mode: LzssMode,
    ) -> Box<dyn Decompressor + 'r> {
        Box::new(LzssDecoder::new(reader, mode))
    }

    /// One-shot LZSS compression.
    pub fn lzss_compress(&self, data: &[u8], mode: LzssMode) -> Vec<u8> {
        lzss_compress(data, mode)
    }
}

/// Passthrough "codec" for stored folders.
pub struct StoredDecoder<R> {
    reader: R,
}

impl<R: Read> StoredDecoder<R> {
    /// Create a passthrough decoder.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read> Decompressor for StoredDecoder<R> {
    fn decompress(&mut self, out: &mut dyn Write, len: u64) -> Result<u64> {
        let mut copied = 0u64;
        let mut buf = [0u8; 8192];
        while copied < len {
            let want = ((len - copied) as usize).min(buf.len());
            let got = self.reader.read(&mut buf[..want])?;
            if got == 0 {
                break;
            }
            out.write_all(&buf[..got])?;
            copied += got as u64;
        }
        Ok(copied)
    }

    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Identity block compressor for stored folders.
pub struct StoredCompressor;

impl BlockCompressor for StoredCompressor {
    fn compress_block(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        Ok(chunk.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_cab_word_roundtrip() {
        assert_eq!(CodecKind::from_cab_word(0x0000).unwrap(), CodecKind::None);
        assert_eq!(CodecKind::from_cab_word(0x0001).unwrap(), CodecKind::Mszip);
        assert_eq!(
            CodecKind::from_cab_word(0x0F03).unwrap(),
            CodecKind::Lzx { window_bits: 15 }
        );
        assert_eq!(
            CodecKind::from_cab_word(0x1202).unwrap(),
            CodecKind::Quantum { window_bits: 18 }
        );
        for kind in [
            CodecKind::None,
            CodecKind::Mszip,
            CodecKind::Lzx { window_bits: 21 },
            CodecKind::Quantum { window_bits: 10 },
        ] {
            assert_eq!(CodecKind::from_cab_word(kind.to_cab_word()).unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_is_unsupported() {
        let err = CodecKind::from_cab_word(0x0009).unwrap_err();
        assert!(matches!(err, CabrioletError::Unsupported { .. }));
    }

    #[test]
    fn test_bad_window_is_argument_error() {
        let factory = CodecFactory::new();
        let result = factory.decompressor(
            CodecKind::Lzx { window_bits: 3 },
            Cursor::new(Vec::new()),
            CodecOptions::default(),
        );
        let err = match result {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, CabrioletError::Argument { .. }));
    }

    #[test]
    fn test_stored_passthrough() {
        let factory = CodecFactory::global();
        let mut dec = factory
            .decompressor(
                CodecKind::None,
                Cursor::new(b"stored bytes".to_vec()),
                CodecOptions::default(),
            )
            .unwrap();
        let mut out = Vec::new();
        assert_eq!(dec.decompress(&mut out, 12).unwrap(), 12);
        assert_eq!(out, b"stored bytes");
    }
}
