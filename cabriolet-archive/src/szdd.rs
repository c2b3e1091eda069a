//! SZDD single-file compression (`COMPRESS.EXE` / `EXPAND.EXE`).
//!
//! Two signature families share the format: the standard `SZDD` header
//! carries a compression-mode byte, a "missing character" (the last letter
//! of the original file name, replaced by `_` on disk) and the
//! uncompressed length; the QBasic `SZ` variant goes straight to the
//! length. Both carry an LZSS stream after the header — the standard one
//! in Expand mode, the QBasic one in its own dialect.

use cabriolet_core::error::{CabrioletError, Result};
use cabriolet_core::traits::Decompressor;
use cabriolet_lzss::{lzss_compress, LzssDecoder, LzssMode};
use std::io::{Read, Write};

/// Standard signature.
pub const SIGNATURE: [u8; 8] = [0x53, 0x5A, 0x44, 0x44, 0x88, 0xF0, 0x27, 0x33];
/// QBasic variant signature.
pub const SIGNATURE_QBASIC: [u8; 8] = [0x53, 0x5A, 0x20, 0x88, 0xF0, 0x27, 0x33, 0xD1];

/// The compression-mode byte every standard SZDD carries.
const COMP_MODE_A: u8 = 0x41;

/// Which header family a stream uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SzddVariant {
    /// Standard `SZDD`.
    Standard,
    /// QBasic `SZ`.
    QBasic,
}

/// A parsed SZDD header.
#[derive(Debug, Clone)]
pub struct SzddFile {
    /// Header family.
    pub variant: SzddVariant,
    /// The character the on-disk name replaced with `_` (standard only).
    pub missing_char: Option<u8>,
    /// Uncompressed length.
    pub length: u32,
}

impl SzddFile {
    /// Parse a header from `reader`, leaving it positioned at the LZSS
    /// stream.
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        let variant = if magic == SIGNATURE {
            SzddVariant::Standard
        } else if magic == SIGNATURE_QBASIC {
            SzddVariant::QBasic
        } else {
            return Err(CabrioletError::signature(SIGNATURE.to_vec(), magic.to_vec()));
        };

        match variant {
            SzddVariant::Standard => {
                let mut fields = [0u8; 6];
                reader.read_exact(&mut fields)?;
                if fields[0] != COMP_MODE_A {
                    return Err(CabrioletError::format(format!(
                        "unknown SZDD compression mode {:#04x}",
                        fields[0]
                    )));
                }
                let missing = fields[1];
                let length = u32::from_le_bytes(fields[2..6].try_into().unwrap());
                Ok(Self {
                    variant,
                    missing_char: (missing != 0).then_some(missing),
                    length,
                })
            }
            SzddVariant::QBasic => {
                let mut fields = [0u8; 4];
                reader.read_exact(&mut fields)?;
                Ok(Self {
                    variant,
                    missing_char: None,
                    length: u32::from_le_bytes(fields),
                })
            }
        }
    }

    /// The LZSS dialect of the payload.
    pub fn mode(&self) -> LzssMode {
        match self.variant {
            SzddVariant::Standard => LzssMode::Expand,
            SzddVariant::QBasic => LzssMode::QBasic,
        }
    }

    /// Restore an on-disk name's replaced final character, if recorded
    /// (`SETUP.EX_` -> `SETUP.EXE`).
    pub fn restore_name(&self, name: &str) -> String {
        match self.missing_char {
            Some(ch) if name.ends_with('_') => {
                let mut restored = name[..name.len() - 1].to_string();
                restored.push(char::from(ch));
                restored
            }
            _ => name.to_string(),
        }
    }
}

/// Decompress a whole SZDD stream.
pub fn read<R: Read>(mut reader: R) -> Result<(SzddFile, Vec<u8>)> {
    let header = SzddFile::parse(&mut reader)?;
    let mut decoder = LzssDecoder::new(reader, header.mode());
    decoder.set_output_length(u64::from(header.length));
    let mut out = Vec::with_capacity(header.length as usize);
    let produced = decoder.decompress(&mut out, u64::from(header.length))?;
    if produced < u64::from(header.length) {
        return Err(CabrioletError::decompress(format!(
            "SZDD stream ended at {produced} of {} bytes",
            header.length
        )));
    }
    Ok((header, out))
}

/// Decompress, tolerating truncation (salvage).
pub fn read_salvage<R: Read>(mut reader: R) -> Result<(SzddFile, Vec<u8>)> {
    let header = SzddFile::parse(&mut reader)?;
    let mut decoder = LzssDecoder::new(reader, header.mode());
    decoder.set_output_length(u64::from(header.length));
    let mut out = Vec::new();
    decoder.decompress(&mut out, u64::from(header.length))?;
    Ok((header, out))
}

/// Compress `data` into a standard SZDD stream.
pub fn write<W: Write>(out: &mut W, data: &[u8], missing_char: Option<u8>) -> Result<()> {
    out.write_all(&SIGNATURE)?;
    out.write_all(&[COMP_MODE_A, missing_char.unwrap_or(0)])?;
    out.write_all(&(data.len() as u32).to_le_bytes())?;
    out.write_all(&lzss_compress(data, LzssMode::Expand))?;
    Ok(())
}

/// Compress `data` into a QBasic `SZ` stream.
pub fn write_qbasic<W: Write>(out: &mut W, data: &[u8]) -> Result<()> {
    out.write_all(&SIGNATURE_QBASIC)?;
    out.write_all(&(data.len() as u32).to_le_bytes())?;
    out.write_all(&lzss_compress(data, LzssMode::QBasic))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_roundtrip_standard() {
        let data = b"szdd szdd szdd szdd compress me".repeat(30);
        let mut packed = Vec::new();
        write(&mut packed, &data, Some(b'E')).unwrap();

        let (header, out) = read(Cursor::new(packed)).unwrap();
        assert_eq!(header.variant, SzddVariant::Standard);
        assert_eq!(header.length as usize, data.len());
        assert_eq!(out, data);
        assert_eq!(header.restore_name("SETUP.EX_"), "SETUP.EXE");
    }

    #[test]
    fn test_roundtrip_qbasic() {
        let data = b"qbasic qbasic qbasic".repeat(20);
        let mut packed = Vec::new();
        write_qbasic(&mut packed, &data).unwrap();

        let (header, out) = read(Cursor::new(packed)).unwrap();
        assert_eq!(header.variant, SzddVariant::QBasic);
        assert_eq!(out, data);
    }

    #[test]
    fn test_bad_signature() {
        let err = read(Cursor::new(vec![0u8; 32])).unwrap_err();
        assert!(matches!(err, CabrioletError::Signature { .. }));
    }

    #[test]
    fn test_truncated_is_salvageable() {
        let data = b"salvage salvage salvage salvage".repeat(40);
        let mut packed = Vec::new();
        write(&mut packed, &data, None).unwrap();
        packed.truncate(packed.len() / 2);

        assert!(read(Cursor::new(packed.clone())).is_err());
        let (_, partial) = read_salvage(Cursor::new(packed)).unwrap();
        assert_eq!(partial[..], data[..partial.len()]);
    }
}
