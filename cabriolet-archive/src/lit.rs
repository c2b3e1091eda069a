//! Microsoft Reader (LIT) reading.
//!
//! LIT is an ITOL/ITLS container: an `ITOLITLS` signature, a version, and
//! a table of header pieces locating the directory and data sections.
//! This module parses that outer shell and decompresses unencrypted LZX
//! content through the same reset-interval path CHM uses. DRM-protected
//! content is refused (DES decryption is out of scope), and LIT writing is
//! not offered.

use crate::chm::LzxcControl;
use cabriolet_core::error::{CabrioletError, Result};
use std::io::{Read, Seek, SeekFrom, Write};

/// LIT signature.
pub const SIGNATURE: [u8; 8] = *b"ITOLITLS";

/// Number of header pieces in version-1 files.
pub const NUM_PIECES: usize = 5;

/// One header piece: an absolute span within the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    /// Absolute offset.
    pub offset: u64,
    /// Length in bytes.
    pub size: u64,
}

/// The parsed outer shell of a LIT file.
#[derive(Debug, Clone)]
pub struct LitFile {
    /// Format version.
    pub version: u32,
    /// Total header length.
    pub header_len: u32,
    /// The five header pieces.
    pub pieces: Vec<Piece>,
}

impl LitFile {
    /// Parse the primary header.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let mut head = [0u8; 24];
        reader.read_exact(&mut head)?;
        if head[0..8] != SIGNATURE {
            return Err(CabrioletError::signature(
                SIGNATURE.to_vec(),
                head[0..8].to_vec(),
            ));
        }
        let version = u32::from_le_bytes(head[8..12].try_into().unwrap());
        if version != 1 {
            return Err(CabrioletError::format(format!(
                "unsupported LIT version {version}"
            )));
        }
        let header_len = u32::from_le_bytes(head[12..16].try_into().unwrap());
        let num_pieces = u32::from_le_bytes(head[16..20].try_into().unwrap()) as usize;
        if num_pieces != NUM_PIECES {
            return Err(CabrioletError::format(format!(
                "expected {NUM_PIECES} header pieces, found {num_pieces}"
            )));
        }
        // head[20..24] is the secondary header length; the piece table
        // follows immediately.
        let mut pieces = Vec::with_capacity(num_pieces);
        for _ in 0..num_pieces {
            let mut entry = [0u8; 16];
            reader.read_exact(&mut entry)?;
            pieces.push(Piece {
                offset: u64::from_le_bytes(entry[0..8].try_into().unwrap()),
                size: u64::from_le_bytes(entry[8..16].try_into().unwrap()),
            });
        }
        Ok(Self {
            version,
            header_len,
            pieces,
        })
    }

    /// Load one header piece's raw bytes.
    pub fn read_piece<R: Read + Seek>(&self, reader: &mut R, index: usize) -> Result<Vec<u8>> {
        let piece = self
            .pieces
            .get(index)
            .ok_or_else(|| CabrioletError::argument(format!("no header piece {index}")))?;
        reader.seek(SeekFrom::Start(piece.offset))?;
        let mut bytes = vec![0u8; piece.size as usize];
        reader.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    /// Decompress an unencrypted LZX content span.
    ///
    /// `control` comes from the section's control data (same layout as
    /// CHM's `LZXC`). Encrypted sections must be refused by the caller
    /// before reaching this point; there is no DRM support.
    pub fn decompress_content<R: Read + Seek>(
        &self,
        reader: &mut R,
        content_offset: u64,
        control: LzxcControl,
        section_length: u64,
        out: &mut dyn Write,
    ) -> Result<u64> {
        reader.seek(SeekFrom::Start(content_offset))?;
        crate::chm::decompress_range(reader, control, section_length, 0, section_length, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn minimal_lit() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&SIGNATURE);
        bytes.extend_from_slice(&1u32.to_le_bytes()); // version
        bytes.extend_from_slice(&0x68u32.to_le_bytes()); // header length
        bytes.extend_from_slice(&(NUM_PIECES as u32).to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes()); // secondary header len
        for i in 0..NUM_PIECES as u64 {
            bytes.extend_from_slice(&(0x68 + i * 16).to_le_bytes());
            bytes.extend_from_slice(&16u64.to_le_bytes());
        }
        bytes.resize(0x68 + NUM_PIECES * 16, 0xAB);
        bytes
    }

    #[test]
    fn test_parse_shell() {
        let lit = LitFile::parse(&mut Cursor::new(minimal_lit())).unwrap();
        assert_eq!(lit.version, 1);
        assert_eq!(lit.pieces.len(), NUM_PIECES);
        assert_eq!(lit.pieces[0].offset, 0x68);
        assert_eq!(lit.pieces[4].size, 16);
    }

    #[test]
    fn test_read_piece() {
        let bytes = minimal_lit();
        let lit = LitFile::parse(&mut Cursor::new(bytes.clone())).unwrap();
        let piece = lit.read_piece(&mut Cursor::new(bytes), 2).unwrap();
        assert_eq!(piece, vec![0xAB; 16]);
    }

    #[test]
    fn test_bad_signature() {
        let err = LitFile::parse(&mut Cursor::new(vec![0u8; 128])).unwrap_err();
        assert!(matches!(err, CabrioletError::Signature { .. }));
    }

    #[test]
    fn test_wrong_version() {
        let mut bytes = minimal_lit();
        bytes[8] = 9;
        let err = LitFile::parse(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, CabrioletError::Format { .. }));
    }
}
