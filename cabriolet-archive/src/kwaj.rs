//! KWAJ single-file compression.
//!
//! A 14-byte base header names the compression method and where the data
//! starts; flag bits gate optional fields (uncompressed length, two
//! unknown words, the original file name and extension, free text) that
//! sit between the base header and the payload.

use cabriolet_core::error::{CabrioletError, Result};
use cabriolet_core::traits::Decompressor;
use cabriolet_lzss::{lzss_compress, LzssDecoder, LzssMode};
use cabriolet_mszip::{MszipDecoder, MszipOptions};
use std::io::{Read, Seek, SeekFrom, Write};

/// KWAJ signature.
pub const SIGNATURE: [u8; 8] = [0x4B, 0x57, 0x41, 0x4A, 0x88, 0xF0, 0x27, 0xD1];

/// Optional-field flag: uncompressed length present.
pub const FLAG_HAS_LENGTH: u16 = 0x0001;
/// Optional-field flag: unknown purpose, one u16.
pub const FLAG_HAS_UNKNOWN1: u16 = 0x0002;
/// Optional-field flag: unknown purpose, length-prefixed bytes.
pub const FLAG_HAS_UNKNOWN2: u16 = 0x0004;
/// Optional-field flag: original file name present.
pub const FLAG_HAS_FILENAME: u16 = 0x0008;
/// Optional-field flag: original extension present.
pub const FLAG_HAS_EXTENSION: u16 = 0x0010;
/// Optional-field flag: arbitrary extra text present.
pub const FLAG_HAS_EXTRA_TEXT: u16 = 0x0020;

/// KWAJ compression methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KwajMethod {
    /// Stored.
    None,
    /// Every byte XORed with 0xFF.
    Xor,
    /// SZDD-style LZSS.
    Lzss,
    /// LZ + Huffman (not implemented here).
    Lzh,
    /// MSZIP `CK` frames.
    Mszip,
}

impl KwajMethod {
    fn from_u16(value: u16) -> Result<Self> {
        match value {
            0 => Ok(KwajMethod::None),
            1 => Ok(KwajMethod::Xor),
            2 => Ok(KwajMethod::Lzss),
            3 => Ok(KwajMethod::Lzh),
            4 => Ok(KwajMethod::Mszip),
            other => Err(CabrioletError::unsupported(format!(
                "KWAJ compression method {other}"
            ))),
        }
    }

    fn to_u16(self) -> u16 {
        match self {
            KwajMethod::None => 0,
            KwajMethod::Xor => 1,
            KwajMethod::Lzss => 2,
            KwajMethod::Lzh => 3,
            KwajMethod::Mszip => 4,
        }
    }
}

/// A parsed KWAJ header.
#[derive(Debug, Clone)]
pub struct KwajFile {
    /// Compression method of the payload.
    pub method: KwajMethod,
    /// Absolute offset of the payload.
    pub data_offset: u16,
    /// Raw flag word.
    pub flags: u16,
    /// Uncompressed length, when recorded.
    pub length: Option<u32>,
    /// Original file name, when recorded.
    pub filename: Option<String>,
    /// Original extension, when recorded.
    pub extension: Option<String>,
    /// Extra text, when recorded.
    pub extra_text: Option<Vec<u8>>,
}

impl KwajFile {
    /// Parse a header, leaving `reader` positioned at the payload.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let mut base = [0u8; 14];
        reader.read_exact(&mut base)?;
        if base[0..8] != SIGNATURE {
            return Err(CabrioletError::signature(
                SIGNATURE.to_vec(),
                base[0..8].to_vec(),
            ));
        }
        let method = KwajMethod::from_u16(u16::from_le_bytes(base[8..10].try_into().unwrap()))?;
        let data_offset = u16::from_le_bytes(base[10..12].try_into().unwrap());
        let flags = u16::from_le_bytes(base[12..14].try_into().unwrap());

        let mut length = None;
        let mut filename = None;
        let mut extension = None;
        let mut extra_text = None;

        if flags & FLAG_HAS_LENGTH != 0 {
            let mut buf = [0u8; 4];
            reader.read_exact(&mut buf)?;
            length = Some(u32::from_le_bytes(buf));
        }
        if flags & FLAG_HAS_UNKNOWN1 != 0 {
            let mut buf = [0u8; 2];
            reader.read_exact(&mut buf)?;
        }
        if flags & FLAG_HAS_UNKNOWN2 != 0 {
            let mut buf = [0u8; 2];
            reader.read_exact(&mut buf)?;
            let skip = u16::from_le_bytes(buf);
            std::io::copy(
                &mut reader.by_ref().take(u64::from(skip)),
                &mut std::io::sink(),
            )?;
        }
        if flags & FLAG_HAS_FILENAME != 0 {
            filename = Some(read_short_string(reader, 9)?);
        }
        if flags & FLAG_HAS_EXTENSION != 0 {
            extension = Some(read_short_string(reader, 4)?);
        }
        if flags & FLAG_HAS_EXTRA_TEXT != 0 {
            let mut buf = [0u8; 2];
            reader.read_exact(&mut buf)?;
            let len = u16::from_le_bytes(buf);
            let mut text = vec![0u8; usize::from(len)];
            reader.read_exact(&mut text)?;
            extra_text = Some(text);
        }

        reader.seek(SeekFrom::Start(u64::from(data_offset)))?;
        Ok(Self {
            method,
            data_offset,
            flags,
            length,
            filename,
            extension,
            extra_text,
        })
    }

    /// The recorded original name, joined as `name.ext` where present.
    pub fn original_name(&self) -> Option<String> {
        match (&self.filename, &self.extension) {
            (Some(name), Some(ext)) => Some(format!("{name}.{ext}")),
            (Some(name), None) => Some(name.clone()),
            (None, Some(ext)) => Some(format!(".{ext}")),
            (None, None) => None,
        }
    }
}

fn read_short_string<R: Read>(reader: &mut R, max: usize) -> Result<String> {
    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];
    for _ in 0..=max {
        reader.read_exact(&mut byte)?;
        if byte[0] == 0 {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            return Ok(decoded.into_owned());
        }
        bytes.push(byte[0]);
    }
    Err(CabrioletError::parse("unterminated KWAJ header string"))
}

/// Decompress a whole KWAJ stream.
pub fn read<R: Read + Seek>(mut reader: R) -> Result<(KwajFile, Vec<u8>)> {
    let header = KwajFile::parse(&mut reader)?;
    let data = match header.method {
        KwajMethod::None => {
            let mut out = Vec::new();
            reader.read_to_end(&mut out)?;
            out
        }
        KwajMethod::Xor => {
            let mut out = Vec::new();
            reader.read_to_end(&mut out)?;
            for byte in &mut out {
                *byte ^= 0xFF;
            }
            out
        }
        KwajMethod::Lzss => {
            let mut decoder = LzssDecoder::new(reader, LzssMode::Expand);
            if let Some(length) = header.length {
                decoder.set_output_length(u64::from(length));
            }
            let mut out = Vec::new();
            decoder.decompress(&mut out, u64::MAX)?;
            out
        }
        KwajMethod::Mszip => {
            let length = header.length.ok_or_else(|| {
                CabrioletError::format("KWAJ MSZIP stream without a recorded length")
            })?;
            let mut decoder = MszipDecoder::new(reader, MszipOptions::default());
            decoder.set_output_length(u64::from(length));
            let mut out = Vec::new();
            decoder.decompress(&mut out, u64::from(length))?;
            out
        }
        KwajMethod::Lzh => {
            return Err(CabrioletError::unsupported(
                "KWAJ LZH compression (method 3)",
            ));
        }
    };
    if let Some(length) = header.length {
        if data.len() as u64 != u64::from(length) {
            return Err(CabrioletError::format(format!(
                "KWAJ length field says {length}, stream yielded {}",
                data.len()
            )));
        }
    }
    Ok((header, data))
}

/// Options for writing a KWAJ stream.
#[derive(Debug, Clone, Default)]
pub struct KwajWriteOptions {
    /// Record the uncompressed length.
    pub record_length: bool,
    /// Record the original name (up to 8 chars) and extension (up to 3).
    pub name: Option<(String, String)>,
}

/// Compress `data` into a KWAJ stream with method `None` or `Lzss`.
pub fn write<W: Write>(
    out: &mut W,
    data: &[u8],
    method: KwajMethod,
    options: &KwajWriteOptions,
) -> Result<()> {
    let payload = match method {
        KwajMethod::None => data.to_vec(),
        KwajMethod::Lzss => lzss_compress(data, LzssMode::Expand),
        other => {
            return Err(CabrioletError::unsupported(format!(
                "writing KWAJ method {:?}",
                other
            )));
        }
    };

    let mut flags = 0u16;
    let mut optional = Vec::new();
    if options.record_length {
        flags |= FLAG_HAS_LENGTH;
        optional.extend_from_slice(&(data.len() as u32).to_le_bytes());
    }
    if let Some((name, ext)) = &options.name {
        if name.len() > 8 || ext.len() > 3 {
            return Err(CabrioletError::argument(
                "KWAJ names are limited to 8.3 characters",
            ));
        }
        flags |= FLAG_HAS_FILENAME | FLAG_HAS_EXTENSION;
        optional.extend_from_slice(name.as_bytes());
        optional.push(0);
        optional.extend_from_slice(ext.as_bytes());
        optional.push(0);
    }

    let data_offset = (14 + optional.len()) as u16;
    out.write_all(&SIGNATURE)?;
    out.write_all(&method.to_u16().to_le_bytes())?;
    out.write_all(&data_offset.to_le_bytes())?;
    out.write_all(&flags.to_le_bytes())?;
    out.write_all(&optional)?;
    out.write_all(&payload)?;
    Ok(())
}
