//! CAB on-disk record layouts.
//!
//! Everything here is little-endian. `CFHEADER` is 36 fixed bytes, with an
//! optional 4-byte reserve extension and prev/next cabinet name strings;
//! `CFFOLDER` is 8 bytes plus folder reserve; `CFFILE` is 16 bytes plus a
//! NUL-terminated name; `CFDATA` is 8 bytes plus data reserve and payload.

use crate::factory::CodecKind;
use cabriolet_core::entry::{Attributes, DosDateTime};
use cabriolet_core::error::{CabrioletError, Result};
use std::io::{Read, Write};

/// Cabinet magic.
pub const MAGIC: [u8; 4] = *b"MSCF";

/// Expected format version.
pub const VERSION: (u8, u8) = (1, 3);

/// Header flag: previous cabinet present.
pub const FLAG_PREV_CABINET: u16 = 0x0001;
/// Header flag: next cabinet present.
pub const FLAG_NEXT_CABINET: u16 = 0x0002;
/// Header flag: reserve extension present.
pub const FLAG_RESERVE_PRESENT: u16 = 0x0004;

/// Folder-index sentinel: file continues from the previous cabinet.
pub const FOLDER_CONTINUED_FROM_PREV: u16 = 0xFFFD;
/// Folder-index sentinel: file continues into the next cabinet.
pub const FOLDER_CONTINUED_TO_NEXT: u16 = 0xFFFE;
/// Folder-index sentinel: both of the above.
pub const FOLDER_CONTINUED_PREV_AND_NEXT: u16 = 0xFFFF;

/// Fixed CFHEADER length.
pub const CFHEADER_SIZE: usize = 36;
/// Fixed CFFOLDER length (before reserve).
pub const CFFOLDER_SIZE: usize = 8;
/// Fixed CFFILE length (before the name).
pub const CFFILE_SIZE: usize = 16;
/// Fixed CFDATA length (before reserve and payload).
pub const CFDATA_SIZE: usize = 8;

/// Uncompressed bytes per data block.
pub const BLOCK_MAX: usize = 32768;
/// Compressed payload ceiling (the LZX worst case).
pub const COMPRESSED_BLOCK_MAX: usize = BLOCK_MAX + 6144;
/// Most blocks a folder may carry.
pub const FOLDER_MAX_BLOCKS: u32 = 0xFFFF;

/// Name and disk label of a neighbouring cabinet in a set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CabLink {
    /// The neighbouring cabinet's file name.
    pub cabinet: String,
    /// The distribution disk label.
    pub disk: String,
}

/// Per-area reserved byte counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReserveSizes {
    /// Bytes reserved after the header extension.
    pub header: u16,
    /// Bytes reserved after each `CFFOLDER`.
    pub folder: u8,
    /// Bytes reserved after each `CFDATA` header.
    pub data: u8,
}

/// A parsed `CFHEADER` plus its optional extensions.
#[derive(Debug, Clone)]
pub struct CabHeader {
    /// Total cabinet size in bytes.
    pub cabinet_size: u32,
    /// Offset of the first `CFFILE`.
    pub files_offset: u32,
    /// Format version (major, minor).
    pub version: (u8, u8),
    /// Number of folders.
    pub num_folders: u16,
    /// Number of files.
    pub num_files: u16,
    /// Header flags.
    pub flags: u16,
    /// Set identifier shared by a multi-part set.
    pub set_id: u16,
    /// Index of this cabinet within its set.
    pub cabinet_index: u16,
    /// Reserved-area sizes (all zero without `FLAG_RESERVE_PRESENT`).
    pub reserve: ReserveSizes,
    /// Previous cabinet link.
    pub prev: Option<CabLink>,
    /// Next cabinet link.
    pub next: Option<CabLink>,
}

impl CabHeader {
    /// Parse a header from `reader`.
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; CFHEADER_SIZE];
        reader.read_exact(&mut buf)?;

        if buf[0..4] != MAGIC {
            return Err(CabrioletError::signature(MAGIC.to_vec(), buf[0..4].to_vec()));
        }
        let cabinet_size = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let files_offset = u32::from_le_bytes(buf[16..20].try_into().unwrap());
        let version = (buf[25], buf[24]);
        let num_folders = u16::from_le_bytes(buf[26..28].try_into().unwrap());
        let num_files = u16::from_le_bytes(buf[28..30].try_into().unwrap());
        let flags = u16::from_le_bytes(buf[30..32].try_into().unwrap());
        let set_id = u16::from_le_bytes(buf[32..34].try_into().unwrap());
        let cabinet_index = u16::from_le_bytes(buf[34..36].try_into().unwrap());

        if version != VERSION {
            return Err(CabrioletError::format(format!(
                "unsupported cabinet version {}.{}",
                version.0, version.1
            )));
        }
        if u64::from(files_offset) >= u64::from(cabinet_size) {
            return Err(CabrioletError::format(
                "file table offset beyond cabinet size",
            ));
        }

        let reserve = if flags & FLAG_RESERVE_PRESENT != 0 {
            let mut ext = [0u8; 4];
            reader.read_exact(&mut ext)?;
            let sizes = ReserveSizes {
                header: u16::from_le_bytes(ext[0..2].try_into().unwrap()),
                folder: ext[2],
                data: ext[3],
            };
            if sizes.header > 0 {
                std::io::copy(
                    &mut reader.by_ref().take(u64::from(sizes.header)),
                    &mut std::io::sink(),
                )?;
            }
            sizes
        } else {
            ReserveSizes::default()
        };

        let prev = if flags & FLAG_PREV_CABINET != 0 {
            Some(CabLink {
                cabinet: read_string(reader)?,
                disk: read_string(reader)?,
            })
        } else {
            None
        };
        let next = if flags & FLAG_NEXT_CABINET != 0 {
            Some(CabLink {
                cabinet: read_string(reader)?,
                disk: read_string(reader)?,
            })
        } else {
            None
        };

        Ok(Self {
            cabinet_size,
            files_offset,
            version,
            num_folders,
            num_files,
            flags,
            set_id,
            cabinet_index,
            reserve,
            prev,
            next,
        })
    }

    /// Emit the fixed 36 bytes plus extensions.
    pub fn emit<W: Write>(&self, out: &mut W) -> Result<()> {
        let mut buf = [0u8; CFHEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[8..12].copy_from_slice(&self.cabinet_size.to_le_bytes());
        buf[16..20].copy_from_slice(&self.files_offset.to_le_bytes());
        buf[24] = self.version.1;
        buf[25] = self.version.0;
        buf[26..28].copy_from_slice(&self.num_folders.to_le_bytes());
        buf[28..30].copy_from_slice(&self.num_files.to_le_bytes());
        buf[30..32].copy_from_slice(&self.flags.to_le_bytes());
        buf[32..34].copy_from_slice(&self.set_id.to_le_bytes());
        buf[34..36].copy_from_slice(&self.cabinet_index.to_le_bytes());
        out.write_all(&buf)?;

        if self.flags & FLAG_RESERVE_PRESENT != 0 {
            out.write_all(&self.reserve.header.to_le_bytes())?;
            out.write_all(&[self.reserve.folder, self.reserve.data])?;
            out.write_all(&vec![0u8; usize::from(self.reserve.header)])?;
        }
        if let Some(link) = &self.prev {
            write_string(out, &link.cabinet)?;
            write_string(out, &link.disk)?;
        }
        if let Some(link) = &self.next {
            write_string(out, &link.cabinet)?;
            write_string(out, &link.disk)?;
        }
        Ok(())
    }
}

/// A parsed `CFFOLDER`.
#[derive(Debug, Clone)]
pub struct CfFolder {
    /// Absolute offset of the folder's first `CFDATA`.
    pub data_offset: u32,
    /// Number of data blocks.
    pub num_blocks: u16,
    /// Compression kind and parameter.
    pub compression: CodecKind,
}

impl CfFolder {
    /// Parse one folder record.
    pub fn parse<R: Read>(reader: &mut R, reserve: u8) -> Result<Self> {
        let mut buf = [0u8; CFFOLDER_SIZE];
        reader.read_exact(&mut buf)?;
        let data_offset = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let num_blocks = u16::from_le_bytes(buf[4..6].try_into().unwrap());
        let word = u16::from_le_bytes(buf[6..8].try_into().unwrap());
        if reserve > 0 {
            std::io::copy(
                &mut reader.by_ref().take(u64::from(reserve)),
                &mut std::io::sink(),
            )?;
        }
        Ok(Self {
            data_offset,
            num_blocks,
            compression: CodecKind::from_cab_word(word)?,
        })
    }

    /// Emit one folder record.
    pub fn emit<W: Write>(&self, out: &mut W, reserve: u8) -> Result<()> {
        out.write_all(&self.data_offset.to_le_bytes())?;
        out.write_all(&self.num_blocks.to_le_bytes())?;
        out.write_all(&self.compression.to_cab_word().to_le_bytes())?;
        out.write_all(&vec![0u8; usize::from(reserve)])?;
        Ok(())
    }
}

/// A parsed `CFFILE`.
#[derive(Debug, Clone)]
pub struct CfFile {
    /// Uncompressed length.
    pub length: u32,
    /// Offset within the folder's uncompressed stream.
    pub offset: u32,
    /// Folder index, possibly a continuation sentinel.
    pub folder_index: u16,
    /// Timestamp.
    pub datetime: DosDateTime,
    /// Attribute word.
    pub attributes: Attributes,
    /// Decoded file name.
    pub name: String,
}

impl CfFile {
    /// Parse one file record.
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; CFFILE_SIZE];
        reader.read_exact(&mut buf)?;
        let length = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let offset = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let folder_index = u16::from_le_bytes(buf[8..10].try_into().unwrap());
        let date = u16::from_le_bytes(buf[10..12].try_into().unwrap());
        let time = u16::from_le_bytes(buf[12..14].try_into().unwrap());
        let attributes = Attributes(u16::from_le_bytes(buf[14..16].try_into().unwrap()));

        let raw_name = read_bytes_until_nul(reader)?;
        let name = if attributes.contains(Attributes::NAME_IS_UTF) {
            String::from_utf8(raw_name)
                .map_err(|_| CabrioletError::format("file name is not valid UTF-8"))?
        } else {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&raw_name);
            decoded.into_owned()
        };

        Ok(Self {
            length,
            offset,
            folder_index,
            datetime: DosDateTime { date, time },
            attributes,
            name,
        })
    }

    /// Emit one file record.
    pub fn emit<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_all(&self.length.to_le_bytes())?;
        out.write_all(&self.offset.to_le_bytes())?;
        out.write_all(&self.folder_index.to_le_bytes())?;
        out.write_all(&self.datetime.date.to_le_bytes())?;
        out.write_all(&self.datetime.time.to_le_bytes())?;
        out.write_all(&self.attributes.0.to_le_bytes())?;
        if self.attributes.contains(Attributes::NAME_IS_UTF) {
            out.write_all(self.name.as_bytes())?;
        } else {
            let (encoded, _, _) = encoding_rs::WINDOWS_1252.encode(&self.name);
            out.write_all(&encoded)?;
        }
        out.write_all(&[0])?;
        Ok(())
    }

    /// The emitted record length in bytes.
    pub fn emitted_len(&self) -> usize {
        let name_len = if self.attributes.contains(Attributes::NAME_IS_UTF) {
            self.name.len()
        } else {
            encoding_rs::WINDOWS_1252.encode(&self.name).0.len()
        };
        CFFILE_SIZE + name_len + 1
    }
}

/// A parsed `CFDATA` header (payload read separately).
#[derive(Debug, Clone, Copy)]
pub struct CfData {
    /// XOR-32 over reserve + payload, seeded with the size fields.
    pub checksum: u32,
    /// Payload length.
    pub compressed_size: u16,
    /// Uncompressed length (0 marks a split continuation block).
    pub uncompressed_size: u16,
}

impl CfData {
    /// Parse one data-block header.
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; CFDATA_SIZE];
        reader.read_exact(&mut buf)?;
        Ok(Self {
            checksum: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            compressed_size: u16::from_le_bytes(buf[4..6].try_into().unwrap()),
            uncompressed_size: u16::from_le_bytes(buf[6..8].try_into().unwrap()),
        })
    }

    /// Emit one data-block header.
    pub fn emit<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_all(&self.checksum.to_le_bytes())?;
        out.write_all(&self.compressed_size.to_le_bytes())?;
        out.write_all(&self.uncompressed_size.to_le_bytes())?;
        Ok(())
    }
}

fn read_bytes_until_nul<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        reader.read_exact(&mut byte)?;
        if byte[0] == 0 {
            return Ok(bytes);
        }
        if bytes.len() > 4096 {
            return Err(CabrioletError::parse("unterminated string in header"));
        }
        bytes.push(byte[0]);
    }
}

fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let bytes = read_bytes_until_nul(reader)?;
    let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
    Ok(decoded.into_owned())
}

fn write_string<W: Write>(out: &mut W, s: &str) -> Result<()> {
    let (encoded, _, _) = encoding_rs::WINDOWS_1252.encode(s);
    out.write_all(&encoded)?;
    out.write_all(&[0])?;
    Ok(())
}
