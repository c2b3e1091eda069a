//! Cabinet writing.
//!
//! The builder sequences validate -> layout -> emit: inputs are queued in
//! a [`FileManager`] and validated up front, a first pass compresses the
//! folder stream and sizes every record, and a second pass emits
//! `CFHEADER | CFFOLDER | CFFILE* | CFDATA*` with computed offsets and
//! per-block checksums.

use super::checksum;
use super::header::{CabHeader, CfData, CfFile, CfFolder, ReserveSizes, BLOCK_MAX, VERSION};
use crate::factory::{CodecFactory, CodecKind};
use cabriolet_core::entry::{Attributes, DosDateTime, FileManager};
use cabriolet_core::error::{CabrioletError, Result};
use std::io::Write;

/// Writes a single-folder cabinet from queued inputs.
pub struct CabBuilder {
    files: FileManager,
    compression: CodecKind,
    set_id: u16,
    cabinet_index: u16,
}

impl CabBuilder {
    /// A builder using the given compression for its folder.
    pub fn new(compression: CodecKind) -> Self {
        Self {
            files: FileManager::new(),
            compression,
            set_id: 0,
            cabinet_index: 0,
        }
    }

    /// Set the set id recorded in the header.
    pub fn set_id(&mut self, set_id: u16) -> &mut Self {
        self.set_id = set_id;
        self
    }

    /// Set the cabinet index recorded in the header.
    pub fn cabinet_index(&mut self, index: u16) -> &mut Self {
        self.cabinet_index = index;
        self
    }

    /// Access the input queue.
    pub fn files_mut(&mut self) -> &mut FileManager {
        &mut self.files
    }

    /// Queue an in-memory file.
    pub fn add_bytes(
        &mut self,
        bytes: Vec<u8>,
        archive_path: impl Into<String>,
        datetime: DosDateTime,
    ) -> Result<&mut Self> {
        let entry = self.files.add_bytes(bytes, archive_path)?;
        entry.datetime = datetime;
        Ok(self)
    }

    /// Queue a disk file.
    pub fn add_file(
        &mut self,
        path: impl Into<std::path::PathBuf>,
        archive_path: impl Into<String>,
    ) -> Result<&mut Self> {
        self.files.add_file(path, archive_path)?;
        Ok(self)
    }

    /// Compress, lay out and emit the cabinet.
    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        if self.files.is_empty() {
            return Err(CabrioletError::argument("no files queued for the cabinet"));
        }
        for entry in self.files.entries() {
            entry.validate()?;
        }

        // Pass one: build the folder stream and compress its blocks.
        let mut stream = Vec::new();
        let mut records = Vec::with_capacity(self.files.len());
        for entry in self.files.entries() {
            let bytes = entry.read_bytes()?;
            let mut attributes = entry.attributes;
            if !entry.archive_path.is_ascii() {
                attributes.insert(Attributes::NAME_IS_UTF);
            }
            records.push(CfFile {
                length: bytes.len() as u32,
                offset: stream.len() as u32,
                folder_index: 0,
                datetime: entry.datetime,
                attributes,
                name: entry.archive_path.clone(),
            });
            stream.extend_from_slice(&bytes);
        }

        let factory = CodecFactory::global();
        let mut compressor = factory.compressor(self.compression)?;
        let mut blocks: Vec<(u16, Vec<u8>)> = Vec::new();
        for chunk in stream.chunks(BLOCK_MAX) {
            let payload = compressor.compress_block(chunk)?;
            blocks.push((chunk.len() as u16, payload));
        }
        let tail = compressor.finish()?;
        if !tail.is_empty() {
            match blocks.last_mut() {
                Some((_, payload)) => payload.extend_from_slice(&tail),
                None => blocks.push((0, tail)),
            }
        }
        // Pass two: sizes are now known; lay out offsets and emit.
        let header_len = 36u32;
        let folder_len = 8u32;
        let files_len: u32 = records.iter().map(|r| r.emitted_len() as u32).sum();
        let files_offset = header_len + folder_len;
        let data_offset = files_offset + files_len;
        let data_len: u32 = blocks
            .iter()
            .map(|(_, payload)| 8 + payload.len() as u32)
            .sum();

        let header = CabHeader {
            cabinet_size: data_offset + data_len,
            files_offset,
            version: VERSION,
            num_folders: 1,
            num_files: records.len() as u16,
            flags: 0,
            set_id: self.set_id,
            cabinet_index: self.cabinet_index,
            reserve: ReserveSizes::default(),
            prev: None,
            next: None,
        };
        header.emit(out)?;

        CfFolder {
            data_offset,
            num_blocks: blocks.len() as u16,
            compression: self.compression,
        }
        .emit(out, 0)?;

        for record in &records {
            record.emit(out)?;
        }

        for (uncompressed, payload) in &blocks {
            let compressed = payload.len() as u16;
            let seed = checksum::data_seed(compressed, *uncompressed);
            CfData {
                checksum: checksum::checksum(payload, seed),
                compressed_size: compressed,
                uncompressed_size: *uncompressed,
            }
            .emit(out)?;
            out.write_all(payload)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_builder_rejected() {
        let builder = CabBuilder::new(CodecKind::None);
        let mut out = Vec::new();
        assert!(matches!(
            builder.write(&mut out),
            Err(CabrioletError::Argument { .. })
        ));
    }

    #[test]
    fn test_offsets_are_consistent() {
        let mut builder = CabBuilder::new(CodecKind::None);
        builder
            .add_bytes(b"alpha".to_vec(), "a.txt", DosDateTime::default())
            .unwrap()
            .add_bytes(b"beta".to_vec(), "b.txt", DosDateTime::default())
            .unwrap();
        let mut out = Vec::new();
        builder.write(&mut out).unwrap();

        // The recorded cabinet size matches the bytes produced.
        let recorded = u32::from_le_bytes(out[8..12].try_into().unwrap());
        assert_eq!(recorded as usize, out.len());
    }
}
