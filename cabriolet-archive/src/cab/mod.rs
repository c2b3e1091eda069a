//! Microsoft Cabinet (CAB) container support.
//!
//! A [`CabinetSet`] owns one or more parsed cabinets plus the folder and
//! file lists they share. Single cabinets are the one-member case;
//! multi-part sets grow through [`CabinetSet::append`], which joins
//! merge-flagged folders across the boundary and deduplicates the files
//! that span it.
//!
//! Extraction is folder-centric: all files in a folder come out of one
//! codec state, fed by a [`BlockReader`] that concatenates `CFDATA`
//! payloads across the folder's physical ranges (including the split block
//! shared by two cabinets of a set).

pub mod builder;
pub mod checksum;
pub mod header;

use crate::factory::{CodecFactory, CodecKind, CodecOptions};
use cabriolet_core::entry::{Attributes, DosDateTime};
use cabriolet_core::error::{CabrioletError, Result};
use cabriolet_core::traits::{discard, Decompressor, ExtractStats};
use header::{
    CabHeader, CfData, CfFile, CfFolder, BLOCK_MAX, COMPRESSED_BLOCK_MAX,
    FOLDER_CONTINUED_FROM_PREV, FOLDER_CONTINUED_PREV_AND_NEXT, FOLDER_CONTINUED_TO_NEXT, MAGIC,
    VERSION,
};
use std::io::{Read, Seek, SeekFrom, Write};

/// Reader-side options.
#[derive(Debug, Clone, Copy, Default)]
pub struct CabOptions {
    /// Keep going past checksum failures and codec errors, returning
    /// partial files.
    pub salvage: bool,
    /// Accept blocks whose XOR-32 does not match.
    pub skip_checksum: bool,
    /// MSZIP: zero-pad damaged frames instead of failing.
    pub fix_mszip: bool,
}

impl CabOptions {
    fn codec_options(self) -> CodecOptions {
        CodecOptions {
            salvage: self.salvage,
            fix_mszip: self.fix_mszip,
            reset_interval: 0,
        }
    }
}

/// One member of a set.
#[derive(Debug)]
pub struct Cabinet {
    /// The parsed header.
    pub header: CabHeader,
    /// Offset of the cabinet within its source (embedded cabinets).
    pub base_offset: u64,
    /// Index of the previous member, once linked.
    pub prev_cabinet: Option<usize>,
    /// Index of the next member, once linked.
    pub next_cabinet: Option<usize>,
}

/// A physical run of data blocks inside one cabinet.
#[derive(Debug, Clone)]
pub struct FolderData {
    /// Which set member holds the run.
    pub cabinet: usize,
    /// Absolute offset of the first `CFDATA`.
    pub data_offset: u64,
    /// Blocks in the run.
    pub block_count: u16,
    /// Per-datablock reserve bytes in that cabinet.
    pub data_reserve: u8,
}

/// A logical folder, possibly spanning cabinets.
#[derive(Debug, Clone)]
pub struct FolderRecord {
    /// Compression kind and parameter.
    pub compression: CodecKind,
    /// Total block count across the chain (split blocks counted once).
    pub block_count: u32,
    /// The physical ranges backing the folder.
    pub data: Vec<FolderData>,
    /// Continues a folder from the previous cabinet.
    pub merge_prev: bool,
    /// Continues into the next cabinet.
    pub merge_next: bool,
}

/// A file within the set.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Path inside the cabinet.
    pub name: String,
    /// Uncompressed length.
    pub length: u32,
    /// Offset within the folder's uncompressed stream.
    pub offset: u32,
    /// Index into the set's folder list.
    pub folder: usize,
    /// Attribute word.
    pub attributes: Attributes,
    /// Timestamp.
    pub datetime: DosDateTime,
    /// Crosses in from the previous cabinet.
    pub continued_from_prev: bool,
    /// Crosses out into the next cabinet.
    pub continued_to_next: bool,
}

/// One or more cabinets sharing folder and file lists.
pub struct CabinetSet<R> {
    sources: Vec<R>,
    /// The member cabinets, in set order.
    pub cabinets: Vec<Cabinet>,
    /// The shared folder list.
    pub folders: Vec<FolderRecord>,
    /// The shared file list.
    pub files: Vec<FileRecord>,
    options: CabOptions,
}

impl<R: Read + Seek> CabinetSet<R> {
    /// Parse a cabinet and start a set with it.
    pub fn open(source: R) -> Result<Self> {
        Self::open_with(source, CabOptions::default())
    }

    /// Parse with explicit options.
    pub fn open_with(source: R, options: CabOptions) -> Result<Self> {
        Self::open_at(source, 0, options)
    }

    /// Parse a cabinet embedded at `base_offset` within the source.
    pub fn open_at(mut source: R, base_offset: u64, options: CabOptions) -> Result<Self> {
        let mut set = Self {
            sources: Vec::new(),
            cabinets: Vec::new(),
            folders: Vec::new(),
            files: Vec::new(),
            options,
        };
        let parsed = parse_cabinet(&mut source, base_offset)?;
        set.install(source, parsed, None)?;
        Ok(set)
    }

    /// The set-wide options.
    pub fn options(&self) -> CabOptions {
        self.options
    }

    fn install(&mut self, source: R, parsed: ParsedCabinet, merge_left: Option<()>) -> Result<()> {
        let cab_index = self.cabinets.len();
        let ParsedCabinet {
            header,
            base_offset,
            folders,
            files,
        } = parsed;

        let folder_base = self.folders.len();
        let mut merged_first_folder = false;

        if merge_left.is_some() {
            // Splice the continued folder onto the left cabinet's last one.
            let first = folders
                .first()
                .ok_or_else(|| CabrioletError::format("continuing cabinet has no folders"))?;
            if !first.merge_prev {
                return Err(CabrioletError::format(
                    "cabinets do not continue into each other",
                ));
            }
            let last = self
                .folders
                .last_mut()
                .ok_or_else(|| CabrioletError::format("set has no folder to continue"))?;
            if last.compression != first.compression {
                return Err(CabrioletError::format(format!(
                    "incompatible compression across the join ({} vs {})",
                    last.compression.name(),
                    first.compression.name()
                )));
            }
            let mut chain = first.data.clone();
            for range in &mut chain {
                range.cabinet = cab_index;
            }
            last.data.extend(chain);
            // The boundary block is shared between both cabinets.
            last.block_count += first.block_count.saturating_sub(1);
            last.merge_next = first.merge_next;
            merged_first_folder = true;
        }

        // Remaining folders join the shared list as-is.
        for folder in folders.iter().skip(usize::from(merged_first_folder)) {
            let mut record = folder.clone();
            for range in &mut record.data {
                range.cabinet = cab_index;
            }
            self.folders.push(record);
        }

        let remap = |local: usize| {
            if merged_first_folder {
                if local == 0 {
                    folder_base - 1
                } else {
                    folder_base + local - 1
                }
            } else {
                folder_base + local
            }
        };

        for mut file in files {
            if file.continued_from_prev {
                // The right-hand copy is authoritative; drop the left one.
                if let Some(pos) = self
                    .files
                    .iter()
                    .position(|f| f.continued_to_next && f.name == file.name)
                {
                    self.files.remove(pos);
                }
            }
            file.folder = remap(file.folder);
            self.files.push(file);
        }

        if let Some(last) = self.cabinets.last_mut() {
            last.next_cabinet = Some(cab_index);
        }
        self.cabinets.push(Cabinet {
            header,
            base_offset,
            prev_cabinet: cab_index.checked_sub(1),
            next_cabinet: None,
        });
        self.sources.push(source);
        Ok(())
    }

    /// Join the next cabinet of a multi-part set onto this one.
    ///
    /// Validation is all-or-nothing: any incompatibility leaves the set
    /// untouched.
    pub fn append(&mut self, mut source: R) -> Result<()> {
        let parsed = parse_cabinet(&mut source, 0)?;
        let left = self
            .cabinets
            .last()
            .ok_or_else(|| CabrioletError::argument("cannot append to an empty set"))?;

        // Fail-fast validation, before any mutation.
        if self
            .cabinets
            .iter()
            .any(|c| c.header.cabinet_index == parsed.header.cabinet_index)
        {
            return Err(CabrioletError::argument(
                "cabinet is already a member of this set",
            ));
        }
        if parsed.header.set_id != left.header.set_id {
            return Err(CabrioletError::format(format!(
                "set id mismatch ({:#06x} vs {:#06x})",
                parsed.header.set_id, left.header.set_id
            )));
        }
        if parsed.header.cabinet_index != left.header.cabinet_index + 1 {
            return Err(CabrioletError::format(format!(
                "cabinet index {} does not follow {}",
                parsed.header.cabinet_index, left.header.cabinet_index
            )));
        }
        let last_folder = self
            .folders
            .last()
            .ok_or_else(|| CabrioletError::format("set has no folder to continue"))?;
        if !last_folder.merge_next {
            return Err(CabrioletError::format(
                "cabinets do not continue into each other",
            ));
        }
        let first = parsed
            .folders
            .first()
            .ok_or_else(|| CabrioletError::format("continuing cabinet has no folders"))?;
        if !first.merge_prev {
            return Err(CabrioletError::format(
                "cabinets do not continue into each other",
            ));
        }
        if last_folder.compression != first.compression {
            return Err(CabrioletError::format(format!(
                "incompatible compression across the join ({} vs {})",
                last_folder.compression.name(),
                first.compression.name()
            )));
        }
        // A defensive cycle walk over the next-chain.
        let mut seen = 0usize;
        let mut cursor = Some(0usize);
        while let Some(idx) = cursor {
            seen += 1;
            if seen > self.cabinets.len() {
                return Err(CabrioletError::format("circular cabinet chain"));
            }
            cursor = self.cabinets[idx].next_cabinet;
        }

        self.install(source, parsed, Some(()))
    }

    /// Total uncompressed length of a folder's stream.
    fn folder_stream_len(&self, folder: usize) -> u64 {
        self.files
            .iter()
            .filter(|f| f.folder == folder)
            .map(|f| u64::from(f.offset) + u64::from(f.length))
            .max()
            .unwrap_or(0)
    }

    /// Extract files through a per-file sink callback.
    ///
    /// The callback returns `Ok(Some(sink))` to extract a file, or
    /// `Ok(None)` to skip it (its bytes are still decompressed and
    /// discarded when later files need the stream position). Files are
    /// processed folder by folder, in ascending stream offset, through one
    /// codec state per folder.
    pub fn extract<F>(&mut self, mut sink_for: F) -> Result<ExtractStats>
    where
        F: FnMut(&FileRecord) -> Result<Option<Box<dyn Write>>>,
    {
        let mut stats = ExtractStats::default();
        let factory = CodecFactory::global();

        for folder_idx in 0..self.folders.len() {
            let mut pending: Vec<usize> = (0..self.files.len())
                .filter(|&i| self.files[i].folder == folder_idx)
                .collect();
            pending.sort_by_key(|&i| self.files[i].offset);
            if pending.is_empty() {
                continue;
            }

            let stream_len = self.folder_stream_len(folder_idx);
            let folder = self.folders[folder_idx].clone();
            let options = self.options;

            // Each pass runs the folder stream once, front to back. Files
            // whose data lies behind the stream position (overlapping
            // layouts) are deferred to another pass with a fresh codec.
            while !pending.is_empty() {
                let mut retry = Vec::new();
                let mut reader = BlockReader::new(&mut self.sources, folder.data.clone(), options);
                let mut codec = factory.decompressor(
                    folder.compression,
                    &mut reader,
                    options.codec_options(),
                )?;
                codec.set_output_length(stream_len);
                let mut position = 0u64;
                let mut folder_dead = false;

                for &index in &pending {
                    let file = self.files[index].clone();
                    if u64::from(file.offset) < position {
                        retry.push(index);
                        continue;
                    }
                    let Some(mut sink) = sink_for(&file)? else {
                        // Nothing to write; later files skip this region
                        // on their own.
                        stats.skipped += 1;
                        continue;
                    };
                    if folder_dead {
                        stats.failed += 1;
                        continue;
                    }

                    let result = (|| -> Result<u64> {
                        let skip = u64::from(file.offset) - position;
                        if skip > 0 {
                            let skipped = discard(codec.as_mut(), skip)?;
                            position += skipped;
                            if skipped < skip {
                                return Err(CabrioletError::decompress(
                                    "folder stream ended inside a gap",
                                ));
                            }
                        }
                        let wanted = u64::from(file.length);
                        let written = codec.decompress(sink.as_mut(), wanted)?;
                        sink.flush()?;
                        position += written;
                        if written < wanted && !options.salvage {
                            return Err(CabrioletError::decompress(format!(
                                "file {} truncated at {written} of {wanted} bytes",
                                file.name
                            )));
                        }
                        Ok(written)
                    })();

                    match result.map_err(normalize_error) {
                        Ok(written) => {
                            stats.extracted += 1;
                            stats.bytes += written;
                        }
                        Err(err) => {
                            if !options.salvage {
                                return Err(err);
                            }
                            stats.failed += 1;
                            folder_dead = true;
                        }
                    }
                }
                pending = retry;
            }
        }
        Ok(stats)
    }

    /// Extract every file under `dir`, creating subdirectories as needed.
    pub fn extract_to_dir(&mut self, dir: &std::path::Path) -> Result<ExtractStats> {
        let dir = dir.to_path_buf();
        self.extract(move |file| {
            let relative: std::path::PathBuf = file
                .name
                .replace('\\', "/")
                .split('/')
                .filter(|part| !part.is_empty() && *part != "." && *part != "..")
                .collect();
            let target = dir.join(relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let sink = std::fs::File::create(target)?;
            Ok(Some(Box::new(sink)))
        })
    }

    /// Read one file's bytes into memory.
    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>> {
        if !self.files.iter().any(|f| f.name == name) {
            return Err(CabrioletError::argument(format!("no such file: {name}")));
        }
        let wanted = name.to_string();
        let out = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let captured = out.clone();
        self.extract(move |file| {
            if file.name == wanted {
                Ok(Some(Box::new(SharedSink(captured.clone()))))
            } else {
                Ok(None)
            }
        })?;
        let bytes = out.lock().unwrap().clone();
        Ok(bytes)
    }
}

/// Codec errors travel through the `Read` adapter boxed inside
/// `io::Error`; unwrap them so callers see the original kind (a checksum
/// mismatch stays a checksum mismatch).
fn normalize_error(err: CabrioletError) -> CabrioletError {
    if let CabrioletError::Io(io_err) = err {
        let kind = io_err.kind();
        match io_err.into_inner() {
            Some(inner) => match inner.downcast::<CabrioletError>() {
                Ok(ours) => *ours,
                Err(other) => CabrioletError::Io(std::io::Error::new(kind, other)),
            },
            None => CabrioletError::Io(std::io::Error::from(kind)),
        }
    } else {
        err
    }
}

struct SharedSink(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

struct ParsedCabinet {
    header: CabHeader,
    base_offset: u64,
    folders: Vec<FolderRecord>,
    files: Vec<FileRecord>,
}

fn parse_cabinet<R: Read + Seek>(source: &mut R, base_offset: u64) -> Result<ParsedCabinet> {
    source.seek(SeekFrom::Start(base_offset))?;
    let header = CabHeader::parse(source)?;

    let mut folders = Vec::with_capacity(usize::from(header.num_folders));
    for _ in 0..header.num_folders {
        let raw = CfFolder::parse(source, header.reserve.folder)?;
        folders.push(FolderRecord {
            compression: raw.compression,
            block_count: u32::from(raw.num_blocks),
            data: vec![FolderData {
                cabinet: 0,
                data_offset: base_offset + u64::from(raw.data_offset),
                block_count: raw.num_blocks,
                data_reserve: header.reserve.data,
            }],
            merge_prev: false,
            merge_next: false,
        });
    }

    source.seek(SeekFrom::Start(base_offset + u64::from(header.files_offset)))?;
    let mut files = Vec::with_capacity(usize::from(header.num_files));
    for _ in 0..header.num_files {
        let raw = CfFile::parse(source)?;
        let (folder, from_prev, to_next) = match raw.folder_index {
            FOLDER_CONTINUED_FROM_PREV => (0, true, false),
            FOLDER_CONTINUED_TO_NEXT => (folders.len().saturating_sub(1), false, true),
            FOLDER_CONTINUED_PREV_AND_NEXT => (0, true, true),
            index => {
                let index = usize::from(index);
                if index >= folders.len() {
                    return Err(CabrioletError::format(format!(
                        "file {} references folder {index} of {}",
                        raw.name,
                        folders.len()
                    )));
                }
                (index, false, false)
            }
        };
        if from_prev {
            if let Some(record) = folders.get_mut(folder) {
                record.merge_prev = true;
            }
        }
        if to_next {
            if let Some(record) = folders.get_mut(folder) {
                record.merge_next = true;
            }
        }
        let span = u64::from(raw.offset) + u64::from(raw.length);
        if span > u64::from(BLOCK_MAX as u32) * u64::from(header::FOLDER_MAX_BLOCKS) {
            return Err(CabrioletError::format(format!(
                "file {} extends past the folder ceiling",
                raw.name
            )));
        }
        files.push(FileRecord {
            name: raw.name,
            length: raw.length,
            offset: raw.offset,
            folder,
            attributes: raw.attributes,
            datetime: raw.datetime,
            continued_from_prev: from_prev,
            continued_to_next: to_next,
        });
    }

    Ok(ParsedCabinet {
        header,
        base_offset,
        folders,
        files,
    })
}

/// Feeds a folder's concatenated `CFDATA` payloads to a codec.
///
/// A block with `uncompressed_size == 0` is the left half of a split block
/// at a cabinet boundary; its payload is joined with the first block of
/// the next range before either is served.
pub struct BlockReader<'a, R> {
    sources: &'a mut [R],
    ranges: Vec<FolderData>,
    range_index: usize,
    blocks_left: u16,
    cursor: u64,
    block: Vec<u8>,
    block_pos: usize,
    options: CabOptions,
    exhausted: bool,
}

impl<'a, R: Read + Seek> BlockReader<'a, R> {
    /// Create a reader over `ranges`.
    pub fn new(sources: &'a mut [R], ranges: Vec<FolderData>, options: CabOptions) -> Self {
        let (blocks_left, cursor) = match ranges.first() {
            Some(range) => (range.block_count, range.data_offset),
            None => (0, 0),
        };
        Self {
            sources,
            ranges,
            range_index: 0,
            blocks_left,
            cursor,
            block: Vec::new(),
            block_pos: 0,
            options,
            exhausted: false,
        }
    }

    /// Read the next raw block from the current range.
    fn read_one_block(&mut self) -> Result<(CfData, Vec<u8>)> {
        let range = &self.ranges[self.range_index];
        let source = self
            .sources
            .get_mut(range.cabinet)
            .ok_or_else(|| CabrioletError::argument("folder data references a missing cabinet"))?;
        source.seek(SeekFrom::Start(self.cursor))?;

        let head = CfData::parse(source)?;
        if usize::from(head.compressed_size) > COMPRESSED_BLOCK_MAX {
            return Err(CabrioletError::format(format!(
                "data block of {} bytes exceeds the format ceiling",
                head.compressed_size
            )));
        }
        let mut reserve = vec![0u8; usize::from(range.data_reserve)];
        source.read_exact(&mut reserve)?;
        let mut payload = vec![0u8; usize::from(head.compressed_size)];
        source.read_exact(&mut payload)?;
        self.cursor += (header::CFDATA_SIZE + reserve.len() + payload.len()) as u64;
        self.blocks_left -= 1;

        if !self.options.skip_checksum && head.checksum != 0 {
            let computed = {
                let seed = checksum::data_seed(head.compressed_size, head.uncompressed_size);
                let seed = checksum::checksum(&reserve, seed);
                checksum::checksum(&payload, seed)
            };
            if computed != head.checksum {
                if !self.options.salvage {
                    return Err(CabrioletError::checksum(head.checksum, computed));
                }
                // Salvage: take the block as-is and keep going.
            }
        }
        Ok((head, payload))
    }

    fn advance_range(&mut self) -> bool {
        while self.blocks_left == 0 {
            if self.range_index + 1 >= self.ranges.len() {
                return false;
            }
            self.range_index += 1;
            let range = &self.ranges[self.range_index];
            self.blocks_left = range.block_count;
            self.cursor = range.data_offset;
        }
        true
    }

    /// Load the next logical block (joining split halves) into `block`.
    fn next_block(&mut self) -> Result<bool> {
        if self.blocks_left == 0 && !self.advance_range() {
            return Ok(false);
        }
        let (head, mut payload) = self.read_one_block()?;
        if head.uncompressed_size == 0 {
            // Left half of a split block; the right half leads the next
            // range. A dangling half at the end of the last range is a
            // truncated set.
            if !self.advance_range() {
                if self.options.salvage {
                    self.block = payload;
                    self.block_pos = 0;
                    return Ok(true);
                }
                return Err(CabrioletError::format(
                    "folder continues into a cabinet that is not loaded",
                ));
            }
            let (_, right) = self.read_one_block()?;
            payload.extend_from_slice(&right);
        }
        self.block = payload;
        self.block_pos = 0;
        Ok(true)
    }
}

impl<R: Read + Seek> Read for BlockReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.exhausted {
            return Ok(0);
        }
        while self.block_pos >= self.block.len() {
            match self.next_block() {
                Ok(true) => {}
                Ok(false) => {
                    self.exhausted = true;
                    return Ok(0);
                }
                Err(_) if self.options.salvage => {
                    // A torn block ends the stream; whatever was decoded
                    // before it is the salvageable part.
                    self.exhausted = true;
                    return Ok(0);
                }
                Err(err) => {
                    return Err(std::io::Error::other(err));
                }
            }
        }
        let take = buf.len().min(self.block.len() - self.block_pos);
        buf[..take].copy_from_slice(&self.block[self.block_pos..self.block_pos + take]);
        self.block_pos += take;
        Ok(take)
    }
}

/// Scan `source` for embedded cabinets, validating each candidate header.
///
/// The scan reads 4 KiB at a time and checks every offset, so cabinets
/// glued onto executables or other carriers are found wherever they sit.
pub fn search<R: Read + Seek>(source: &mut R) -> Result<Vec<u64>> {
    let file_len = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(0))?;

    let mut found = Vec::new();
    let mut window = [0u8; 4096 + 3];
    // Absolute offset of window[0].
    let mut window_start = 0u64;
    let mut carry = 0usize;

    loop {
        let read = source.read(&mut window[carry..])?;
        if read == 0 {
            break;
        }
        let valid = carry + read;
        for i in 0..valid.saturating_sub(3) {
            if window[i..i + 4] == MAGIC {
                let offset = window_start + i as u64;
                if validate_candidate(source, offset, file_len)? {
                    found.push(offset);
                }
            }
        }
        // Keep the last three bytes so a magic spanning the chunk boundary
        // is still seen.
        let keep = valid.min(3);
        window.copy_within(valid - keep..valid, 0);
        window_start += (valid - keep) as u64;
        carry = keep;
    }
    Ok(found)
}

fn validate_candidate<R: Read + Seek>(source: &mut R, offset: u64, file_len: u64) -> Result<bool> {
    let resume = source.stream_position()?;
    source.seek(SeekFrom::Start(offset))?;
    let mut head = [0u8; 36];
    let ok = match source.read_exact(&mut head) {
        Ok(()) => {
            let cabinet_size = u64::from(u32::from_le_bytes(head[8..12].try_into().unwrap()));
            let files_offset = u64::from(u32::from_le_bytes(head[16..20].try_into().unwrap()));
            let version = (head[25], head[24]);
            version == VERSION
                && cabinet_size >= 36
                && offset + cabinet_size <= file_len
                && files_offset < cabinet_size
        }
        Err(_) => false,
    };
    source.seek(SeekFrom::Start(resume))?;
    Ok(ok)
}
