//! The I/O handle abstraction.
//!
//! Every layer above this one performs its reads, writes and seeks through a
//! [`Handle`], which is either an OS file or an owned in-memory buffer. This
//! keeps the codec and container code testable without touching the file
//! system, and lets callers splice in-memory archives through the same
//! entry points as on-disk ones.

use crate::error::{CabrioletError, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// How a handle was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only.
    Read,
    /// Write-only, truncating.
    Write,
    /// Read + write, no truncation.
    Update,
    /// Write-only, appending.
    Append,
}

impl OpenMode {
    fn readable(self) -> bool {
        matches!(self, OpenMode::Read | OpenMode::Update)
    }

    fn writable(self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}

enum Backing {
    File {
        path: PathBuf,
        reader: Option<BufReader<File>>,
        writer: Option<File>,
    },
    Memory(Cursor<Vec<u8>>),
}

/// A seekable byte source/sink over a file or a memory buffer.
///
/// The handle is owned exclusively by its opener and released on drop, on
/// every exit path. Reads on a write-only handle (and vice versa) fail with
/// an [`CabrioletError::Argument`] error rather than touching the backing
/// store.
pub struct Handle {
    backing: Backing,
    mode: OpenMode,
}

impl Handle {
    /// Open an existing file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            backing: Backing::File {
                path,
                reader: Some(BufReader::new(file)),
                writer: None,
            },
            mode: OpenMode::Read,
        })
    }

    /// Create (or truncate) a file for writing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            backing: Backing::File {
                path,
                reader: None,
                writer: Some(file),
            },
            mode: OpenMode::Write,
        })
    }

    /// Open a file with an explicit mode.
    pub fn open_with(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut opts = OpenOptions::new();
        opts.read(mode.readable()).write(mode.writable());
        match mode {
            OpenMode::Write => {
                opts.create(true).truncate(true);
            }
            OpenMode::Append => {
                opts.create(true).append(true);
            }
            OpenMode::Update => {
                opts.create(true);
            }
            OpenMode::Read => {}
        }
        let file = opts.open(&path)?;
        let (reader, writer) = if mode == OpenMode::Read {
            (Some(BufReader::new(file)), None)
        } else {
            (None, Some(file))
        };
        Ok(Self {
            backing: Backing::File {
                path,
                reader,
                writer,
            },
            mode,
        })
    }

    /// Wrap an owned byte buffer as a readable + writable handle.
    pub fn memory(bytes: Vec<u8>) -> Self {
        Self {
            backing: Backing::Memory(Cursor::new(bytes)),
            mode: OpenMode::Update,
        }
    }

    /// A fresh, empty in-memory handle for writing.
    pub fn memory_writer() -> Self {
        Self::memory(Vec::new())
    }

    /// The mode this handle was opened with.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// The backing path, if this is a file handle.
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::File { path, .. } => Some(path),
            Backing::Memory(_) => None,
        }
    }

    /// Current position in the stream.
    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.seek(SeekFrom::Current(0))?)
    }

    /// Total length of the underlying store.
    pub fn len(&mut self) -> Result<u64> {
        match &mut self.backing {
            Backing::File { reader, writer, .. } => {
                if let Some(r) = reader {
                    Ok(r.get_ref().metadata()?.len())
                } else if let Some(w) = writer {
                    Ok(w.metadata()?.len())
                } else {
                    Ok(0)
                }
            }
            Backing::Memory(cursor) => Ok(cursor.get_ref().len() as u64),
        }
    }

    /// Whether the underlying store is empty.
    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Consume a memory handle, returning its bytes.
    ///
    /// Fails with an argument error for file handles.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self.backing {
            Backing::Memory(cursor) => Ok(cursor.into_inner()),
            Backing::File { .. } => Err(CabrioletError::argument(
                "into_bytes called on a file handle",
            )),
        }
    }

}

fn denied(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("handle not open for {what}"),
    )
}

impl Read for Handle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let readable = self.mode.readable();
        match &mut self.backing {
            Backing::File { reader, writer, .. } => {
                if let Some(r) = reader {
                    r.read(buf)
                } else if readable {
                    // Update-mode handles read straight off the file.
                    match writer {
                        Some(w) => w.read(buf),
                        None => Err(denied("reading")),
                    }
                } else {
                    Err(denied("reading"))
                }
            }
            Backing::Memory(cursor) => cursor.read(buf),
        }
    }
}

impl Write for Handle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.backing {
            Backing::File { writer, .. } => match writer {
                Some(w) => w.write(buf),
                None => Err(denied("writing")),
            },
            Backing::Memory(cursor) => cursor.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.backing {
            Backing::File { writer, .. } => match writer {
                Some(w) => w.flush(),
                None => Ok(()),
            },
            Backing::Memory(_) => Ok(()),
        }
    }
}

impl Seek for Handle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.backing {
            Backing::File { reader, writer, .. } => {
                if let Some(r) = reader {
                    r.seek(pos)
                } else if let Some(w) = writer {
                    w.seek(pos)
                } else {
                    Err(io::Error::new(io::ErrorKind::Other, "handle closed"))
                }
            }
            Backing::Memory(cursor) => cursor.seek(pos),
        }
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.backing {
            Backing::File { path, .. } => f
                .debug_struct("Handle")
                .field("file", path)
                .field("mode", &self.mode)
                .finish(),
            Backing::Memory(cursor) => f
                .debug_struct("Handle")
                .field("memory_len", &cursor.get_ref().len())
                .field("mode", &self.mode)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_roundtrip() {
        let mut h = Handle::memory_writer();
        h.write_all(b"hello world").unwrap();
        h.seek(SeekFrom::Start(6)).unwrap();

        let mut buf = [0u8; 5];
        h.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"world");

        assert_eq!(h.into_bytes().unwrap(), b"hello world");
    }

    #[test]
    fn test_tell_tracks_position() {
        let mut h = Handle::memory(b"0123456789".to_vec());
        let mut buf = [0u8; 4];
        h.read_exact(&mut buf).unwrap();
        assert_eq!(h.tell().unwrap(), 4);
        assert_eq!(h.len().unwrap(), 10);
    }

    #[test]
    fn test_file_handle() {
        let dir = std::env::temp_dir().join("cabriolet-io-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("handle.bin");

        {
            let mut h = Handle::create(&path).unwrap();
            h.write_all(&[1, 2, 3, 4]).unwrap();
        }
        let mut h = Handle::open(&path).unwrap();
        assert_eq!(h.len().unwrap(), 4);
        let mut buf = Vec::new();
        h.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, vec![1, 2, 3, 4]);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_on_write_handle_fails() {
        let dir = std::env::temp_dir().join("cabriolet-io-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("wo.bin");

        let mut h = Handle::create(&path).unwrap();
        let mut buf = [0u8; 1];
        assert!(h.read(&mut buf).is_err());

        drop(h);
        std::fs::remove_file(&path).unwrap();
    }
}
