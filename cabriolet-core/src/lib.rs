//! # Cabriolet Core
//!
//! Core components for the Cabriolet legacy-container engine.
//!
//! This crate provides the layers every codec and container stands on:
//!
//! - [`io`]: the `Handle` abstraction over files and memory buffers
//! - [`bitstream`]: LSB-first and MSB-first bit readers/writers
//! - [`huffman`]: canonical-code table construction and fast decoding
//! - [`window`]: the LZ sliding-window history buffer
//! - [`crc`]: CRC-32 (OAB block validation)
//! - [`traits`]: the `Decompressor`/`BlockCompressor` capabilities
//! - [`entry`]: writer-side input queueing and DOS metadata
//! - [`error`]: the engine-wide error type
//!
//! ## Architecture
//!
//! Cabriolet is a layered stack; dependencies flow strictly downward:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ CLI                                                     │
//! ├─────────────────────────────────────────────────────────┤
//! │ Containers: CAB, SZDD, KWAJ, CHM/HLP/LIT/OAB glue       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Codecs: LZSS, MSZIP, LZX, Quantum                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ This crate: Handle, BitReader/Writer, Huffman, Window   │
//! └─────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bitstream;
pub mod crc;
pub mod entry;
pub mod error;
pub mod huffman;
pub mod io;
pub mod traits;
pub mod window;

// Re-exports for convenience
pub use bitstream::{BitRead, BitReaderLsb, BitReaderMsb, BitWriterLsb, BitWriterMsb};
pub use crc::Crc32;
pub use entry::{Attributes, DosDateTime, FileEntry, FileManager};
pub use error::{CabrioletError, Result};
pub use huffman::HuffmanTable;
pub use io::{Handle, OpenMode};
pub use traits::{BlockCompressor, Decompressor, ExtractStats};
pub use window::SlidingWindow;
