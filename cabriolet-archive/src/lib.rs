//! Container format support for Cabriolet.
//!
//! The heavyweight citizen is [`cab`]: full Cabinet reading (including
//! multi-part sets, embedded-cabinet search and salvage), per-folder
//! extraction through shared codec states, and writing. [`szdd`] and
//! [`kwaj`] cover the single-file compressors, while [`chm`], [`hlp`],
//! [`oab`] and [`lit`] provide the codec-facing glue those containers
//! consume. The [`factory`] normalises compression codes into codec
//! constructors for all of them.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod cab;
pub mod chm;
pub mod detect;
pub mod factory;
pub mod hlp;
pub mod kwaj;
pub mod lit;
pub mod oab;
pub mod szdd;

// Re-exports for convenience
pub use cab::{builder::CabBuilder, CabOptions, CabinetSet, FileRecord, FolderRecord};
pub use detect::Format;
pub use factory::{Category, CodecFactory, CodecKind, CodecOptions};
