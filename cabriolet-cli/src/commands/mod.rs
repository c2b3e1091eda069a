//! CLI subcommand implementations.

mod create;
mod detect;
mod extract;
mod info;
mod list;

pub use create::{cmd_create, CreateRequest};
pub use detect::cmd_detect;
pub use extract::{cmd_extract, ExtractRequest};
pub use info::cmd_info;
pub use list::cmd_list;

use cabriolet_archive::CodecKind;
use cabriolet_core::error::{CabrioletError, Result};

/// Which container a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    /// Microsoft Cabinet.
    Cab,
    /// SZDD single-file.
    Szdd,
    /// KWAJ single-file.
    Kwaj,
    /// Offline Address Book.
    Oab,
}

/// CAB compression selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionChoice {
    /// Stored.
    None,
    /// MSZIP.
    Mszip,
    /// LZX.
    Lzx,
    /// Quantum.
    Quantum,
}

impl CompressionChoice {
    /// Resolve to a codec kind, validating the window parameter.
    pub fn to_kind(self, window_bits: u32) -> Result<CodecKind> {
        match self {
            CompressionChoice::None => Ok(CodecKind::None),
            CompressionChoice::Mszip => Ok(CodecKind::Mszip),
            CompressionChoice::Lzx => {
                if !(15..=21).contains(&window_bits) {
                    return Err(CabrioletError::argument(
                        "LZX window bits must be 15..=21",
                    ));
                }
                Ok(CodecKind::Lzx { window_bits })
            }
            CompressionChoice::Quantum => {
                if !(10..=21).contains(&window_bits) {
                    return Err(CabrioletError::argument(
                        "Quantum window bits must be 10..=21",
                    ));
                }
                Ok(CodecKind::Quantum { window_bits })
            }
        }
    }
}

/// What to do when an extraction target already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteMode {
    /// Replace it.
    Overwrite,
    /// Leave it and skip the entry.
    SkipExisting,
    /// Ask interactively.
    Prompt,
}
