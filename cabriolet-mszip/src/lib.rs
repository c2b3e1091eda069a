//! MSZIP codec: DEFLATE with `CK` frame framing.
//!
//! CAB folders compressed with MSZIP store each 32 KiB of uncompressed
//! data as one frame: a two-byte `CK` signature followed by a DEFLATE
//! stream whose final block ends the frame. The 32 KiB history window is
//! preserved across frame boundaries, which is why files sharing a folder
//! must be decoded through one codec state in offset order.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod deflate;
mod inflate;
mod tables;

pub use deflate::MszipCompressor;
pub use inflate::{MszipDecoder, MszipOptions};

/// Uncompressed bytes per `CK` frame.
pub const FRAME_SIZE: usize = 32768;
