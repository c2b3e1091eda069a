//! Quantum codec.
//!
//! Quantum compresses in 32 KiB frames with an adaptive arithmetic coder:
//! a selector model routes each step to one of four literal models (byte
//! space split by its top two bits) or to the 3-byte / 4-byte /
//! variable-length match paths, each with its own position-slot model.
//! Decompression is bit-exact; the encoder covers the literal path, which
//! is enough to round-trip any input.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod decode;
mod encode;
mod model;
mod tables;

pub use decode::{QuantumDecoder, QuantumOptions};
pub use encode::QuantumCompressor;
pub use model::{Model, ModelSet, ModelSym};
pub use tables::FRAME_SIZE;
