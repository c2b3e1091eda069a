//! Windows Help (HLP) codec glue.
//!
//! HLP's internal file system is a reader concern; the engine's part is
//! the LZSS dialect its topic blocks use. `?_\x03\x00` opens the container.

use cabriolet_core::error::Result;
use cabriolet_core::traits::Decompressor;
use cabriolet_lzss::{LzssDecoder, LzssMode};
use std::io::{Read, Write};

/// HLP container magic (`0x00035F3F`, little-endian).
pub const MAGIC: [u8; 4] = [0x3F, 0x5F, 0x03, 0x00];

/// Decompress an LZSS-compressed topic byte range.
///
/// `reader` must be positioned at the compressed bytes; `expected` bounds
/// the output (topic headers record it). Returns the bytes produced,
/// which is short only if the range was truncated.
pub fn decompress_range<R: Read>(reader: R, expected: u64, out: &mut dyn Write) -> Result<u64> {
    let mut decoder = LzssDecoder::new(reader, LzssMode::MsHelp);
    decoder.set_output_length(expected);
    decoder.decompress(out, expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cabriolet_lzss::lzss_compress;
    use std::io::Cursor;

    #[test]
    fn test_topic_roundtrip() {
        let topic = b"This is help text. This is help text. More help text.".repeat(40);
        let packed = lzss_compress(&topic, LzssMode::MsHelp);

        let mut out = Vec::new();
        let n = decompress_range(Cursor::new(packed), topic.len() as u64, &mut out).unwrap();
        assert_eq!(n, topic.len() as u64);
        assert_eq!(out, topic);
    }
}
