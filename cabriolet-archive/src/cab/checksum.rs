//! The CAB XOR-32 block checksum.
//!
//! Data is folded four bytes at a time as little-endian words; a 1..3-byte
//! remainder packs high-to-low (first leftover byte into bits 16..24, and
//! so on down). `CFDATA` checksums are seeded with the checksum of the
//! size fields, which equals `compressed_size | uncompressed_size << 16`.

/// Fold `data` into `seed`.
pub fn checksum(data: &[u8], seed: u32) -> u32 {
    let mut sum = seed;
    let mut chunks = data.chunks_exact(4);
    for word in &mut chunks {
        sum ^= u32::from_le_bytes(word.try_into().unwrap());
    }
    let rest = chunks.remainder();
    let mut tail = 0u32;
    for (i, &byte) in rest.iter().enumerate() {
        let shift = 8 * (rest.len() - 1 - i);
        tail |= u32::from(byte) << shift;
    }
    sum ^ tail
}

/// The seed for a `CFDATA` payload checksum.
pub fn data_seed(compressed_size: u16, uncompressed_size: u16) -> u32 {
    u32::from(compressed_size) | (u32::from(uncompressed_size) << 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_words() {
        assert_eq!(checksum(&[0x01, 0x02, 0x03, 0x04], 0), 0x04030201);
        assert_eq!(
            checksum(&[0x01, 0x02, 0x03, 0x04, 0x01, 0x02, 0x03, 0x04], 0),
            0
        );
    }

    #[test]
    fn test_remainder_packs_high_to_low() {
        // One leftover byte lands in the low byte of the partial word.
        assert_eq!(checksum(&[0x01, 0x02, 0x03, 0x04, 0x05], 0), 0x04030204);
        // Two leftovers: first << 8, second << 0.
        assert_eq!(
            checksum(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06], 0),
            0x04030201 ^ 0x0506
        );
        // Three leftovers: first << 16, second << 8, third << 0.
        assert_eq!(
            checksum(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07], 0),
            0x04030201 ^ 0x00050607
        );
    }

    #[test]
    fn test_self_cancellation() {
        // XOR folding means any 4-aligned block XORed with itself is zero.
        let data: Vec<u8> = (0u8..96).collect();
        let doubled: Vec<u8> = data.iter().chain(data.iter()).copied().collect();
        assert_eq!(checksum(&doubled, 0), 0);
    }

    #[test]
    fn test_seed() {
        assert_eq!(data_seed(0x1234, 0x8000), 0x8000_1234);
    }
}
