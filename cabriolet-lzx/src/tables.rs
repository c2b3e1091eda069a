//! LZX constants and slot tables.

/// Number of literal symbols in the main tree.
pub const NUM_CHARS: usize = 256;

/// Shortest match.
pub const MIN_MATCH: usize = 2;

/// Primary length headers (0..=6 inline, 7 selects the length tree).
pub const NUM_PRIMARY_LENGTHS: u16 = 7;

/// Secondary length symbols.
pub const NUM_SECONDARY_LENGTHS: usize = 249;

/// Pre-tree symbols (deltas 0..=16 plus run codes 17/18/19).
pub const PRETREE_NUM_ELEMENTS: usize = 20;

/// Aligned-offset tree symbols.
pub const ALIGNED_NUM_ELEMENTS: usize = 8;

/// Direct-lookup widths for each tree.
pub const PRETREE_TABLE_BITS: u32 = 6;
pub const MAINTREE_TABLE_BITS: u32 = 12;
pub const LENGTH_TABLE_BITS: u32 = 12;
pub const ALIGNED_TABLE_BITS: u32 = 7;

/// Uncompressed bytes per frame.
pub const FRAME_SIZE: usize = 32768;

/// Block type field values.
pub const BLOCKTYPE_VERBATIM: u32 = 1;
pub const BLOCKTYPE_ALIGNED: u32 = 2;
pub const BLOCKTYPE_UNCOMPRESSED: u32 = 3;

/// Highest slot count across supported windows.
pub const MAX_POSITION_SLOTS: usize = 50;

/// Position-slot count for a window of `2^bits` bytes.
pub fn position_slots(bits: u32) -> Option<usize> {
    match bits {
        15 => Some(30),
        16 => Some(32),
        17 => Some(34),
        18 => Some(36),
        19 => Some(38),
        20 => Some(42),
        21 => Some(50),
        _ => None,
    }
}

/// Extra-bit width for each position slot, capped at 17.
pub fn extra_bits() -> [u32; MAX_POSITION_SLOTS + 1] {
    let mut table = [0u32; MAX_POSITION_SLOTS + 1];
    let mut j = 0u32;
    let mut i = 0usize;
    while i <= MAX_POSITION_SLOTS - 1 {
        table[i] = j;
        table[i + 1] = j;
        if i != 0 && j < 17 {
            j += 1;
        }
        i += 2;
    }
    table
}

/// Base offset for each position slot (before the `- 2` bias applied at
/// match-decode time).
pub fn position_base() -> [u32; MAX_POSITION_SLOTS + 1] {
    let extra = extra_bits();
    let mut table = [0u32; MAX_POSITION_SLOTS + 1];
    let mut acc = 0u32;
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = acc;
        acc += 1 << extra[i];
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_counts() {
        assert_eq!(position_slots(15), Some(30));
        assert_eq!(position_slots(21), Some(50));
        assert_eq!(position_slots(14), None);
        assert_eq!(position_slots(22), None);
    }

    #[test]
    fn test_extra_bits_shape() {
        let extra = extra_bits();
        assert_eq!(&extra[..10], &[0, 0, 0, 0, 1, 1, 2, 2, 3, 3]);
        assert_eq!(extra[36], 17);
        assert_eq!(extra[50], 17);
    }

    #[test]
    fn test_position_base_shape() {
        let base = position_base();
        assert_eq!(&base[..10], &[0, 1, 2, 3, 4, 6, 8, 12, 16, 24]);
        // Slot 30 covers up to a 32 KiB window.
        assert_eq!(base[30], 1 << 15);
        assert_eq!(base[38], 1 << 19);
    }
}
