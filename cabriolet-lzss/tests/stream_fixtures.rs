//! Hand-assembled LZSS streams with known outputs.

use cabriolet_core::traits::Decompressor;
use cabriolet_lzss::{LzssDecoder, LzssMode};
use std::io::Cursor;

fn decode(stream: Vec<u8>, mode: LzssMode, limit: u64) -> Vec<u8> {
    let mut decoder = LzssDecoder::new(Cursor::new(stream), mode);
    decoder.set_output_length(limit);
    let mut out = Vec::new();
    decoder.decompress(&mut out, limit).unwrap();
    out
}

#[test]
fn literals_pass_through() {
    // Flag 0b111: three literals, then EOF.
    let out = decode(vec![0b0000_0111, b'c', b'a', b'b'], LzssMode::Expand, 3);
    assert_eq!(out, b"cab");
}

#[test]
fn pair_copies_previous_literals() {
    // "ab" then a pair addressing those two bytes. Expand mode starts
    // writing at window index 4080, so the literals land at 4080/4081.
    let low = (4080u16 & 0xFF) as u8;
    let high_nibble = ((4080u16 >> 4) & 0xF0) as u8;
    let stream = vec![0b0000_0011, b'a', b'b', low, high_nibble | 0x01];
    let out = decode(stream, LzssMode::Expand, 6);
    // Length nibble 1 -> 4 bytes: "ab" then wraps into "ab" again.
    assert_eq!(out, b"ababab"[..6].to_vec());
}

#[test]
fn mshelp_flags_are_inverted() {
    // In MsHelp mode a flag byte of 0xFE means "literal" only in bit 0
    // after inversion... inverted 0xFE = 0x01: one literal, then pairs.
    let out = decode(vec![0xFE, b'Z'], LzssMode::MsHelp, 1);
    assert_eq!(out, b"Z");
}

#[test]
fn qbasic_terminator_stops_mid_unit() {
    // Two literals, then the (0, 0) terminator pair, then trailing bytes
    // that must never be decoded.
    let stream = vec![0b0000_0011, b'o', b'k', 0x00, 0x00, 0xAA, 0xBB];
    let out = decode(stream, LzssMode::QBasic, 64);
    assert_eq!(out, b"ok");
}

#[test]
fn expand_window_preset_is_spaces() {
    // A pair into the untouched window reads the 0x20 preset fill.
    let stream = vec![0b0000_0000, 0x10, 0x02];
    let out = decode(stream, LzssMode::Expand, 5);
    assert_eq!(out, vec![0x20; 5]);
}

#[test]
fn qbasic_window_preset_is_zero() {
    let stream = vec![0b0000_0000, 0x10, 0x02];
    let out = decode(stream, LzssMode::QBasic, 5);
    assert_eq!(out, vec![0x00; 5]);
}
