//! Magic-byte sniffing for the CLI's auto mode.

use crate::{hlp, kwaj, lit, szdd};
use cabriolet_core::error::Result;
use std::io::{Read, Seek, SeekFrom};

/// A recognised container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Microsoft Cabinet.
    Cab,
    /// SZDD single-file (standard or QBasic).
    Szdd,
    /// KWAJ single-file.
    Kwaj,
    /// Compiled HTML Help.
    Chm,
    /// Windows Help.
    Hlp,
    /// Microsoft Reader.
    Lit,
    /// Offline Address Book.
    Oab,
    /// Nothing recognised.
    Unknown,
}

impl Format {
    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            Format::Cab => "cab",
            Format::Szdd => "szdd",
            Format::Kwaj => "kwaj",
            Format::Chm => "chm",
            Format::Hlp => "hlp",
            Format::Lit => "lit",
            Format::Oab => "oab",
            Format::Unknown => "unknown",
        }
    }
}

/// Sniff the format from the first bytes of `reader`, restoring its
/// position afterwards.
pub fn detect<R: Read + Seek>(reader: &mut R) -> Result<Format> {
    let position = reader.stream_position()?;
    let mut head = [0u8; 16];
    let got = {
        let mut filled = 0;
        loop {
            let n = reader.read(&mut head[filled..])?;
            if n == 0 {
                break filled;
            }
            filled += n;
        }
    };
    reader.seek(SeekFrom::Start(position))?;
    Ok(detect_bytes(&head[..got]))
}

/// Sniff from an in-memory prefix.
pub fn detect_bytes(head: &[u8]) -> Format {
    if head.len() >= 4 && &head[0..4] == b"MSCF" {
        return Format::Cab;
    }
    if head.len() >= 8 {
        if head[0..8] == szdd::SIGNATURE || head[0..8] == szdd::SIGNATURE_QBASIC {
            return Format::Szdd;
        }
        if head[0..8] == kwaj::SIGNATURE {
            return Format::Kwaj;
        }
        if head[0..8] == lit::SIGNATURE {
            return Format::Lit;
        }
    }
    if head.len() >= 4 {
        if &head[0..4] == b"ITSF" {
            return Format::Chm;
        }
        if head[0..4] == hlp::MAGIC {
            return Format::Hlp;
        }
    }
    if head.len() >= 8 {
        let hi = u32::from_le_bytes(head[0..4].try_into().unwrap());
        let lo = u32::from_le_bytes(head[4..8].try_into().unwrap());
        if (hi, lo) == (crate::oab::VERSION_HI, crate::oab::VERSION_LO) {
            return Format::Oab;
        }
    }
    Format::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection() {
        assert_eq!(detect_bytes(b"MSCF\x00\x00\x00\x00"), Format::Cab);
        assert_eq!(detect_bytes(&szdd::SIGNATURE), Format::Szdd);
        assert_eq!(detect_bytes(&szdd::SIGNATURE_QBASIC), Format::Szdd);
        assert_eq!(detect_bytes(&kwaj::SIGNATURE), Format::Kwaj);
        assert_eq!(detect_bytes(b"ITSF\x03\x00\x00\x00"), Format::Chm);
        assert_eq!(detect_bytes(b"ITOLITLS"), Format::Lit);
        assert_eq!(detect_bytes(&[0x3F, 0x5F, 0x03, 0x00]), Format::Hlp);
        assert_eq!(
            detect_bytes(&[3, 0, 0, 0, 1, 0, 0, 0]),
            Format::Oab
        );
        assert_eq!(detect_bytes(b"not a thing"), Format::Unknown);
    }
}
