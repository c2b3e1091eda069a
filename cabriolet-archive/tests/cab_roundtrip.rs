//! Write-then-read cabinet round-trips across every codec kind.

use cabriolet_archive::cab::CabinetSet;
use cabriolet_archive::{CabBuilder, CabOptions, CodecKind};
use cabriolet_core::entry::DosDateTime;
use std::io::Cursor;

fn noise(len: usize, mut seed: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        out.push((seed >> 24) as u8);
    }
    out
}

fn sample_files() -> Vec<(String, Vec<u8>)> {
    vec![
        ("readme.txt".to_string(), b"hello cabinet world".to_vec()),
        (
            "docs/guide.txt".to_string(),
            b"guide guide guide guide ".repeat(3000),
        ),
        ("bin/blob.dat".to_string(), noise(50_000, 0xC0FFEE)),
        ("empty.bin".to_string(), Vec::new()),
    ]
}

fn roundtrip(kind: CodecKind) {
    let files = sample_files();
    let mut builder = CabBuilder::new(kind);
    builder.set_id(0x1234);
    for (name, bytes) in &files {
        builder
            .add_bytes(
                bytes.clone(),
                name.clone(),
                DosDateTime::pack(2001, 6, 15, 10, 30, 0),
            )
            .unwrap();
    }
    let mut packed = Vec::new();
    builder.write(&mut packed).unwrap();

    let mut set = CabinetSet::open(Cursor::new(packed)).unwrap();
    assert_eq!(set.cabinets.len(), 1);
    assert_eq!(set.cabinets[0].header.set_id, 0x1234);
    assert_eq!(set.files.len(), files.len());

    for (name, bytes) in &files {
        let record = set.files.iter().find(|f| &f.name == name).unwrap();
        assert_eq!(record.length as usize, bytes.len());
        assert_eq!(
            record.datetime.unpack(),
            Some((2001, 6, 15, 10, 30, 0)),
            "timestamp survives for {name}"
        );
        let out = set.read_file(name).unwrap();
        assert_eq!(&out, bytes, "content survives for {name}");
    }
}

#[test]
fn roundtrip_stored() {
    roundtrip(CodecKind::None);
}

#[test]
fn roundtrip_mszip() {
    roundtrip(CodecKind::Mszip);
}

#[test]
fn roundtrip_lzx() {
    roundtrip(CodecKind::Lzx { window_bits: 16 });
}

#[test]
fn roundtrip_quantum() {
    roundtrip(CodecKind::Quantum { window_bits: 15 });
}

#[test]
fn shared_folder_state_extracts_all_files_in_one_pass() {
    // Three files in one MSZIP folder; extracting them together must use
    // one codec, and the bytes must match even though later files' frames
    // reference earlier files' window contents.
    let f1 = b"alpha ".repeat(9000);
    let f2 = b"alpha beta ".repeat(8000);
    let f3 = noise(40_000, 99);

    let mut builder = CabBuilder::new(CodecKind::Mszip);
    builder
        .add_bytes(f1.clone(), "f1", DosDateTime::default())
        .unwrap()
        .add_bytes(f2.clone(), "f2", DosDateTime::default())
        .unwrap()
        .add_bytes(f3.clone(), "f3", DosDateTime::default())
        .unwrap();
    let mut packed = Vec::new();
    builder.write(&mut packed).unwrap();

    let mut set = CabinetSet::open(Cursor::new(packed)).unwrap();
    let collected = std::sync::Arc::new(std::sync::Mutex::new(Vec::<(String, Vec<u8>)>::new()));

    struct Tee(std::sync::Arc<std::sync::Mutex<Vec<(String, Vec<u8>)>>>, String);
    impl std::io::Write for Tee {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let mut guard = self.0.lock().unwrap();
            match guard.iter_mut().find(|(name, _)| name == &self.1) {
                Some((_, bytes)) => bytes.extend_from_slice(buf),
                None => guard.push((self.1.clone(), buf.to_vec())),
            }
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let capture = collected.clone();
    let stats = set
        .extract(move |file| {
            Ok(Some(Box::new(Tee(capture.clone(), file.name.clone()))))
        })
        .unwrap();
    assert_eq!(stats.extracted, 3);
    assert_eq!(stats.failed, 0);

    let guard = collected.lock().unwrap();
    let lookup = |name: &str| {
        guard
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b.clone())
            .unwrap()
    };
    assert_eq!(lookup("f1"), f1);
    assert_eq!(lookup("f2"), f2);
    assert_eq!(lookup("f3"), f3);
}

#[test]
fn skipping_early_files_still_positions_later_ones() {
    let f1 = noise(70_000, 1);
    let f2 = b"wanted file".repeat(500);

    let mut builder = CabBuilder::new(CodecKind::Lzx { window_bits: 15 });
    builder
        .add_bytes(f1, "skipme", DosDateTime::default())
        .unwrap()
        .add_bytes(f2.clone(), "wanted", DosDateTime::default())
        .unwrap();
    let mut packed = Vec::new();
    builder.write(&mut packed).unwrap();

    let mut set = CabinetSet::open(Cursor::new(packed)).unwrap();
    let out = set.read_file("wanted").unwrap();
    assert_eq!(out, f2);
}

#[test]
fn salvage_returns_partial_files_from_truncated_cabinet() {
    let body = noise(120_000, 77);
    let mut builder = CabBuilder::new(CodecKind::Mszip);
    builder
        .add_bytes(body.clone(), "big.bin", DosDateTime::default())
        .unwrap();
    let mut packed = Vec::new();
    builder.write(&mut packed).unwrap();

    // Cut inside the data area.
    packed.truncate(packed.len() * 2 / 3);

    let mut set = CabinetSet::open_with(
        Cursor::new(packed),
        CabOptions {
            salvage: true,
            skip_checksum: true,
            ..Default::default()
        },
    )
    .unwrap();
    let out = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let capture = out.clone();

    struct Sink(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);
    impl std::io::Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    // No error escapes in salvage mode; whatever came out is a prefix.
    set.extract(move |_| Ok(Some(Box::new(Sink(capture.clone())))))
        .unwrap();
    let partial = out.lock().unwrap();
    assert!(partial.len() <= body.len());
    assert_eq!(partial[..], body[..partial.len()]);
}

#[test]
fn checksum_damage_is_rejected_without_salvage() {
    let mut builder = CabBuilder::new(CodecKind::None);
    builder
        .add_bytes(b"checksummed".to_vec(), "x", DosDateTime::default())
        .unwrap();
    let mut packed = Vec::new();
    builder.write(&mut packed).unwrap();
    // Flip a payload byte (the last byte of the file is inside the last
    // data block).
    let last = packed.len() - 1;
    packed[last] ^= 0x55;

    let mut set = CabinetSet::open(Cursor::new(packed)).unwrap();
    let err = set.read_file("x").unwrap_err();
    assert!(matches!(
        err,
        cabriolet_core::error::CabrioletError::Checksum { .. }
    ));
}

#[test]
fn embedded_cabinet_search_finds_offsets() {
    let mut builder = CabBuilder::new(CodecKind::None);
    builder
        .add_bytes(b"embedded".to_vec(), "e.txt", DosDateTime::default())
        .unwrap();
    let mut cab_bytes = Vec::new();
    builder.write(&mut cab_bytes).unwrap();

    // Sandwich the cabinet between junk, including a decoy magic.
    let mut carrier = Vec::new();
    carrier.extend_from_slice(&noise(10_000, 5));
    carrier.extend_from_slice(b"MSCF");
    carrier.extend_from_slice(&noise(100, 6));
    let offset = carrier.len() as u64;
    carrier.extend_from_slice(&cab_bytes);
    carrier.extend_from_slice(&noise(5_000, 7));

    let found = cabriolet_archive::cab::search(&mut Cursor::new(&carrier)).unwrap();
    assert_eq!(found, vec![offset]);

    let mut set = CabinetSet::open_at(Cursor::new(carrier), offset, CabOptions::default()).unwrap();
    assert_eq!(set.read_file("e.txt").unwrap(), b"embedded");
}
