//! Multi-part cabinet sets: merge arithmetic, split-block extraction and
//! join validation.

use cabriolet_archive::cab::checksum;
use cabriolet_archive::cab::header::{
    CabHeader, CfData, CfFile, CfFolder, ReserveSizes, FOLDER_CONTINUED_FROM_PREV,
    FOLDER_CONTINUED_TO_NEXT, VERSION,
};
use cabriolet_archive::cab::CabinetSet;
use cabriolet_archive::{CabOptions, CodecKind};
use cabriolet_core::entry::{Attributes, DosDateTime};
use std::io::Cursor;

/// A folder to synthesize: compression plus its pre-built data blocks as
/// (uncompressed_size, payload) pairs.
struct TestFolder {
    blocks: Vec<(u16, Vec<u8>)>,
}

/// A file entry to synthesize.
struct TestFile {
    name: &'static str,
    length: u32,
    offset: u32,
    folder_index: u16,
}

/// Hand-assemble a stored-compression cabinet.
fn build_cabinet(set_id: u16, index: u16, folders: &[TestFolder], files: &[TestFile]) -> Vec<u8> {
    let records: Vec<CfFile> = files
        .iter()
        .map(|f| CfFile {
            length: f.length,
            offset: f.offset,
            folder_index: f.folder_index,
            datetime: DosDateTime::default(),
            attributes: Attributes::new(),
            name: f.name.to_string(),
        })
        .collect();

    let files_offset = 36 + 8 * folders.len() as u32;
    let files_len: u32 = records.iter().map(|r| r.emitted_len() as u32).sum();
    let mut data_offset = files_offset + files_len;

    let mut folder_records = Vec::new();
    let mut data_area = Vec::new();
    for folder in folders {
        folder_records.push(CfFolder {
            data_offset,
            num_blocks: folder.blocks.len() as u16,
            compression: CodecKind::None,
        });
        for (uncompressed, payload) in &folder.blocks {
            let seed = checksum::data_seed(payload.len() as u16, *uncompressed);
            CfData {
                checksum: checksum::checksum(payload, seed),
                compressed_size: payload.len() as u16,
                uncompressed_size: *uncompressed,
            }
            .emit(&mut data_area)
            .unwrap();
            data_area.extend_from_slice(payload);
            data_offset += 8 + payload.len() as u32;
        }
    }

    let mut out = Vec::new();
    CabHeader {
        cabinet_size: data_offset,
        files_offset,
        version: VERSION,
        num_folders: folders.len() as u16,
        num_files: records.len() as u16,
        flags: 0,
        set_id,
        cabinet_index: index,
        reserve: ReserveSizes::default(),
        prev: None,
        next: None,
    }
    .emit(&mut out)
    .unwrap();
    for record in &folder_records {
        record.emit(&mut out, 0).unwrap();
    }
    for record in &records {
        record.emit(&mut out).unwrap();
    }
    out.extend_from_slice(&data_area);
    out
}

fn block(uncompressed: &[u8]) -> (u16, Vec<u8>) {
    (uncompressed.len() as u16, uncompressed.to_vec())
}

/// The left half of a split block: declared uncompressed size zero.
fn split_left(payload: &[u8]) -> (u16, Vec<u8>) {
    (0, payload.to_vec())
}

#[test]
fn three_cabinet_merge_arithmetic() {
    // A has two folders, the last continuing out; B continues it, carries
    // a second folder continuing out in turn; C finishes. Folder count
    // must come to 2 + 2 + 1 - 2 = 3 and both duplicate files must drop.
    let a = build_cabinet(
        7,
        0,
        &[
            TestFolder {
                blocks: vec![block(b"a0data")],
            },
            TestFolder {
                blocks: vec![block(b"dup1 left "), split_left(b"")],
            },
        ],
        &[
            TestFile {
                name: "a0.txt",
                length: 6,
                offset: 0,
                folder_index: 0,
            },
            TestFile {
                name: "dup1.txt",
                length: 20,
                offset: 0,
                folder_index: FOLDER_CONTINUED_TO_NEXT,
            },
        ],
    );
    let b = build_cabinet(
        7,
        1,
        &[
            TestFolder {
                blocks: vec![block(b"dup1 right")],
            },
            TestFolder {
                blocks: vec![block(b"dup2 left "), split_left(b"")],
            },
        ],
        &[
            TestFile {
                name: "dup1.txt",
                length: 20,
                offset: 0,
                folder_index: FOLDER_CONTINUED_FROM_PREV,
            },
            TestFile {
                name: "dup2.txt",
                length: 20,
                offset: 0,
                folder_index: FOLDER_CONTINUED_TO_NEXT,
            },
        ],
    );
    let c = build_cabinet(
        7,
        2,
        &[TestFolder {
            blocks: vec![block(b"dup2 right")],
        }],
        &[TestFile {
            name: "dup2.txt",
            length: 20,
            offset: 0,
            folder_index: FOLDER_CONTINUED_FROM_PREV,
        }],
    );

    let mut set = CabinetSet::open(Cursor::new(a)).unwrap();
    set.append(Cursor::new(b)).unwrap();
    set.append(Cursor::new(c)).unwrap();

    assert_eq!(set.folders.len(), 3);
    assert_eq!(set.cabinets.len(), 3);
    let names: Vec<&str> = set.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names.iter().filter(|n| **n == "dup1.txt").count(), 1);
    assert_eq!(names.iter().filter(|n| **n == "dup2.txt").count(), 1);
    assert_eq!(set.files.len(), 3);

    // The chain links run A -> B -> C and stop.
    assert_eq!(set.cabinets[0].next_cabinet, Some(1));
    assert_eq!(set.cabinets[1].next_cabinet, Some(2));
    assert_eq!(set.cabinets[2].next_cabinet, None);
    assert_eq!(set.cabinets[1].prev_cabinet, Some(0));

    // Merged block counts: the boundary block is shared.
    assert_eq!(set.folders[1].block_count, 2 + 1 - 1);
    assert_eq!(set.folders[2].block_count, 2 + 1 - 1);
}

#[test]
fn split_block_extraction_joins_across_cabinets() {
    // "HelloWorld" spans two cabinets: "Hello" in a whole block, then a
    // split block whose left half carries "Wo" and right half "rld".
    let a = build_cabinet(
        9,
        0,
        &[TestFolder {
            blocks: vec![block(b"Hello"), split_left(b"Wo")],
        }],
        &[TestFile {
            name: "hw.txt",
            length: 10,
            offset: 0,
            folder_index: FOLDER_CONTINUED_TO_NEXT,
        }],
    );
    let b = build_cabinet(
        9,
        1,
        &[TestFolder {
            blocks: vec![(5, b"rld".to_vec())],
        }],
        &[TestFile {
            name: "hw.txt",
            length: 10,
            offset: 0,
            folder_index: FOLDER_CONTINUED_FROM_PREV,
        }],
    );

    let mut set = CabinetSet::open(Cursor::new(a)).unwrap();
    set.append(Cursor::new(b)).unwrap();
    assert_eq!(set.read_file("hw.txt").unwrap(), b"HelloWorld");
}

#[test]
fn append_validation_fails_fast() {
    let make = |set_id, index, merge_next, merge_prev| {
        let folder_index = if merge_next {
            FOLDER_CONTINUED_TO_NEXT
        } else if merge_prev {
            FOLDER_CONTINUED_FROM_PREV
        } else {
            0
        };
        build_cabinet(
            set_id,
            index,
            &[TestFolder {
                blocks: vec![block(b"x")],
            }],
            &[TestFile {
                name: "f",
                length: 1,
                offset: 0,
                folder_index,
            }],
        )
    };

    // Wrong set id.
    let mut set = CabinetSet::open(Cursor::new(make(1, 0, true, false))).unwrap();
    assert!(set.append(Cursor::new(make(2, 1, false, true))).is_err());
    assert_eq!(set.cabinets.len(), 1, "failed append must not mutate");

    // Non-consecutive index.
    let mut set = CabinetSet::open(Cursor::new(make(1, 0, true, false))).unwrap();
    assert!(set.append(Cursor::new(make(1, 5, false, true))).is_err());

    // Same cabinet twice (self-join).
    let mut set = CabinetSet::open(Cursor::new(make(1, 0, true, false))).unwrap();
    assert!(set.append(Cursor::new(make(1, 0, true, false))).is_err());

    // No merge flags on either side.
    let mut set = CabinetSet::open(Cursor::new(make(1, 0, false, false))).unwrap();
    assert!(set.append(Cursor::new(make(1, 1, false, false))).is_err());

    // A valid join still works after all those rejections.
    let mut set = CabinetSet::open(Cursor::new(make(1, 0, true, false))).unwrap();
    set.append(Cursor::new(make(1, 1, false, true))).unwrap();
    assert_eq!(set.cabinets.len(), 2);
}

#[test]
fn missing_continuation_is_detected() {
    // A split block with no following cabinet: strict mode errors, salvage
    // yields the prefix.
    let a = build_cabinet(
        3,
        0,
        &[TestFolder {
            blocks: vec![block(b"Hello"), split_left(b"Wo")],
        }],
        &[TestFile {
            name: "hw.txt",
            length: 10,
            offset: 0,
            folder_index: FOLDER_CONTINUED_TO_NEXT,
        }],
    );

    let mut set = CabinetSet::open(Cursor::new(a.clone())).unwrap();
    assert!(set.read_file("hw.txt").is_err());

    let mut set = CabinetSet::open_with(
        Cursor::new(a),
        CabOptions {
            salvage: true,
            ..Default::default()
        },
    )
    .unwrap();
    let partial = set.read_file("hw.txt").unwrap();
    assert_eq!(&partial, b"HelloWo");
}
