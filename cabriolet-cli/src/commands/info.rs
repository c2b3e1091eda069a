//! `cabriolet info` — header and structure diagnostics.

use crate::utils::format_size;
use cabriolet_archive::cab::header::{
    FLAG_NEXT_CABINET, FLAG_PREV_CABINET, FLAG_RESERVE_PRESENT,
};
use cabriolet_archive::cab::CabinetSet;
use cabriolet_archive::detect::{detect, Format};
use cabriolet_archive::{kwaj, oab, szdd};
use cabriolet_core::error::{CabrioletError, Result};
use cabriolet_core::io::Handle;
use std::path::Path;

pub fn cmd_info(archive: &Path) -> Result<()> {
    let mut handle = Handle::open(archive)?;
    let format = detect(&mut handle)?;
    println!("{}: {}", archive.display(), format.name());

    match format {
        Format::Cab => {
            let set = CabinetSet::open(handle)?;
            let cab = &set.cabinets[0];
            let header = &cab.header;
            println!("  cabinet size : {}", format_size(u64::from(header.cabinet_size)));
            println!(
                "  version      : {}.{}",
                header.version.0, header.version.1
            );
            println!("  set id       : {:#06x}", header.set_id);
            println!("  set index    : {}", header.cabinet_index);
            let mut flag_names = Vec::new();
            if header.flags & FLAG_PREV_CABINET != 0 {
                flag_names.push("prev-cabinet");
            }
            if header.flags & FLAG_NEXT_CABINET != 0 {
                flag_names.push("next-cabinet");
            }
            if header.flags & FLAG_RESERVE_PRESENT != 0 {
                flag_names.push("reserve");
            }
            println!(
                "  flags        : {:#06x} [{}]",
                header.flags,
                flag_names.join(", ")
            );
            if let Some(prev) = &header.prev {
                println!("  previous     : {} ({})", prev.cabinet, prev.disk);
            }
            if let Some(next) = &header.next {
                println!("  next         : {} ({})", next.cabinet, next.disk);
            }
            println!("  folders      : {}", set.folders.len());
            for (i, folder) in set.folders.iter().enumerate() {
                let mut notes = Vec::new();
                if folder.merge_prev {
                    notes.push("continues-from-previous");
                }
                if folder.merge_next {
                    notes.push("continues-to-next");
                }
                println!(
                    "    folder {i}: {} compression, {} block(s){}{}",
                    folder.compression.name(),
                    folder.block_count,
                    if notes.is_empty() { "" } else { " " },
                    notes.join(" ")
                );
            }
            println!("  files        : {}", set.files.len());
        }
        Format::Szdd => {
            let header = szdd::SzddFile::parse(&mut handle)?;
            println!("  variant      : {:?}", header.variant);
            println!(
                "  uncompressed : {}",
                format_size(u64::from(header.length))
            );
            if let Some(ch) = header.missing_char {
                println!("  missing char : {:?}", char::from(ch));
            }
        }
        Format::Kwaj => {
            let header = kwaj::KwajFile::parse(&mut handle)?;
            println!("  method       : {:?}", header.method);
            println!("  data offset  : {}", header.data_offset);
            println!("  flags        : {:#06x}", header.flags);
            if let Some(length) = header.length {
                println!("  uncompressed : {}", format_size(u64::from(length)));
            }
            if let Some(name) = header.original_name() {
                println!("  original name: {name}");
            }
        }
        Format::Oab => {
            let header = oab::OabHeader::parse(&mut handle)?;
            println!("  block max    : {}", format_size(u64::from(header.block_max)));
            println!(
                "  target size  : {}",
                format_size(u64::from(header.target_size))
            );
            println!("  lzx window   : 2^{}", header.window_bits());
        }
        other => {
            return Err(CabrioletError::unsupported(format!(
                "inspecting {} files",
                other.name()
            )));
        }
    }
    Ok(())
}
