//! `cabriolet list` — archive contents.

use crate::utils::{format_datetime, format_size};
use cabriolet_archive::cab::CabinetSet;
use cabriolet_archive::detect::{detect, Format};
use cabriolet_archive::{kwaj, szdd};
use cabriolet_core::error::{CabrioletError, Result};
use cabriolet_core::io::Handle;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ListEntry {
    name: String,
    size: u64,
    attributes: String,
    modified: Option<String>,
    folder: Option<usize>,
    compression: Option<String>,
}

pub fn cmd_list(archive: &Path, verbose: bool, json: bool) -> Result<()> {
    let mut handle = Handle::open(archive)?;
    let format = detect(&mut handle)?;

    let entries = match format {
        Format::Cab => {
            let mut set = CabinetSet::open(handle)?;
            let folders = std::mem::take(&mut set.folders);
            set.files
                .iter()
                .map(|file| ListEntry {
                    name: file.name.clone(),
                    size: u64::from(file.length),
                    attributes: file.attributes.display(),
                    modified: Some(format_datetime(file.datetime)),
                    folder: Some(file.folder),
                    compression: folders
                        .get(file.folder)
                        .map(|f| f.compression.name().to_string()),
                })
                .collect::<Vec<_>>()
        }
        Format::Szdd => {
            let header = szdd::SzddFile::parse(&mut handle)?;
            let name = header.restore_name(
                archive
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
                    .as_str(),
            );
            vec![ListEntry {
                name,
                size: u64::from(header.length),
                attributes: "----".to_string(),
                modified: None,
                folder: None,
                compression: Some("lzss".to_string()),
            }]
        }
        Format::Kwaj => {
            let header = kwaj::KwajFile::parse(&mut handle)?;
            vec![ListEntry {
                name: header.original_name().unwrap_or_else(|| {
                    archive
                        .file_stem()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                }),
                size: header.length.map(u64::from).unwrap_or(0),
                attributes: "----".to_string(),
                modified: None,
                folder: None,
                compression: Some(format!("{:?}", header.method).to_lowercase()),
            }]
        }
        other => {
            return Err(CabrioletError::unsupported(format!(
                "listing {} archives",
                other.name()
            )));
        }
    };

    if json {
        let rendered = serde_json::to_string_pretty(&entries)
            .map_err(|err| CabrioletError::format(format!("JSON encoding: {err}")))?;
        println!("{rendered}");
        return Ok(());
    }

    let total: u64 = entries.iter().map(|e| e.size).sum();
    for entry in &entries {
        if verbose {
            println!(
                "{:>10}  {}  {:>19}  {:<8}  {}",
                format_size(entry.size),
                entry.attributes,
                entry.modified.as_deref().unwrap_or("-"),
                entry.compression.as_deref().unwrap_or("-"),
                entry.name
            );
        } else {
            println!("{:>10}  {}", format_size(entry.size), entry.name);
        }
    }
    println!(
        "{} file(s), {} total",
        entries.len(),
        format_size(total)
    );
    Ok(())
}
