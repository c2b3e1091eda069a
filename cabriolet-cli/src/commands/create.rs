//! `cabriolet create` — build an archive from input files.

use super::{CompressionChoice, TargetFormat};
use crate::utils::{mtime_of, read_input};
use cabriolet_archive::{kwaj, oab, szdd, CabBuilder};
use cabriolet_core::error::{CabrioletError, Result};
use cabriolet_core::io::Handle;
use std::io::Write;
use std::path::PathBuf;

/// Everything `create` needs, bundled.
pub struct CreateRequest {
    pub archive: PathBuf,
    pub inputs: Vec<PathBuf>,
    pub format: TargetFormat,
    pub compression: CompressionChoice,
    pub window_bits: u32,
    pub set_id: u16,
    pub verbose: bool,
}

pub fn cmd_create(request: CreateRequest) -> Result<()> {
    match request.format {
        TargetFormat::Cab => create_cab(&request),
        TargetFormat::Szdd => create_szdd(&request),
        TargetFormat::Kwaj => create_kwaj(&request),
        TargetFormat::Oab => create_oab(&request),
    }
}

fn single_input(request: &CreateRequest) -> Result<&PathBuf> {
    match request.inputs.as_slice() {
        [one] => Ok(one),
        _ => Err(CabrioletError::argument(format!(
            "{:?} archives hold exactly one file",
            request.format
        ))),
    }
}

fn create_cab(request: &CreateRequest) -> Result<()> {
    let kind = request.compression.to_kind(request.window_bits)?;
    let mut builder = CabBuilder::new(kind);
    builder.set_id(request.set_id);
    for input in &request.inputs {
        let name = input
            .file_name()
            .ok_or_else(|| {
                CabrioletError::argument(format!("{}: not a file path", input.display()))
            })?
            .to_string_lossy()
            .into_owned();
        builder
            .files_mut()
            .add_file(input.clone(), name)?
            .datetime = mtime_of(input);
        if request.verbose {
            println!("  adding {}", input.display());
        }
    }
    let mut out = Handle::create(&request.archive)?;
    builder.write(&mut out)?;
    out.flush()?;
    println!(
        "created {} ({} file(s), {})",
        request.archive.display(),
        request.inputs.len(),
        kind.name()
    );
    Ok(())
}

fn create_szdd(request: &CreateRequest) -> Result<()> {
    let input = single_input(request)?;
    let data = read_input(input)?;
    // The replaced-final-character convention: SETUP.EXE packs to
    // SETUP.EX_ and records the 'E'.
    let missing = match (
        input.extension().and_then(|e| e.to_str()),
        request.archive.to_string_lossy().ends_with('_'),
    ) {
        (Some(ext), true) => ext.bytes().last(),
        _ => None,
    };
    let mut out = Handle::create(&request.archive)?;
    szdd::write(&mut out, &data, missing)?;
    out.flush()?;
    println!("created {}", request.archive.display());
    Ok(())
}

fn create_kwaj(request: &CreateRequest) -> Result<()> {
    let input = single_input(request)?;
    let data = read_input(input)?;
    let name = input
        .file_stem()
        .and_then(|n| n.to_str())
        .map(str::to_uppercase);
    let ext = input
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_uppercase);
    let options = kwaj::KwajWriteOptions {
        record_length: true,
        name: match (name, ext) {
            (Some(name), Some(ext)) if name.len() <= 8 && ext.len() <= 3 => Some((name, ext)),
            _ => None,
        },
    };
    let mut out = Handle::create(&request.archive)?;
    kwaj::write(&mut out, &data, kwaj::KwajMethod::Lzss, &options)?;
    out.flush()?;
    println!("created {}", request.archive.display());
    Ok(())
}

fn create_oab(request: &CreateRequest) -> Result<()> {
    let input = single_input(request)?;
    let data = read_input(input)?;
    let mut out = Handle::create(&request.archive)?;
    oab::write(&mut out, &data, 32768)?;
    out.flush()?;
    println!("created {}", request.archive.display());
    Ok(())
}
