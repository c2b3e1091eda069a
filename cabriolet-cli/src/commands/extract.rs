//! `cabriolet extract` — pull files out of one or more archives.

use super::{OverwriteMode, TargetFormat};
use crate::utils::{restore_mtime, safe_join};
use cabriolet_archive::cab::CabinetSet;
use cabriolet_archive::detect::{detect, Format};
use cabriolet_archive::{kwaj, oab, szdd, CabOptions};
use cabriolet_core::entry::DosDateTime;
use cabriolet_core::error::{CabrioletError, Result};
use cabriolet_core::io::Handle;
use cabriolet_core::traits::ExtractStats;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Everything `extract` needs, bundled.
pub struct ExtractRequest {
    pub archives: Vec<PathBuf>,
    pub output: PathBuf,
    pub files: Vec<String>,
    pub join: bool,
    pub format: Option<TargetFormat>,
    pub salvage: bool,
    pub skip_checksum: bool,
    pub fix_mszip: bool,
    pub verbose: bool,
    pub overwrite_mode: OverwriteMode,
}

pub fn cmd_extract(request: ExtractRequest) -> Result<()> {
    std::fs::create_dir_all(&request.output)?;

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::with_template("{spinner} {pos} file(s)  {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );

    let totals = Mutex::new(ExtractStats::default());

    if request.join {
        let stats = extract_joined_set(&request, &progress)?;
        totals.lock().unwrap().merge(&stats);
    } else if request.archives.len() > 1 && request.overwrite_mode != OverwriteMode::Prompt {
        // Independent jobs fan out across the thread pool; each job owns
        // its handles and codec state, only the statistics are shared.
        let failures: Vec<CabrioletError> = request
            .archives
            .par_iter()
            .filter_map(|archive| {
                match extract_one(&request, archive, &progress) {
                    Ok(stats) => {
                        totals.lock().unwrap().merge(&stats);
                        None
                    }
                    Err(err) => Some(CabrioletError::argument(format!(
                        "{}: {err}",
                        archive.display()
                    ))),
                }
            })
            .collect();
        if let Some(first) = failures.into_iter().next() {
            return Err(first);
        }
    } else {
        for archive in &request.archives {
            let stats = extract_one(&request, archive, &progress)?;
            totals.lock().unwrap().merge(&stats);
        }
    }

    progress.finish_and_clear();
    let totals = totals.into_inner().unwrap();
    println!(
        "extracted {} file(s) ({} bytes), {} skipped, {} failed",
        totals.extracted, totals.bytes, totals.skipped, totals.failed
    );
    if totals.failed > 0 && !request.salvage {
        return Err(CabrioletError::decompress("some files failed to extract"));
    }
    Ok(())
}

fn cab_options(request: &ExtractRequest) -> CabOptions {
    CabOptions {
        salvage: request.salvage,
        skip_checksum: request.skip_checksum,
        fix_mszip: request.fix_mszip,
    }
}

fn extract_joined_set(request: &ExtractRequest, progress: &ProgressBar) -> Result<ExtractStats> {
    let mut archives = request.archives.iter();
    let first = archives
        .next()
        .ok_or_else(|| CabrioletError::argument("no archives given"))?;
    let mut set = CabinetSet::open_with(Handle::open(first)?, cab_options(request))?;
    for part in archives {
        set.append(Handle::open(part)?)?;
    }
    extract_cab_set(request, &mut set, progress)
}

fn extract_one(
    request: &ExtractRequest,
    archive: &Path,
    progress: &ProgressBar,
) -> Result<ExtractStats> {
    let mut handle = Handle::open(archive)?;
    let format = match request.format {
        Some(TargetFormat::Cab) => Format::Cab,
        Some(TargetFormat::Szdd) => Format::Szdd,
        Some(TargetFormat::Kwaj) => Format::Kwaj,
        Some(TargetFormat::Oab) => Format::Oab,
        None => detect(&mut handle)?,
    };

    match format {
        Format::Cab => {
            let mut set = CabinetSet::open_with(handle, cab_options(request))?;
            extract_cab_set(request, &mut set, progress)
        }
        Format::Szdd => {
            let (header, data) = if request.salvage {
                szdd::read_salvage(handle)?
            } else {
                szdd::read(handle)?
            };
            let default_name = archive
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "expanded.bin".to_string());
            let name = header.restore_name(&default_name);
            write_single(request, &name, &data, progress)
        }
        Format::Kwaj => {
            let (header, data) = kwaj::read(handle)?;
            let name = header.original_name().unwrap_or_else(|| {
                archive
                    .file_stem()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "expanded.bin".to_string())
            });
            write_single(request, &name, &data, progress)
        }
        Format::Oab => {
            let mut data = Vec::new();
            oab::read(handle, &mut data)?;
            let name = archive
                .file_stem()
                .map(|n| format!("{}.oab", n.to_string_lossy()))
                .unwrap_or_else(|| "addressbook.oab".to_string());
            write_single(request, &name, &data, progress)
        }
        other => Err(CabrioletError::unsupported(format!(
            "extracting {} archives",
            other.name()
        ))),
    }
}

fn wanted(request: &ExtractRequest, name: &str) -> bool {
    request.files.is_empty() || request.files.iter().any(|f| f == name)
}

fn may_write(request: &ExtractRequest, target: &Path) -> Result<bool> {
    if !target.exists() {
        return Ok(true);
    }
    match request.overwrite_mode {
        OverwriteMode::Overwrite => Ok(true),
        OverwriteMode::SkipExisting => Ok(false),
        OverwriteMode::Prompt => {
            let answer = dialoguer::Confirm::new()
                .with_prompt(format!("overwrite {}?", target.display()))
                .default(false)
                .interact()
                .map_err(|err| CabrioletError::argument(format!("prompt failed: {err}")))?;
            Ok(answer)
        }
    }
}

fn write_single(
    request: &ExtractRequest,
    name: &str,
    data: &[u8],
    progress: &ProgressBar,
) -> Result<ExtractStats> {
    let mut stats = ExtractStats::default();
    if !wanted(request, name) {
        stats.skipped = 1;
        return Ok(stats);
    }
    let target = safe_join(&request.output, name);
    if !may_write(request, &target)? {
        stats.skipped = 1;
        return Ok(stats);
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, data)?;
    progress.inc(1);
    if request.verbose {
        progress.println(format!("  {}", target.display()));
    }
    stats.extracted = 1;
    stats.bytes = data.len() as u64;
    Ok(stats)
}

fn extract_cab_set(
    request: &ExtractRequest,
    set: &mut CabinetSet<Handle>,
    progress: &ProgressBar,
) -> Result<ExtractStats> {
    let output = request.output.clone();
    let restore: Mutex<Vec<(PathBuf, DosDateTime)>> = Mutex::new(Vec::new());

    let stats = {
        let restore = &restore;
        let progress = progress.clone();
        let verbose = request.verbose;
        set.extract(move |file| {
            if !wanted(request, &file.name) {
                return Ok(None);
            }
            let target = safe_join(&output, &file.name);
            if !may_write(request, &target)? {
                return Ok(None);
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let sink = std::fs::File::create(&target)?;
            restore.lock().unwrap().push((target.clone(), file.datetime));
            progress.inc(1);
            if verbose {
                progress.println(format!("  {}", target.display()));
            }
            Ok(Some(Box::new(sink)))
        })?
    };

    for (path, datetime) in restore.into_inner().unwrap() {
        restore_mtime(&path, datetime);
    }
    Ok(stats)
}
