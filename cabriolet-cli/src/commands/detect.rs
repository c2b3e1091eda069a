//! `cabriolet detect` — magic-byte sniffing.

use cabriolet_archive::detect::detect;
use cabriolet_core::error::Result;
use cabriolet_core::io::Handle;
use std::path::Path;

pub fn cmd_detect(file: &Path) -> Result<()> {
    let mut handle = Handle::open(file)?;
    let format = detect(&mut handle)?;
    println!("{}: {}", file.display(), format.name());
    Ok(())
}
