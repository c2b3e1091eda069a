//! Cabriolet CLI.
//!
//! A command-line front-end for the legacy Microsoft container family:
//! CAB, SZDD, KWAJ, CHM, HLP, LIT and OAB over the shared codec pool.

mod commands;
mod utils;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use commands::{cmd_create, cmd_detect, cmd_extract, cmd_info, cmd_list};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cabriolet")]
#[command(
    author,
    version,
    about = "Read and write legacy Microsoft containers (CAB, SZDD, KWAJ, OAB)"
)]
#[command(long_about = "
Cabriolet reads and writes the legacy Microsoft container family over a
shared pool of codecs (LZSS, MSZIP, LZX, Quantum).

Examples:
  cabriolet list setup.cab
  cabriolet list setup.cab --json
  cabriolet extract setup.cab -o out/
  cabriolet extract disk1.cab disk2.cab --join -o out/
  cabriolet extract readme.tx_ -o out/
  cabriolet create setup.cab file1.txt file2.txt --compression mszip
  cabriolet create readme.tx_ readme.txt --format szdd
  cabriolet info setup.cab
  cabriolet detect mystery.bin
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    /// Microsoft Cabinet.
    Cab,
    /// SZDD single-file.
    Szdd,
    /// KWAJ single-file.
    Kwaj,
    /// Offline Address Book.
    Oab,
}

#[derive(Clone, Copy, ValueEnum)]
enum CompressionArg {
    /// Stored.
    None,
    /// MSZIP (DEFLATE).
    Mszip,
    /// LZX.
    Lzx,
    /// Quantum.
    Quantum,
}

#[derive(Subcommand)]
enum Commands {
    /// List the contents of an archive
    #[command(alias = "l")]
    List {
        /// Archive file to list
        archive: PathBuf,

        /// Show verbose output (attributes, offsets, folders)
        #[arg(short, long)]
        verbose: bool,

        /// Output as JSON (machine-readable)
        #[arg(short, long)]
        json: bool,
    },

    /// Extract files from one or more archives
    #[command(alias = "x")]
    #[command(group = clap::ArgGroup::new("overwrite_mode").multiple(false))]
    Extract {
        /// Archive files to extract
        #[arg(required = true)]
        archives: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Only extract these names (all when empty)
        #[arg(short = 'f', long = "file")]
        files: Vec<String>,

        /// Treat the archives as one multi-part set, in order
        #[arg(long)]
        join: bool,

        /// Archive format (sniffed from magic bytes when omitted)
        #[arg(long, value_enum)]
        format: Option<FormatArg>,

        /// Keep going past damage, writing whatever can be recovered
        #[arg(long)]
        salvage: bool,

        /// Do not verify CAB block checksums
        #[arg(long)]
        skip_checksum: bool,

        /// Zero-pad damaged MSZIP frames instead of failing
        #[arg(long)]
        fix_mszip: bool,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Always overwrite existing files (default)
        #[arg(long, group = "overwrite_mode")]
        overwrite: bool,

        /// Skip extraction if the file already exists
        #[arg(long, group = "overwrite_mode")]
        skip_existing: bool,

        /// Ask before overwriting each file
        #[arg(long, group = "overwrite_mode")]
        prompt: bool,
    },

    /// Create an archive
    #[command(alias = "c")]
    Create {
        /// Archive file to create
        archive: PathBuf,

        /// Input files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "cab")]
        format: FormatArg,

        /// Compression method (CAB only)
        #[arg(long, value_enum, default_value = "mszip")]
        compression: CompressionArg,

        /// LZX/Quantum window size exponent
        #[arg(long, default_value_t = 16)]
        window_bits: u32,

        /// CAB set id
        #[arg(long, default_value_t = 0)]
        set_id: u16,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show archive diagnostics (header, folders, merge flags)
    Info {
        /// Archive file to inspect
        archive: PathBuf,
    },

    /// Report the detected format of a file
    Detect {
        /// File to sniff
        file: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::List {
            archive,
            verbose,
            json,
        } => cmd_list(&archive, verbose, json),
        Commands::Extract {
            archives,
            output,
            files,
            join,
            format,
            salvage,
            skip_checksum,
            fix_mszip,
            verbose,
            overwrite: _,
            skip_existing,
            prompt,
        } => {
            let overwrite_mode = if skip_existing {
                commands::OverwriteMode::SkipExisting
            } else if prompt {
                commands::OverwriteMode::Prompt
            } else {
                commands::OverwriteMode::Overwrite
            };
            cmd_extract(commands::ExtractRequest {
                archives,
                output,
                files,
                join,
                format: format.map(Into::into),
                salvage,
                skip_checksum,
                fix_mszip,
                verbose,
                overwrite_mode,
            })
        }
        Commands::Create {
            archive,
            inputs,
            format,
            compression,
            window_bits,
            set_id,
            verbose,
        } => cmd_create(commands::CreateRequest {
            archive,
            inputs,
            format: format.into(),
            compression: compression.into(),
            window_bits,
            set_id,
            verbose,
        }),
        Commands::Info { archive } => cmd_info(&archive),
        Commands::Detect { file } => cmd_detect(&file),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

impl From<FormatArg> for commands::TargetFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Cab => commands::TargetFormat::Cab,
            FormatArg::Szdd => commands::TargetFormat::Szdd,
            FormatArg::Kwaj => commands::TargetFormat::Kwaj,
            FormatArg::Oab => commands::TargetFormat::Oab,
        }
    }
}

impl From<CompressionArg> for commands::CompressionChoice {
    fn from(value: CompressionArg) -> Self {
        match value {
            CompressionArg::None => commands::CompressionChoice::None,
            CompressionArg::Mszip => commands::CompressionChoice::Mszip,
            CompressionArg::Lzx => commands::CompressionChoice::Lzx,
            CompressionArg::Quantum => commands::CompressionChoice::Quantum,
        }
    }
}
