//! File-oriented front end for the signature / delta / patch pipeline.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rollsync", version, about = "rsync-style signatures, deltas and patches over files")]
struct Cli {
    /// Print per-stage diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a signature of BASIS
    #[command(visible_alias = "s")]
    Signature {
        basis: PathBuf,
        /// Output path, defaults to BASIS.sign
        output: Option<PathBuf>,
        /// Signature block size in bytes
        #[arg(short = 'b', long, default_value_t = rollsync::DEFAULT_BLOCK_LEN)]
        block_size: u32,
        /// Strong checksum length, 32 or 64
        #[arg(short = 's', long, default_value_t = rollsync::DEFAULT_STRONG_SUM_LEN)]
        sum_size: u32,
    },
    /// Generate a delta from a signature and NEWFILE
    #[command(visible_alias = "d")]
    Delta {
        signature: PathBuf,
        newfile: PathBuf,
        /// Output path, defaults to NEWFILE-delta
        output: Option<PathBuf>,
    },
    /// Rebuild NEWFILE from BASIS and a delta
    #[command(visible_alias = "p")]
    Patch {
        basis: PathBuf,
        delta: PathBuf,
        /// Output path, defaults to BASIS-patch with the original extension
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Command::Signature {
            basis,
            output,
            block_size,
            sum_size,
        } => {
            let file = open(&basis)?;
            let basis_len = file.metadata()?.len();
            let out_path = output.unwrap_or_else(|| appended(&basis, ".sign"));
            let out = create(&out_path)?;
            rollsync::generate_signature_with_options(
                BufReader::new(file),
                basis_len,
                block_size,
                sum_size,
                out,
            )
            .with_context(|| format!("generate signature of {}", basis.display()))?;
        }
        Command::Delta {
            signature,
            newfile,
            output,
        } => {
            let sig = rollsync::load_signature(BufReader::new(open(&signature)?))
                .with_context(|| format!("load signature {}", signature.display()))?;
            let out_path = output.unwrap_or_else(|| appended(&newfile, "-delta"));
            rollsync::generate_delta(&sig, BufReader::new(open(&newfile)?), create(&out_path)?)
                .with_context(|| format!("generate delta of {}", newfile.display()))?;
        }
        Command::Patch {
            basis,
            delta,
            output,
        } => {
            let out_path = output.unwrap_or_else(|| patched(&basis));
            rollsync::apply_delta(
                BufReader::new(open(&delta)?),
                BufReader::new(open(&basis)?),
                create(&out_path)?,
            )
            .with_context(|| format!("apply {} to {}", delta.display(), basis.display()))?;
        }
    }
    Ok(())
}

fn open(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("open {}", path.display()))
}

fn create(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("create {}", path.display()))
}

fn appended(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// `dir/name.ext` becomes `dir/name-patch.ext`.
fn patched(basis: &Path) -> PathBuf {
    match basis.extension() {
        Some(ext) => {
            let mut name = basis.with_extension("").into_os_string();
            name.push("-patch.");
            name.push(ext);
            PathBuf::from(name)
        }
        None => appended(basis, "-patch"),
    }
}
