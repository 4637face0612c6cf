//! Command-line interface.

use anyhow::{Context, Result, ensure};
use clap::{Args, Parser, Subcommand};
use rand::rand_core::{OsRng, TryRngCore};

use crate::app;
use crate::config::{self, Config, DEFAULT_ENCRYPT_EXT};
use crate::secret::Key;

#[derive(Debug, Parser)]
#[command(
    name = "filecloak",
    version,
    about = "File encryption utility supporting deterministic and randomized modes."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Flags shared by every file-processing subcommand.
#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Files and directories to process.
    #[arg(default_value = ".")]
    pub paths: Vec<String>,

    /// Include pattern (find -path semantics, repeatable).
    #[arg(long)]
    pub include: Vec<String>,

    /// Exclude pattern (find -path semantics, repeatable).
    #[arg(long)]
    pub exclude: Vec<String>,

    /// JSONC file with additional include patterns.
    #[arg(long, value_name = "FILE")]
    pub include_from: Option<String>,

    /// JSONC file with additional exclude patterns.
    #[arg(long, value_name = "FILE")]
    pub exclude_from: Option<String>,

    /// Number of parallel workers.
    #[arg(short = 'j', long, default_value_t = config::default_parallelism())]
    pub parallel: usize,

    /// Suffix appended to encrypted files.
    #[arg(long, default_value = DEFAULT_ENCRYPT_EXT)]
    pub encrypt_ext: String,

    /// Suffix appended to decrypted files, after stripping the encrypted
    /// suffix.
    #[arg(long, default_value = "")]
    pub decrypt_ext: String,

    /// Remove source files after successful processing.
    #[arg(long)]
    pub delete: bool,

    /// Copy the source modification time onto the output.
    #[arg(long)]
    pub preserve_timestamps: bool,

    /// Resolve and print the plan without writing anything.
    #[arg(long)]
    pub dry: bool,

    /// Suppress per-file success messages.
    #[arg(short, long)]
    pub quiet: bool,

    /// Print summary statistics after the run.
    #[arg(long)]
    pub stats: bool,
}

/// Key source flags, mutually exclusive.
#[derive(Debug, Args)]
pub struct KeyArgs {
    /// Encryption key (64 or 128 hex characters).
    #[arg(short, long, conflicts_with = "key_file")]
    pub key: Option<String>,

    /// Path to a file holding the hex-encoded key.
    #[arg(short = 'f', long)]
    pub key_file: Option<String>,
}

impl KeyArgs {
    fn load(&self) -> Result<Option<Key>> {
        match (&self.key, &self.key_file) {
            (Some(hex_key), _) => Ok(Some(Key::from_hex(hex_key).context("reading key")?)),
            (None, Some(path)) => Ok(Some(Key::from_file(path).context("reading key")?)),
            (None, None) => Ok(None),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Encrypt files.
    #[command(alias = "enc")]
    Encrypt {
        #[command(flatten)]
        common: CommonArgs,

        #[command(flatten)]
        key: KeyArgs,

        /// Use deterministic encryption (requires a 64-byte key).
        #[arg(short, long)]
        deterministic: bool,
    },

    /// Decrypt files.
    #[command(alias = "dec")]
    Decrypt {
        #[command(flatten)]
        common: CommonArgs,

        #[command(flatten)]
        key: KeyArgs,
    },

    /// Validate that include/exclude patterns match files.
    Check {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Generate a new random key and print it as hex.
    #[command(alias = "gen")]
    Generate {
        /// Key length in bytes: 32 (randomized) or 64 (deterministic).
        #[arg(long, default_value_t = 32)]
        length: usize,
    },

    /// Replace file contents with a fixed string.
    #[command(alias = "red")]
    Redact {
        #[command(flatten)]
        common: CommonArgs,

        /// Replacement content for redacted files.
        #[arg(long, default_value = "<REDACTED>")]
        content: String,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}

impl Cli {
    pub fn execute(self) -> Result<()> {
        match self.command {
            Command::Encrypt { common, key, deterministic } => {
                let cfg = build_config(common, key.load()?, false, deterministic);
                app::run(&cfg)
            }

            Command::Decrypt { common, key } => {
                let cfg = build_config(common, key.load()?, true, false);
                app::run(&cfg)
            }

            Command::Check { common } => {
                let cfg = build_config(common, None, false, false);
                app::run_check(&cfg)
            }

            Command::Generate { length } => generate_key(length),

            Command::Redact { common, content } => {
                let cfg = build_config(common, None, false, false);
                app::run_redact(&cfg, &content)
            }
        }
    }
}

fn build_config(common: CommonArgs, key: Option<Key>, decrypt: bool, deterministic: bool) -> Config {
    Config {
        paths: common.paths,
        include: common.include,
        exclude: common.exclude,
        include_from: common.include_from,
        exclude_from: common.exclude_from,
        parallel: common.parallel,
        encrypt_ext: common.encrypt_ext,
        decrypt_ext: common.decrypt_ext,
        delete: common.delete,
        preserve_timestamps: common.preserve_timestamps,
        dry: common.dry,
        quiet: common.quiet,
        stats: common.stats,
        decrypt,
        deterministic,
        key,
    }
}

fn generate_key(length: usize) -> Result<()> {
    ensure!(length == 32 || length == 64, "key length must be 32 or 64 bytes");

    let mut key = vec![0u8; length];
    OsRng.try_fill_bytes(&mut key).map_err(|e| anyhow::anyhow!("generating key: {e}"))?;

    println!("{}", hex::encode(&key));

    Ok(())
}
