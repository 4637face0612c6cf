//! Runtime configuration and format constants.

use std::thread;

use anyhow::{Context, Result, ensure};

use crate::secret::Key;

/// Default suffix appended to encrypted files.
pub const DEFAULT_ENCRYPT_EXT: &str = ".enc";

/// Plaintext chunk size for deterministic mode.
///
/// Each chunk is encrypted as one AEAD frame; the last chunk may be shorter.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Upper bound on a deterministic frame's declared ciphertext length.
///
/// A valid frame is at most CHUNK_SIZE plus the AEAD overhead; anything
/// larger is a corrupt or hostile length prefix and is rejected before
/// allocation.
pub const MAX_FRAME_SIZE: usize = CHUNK_SIZE + 128;

/// Read granularity for the randomized streaming codec.
pub const STREAM_BUFFER_SIZE: usize = 4096;

/// Runtime options shared by the encrypt, decrypt, check, and redact paths.
#[derive(Debug)]
pub struct Config {
    /// Positional arguments: files and directories to process.
    pub paths: Vec<String>,

    /// Include patterns from `--include`.
    pub include: Vec<String>,

    /// Exclude patterns from `--exclude`.
    pub exclude: Vec<String>,

    /// Optional JSONC file with additional include patterns.
    pub include_from: Option<String>,

    /// Optional JSONC file with additional exclude patterns.
    pub exclude_from: Option<String>,

    /// Worker limit for the scheduler.
    pub parallel: usize,

    /// Suffix appended on encrypt and stripped on decrypt.
    pub encrypt_ext: String,

    /// Suffix appended after stripping on decrypt. Empty restores the
    /// original name.
    pub decrypt_ext: String,

    /// Remove sources after successful processing.
    pub delete: bool,

    /// Copy the source mtime onto the output.
    pub preserve_timestamps: bool,

    /// Resolve and print the plan without writing anything.
    pub dry: bool,

    /// Suppress per-file success messages. Errors always print.
    pub quiet: bool,

    /// Print the summary block after the run.
    pub stats: bool,

    /// True for the decrypt subcommand.
    pub decrypt: bool,

    /// Deterministic mode (encrypt only; decrypt reads it from the header).
    pub deterministic: bool,

    /// Key material, absent for subcommands that need none.
    pub key: Option<Key>,
}

impl Config {
    /// Validates preconditions that must fail before any file I/O.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.paths.is_empty(), "no paths given");
        ensure!(self.parallel > 0, "parallel must be at least 1");

        let key = self.key.as_ref().context("a key must be provided via --key or --key-file")?;

        if !self.decrypt {
            // Encryption knows its mode up front, so the key length can be
            // checked against it now. Decryption checks per file after the
            // header names the mode.
            if self.deterministic {
                key.deterministic()?;
            } else {
                key.randomized()?;
            }
        }

        Ok(())
    }
}

/// Default worker count: one per available CPU.
pub fn default_parallelism() -> usize {
    thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
