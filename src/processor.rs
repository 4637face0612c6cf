//! Per-file orchestration.
//!
//! Each file runs the same shape: stat the source, create a temp file in
//! the output directory, stream the body codec, set permissions, and
//! atomically rename the temp over the output path. The temp file is
//! unlinked on every failure path by its drop guard, so a partial output
//! never becomes visible.

use std::fs;
use std::io::{BufWriter, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use filetime::FileTime;
use tracing::debug;

use crate::config::Config;
use crate::crypto::{Deterministic, Randomized};
use crate::envelope::{HEADER_SIZE, Header, Mode};
use crate::file::operations::{create_temp_for, open_source, output_path};
use crate::secret::Key;
use crate::types::FileResult;

const EXECUTABLE_BITS: u32 = 0o111;
const OWNER_READ_WRITE: u32 = 0o600;

/// Drives encryption or decryption for individual files. One processor is
/// shared read-only across all workers.
pub struct FileProcessor {
    decrypt: bool,
    deterministic: bool,
    key: Key,
    encrypt_ext: String,
    decrypt_ext: String,
    preserve_timestamps: bool,
}

impl FileProcessor {
    pub fn new(cfg: &Config) -> Result<Self> {
        let key = cfg.key.clone().context("a key must be provided via --key or --key-file")?;

        Ok(Self {
            decrypt: cfg.decrypt,
            deterministic: cfg.deterministic,
            key,
            encrypt_ext: cfg.encrypt_ext.clone(),
            decrypt_ext: cfg.decrypt_ext.clone(),
            preserve_timestamps: cfg.preserve_timestamps,
        })
    }

    /// Derives the output path for an input, mirroring what a real run
    /// would produce. Used by the dry-run preview as well.
    pub fn planned_output(&self, input: &Path) -> PathBuf {
        output_path(input, self.decrypt, &self.encrypt_ext, &self.decrypt_ext)
    }

    /// Processes one file, capturing any failure in the result.
    pub fn process(&self, input: &Path) -> FileResult {
        let output = self.planned_output(input);

        match self.run(input, &output) {
            Ok(size) => FileResult::ok(input.to_path_buf(), output, size),
            Err(error) => FileResult::err(input.to_path_buf(), error),
        }
    }

    fn run(&self, input: &Path, output: &Path) -> Result<u64> {
        let info = fs::metadata(input).with_context(|| format!("getting file info for {}", input.display()))?;
        let source_executable = info.permissions().mode() & EXECUTABLE_BITS != 0;

        let mut temp = create_temp_for(output)?;
        let mut reader = open_source(input)?;

        debug!(input = %input.display(), output = %output.display(), "processing");

        let executable = {
            let mut writer = BufWriter::new(temp.as_file_mut());

            let executable = if self.decrypt {
                self.decrypt_to(&mut reader, &mut writer)?
            } else {
                self.encrypt_to(&mut reader, &mut writer, source_executable)?;
                source_executable
            };

            writer.flush().context("flushing output")?;
            executable
        };

        let mut mode = OWNER_READ_WRITE;
        if executable {
            mode |= EXECUTABLE_BITS;
        }

        temp.as_file()
            .set_permissions(fs::Permissions::from_mode(mode))
            .context("setting file permissions")?;

        // The rename is the linearization point: observers see either the
        // old file or the complete new one.
        temp.persist(output)
            .map_err(|e| e.error)
            .with_context(|| format!("renaming output file {}", output.display()))?;

        if self.preserve_timestamps {
            let mtime = FileTime::from_last_modification_time(&info);
            filetime::set_file_times(output, mtime, mtime).context("preserving timestamps")?;
        }

        let out_info = fs::metadata(output).with_context(|| format!("stat output {}", output.display()))?;

        Ok(out_info.len())
    }

    fn encrypt_to<R: Read, W: Write>(&self, reader: R, writer: &mut W, executable: bool) -> Result<()> {
        let mode = if self.deterministic { Mode::Deterministic } else { Mode::Randomized };

        let header = Header::new(mode, executable);
        header.write_to(writer)?;

        let header_bytes = header.to_bytes();
        match mode {
            Mode::Deterministic => {
                Deterministic::new(self.key.deterministic()?)?.encrypt_stream(reader, writer, &header_bytes)
            }
            Mode::Randomized => {
                Randomized::new(self.key.randomized()?)?.encrypt_stream(reader, writer, &header_bytes)
            }
        }
    }

    /// Decrypts the body after the header names the mode. Returns whether
    /// the original file was executable.
    fn decrypt_to<R: Read, W: Write>(&self, reader: &mut R, writer: &mut W) -> Result<bool> {
        let header = Header::read_from(reader)?;
        let header_bytes: [u8; HEADER_SIZE] = header.to_bytes();

        match header.mode {
            Mode::Deterministic => {
                Deterministic::new(self.key.deterministic()?)?.decrypt_stream(reader, writer, &header_bytes)?;
            }
            Mode::Randomized => {
                Randomized::new(self.key.randomized()?)?.decrypt_stream(reader, writer, &header_bytes)?;
            }
        }

        Ok(header.executable)
    }
}
