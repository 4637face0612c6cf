//! Path derivation and file handle helpers.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

/// Derives the output path for an input file.
///
/// Encrypt appends `encrypt_ext`. Decrypt strips a trailing `encrypt_ext`
/// if present, then appends `decrypt_ext` (empty by default, restoring the
/// original name).
pub fn output_path(input: &Path, decrypt: bool, encrypt_ext: &str, decrypt_ext: &str) -> PathBuf {
    if !decrypt {
        let mut name = input.as_os_str().to_os_string();
        name.push(encrypt_ext);

        return PathBuf::from(name);
    }

    let text = input.to_string_lossy();
    let stripped = text.strip_suffix(encrypt_ext).unwrap_or(&text);

    PathBuf::from(format!("{stripped}{decrypt_ext}"))
}

/// Opens the source file for buffered reading.
pub fn open_source(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("opening input file {}", path.display()))?;

    Ok(BufReader::new(file))
}

/// Creates a temp file next to the intended output so the final rename
/// never crosses a filesystem boundary. Dropping the handle unlinks the
/// file, which is the cleanup guard for every error path.
pub fn create_temp_for(output: &Path) -> Result<NamedTempFile> {
    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(dir)
        .with_context(|| format!("creating temporary file in {}", dir.display()))
}
