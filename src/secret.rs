//! Key material handling.
//!
//! Keys arrive as hex, either directly on the command line or from a key
//! file. The decoded length decides which modes are usable: 32 bytes for
//! the randomized AES-256 path, 64 bytes for deterministic AES-SIV.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use zeroize::Zeroizing;

/// Key size for the randomized AES-256-CTR mode.
pub const RANDOMIZED_KEY_SIZE: usize = 32;

/// Key size for the deterministic AES-SIV mode.
pub const DETERMINISTIC_KEY_SIZE: usize = 64;

/// Raw key bytes, wiped on drop.
#[derive(Clone)]
pub struct Key {
    bytes: Zeroizing<Vec<u8>>,
}

impl Key {
    /// Decodes a hex key, accepting only the two supported lengths.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let bytes = Zeroizing::new(hex::decode(hex_key.trim()).context("decoding key")?);

        match bytes.len() {
            RANDOMIZED_KEY_SIZE | DETERMINISTIC_KEY_SIZE => Ok(Self { bytes }),
            n => bail!("key must be 32 bytes (64 hex characters) or 64 bytes (128 hex characters), got {n} bytes"),
        }
    }

    /// Reads a hex key from a file, ignoring surrounding whitespace.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = Zeroizing::new(
            fs::read_to_string(path).with_context(|| format!("reading key file {}", path.display()))?,
        );

        Self::from_hex(&contents)
    }

    /// The 32-byte key for randomized mode, or an error naming the
    /// requirement.
    pub fn randomized(&self) -> Result<&[u8]> {
        if self.bytes.len() != RANDOMIZED_KEY_SIZE {
            bail!("key must be 32 bytes (64 hex characters) for AES-256");
        }

        Ok(&self.bytes)
    }

    /// The 64-byte key for deterministic mode, or an error naming the
    /// requirement.
    pub fn deterministic(&self) -> Result<&[u8]> {
        if self.bytes.len() != DETERMINISTIC_KEY_SIZE {
            bail!("key must be 64 bytes (128 hex characters) for AES-SIV");
        }

        Ok(&self.bytes)
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key").field("len", &self.bytes.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_both_supported_lengths() {
        let short = Key::from_hex(&"00".repeat(32)).unwrap();
        assert!(short.randomized().is_ok());
        assert!(short.deterministic().is_err());

        let long = Key::from_hex(&"ff".repeat(64)).unwrap();
        assert!(long.deterministic().is_ok());
        assert!(long.randomized().is_err());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Key::from_hex("not hex").is_err());
        assert!(Key::from_hex(&"aa".repeat(16)).is_err());
        assert!(Key::from_hex("").is_err());
    }

    #[test]
    fn trims_whitespace() {
        let key = Key::from_hex(&format!("  {}\n", "ab".repeat(32))).unwrap();
        assert!(key.randomized().is_ok());
    }

    #[test]
    fn reads_key_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", "cd".repeat(64)).unwrap();

        let key = Key::from_file(file.path()).unwrap();
        assert!(key.deterministic().is_ok());
    }
}
