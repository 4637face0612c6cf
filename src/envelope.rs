//! The on-disk envelope header.
//!
//! Every encrypted file starts with a fixed 7-byte header:
//!
//! | Offset | Size | Field   | Notes                                    |
//! |--------|------|---------|------------------------------------------|
//! | 0      | 4    | Magic   | ASCII `GONC`                             |
//! | 4      | 1    | Version | `0x01`                                   |
//! | 5      | 1    | Flags   | bit 0 = executable; others reserved      |
//! | 6      | 1    | Mode    | `0x01` deterministic, `0x02` randomized  |
//!
//! The header is written before any ciphertext and is authenticated by
//! both body formats.

use std::io::{Read, Write};

use anyhow::{Context, Result, bail};

/// File type marker at the start of every envelope.
pub const MAGIC: [u8; 4] = *b"GONC";

/// Current envelope version.
pub const VERSION: u8 = 0x01;

/// Total header length in bytes.
pub const HEADER_SIZE: usize = 7;

const FLAG_EXECUTABLE: u8 = 0x01;

/// Body format identifier.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    /// AES-SIV chunk frames; identical input produces identical output.
    Deterministic = 0x01,

    /// AES-256-CTR with a fresh IV and an HMAC-SHA256 trailer.
    Randomized = 0x02,
}

impl Mode {
    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(Self::Deterministic),
            0x02 => Ok(Self::Randomized),
            other => bail!("unsupported envelope mode {other}"),
        }
    }
}

/// Parsed envelope header.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Header {
    pub mode: Mode,
    pub executable: bool,
}

impl Header {
    #[inline]
    pub fn new(mode: Mode, executable: bool) -> Self {
        Self { mode, executable }
    }

    /// Serializes the header. These bytes also feed the associated data
    /// (deterministic mode) and the MAC (randomized mode).
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut flags = 0;
        if self.executable {
            flags |= FLAG_EXECUTABLE;
        }

        [MAGIC[0], MAGIC[1], MAGIC[2], MAGIC[3], VERSION, flags, self.mode as u8]
    }

    /// Writes the header at the start of an output file.
    pub fn write_to<W: Write>(self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()).context("writing envelope header")
    }

    /// Reads and validates the header at the start of an input file.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        reader.read_exact(&mut buf).context("reading envelope header")?;

        if buf[..4] != MAGIC {
            bail!("invalid envelope magic");
        }

        let version = buf[4];
        if version != VERSION {
            bail!("unsupported envelope version {version}");
        }

        let flags = buf[5];
        let mode = Mode::from_byte(buf[6])?;

        Ok(Self { mode, executable: flags & FLAG_EXECUTABLE != 0 })
    }
}
