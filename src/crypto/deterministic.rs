//! Deterministic chunked AEAD codec.
//!
//! The body is a sequence of frames, each a 4-byte big-endian ciphertext
//! length followed by the AES-SIV output for one plaintext chunk of up to
//! [`CHUNK_SIZE`](crate::config::CHUNK_SIZE) bytes. Chunk `i` is encrypted
//! with associated data `header || u64 BE i`, which ties every frame to
//! its envelope and position: a frame cannot be dropped, reordered, or
//! spliced in from another file without failing authentication.
//!
//! Empty input produces zero frames, leaving a header-only file.

use std::io::{self, Read, Write};

use aes_siv::aead::{Aead, Payload};
use aes_siv::{Aes256SivAead, KeyInit, Nonce};
use anyhow::{Context, Result, anyhow, bail};
use byteorder::{BigEndian, WriteBytesExt};

use crate::config::{CHUNK_SIZE, MAX_FRAME_SIZE};
use crate::envelope::HEADER_SIZE;

/// Deterministic codec backed by AES-SIV with a 64-byte key.
pub struct Deterministic {
    cipher: Aes256SivAead,
}

impl Deterministic {
    pub fn new(key: &[u8]) -> Result<Self> {
        let cipher = Aes256SivAead::new_from_slice(key).map_err(|e| anyhow!("creating AES-SIV cipher: {e}"))?;

        Ok(Self { cipher })
    }

    /// Encrypts `reader` into length-prefixed frames on `writer`.
    pub fn encrypt_stream<R: Read, W: Write>(
        &self,
        mut reader: R,
        writer: W,
        header: &[u8; HEADER_SIZE],
    ) -> Result<()> {
        let mut chunked = ChunkWriter::new(writer, &self.cipher, header);

        io::copy(&mut reader, &mut chunked).context("encrypting stream")?;
        chunked.finish()?;

        Ok(())
    }

    /// Decrypts length-prefixed frames from `reader` onto `writer`.
    pub fn decrypt_stream<R: Read, W: Write>(
        &self,
        mut reader: R,
        mut writer: W,
        header: &[u8; HEADER_SIZE],
    ) -> Result<()> {
        let mut index = 0u64;

        while let Some(frame_len) = read_frame_len(&mut reader)? {
            let frame_len = frame_len as usize;
            if frame_len > MAX_FRAME_SIZE {
                bail!("chunk length {frame_len} exceeds maximum frame size");
            }

            let mut encrypted = vec![0u8; frame_len];
            reader.read_exact(&mut encrypted).context("reading encrypted chunk")?;

            let ad = chunk_ad(header, index);
            let plaintext = self
                .cipher
                .decrypt(&Nonce::default(), Payload { msg: &encrypted, aad: &ad })
                .map_err(|_| anyhow!("decrypting chunk {index}: authentication failed"))?;

            writer.write_all(&plaintext).context("writing decrypted chunk")?;

            index += 1;
        }

        Ok(())
    }
}

/// Associated data for chunk `index`: the envelope header followed by the
/// big-endian chunk counter, starting at 0.
fn chunk_ad(header: &[u8; HEADER_SIZE], index: u64) -> [u8; HEADER_SIZE + 8] {
    let mut ad = [0u8; HEADER_SIZE + 8];
    ad[..HEADER_SIZE].copy_from_slice(header);
    ad[HEADER_SIZE..].copy_from_slice(&index.to_be_bytes());
    ad
}

/// Reads a frame length prefix. Returns `None` on clean EOF at a frame
/// boundary; a partial prefix is an error.
fn read_frame_len<R: Read>(reader: &mut R) -> Result<Option<u32>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;

    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).context("reading chunk length")?;
        if n == 0 {
            break;
        }

        filled += n;
    }

    match filled {
        0 => Ok(None),
        4 => Ok(Some(u32::from_be_bytes(buf))),
        _ => bail!("truncated chunk length"),
    }
}

/// Buffers plaintext and emits one encrypted frame per full chunk. The
/// tail chunk, if any, is flushed by [`ChunkWriter::finish`].
struct ChunkWriter<'a, W: Write> {
    output: W,
    cipher: &'a Aes256SivAead,
    header: [u8; HEADER_SIZE],
    buffer: Vec<u8>,
    index: u64,
}

impl<'a, W: Write> ChunkWriter<'a, W> {
    fn new(output: W, cipher: &'a Aes256SivAead, header: &[u8; HEADER_SIZE]) -> Self {
        Self {
            output,
            cipher,
            header: *header,
            buffer: Vec::with_capacity(CHUNK_SIZE),
            index: 0,
        }
    }

    fn flush_chunk(&mut self, size: usize) -> io::Result<()> {
        let ad = chunk_ad(&self.header, self.index);

        let encrypted = self
            .cipher
            .encrypt(&Nonce::default(), Payload { msg: &self.buffer[..size], aad: &ad })
            .map_err(|_| io::Error::other("chunk encryption failed"))?;

        // Chunks are capped at 1 MiB, so the ciphertext length always fits.
        self.output.write_u32::<BigEndian>(encrypted.len() as u32)?;
        self.output.write_all(&encrypted)?;

        self.buffer.drain(..size);
        self.index += 1;

        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            let size = self.buffer.len();
            self.flush_chunk(size).context("encrypting final chunk")?;
        }

        self.output.flush().context("flushing output")?;

        Ok(())
    }
}

impl<W: Write> Write for ChunkWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);

        while self.buffer.len() >= CHUNK_SIZE {
            self.flush_chunk(CHUNK_SIZE)?;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::envelope::{Header, Mode};

    const KEY: [u8; 64] = [0x42; 64];

    fn header_bytes() -> [u8; HEADER_SIZE] {
        Header::new(Mode::Deterministic, false).to_bytes()
    }

    fn encrypt(data: &[u8]) -> Vec<u8> {
        let codec = Deterministic::new(&KEY).unwrap();
        let mut out = Vec::new();
        codec.encrypt_stream(Cursor::new(data), &mut out, &header_bytes()).unwrap();
        out
    }

    fn decrypt(body: &[u8]) -> Result<Vec<u8>> {
        let codec = Deterministic::new(&KEY).unwrap();
        let mut out = Vec::new();
        codec.decrypt_stream(Cursor::new(body), &mut out, &header_bytes())?;
        Ok(out)
    }

    /// Splits a body into (length-prefix, ciphertext) frames.
    fn frames(body: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        let mut pos = 0;

        while pos < body.len() {
            let len = u32::from_be_bytes(body[pos..pos + 4].try_into().unwrap()) as usize;
            frames.push(body[pos..pos + 4 + len].to_vec());
            pos += 4 + len;
        }

        frames
    }

    #[test]
    fn rejects_wrong_key_length() {
        assert!(Deterministic::new(&[0u8; 32]).is_err());
        assert!(Deterministic::new(&[0u8; 64]).is_ok());
    }

    #[test]
    fn roundtrip_small() {
        let body = encrypt(b"hello");
        assert_eq!(decrypt(&body).unwrap(), b"hello");
    }

    #[test]
    fn roundtrip_empty_produces_no_frames() {
        let body = encrypt(b"");
        assert!(body.is_empty());
        assert_eq!(decrypt(&body).unwrap(), b"");
    }

    #[test]
    fn output_is_byte_identical_across_runs() {
        let data = vec![0xA5u8; 200_000];
        assert_eq!(encrypt(&data), encrypt(&data));
    }

    #[test]
    fn three_mib_input_yields_exactly_three_frames() {
        let data = vec![0x5Au8; 3 * CHUNK_SIZE];
        let body = encrypt(&data);

        assert_eq!(frames(&body).len(), 3);
        assert_eq!(decrypt(&body).unwrap(), data);
    }

    #[test]
    fn partial_tail_chunk_gets_its_own_frame() {
        let data = vec![0x11u8; CHUNK_SIZE + 5];
        let body = encrypt(&data);

        assert_eq!(frames(&body).len(), 2);
        assert_eq!(decrypt(&body).unwrap(), data);
    }

    #[test]
    fn flipped_ciphertext_byte_fails() {
        let mut body = encrypt(b"some data worth protecting");
        let last = body.len() - 1;
        body[last] ^= 0x01;

        assert!(decrypt(&body).is_err());
    }

    #[test]
    fn reordered_frames_fail() {
        let mut data = vec![0u8; 2 * CHUNK_SIZE];
        data[0] = 1;

        let body = encrypt(&data);
        let frames = frames(&body);
        assert_eq!(frames.len(), 2);

        let swapped: Vec<u8> = frames[1].iter().chain(frames[0].iter()).copied().collect();
        assert!(decrypt(&swapped).is_err());
    }

    #[test]
    fn dropped_frame_shifts_indices_and_fails() {
        let data = vec![0x33u8; 2 * CHUNK_SIZE + 9];
        let body = encrypt(&data);
        let frames = frames(&body);
        assert_eq!(frames.len(), 3);

        // Remove the middle frame; the old third frame now decrypts at
        // index 1 and its associated data no longer matches.
        let truncated: Vec<u8> = frames[0].iter().chain(frames[2].iter()).copied().collect();
        assert!(decrypt(&truncated).is_err());
    }

    #[test]
    fn frame_from_other_header_fails() {
        let codec = Deterministic::new(&KEY).unwrap();

        let exec_header = Header::new(Mode::Deterministic, true).to_bytes();
        let mut body = Vec::new();
        codec.encrypt_stream(Cursor::new(b"payload".as_slice()), &mut body, &exec_header).unwrap();

        // Decrypting under the non-executable header must fail.
        assert!(decrypt(&body).is_err());
    }

    #[test]
    fn oversize_frame_length_is_rejected() {
        let mut body = Vec::new();
        body.extend_from_slice(&((MAX_FRAME_SIZE as u32) + 1).to_be_bytes());
        body.extend_from_slice(&[0u8; 16]);

        let err = decrypt(&body).unwrap_err();
        assert!(err.to_string().contains("maximum frame size"));
    }

    #[test]
    fn truncated_length_prefix_is_rejected() {
        let mut body = encrypt(b"data");
        body.extend_from_slice(&[0u8, 0u8]);

        assert!(decrypt(&body).is_err());
    }

    #[test]
    fn truncated_ciphertext_is_rejected() {
        let body = encrypt(b"data");
        assert!(decrypt(&body[..body.len() - 1]).is_err());
    }
}
