//! Randomized streaming codec: AES-256-CTR with an HMAC-SHA256 trailer.
//!
//! Body layout: a 16-byte random IV, ciphertext the same length as the
//! plaintext, then a 32-byte tag over `header || IV || ciphertext`
//! (encrypt-then-MAC). The 32-byte key is split into independent
//! encryption and MAC keys via HKDF-SHA256 so a fresh IV per file gives
//! CPA indistinguishability without reusing key material across roles.

use std::io::{Read, Write};

use aes::Aes256;
use anyhow::{Context, Result, anyhow, bail};
use ctr::Ctr128BE;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use rand::rand_core::{OsRng, TryRngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::config::STREAM_BUFFER_SIZE;
use crate::crypto::derive::split_randomized_key;
use crate::envelope::HEADER_SIZE;

/// IV length, one AES block.
pub const IV_SIZE: usize = 16;

/// HMAC-SHA256 tag length.
pub const TAG_SIZE: usize = 32;

type Aes256Ctr = Ctr128BE<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Randomized codec backed by a 32-byte key.
pub struct Randomized {
    enc_key: Zeroizing<[u8; 32]>,
    mac_key: Zeroizing<[u8; 32]>,
}

impl Randomized {
    pub fn new(key: &[u8]) -> Result<Self> {
        let (enc_key, mac_key) = split_randomized_key(key)?;

        Ok(Self { enc_key, mac_key })
    }

    fn mac(&self, header: &[u8; HEADER_SIZE]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&*self.mac_key).map_err(|e| anyhow!("creating hmac: {e}"))?;
        mac.update(header);

        Ok(mac)
    }

    fn keystream(&self, iv: &[u8; IV_SIZE]) -> Result<Aes256Ctr> {
        Aes256Ctr::new_from_slices(&*self.enc_key, iv).map_err(|e| anyhow!("creating cipher: {e}"))
    }

    /// Encrypts `reader` onto `writer`: IV, streamed ciphertext, tag.
    pub fn encrypt_stream<R: Read, W: Write>(
        &self,
        mut reader: R,
        mut writer: W,
        header: &[u8; HEADER_SIZE],
    ) -> Result<()> {
        let mut mac = self.mac(header)?;

        let mut iv = [0u8; IV_SIZE];
        OsRng.try_fill_bytes(&mut iv).map_err(|e| anyhow!("generating IV: {e}"))?;

        writer.write_all(&iv).context("writing IV")?;
        mac.update(&iv);

        let mut cipher = self.keystream(&iv)?;
        let mut buf = [0u8; STREAM_BUFFER_SIZE];

        loop {
            let n = reader.read(&mut buf).context("reading plaintext")?;
            if n == 0 {
                break;
            }

            cipher.apply_keystream(&mut buf[..n]);
            mac.update(&buf[..n]);
            writer.write_all(&buf[..n]).context("writing ciphertext")?;
        }

        let tag: [u8; TAG_SIZE] = mac.finalize().into_bytes().into();
        writer.write_all(&tag).context("writing authentication tag")?;

        Ok(())
    }

    /// Decrypts `reader` onto `writer`, verifying the trailing tag.
    ///
    /// The final [`TAG_SIZE`] bytes are withheld as the tag candidate
    /// while everything before them streams through the keystream.
    /// Callers must discard the output if this returns an error; the
    /// processor writes to an unlinked temp file, so unauthenticated
    /// plaintext never reaches the output path.
    pub fn decrypt_stream<R: Read, W: Write>(
        &self,
        mut reader: R,
        mut writer: W,
        header: &[u8; HEADER_SIZE],
    ) -> Result<()> {
        let mut mac = self.mac(header)?;

        let mut iv = [0u8; IV_SIZE];
        reader.read_exact(&mut iv).context("reading IV")?;
        mac.update(&iv);

        let mut cipher = self.keystream(&iv)?;

        let mut buf = [0u8; STREAM_BUFFER_SIZE];
        let mut pending: Vec<u8> = Vec::with_capacity(STREAM_BUFFER_SIZE + TAG_SIZE);

        loop {
            let n = reader.read(&mut buf).context("reading ciphertext")?;
            if n == 0 {
                break;
            }

            pending.extend_from_slice(&buf[..n]);

            if pending.len() > TAG_SIZE {
                let take = pending.len() - TAG_SIZE;
                mac.update(&pending[..take]);
                cipher.apply_keystream(&mut pending[..take]);
                writer.write_all(&pending[..take]).context("writing plaintext")?;
                pending.drain(..take);
            }
        }

        if pending.len() != TAG_SIZE {
            bail!("authentication tag missing");
        }

        let expected: [u8; TAG_SIZE] = mac.finalize().into_bytes().into();
        if !bool::from(expected[..].ct_eq(&pending[..])) {
            bail!("authentication failed");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::envelope::{Header, Mode};

    const KEY: [u8; 32] = [0x24; 32];

    fn header_bytes() -> [u8; HEADER_SIZE] {
        Header::new(Mode::Randomized, false).to_bytes()
    }

    fn encrypt(data: &[u8]) -> Vec<u8> {
        let codec = Randomized::new(&KEY).unwrap();
        let mut out = Vec::new();
        codec.encrypt_stream(Cursor::new(data), &mut out, &header_bytes()).unwrap();
        out
    }

    fn decrypt(body: &[u8]) -> Result<Vec<u8>> {
        let codec = Randomized::new(&KEY).unwrap();
        let mut out = Vec::new();
        codec.decrypt_stream(Cursor::new(body), &mut out, &header_bytes())?;
        Ok(out)
    }

    #[test]
    fn roundtrip() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let body = encrypt(data);

        assert_eq!(body.len(), IV_SIZE + data.len() + TAG_SIZE);
        assert_eq!(decrypt(&body).unwrap(), data);
    }

    #[test]
    fn roundtrip_spans_several_reads() {
        let data = vec![0xC3u8; 3 * STREAM_BUFFER_SIZE + 17];
        assert_eq!(decrypt(&encrypt(&data)).unwrap(), data);
    }

    #[test]
    fn empty_input_is_iv_plus_tag() {
        let body = encrypt(b"");
        assert_eq!(body.len(), IV_SIZE + TAG_SIZE);
        assert_eq!(decrypt(&body).unwrap(), b"");
    }

    #[test]
    fn ciphertexts_differ_across_runs() {
        let data = b"same plaintext";
        assert_ne!(encrypt(data), encrypt(data));
    }

    #[test]
    fn flipped_tag_byte_fails() {
        let mut body = encrypt(b"data");
        let last = body.len() - 1;
        body[last] ^= 0x01;

        let err = decrypt(&body).unwrap_err();
        assert!(err.to_string().contains("authentication failed"));
    }

    #[test]
    fn flipped_ciphertext_byte_fails() {
        let mut body = encrypt(b"data");
        body[IV_SIZE] ^= 0x01;

        assert!(decrypt(&body).is_err());
    }

    #[test]
    fn flipped_iv_byte_fails() {
        let mut body = encrypt(b"data");
        body[0] ^= 0x01;

        assert!(decrypt(&body).is_err());
    }

    #[test]
    fn different_header_fails() {
        let codec = Randomized::new(&KEY).unwrap();

        let exec_header = Header::new(Mode::Randomized, true).to_bytes();
        let mut body = Vec::new();
        codec.encrypt_stream(Cursor::new(b"data".as_slice()), &mut body, &exec_header).unwrap();

        assert!(decrypt(&body).is_err());
    }

    #[test]
    fn short_body_fails() {
        let body = encrypt(b"data");

        // Strip one byte off the tag.
        let err = decrypt(&body[..body.len() - 1]).unwrap_err();
        assert!(err.to_string().contains("authentication"));

        // Nothing but the IV.
        assert!(decrypt(&body[..IV_SIZE]).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let body = encrypt(b"data");

        let other = Randomized::new(&[0x25; 32]).unwrap();
        let mut out = Vec::new();
        assert!(other.decrypt_stream(Cursor::new(&body), &mut out, &header_bytes()).is_err());
    }

    #[test]
    fn rejects_wrong_key_length_upstream() {
        // The codec itself accepts any IKM length for HKDF; the length
        // gate lives in Key. Make sure construction still works with the
        // canonical 32 bytes.
        assert!(Randomized::new(&KEY).is_ok());
    }
}
