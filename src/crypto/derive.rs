//! Key derivation for the randomized mode.

use anyhow::{Result, anyhow};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Domain-separation string baked into the wire format.
const HKDF_INFO: &[u8] = b"gonc/randomized";

/// Derived key length: 32 bytes encryption + 32 bytes MAC.
const OUTPUT_LEN: usize = 64;

/// Splits a 32-byte key into independent encryption and MAC keys via
/// HKDF-SHA256 with an empty salt.
pub fn split_randomized_key(key: &[u8]) -> Result<(Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>)> {
    let hkdf = Hkdf::<Sha256>::new(None, key);

    let mut okm = Zeroizing::new([0u8; OUTPUT_LEN]);
    hkdf.expand(HKDF_INFO, &mut *okm)
        .map_err(|e| anyhow!("deriving randomized keys: {e}"))?;

    let mut enc_key = Zeroizing::new([0u8; 32]);
    let mut mac_key = Zeroizing::new([0u8; 32]);
    enc_key.copy_from_slice(&okm[..32]);
    mac_key.copy_from_slice(&okm[32..]);

    Ok((enc_key, mac_key))
}
