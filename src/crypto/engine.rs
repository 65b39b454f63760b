//! AES-256-GCM authenticated encryption.
//!
//! `encrypt` generates a fresh random 12-byte nonce per call and
//! returns it alongside the ciphertext; a caller-supplied nonce is
//! deliberately not accepted.  `decrypt` verifies the 16-byte GCM tag
//! and fails with `AuthenticationFailed` on any tamper; it never
//! returns partial or garbage plaintext.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use zeroize::Zeroizing;

use crate::errors::{Result, VaultError};
use crate::keystore::KeyHandle;

/// Size of the AES-256-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Encrypt `plaintext` under the given key handle.
///
/// Returns the ciphertext (with the appended auth tag) and the fresh
/// nonce used for this call.  The caller stores both; the nonce is
/// unique per encryption.
pub fn encrypt(key: &KeyHandle, plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_LEN])> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::EncryptionFailed(format!("invalid key length: {e}")))?;

    // Fresh random 12-byte nonce, never caller-supplied.
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| VaultError::EncryptionFailed(format!("encryption error: {e}")))?;

    Ok((ciphertext, nonce.into()))
}

/// Decrypt data produced by [`encrypt`].
///
/// Length mismatches on the nonce or ciphertext are `InvalidFormat`
/// (corruption, not a crypto failure); a bad auth tag is
/// `AuthenticationFailed`.  The plaintext buffer is zeroized on drop.
pub fn decrypt(key: &KeyHandle, ciphertext: &[u8], nonce: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if nonce.len() != NONCE_LEN {
        return Err(VaultError::InvalidFormat(format!(
            "nonce must be {NONCE_LEN} bytes, got {}",
            nonce.len()
        )));
    }

    // A valid GCM ciphertext is at least one full auth tag.
    if ciphertext.len() < TAG_LEN {
        return Err(VaultError::InvalidFormat(format!(
            "ciphertext too short: {} bytes, tag alone is {TAG_LEN}",
            ciphertext.len()
        )));
    }

    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| VaultError::AuthenticationFailed)?;

    let nonce = Nonce::from_slice(nonce);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| VaultError::AuthenticationFailed)?;

    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::{KeyStore, MemoryKeyStore};

    fn key() -> KeyHandle {
        MemoryKeyStore::new().get_or_create_key(1).unwrap()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = key();
        let (ct, nonce) = encrypt(&key, b"hello world").unwrap();
        let pt = decrypt(&key, &ct, &nonce).unwrap();
        assert_eq!(&pt[..], b"hello world");
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let key = key();
        let (ct1, nonce1) = encrypt(&key, b"same input").unwrap();
        let (ct2, nonce2) = encrypt(&key, b"same input").unwrap();
        assert_ne!(nonce1, nonce2);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let key = key();
        let (mut ct, nonce) = encrypt(&key, b"secret").unwrap();
        ct[0] ^= 0x01;
        let result = decrypt(&key, &ct, &nonce);
        assert!(matches!(result, Err(VaultError::AuthenticationFailed)));
    }

    #[test]
    fn tampered_nonce_fails_authentication() {
        let key = key();
        let (ct, mut nonce) = encrypt(&key, b"secret").unwrap();
        nonce[0] ^= 0x01;
        let result = decrypt(&key, &ct, &nonce);
        assert!(matches!(result, Err(VaultError::AuthenticationFailed)));
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let store = MemoryKeyStore::new();
        let k1 = store.get_or_create_key(1).unwrap();
        let k2 = store.get_or_create_key(2).unwrap();

        let (ct, nonce) = encrypt(&k1, b"secret").unwrap();
        let result = decrypt(&k2, &ct, &nonce);
        assert!(matches!(result, Err(VaultError::AuthenticationFailed)));
    }

    #[test]
    fn short_nonce_is_invalid_format() {
        let key = key();
        let (ct, _) = encrypt(&key, b"secret").unwrap();
        let result = decrypt(&key, &ct, &[0u8; 8]);
        assert!(matches!(result, Err(VaultError::InvalidFormat(_))));
    }

    #[test]
    fn truncated_ciphertext_is_invalid_format() {
        let key = key();
        let (_, nonce) = encrypt(&key, b"secret").unwrap();
        let result = decrypt(&key, &[0u8; 4], &nonce);
        assert!(matches!(result, Err(VaultError::InvalidFormat(_))));
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let key = key();
        let (ct, nonce) = encrypt(&key, b"").unwrap();
        assert_eq!(ct.len(), TAG_LEN);
        let pt = decrypt(&key, &ct, &nonce).unwrap();
        assert!(pt.is_empty());
    }
}
