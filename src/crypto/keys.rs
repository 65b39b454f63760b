//! Key derivation helpers using HKDF-SHA256.
//!
//! From a versioned master key we derive:
//! - A unique **per-record** encryption key for each secret name.
//! - A dedicated **MAC key** for the storage envelope integrity check.
//!
//! HKDF (RFC 5869) uses the master key as input keying material and a
//! context string (`info`) to produce independent sub-keys, so
//! compromising one encrypted record does not reveal others and the
//! MAC key never doubles as an encryption key.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::errors::{Result, VaultError};
use crate::keystore::{KeyHandle, KEY_LEN};

/// Derive the per-record encryption key for a secret name.
///
/// The returned handle carries the same key version as the master so
/// records remember which master key they were encrypted under.
///
/// `info` is `"biovault-record:<name>"`, binding the derived key to a
/// specific secret.
pub fn derive_record_key(master: &KeyHandle, name: &str) -> Result<KeyHandle> {
    let info = format!("biovault-record:{name}");
    let mut okm = hkdf_derive(master.as_bytes(), info.as_bytes())?;
    let handle = KeyHandle::new(master.version(), *okm);
    okm.zeroize();
    Ok(handle)
}

/// Derive the MAC key used to authenticate the storage envelope.
///
/// Lets the vault detect wholesale tampering with the on-disk file
/// before any record-level decryption is attempted.
pub fn derive_storage_mac_key(master: &KeyHandle) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    hkdf_derive(master.as_bytes(), b"biovault-storage-mac")
}

/// Internal helper: run HKDF-SHA256 expand with the given `info`.
///
/// The extract step is skipped because the master key is already
/// uniform random (it came straight from the OS RNG).
fn hkdf_derive(ikm: &[u8], info: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let hk = Hkdf::<Sha256>::new(None, ikm);

    let mut okm = Zeroizing::new([0u8; KEY_LEN]);
    hk.expand(info, &mut *okm)
        .map_err(|e| VaultError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::{KeyStore, MemoryKeyStore};

    #[test]
    fn record_keys_differ_per_name() {
        let master = MemoryKeyStore::new().get_or_create_key(1).unwrap();
        let k1 = derive_record_key(&master, "api_token").unwrap();
        let k2 = derive_record_key(&master, "db_password").unwrap();
        assert_ne!(k1.fingerprint(), k2.fingerprint());
    }

    #[test]
    fn record_key_is_deterministic() {
        let master = MemoryKeyStore::new().get_or_create_key(1).unwrap();
        let k1 = derive_record_key(&master, "api_token").unwrap();
        let k2 = derive_record_key(&master, "api_token").unwrap();
        assert_eq!(k1.fingerprint(), k2.fingerprint());
    }

    #[test]
    fn record_key_keeps_master_version() {
        let master = MemoryKeyStore::new().get_or_create_key(7).unwrap();
        let derived = derive_record_key(&master, "api_token").unwrap();
        assert_eq!(derived.version(), 7);
    }

    #[test]
    fn mac_key_differs_from_master() {
        let master = MemoryKeyStore::new().get_or_create_key(1).unwrap();
        let mac = derive_storage_mac_key(&master).unwrap();
        assert_ne!(&*mac, master.as_bytes());
    }

    #[test]
    fn different_masters_derive_different_record_keys() {
        let store = MemoryKeyStore::new();
        let m1 = store.get_or_create_key(1).unwrap();
        let m2 = store.get_or_create_key(2).unwrap();
        let k1 = derive_record_key(&m1, "api_token").unwrap();
        let k2 = derive_record_key(&m2, "api_token").unwrap();
        assert_ne!(k1.fingerprint(), k2.fingerprint());
    }
}
