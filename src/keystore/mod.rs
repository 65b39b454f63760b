//! Master key ownership.
//!
//! A `KeyStore` owns versioned 256-bit master keys and hands out opaque
//! [`KeyHandle`]s.  Raw key bytes never cross the crate's public API:
//! only the crypto layer (same crate) can read them.
//!
//! The trait seam exists so tests can inject [`MemoryKeyStore`] instead
//! of a real secure-hardware-backed store.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::TryRngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::errors::{Result, VaultError};

pub mod file;

#[cfg(feature = "keyring-store")]
pub mod keyring;

pub use file::FileKeyStore;

/// Length of a master key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Opaque reference to key material held by a key store.
///
/// The raw bytes are zeroized on drop and are only readable inside this
/// crate.  Handles are never serialized and deliberately not `Clone`.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct KeyHandle {
    version: u32,
    bytes: [u8; KEY_LEN],
}

impl KeyHandle {
    /// Wrap raw key bytes in a handle.  Crate-internal: only key stores
    /// and the crypto layer construct handles.
    pub(crate) fn new(version: u32, bytes: [u8; KEY_LEN]) -> Self {
        Self { version, bytes }
    }

    /// The key version this handle refers to.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Access the raw key bytes.  Crate-internal by design.
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Short hex fingerprint of the key (first 8 bytes of SHA-256).
    ///
    /// Safe to log or display: it reveals nothing about the key itself
    /// beyond equality, and lets callers confirm that a wipe actually
    /// produced fresh key material.
    pub fn fingerprint(&self) -> String {
        let hash = Sha256::digest(self.bytes);
        hash[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key bytes.
        f.debug_struct("KeyHandle")
            .field("version", &self.version)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Owns versioned master keys.
///
/// `get_or_create_key` is idempotent: repeated calls for the same
/// version return handles to the same key material, generating a fresh
/// random key on first use.  `wipe` irreversibly destroys all key
/// material; every existing ciphertext becomes permanently
/// undecryptable.
pub trait KeyStore: Send + Sync {
    /// Return a handle for the key of the given version, generating a
    /// fresh random key if none exists yet.
    ///
    /// Fails with `KeyUnavailable` if the backing store is absent or
    /// unreadable; the caller must treat that as fatal for vault
    /// operation, not retry it automatically.
    fn get_or_create_key(&self, version: u32) -> Result<KeyHandle>;

    /// The version new encryptions should use.
    fn current_version(&self) -> Result<u32>;

    /// Irreversibly destroy all key material.
    fn wipe(&self) -> Result<()>;
}

/// Generate a fresh random 32-byte master key.
pub(crate) fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    rand::rngs::OsRng
        .try_fill_bytes(&mut key)
        .expect("OS RNG failure");
    key
}

// ---------------------------------------------------------------------------
// MemoryKeyStore
// ---------------------------------------------------------------------------

/// Ephemeral in-memory key store.
///
/// Keys live only as long as the process.  Useful for tests and for
/// cache-style vaults whose contents are disposable across restarts.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<u32, [u8; KEY_LEN]>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn get_or_create_key(&self, version: u32) -> Result<KeyHandle> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| VaultError::KeyUnavailable("key store lock poisoned".into()))?;
        let key = keys.entry(version).or_insert_with(generate_key);
        Ok(KeyHandle::new(version, *key))
    }

    fn current_version(&self) -> Result<u32> {
        let keys = self
            .keys
            .lock()
            .map_err(|_| VaultError::KeyUnavailable("key store lock poisoned".into()))?;
        Ok(keys.keys().max().copied().unwrap_or(1))
    }

    fn wipe(&self) -> Result<()> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| VaultError::KeyUnavailable("key store lock poisoned".into()))?;
        for (_, mut key) in keys.drain() {
            key.zeroize();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent() {
        let store = MemoryKeyStore::new();
        let h1 = store.get_or_create_key(1).unwrap();
        let h2 = store.get_or_create_key(1).unwrap();
        assert_eq!(h1.fingerprint(), h2.fingerprint());
        assert_eq!(h1.version(), 1);
    }

    #[test]
    fn different_versions_have_different_keys() {
        let store = MemoryKeyStore::new();
        let h1 = store.get_or_create_key(1).unwrap();
        let h2 = store.get_or_create_key(2).unwrap();
        assert_ne!(h1.fingerprint(), h2.fingerprint());
    }

    #[test]
    fn wipe_regenerates_fresh_material() {
        let store = MemoryKeyStore::new();
        let before = store.get_or_create_key(1).unwrap().fingerprint();
        store.wipe().unwrap();
        let after = store.get_or_create_key(1).unwrap().fingerprint();
        assert_ne!(before, after, "wiped key must not come back");
    }

    #[test]
    fn debug_does_not_leak_key_bytes() {
        let store = MemoryKeyStore::new();
        let handle = store.get_or_create_key(1).unwrap();
        let debug = format!("{handle:?}");
        assert!(debug.contains("version"));
        assert!(!debug.contains("bytes"));
    }
}
