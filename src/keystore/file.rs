//! File-backed key store.
//!
//! Master keys are random 32-byte values persisted in a JSON key file
//! with owner-only permissions.  Each stored key carries a SHA-256
//! fingerprint that is re-checked (in constant time) on every load so
//! silent corruption surfaces as `KeyUnavailable` instead of garbage
//! decryptions.
//!
//! This is the stand-in for an OS keystore on platforms without one; on
//! platforms with a credential store, prefer the `keyring-store` feature.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::errors::{Result, VaultError};

use super::{generate_key, KeyHandle, KeyStore, KEY_LEN};

/// Current key file format version.
const FORMAT_VERSION: u8 = 1;

/// One stored master key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredKey {
    /// Raw key bytes, base64 in JSON.
    #[serde(
        serialize_with = "crate::storage::format::base64_encode",
        deserialize_with = "crate::storage::format::base64_decode"
    )]
    key: Vec<u8>,

    /// Hex SHA-256 fingerprint (first 8 bytes) for corruption detection.
    fingerprint: String,

    /// When this key was generated.
    created_at: DateTime<Utc>,
}

/// On-disk layout of the key file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeyFile {
    format_version: u8,
    /// Version new encryptions should use.
    current_version: u32,
    /// All live keys, keyed by version.
    keys: BTreeMap<u32, StoredKey>,
}

impl Default for KeyFile {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            current_version: 1,
            keys: BTreeMap::new(),
        }
    }
}

/// Key store persisting master keys to a single JSON file.
pub struct FileKeyStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the key file.
    lock: Mutex<()>,
}

impl FileKeyStore {
    /// Open (or lazily create on first key generation) a key store at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the path to the key file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<KeyFile> {
        if !self.path.exists() {
            return Ok(KeyFile::default());
        }

        let data = fs::read(&self.path)
            .map_err(|e| VaultError::KeyUnavailable(format!("cannot read key file: {e}")))?;

        let file: KeyFile = serde_json::from_slice(&data)
            .map_err(|e| VaultError::KeyUnavailable(format!("key file is corrupt: {e}")))?;

        if file.format_version != FORMAT_VERSION {
            return Err(VaultError::KeyUnavailable(format!(
                "unsupported key file version {}, expected {FORMAT_VERSION}",
                file.format_version
            )));
        }

        Ok(file)
    }

    fn write_file(&self, file: &KeyFile) -> Result<()> {
        let data = serde_json::to_vec(file)
            .map_err(|e| VaultError::SerializationError(format!("key file: {e}")))?;

        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    VaultError::KeyUnavailable(format!("cannot create key directory: {e}"))
                })?;
            }
        }

        // Atomic write: temp file in the same directory, then rename.
        let parent = self.path.parent().unwrap_or(Path::new("."));
        let tmp_path = parent.join(format!(
            ".{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy()
        ));

        fs::write(&tmp_path, &data)?;

        // Owner-only read/write before the file lands at its final name.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&tmp_path, perms).map_err(|e| {
                VaultError::KeyUnavailable(format!("failed to set key file permissions: {e}"))
            })?;
        }

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn handle_from_stored(version: u32, stored: &StoredKey) -> Result<KeyHandle> {
        if stored.key.len() != KEY_LEN {
            return Err(VaultError::KeyUnavailable(format!(
                "stored key has {} bytes, expected {KEY_LEN}",
                stored.key.len()
            )));
        }

        // Re-check the fingerprint in constant time; a mismatch means
        // the key file was corrupted or edited.
        let actual = fingerprint_hex(&stored.key);
        let matches: bool = actual
            .as_bytes()
            .ct_eq(stored.fingerprint.as_bytes())
            .into();
        if !matches {
            return Err(VaultError::KeyUnavailable(
                "key fingerprint mismatch, key file corrupted".into(),
            ));
        }

        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&stored.key);
        let handle = KeyHandle::new(version, bytes);
        bytes.zeroize();
        Ok(handle)
    }
}

/// Hex fingerprint of raw key bytes (first 8 bytes of SHA-256).
fn fingerprint_hex(key: &[u8]) -> String {
    let hash = Sha256::digest(key);
    hash[..8].iter().map(|b| format!("{b:02x}")).collect()
}

impl KeyStore for FileKeyStore {
    fn get_or_create_key(&self, version: u32) -> Result<KeyHandle> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| VaultError::KeyUnavailable("key store lock poisoned".into()))?;

        let mut file = self.read_file()?;

        if let Some(stored) = file.keys.get(&version) {
            return Self::handle_from_stored(version, stored);
        }

        // First use of this version: generate and persist a fresh key.
        let mut key = generate_key();
        let stored = StoredKey {
            key: key.to_vec(),
            fingerprint: fingerprint_hex(&key),
            created_at: Utc::now(),
        };
        file.keys.insert(version, stored);
        if version > file.current_version {
            file.current_version = version;
        }
        self.write_file(&file)?;

        let handle = KeyHandle::new(version, key);
        key.zeroize();
        Ok(handle)
    }

    fn current_version(&self) -> Result<u32> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| VaultError::KeyUnavailable("key store lock poisoned".into()))?;
        Ok(self.read_file()?.current_version)
    }

    fn wipe(&self) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| VaultError::KeyUnavailable("key store lock poisoned".into()))?;

        if self.path.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| VaultError::KeyUnavailable(format!("cannot wipe key file: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileKeyStore) {
        let dir = TempDir::new().unwrap();
        let store = FileKeyStore::new(dir.path().join("master.keys"));
        (dir, store)
    }

    #[test]
    fn key_survives_reopen() {
        let (dir, store) = store();
        let fp = store.get_or_create_key(1).unwrap().fingerprint();

        // A second store over the same file sees the same key.
        let store2 = FileKeyStore::new(dir.path().join("master.keys"));
        let fp2 = store2.get_or_create_key(1).unwrap().fingerprint();
        assert_eq!(fp, fp2);
    }

    #[test]
    fn current_version_defaults_to_one() {
        let (_dir, store) = store();
        assert_eq!(store.current_version().unwrap(), 1);
    }

    #[test]
    fn current_version_tracks_highest_created() {
        let (_dir, store) = store();
        store.get_or_create_key(1).unwrap();
        store.get_or_create_key(3).unwrap();
        assert_eq!(store.current_version().unwrap(), 3);
    }

    #[test]
    fn wipe_destroys_all_keys() {
        let (_dir, store) = store();
        let before = store.get_or_create_key(1).unwrap().fingerprint();
        store.wipe().unwrap();
        assert!(!store.path().exists());

        let after = store.get_or_create_key(1).unwrap().fingerprint();
        assert_ne!(before, after);
    }

    #[test]
    fn corrupted_key_file_is_rejected() {
        let (_dir, store) = store();
        store.get_or_create_key(1).unwrap();

        // Scribble over the file.
        fs::write(store.path(), b"not json at all").unwrap();

        let result = store.get_or_create_key(1);
        assert!(matches!(result, Err(VaultError::KeyUnavailable(_))));
    }

    #[test]
    fn tampered_key_bytes_fail_fingerprint_check() {
        let (_dir, store) = store();
        store.get_or_create_key(1).unwrap();

        // Swap the stored key for different bytes, keeping the old fingerprint.
        let mut file: KeyFile =
            serde_json::from_slice(&fs::read(store.path()).unwrap()).unwrap();
        if let Some(stored) = file.keys.get_mut(&1) {
            stored.key = vec![0u8; KEY_LEN];
        }
        fs::write(store.path(), serde_json::to_vec(&file).unwrap()).unwrap();

        let result = store.get_or_create_key(1);
        assert!(matches!(result, Err(VaultError::KeyUnavailable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn key_file_has_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, store) = store();
        store.get_or_create_key(1).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
