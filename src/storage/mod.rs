//! Encrypted record persistence.
//!
//! `VaultStorage` keeps the name → `SecretRecord` map in memory and
//! mirrors every mutation to disk through the binary format layer, so
//! a crash never loses an acknowledged write.  It stores ciphertext
//! only; plaintext never reaches this module.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use crate::errors::{Result, VaultError};

pub mod format;
pub mod record;

pub use record::{SecretMetadata, SecretRecord};

use format::StorageHeader;

/// Length of the storage MAC key in bytes.
pub const MAC_KEY_LEN: usize = 32;

/// File-backed store of encrypted secret records.
pub struct VaultStorage {
    /// Path to the `.vault` file on disk.
    path: PathBuf,

    /// Header metadata (format version, creation timestamp).
    header: StorageHeader,

    /// In-memory map of secret name -> encrypted record.
    records: HashMap<String, SecretRecord>,

    /// MAC key for the on-disk envelope (derived from the master key).
    mac_key: Zeroizing<[u8; MAC_KEY_LEN]>,
}

impl VaultStorage {
    /// Open the vault file at `path`, or start empty if none exists.
    ///
    /// An existing file is verified against `mac_key` **over the raw
    /// bytes from disk** before any record is trusted; a mismatch is
    /// `InvalidFormat` and is never auto-repaired.
    pub fn open_or_create(path: &Path, mac_key: Zeroizing<[u8; MAC_KEY_LEN]>) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                path: path.to_path_buf(),
                header: StorageHeader::new(),
                records: HashMap::new(),
                mac_key,
            });
        }

        let raw = format::read_store(path)?;

        format::verify_hmac(
            &*mac_key,
            &raw.header_bytes,
            &raw.records_bytes,
            &raw.stored_hmac,
        )?;

        let records: HashMap<String, SecretRecord> = raw
            .records
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            header: raw.header,
            records,
            mac_key,
        })
    }

    /// Insert or overwrite a record (last-write-wins) and persist.
    pub fn save(&mut self, record: SecretRecord) -> Result<()> {
        self.records.insert(record.name.clone(), record);
        self.persist()
    }

    /// Fetch the record for `name`.
    pub fn load(&self, name: &str) -> Result<&SecretRecord> {
        self.records
            .get(name)
            .ok_or_else(|| VaultError::NotFound(name.to_string()))
    }

    /// Remove a record and persist.  Fails with `NotFound` if absent.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        if self.records.remove(name).is_none() {
            return Err(VaultError::NotFound(name.to_string()));
        }
        self.persist()
    }

    /// All record names, sorted.
    pub fn list_names(&self) -> BTreeSet<String> {
        self.records.keys().cloned().collect()
    }

    /// Metadata for all records, sorted by name.  No ciphertext leaves
    /// this call.
    pub fn list_metadata(&self) -> Vec<SecretMetadata> {
        let mut list: Vec<SecretMetadata> = self
            .records
            .values()
            .map(|r| SecretMetadata {
                name: r.name.clone(),
                key_version: r.key_version,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
            .collect();

        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// Returns `true` if a record with the given name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the path to the vault file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete every record and remove the file from disk.
    ///
    /// Used by `wipe_all`; after this the store is empty and the next
    /// mutation writes a fresh file.
    pub fn wipe(&mut self) -> Result<()> {
        self.records.clear();
        self.header = StorageHeader::new();
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// Swap in a new MAC key (after a key store wipe regenerated the
    /// master key).  Re-persists so the file on disk matches.
    pub fn reset_mac_key(&mut self, mac_key: Zeroizing<[u8; MAC_KEY_LEN]>) -> Result<()> {
        self.mac_key = mac_key;
        if !self.records.is_empty() || self.path.exists() {
            self.persist()?;
        }
        Ok(())
    }

    /// Serialize and write the store to disk atomically.
    fn persist(&self) -> Result<()> {
        // Sorted Vec for deterministic output.
        let mut record_list: Vec<SecretRecord> = self.records.values().cloned().collect();
        record_list.sort_by(|a, b| a.name.cmp(&b.name));

        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        format::write_store(&self.path, &self.header, &record_list, &*self.mac_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn mac_key() -> Zeroizing<[u8; MAC_KEY_LEN]> {
        Zeroizing::new([7u8; MAC_KEY_LEN])
    }

    fn record(name: &str) -> SecretRecord {
        SecretRecord {
            name: name.to_string(),
            ciphertext: vec![1, 2, 3, 4],
            nonce: vec![0; 12],
            key_version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn save_load_roundtrip_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.vault");

        let mut store = VaultStorage::open_or_create(&path, mac_key()).unwrap();
        store.save(record("api_token")).unwrap();

        let store2 = VaultStorage::open_or_create(&path, mac_key()).unwrap();
        let loaded = store2.load("api_token").unwrap();
        assert_eq!(loaded.ciphertext, vec![1, 2, 3, 4]);
    }

    #[test]
    fn save_overwrites_existing_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.vault");

        let mut store = VaultStorage::open_or_create(&path, mac_key()).unwrap();
        store.save(record("key")).unwrap();

        let mut updated = record("key");
        updated.ciphertext = vec![9, 9, 9];
        store.save(updated).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.load("key").unwrap().ciphertext, vec![9, 9, 9]);
    }

    #[test]
    fn load_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.vault");
        let store = VaultStorage::open_or_create(&path, mac_key()).unwrap();

        let result = store.load("absent");
        assert!(matches!(result, Err(VaultError::NotFound(_))));
    }

    #[test]
    fn delete_removes_and_errors_when_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.vault");

        let mut store = VaultStorage::open_or_create(&path, mac_key()).unwrap();
        store.save(record("gone")).unwrap();
        store.delete("gone").unwrap();

        assert!(matches!(
            store.delete("gone"),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn list_names_is_sorted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.vault");

        let mut store = VaultStorage::open_or_create(&path, mac_key()).unwrap();
        store.save(record("zebra")).unwrap();
        store.save(record("alpha")).unwrap();

        let names: Vec<String> = store.list_names().into_iter().collect();
        assert_eq!(names, vec!["alpha".to_string(), "zebra".to_string()]);
    }

    #[test]
    fn wrong_mac_key_rejects_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.vault");

        let mut store = VaultStorage::open_or_create(&path, mac_key()).unwrap();
        store.save(record("x")).unwrap();

        let result = VaultStorage::open_or_create(&path, Zeroizing::new([8u8; MAC_KEY_LEN]));
        assert!(matches!(result, Err(VaultError::InvalidFormat(_))));
    }

    #[test]
    fn wipe_empties_store_and_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.vault");

        let mut store = VaultStorage::open_or_create(&path, mac_key()).unwrap();
        store.save(record("x")).unwrap();
        store.wipe().unwrap();

        assert!(store.is_empty());
        assert!(!path.exists());
    }
}
