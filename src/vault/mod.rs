//! The vault facade.
//!
//! `Vault` composes the key store, cipher engine, storage, and gate
//! into the caller-facing operations: `put`, `get`, `delete`, `lock`,
//! `wipe_all`, `list_secrets`.  Reads go through the gate; writes and
//! deletes follow the configured policy (writing a new secret does not
//! require proving possession of an existing one).
//!
//! A `Vault` is an explicit handle, not a process-wide singleton.  Clone
//! it freely; clones share the same storage, gate session, and key
//! store.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::config::VaultConfig;
use crate::crypto::{engine, keys};
use crate::errors::{Result, VaultError};
use crate::gate::{Authenticator, BiometricGate, GateState};
use crate::keystore::KeyStore;
use crate::storage::{SecretMetadata, SecretRecord, VaultStorage};

/// A biometric-gated encrypted secret vault.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Vault {
    keystore: Arc<dyn KeyStore>,
    gate: BiometricGate,
    // Single writer lane: serializes put/delete on the whole vault,
    // which trivially preserves last-write-wins per name.
    storage: Arc<Mutex<VaultStorage>>,
    allow_put_while_locked: bool,
}

impl Vault {
    /// Open (or create) a vault at `storage_path`.
    ///
    /// Fails with `KeyUnavailable` if the key store cannot produce the
    /// current master key, and with `InvalidFormat` if an existing
    /// vault file does not pass its integrity check.
    pub async fn open(
        storage_path: impl AsRef<Path>,
        keystore: Arc<dyn KeyStore>,
        authenticator: Arc<dyn Authenticator>,
        config: VaultConfig,
    ) -> Result<Self> {
        let version = keystore.current_version()?;
        let master = keystore.get_or_create_key(version)?;
        let mac_key = keys::derive_storage_mac_key(&master)?;

        let storage = VaultStorage::open_or_create(storage_path.as_ref(), mac_key)?;
        debug!(
            records = storage.len(),
            key_version = version,
            "vault opened"
        );

        let gate = BiometricGate::new(authenticator, config.gate_policy());

        Ok(Self {
            keystore,
            gate,
            storage: Arc::new(Mutex::new(storage)),
            allow_put_while_locked: config.allow_put_while_locked,
        })
    }

    /// Store a secret under `name`, overwriting any previous value.
    ///
    /// Encrypts with a per-record key derived from the current master
    /// key.  Allowed while Locked unless the policy says otherwise.
    pub async fn put(&self, name: &str, plaintext: &[u8]) -> Result<()> {
        validate_secret_name(name)?;

        if !self.allow_put_while_locked {
            self.gate.request_unlock().await?;
        }

        let version = self.keystore.current_version()?;
        let master = self.keystore.get_or_create_key(version)?;
        let record_key = keys::derive_record_key(&master, name)?;

        let (ciphertext, nonce) = engine::encrypt(&record_key, plaintext)?;

        let now = Utc::now();
        let mut storage = self.storage.lock().await;

        // If the secret already exists, preserve the original created_at.
        let created_at = storage
            .load(name)
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        storage.save(SecretRecord {
            name: name.to_string(),
            ciphertext,
            nonce: nonce.to_vec(),
            key_version: version,
            created_at,
            updated_at: now,
        })?;

        debug!(name, key_version = version, "secret stored");
        Ok(())
    }

    /// Decrypt and return the plaintext for `name`.
    ///
    /// Requires the gate to be Unlocked; if it is not, a challenge is
    /// triggered transparently and the call suspends until the user
    /// responds.  On gate denial the error propagates without touching
    /// storage or the cipher layer.  The returned buffer zeroizes on
    /// drop.
    pub async fn get(&self, name: &str) -> Result<Zeroizing<Vec<u8>>> {
        validate_secret_name(name)?;

        self.gate.request_unlock().await?;

        let storage = self.storage.lock().await;
        let record = storage.load(name)?;

        let master = self.keystore.get_or_create_key(record.key_version)?;
        let record_key = keys::derive_record_key(&master, name)?;

        let plaintext = engine::decrypt(&record_key, &record.ciphertext, &record.nonce)?;
        debug!(name, "secret read");
        Ok(plaintext)
    }

    /// Like [`Vault::get`], for UTF-8 secrets.
    pub async fn get_string(&self, name: &str) -> Result<String> {
        let plaintext = self.get(name).await?;

        // On error, zeroize the copied bytes inside the error before
        // discarding.
        String::from_utf8(plaintext.to_vec()).map_err(|e| {
            let mut bad_bytes = e.into_bytes();
            bad_bytes.zeroize();
            VaultError::SerializationError("secret value is not valid UTF-8".to_string())
        })
    }

    /// Remove a secret.  Does not require unlock, since deleting reveals
    /// nothing.  Fails with `NotFound` if absent.
    pub async fn delete(&self, name: &str) -> Result<()> {
        validate_secret_name(name)?;

        let mut storage = self.storage.lock().await;
        storage.delete(name)?;
        debug!(name, "secret deleted");
        Ok(())
    }

    /// Metadata for all secrets, sorted by name.  Metadata-only: no
    /// decryption and no gate interaction.
    pub async fn list_secrets(&self) -> Vec<SecretMetadata> {
        self.storage.lock().await.list_metadata()
    }

    /// Returns `true` if a secret with the given name exists.
    pub async fn contains(&self, name: &str) -> bool {
        self.storage.lock().await.contains(name)
    }

    /// Number of stored secrets.
    pub async fn secret_count(&self) -> usize {
        self.storage.lock().await.len()
    }

    /// Explicitly close the unlock session.
    pub async fn lock(&self) {
        self.gate.lock().await;
    }

    /// Current gate state (with lazy session expiry applied).
    pub async fn gate_state(&self) -> GateState {
        self.gate.state().await
    }

    /// Access the gate directly (cancellation, lifecycle signals,
    /// session inspection).
    pub fn gate(&self) -> &BiometricGate {
        &self.gate
    }

    /// Destroy every record **and** all key material.  Irreversible:
    /// nothing stored before this call can ever be decrypted again.
    pub async fn wipe_all(&self) -> Result<()> {
        let mut storage = self.storage.lock().await;

        storage.wipe()?;
        self.keystore.wipe()?;
        self.gate.lock().await;

        // The master key just changed, so the storage MAC key must be
        // re-derived or the next save would be rejected on reopen.
        let version = self.keystore.current_version()?;
        let master = self.keystore.get_or_create_key(version)?;
        storage.reset_mac_key(keys::derive_storage_mac_key(&master)?)?;

        warn!("vault wiped; all previous ciphertexts are now garbage");
        Ok(())
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

/// Validate that a secret name is safe.
///
/// Allowed: ASCII letters, digits, underscores, hyphens, periods.
/// Must be non-empty and at most 256 characters.
fn validate_secret_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VaultError::InvalidName("name cannot be empty".into()));
    }
    if name.len() > 256 {
        return Err(VaultError::InvalidName(
            "name cannot exceed 256 characters".into(),
        ));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
    {
        return Err(VaultError::InvalidName(format!(
            "name '{name}' contains invalid characters; only ASCII letters, digits, underscores, hyphens, and periods are allowed"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names_pass() {
        for name in ["api_token", "DB-URL", "a.b.c", "X", "0"] {
            assert!(validate_secret_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn invalid_names_fail() {
        for name in ["", "has space", "semi;colon", "sla/sh", "emoji🔒"] {
            assert!(
                matches!(validate_secret_name(name), Err(VaultError::InvalidName(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn overlong_name_fails() {
        let name = "x".repeat(257);
        assert!(matches!(
            validate_secret_name(&name),
            Err(VaultError::InvalidName(_))
        ));
    }
}
