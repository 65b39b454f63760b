//! OS keyring key store.
//!
//! Stores master keys in the operating system's credential store:
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring / KDE Wallet)
//!
//! On platforms where the credential store itself is protected by
//! biometrics or the device credential, this gives key material the
//! same at-rest protection as an app-specific keystore.  All failures
//! surface as `KeyUnavailable`; the caller decides whether to fall
//! back to a `FileKeyStore`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use zeroize::Zeroize;

use crate::errors::{Result, VaultError};

use super::{generate_key, KeyHandle, KeyStore, KEY_LEN};

/// Service name used in the OS keyring.
const SERVICE_NAME: &str = "biovault";

/// Keyring entry that tracks the current key version.
const VERSION_ENTRY: &str = "current-version";

/// Key store backed by the OS credential store.
///
/// Each vault gets its own namespace so multiple vaults on one machine
/// do not share keys.
pub struct KeyringKeyStore {
    namespace: String,
}

impl KeyringKeyStore {
    /// Create a keyring-backed store for the given vault namespace
    /// (e.g. the vault's file stem).
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    fn entry(&self, name: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(SERVICE_NAME, &format!("{}:{name}", self.namespace))
            .map_err(|e| VaultError::KeyUnavailable(format!("failed to create keyring entry: {e}")))
    }

    fn key_entry(&self, version: u32) -> Result<keyring::Entry> {
        self.entry(&format!("master-key-v{version}"))
    }

    fn read_version(&self) -> Result<u32> {
        match self.entry(VERSION_ENTRY)?.get_password() {
            Ok(v) => v
                .parse()
                .map_err(|_| VaultError::KeyUnavailable("corrupt version entry in keyring".into())),
            Err(keyring::Error::NoEntry) => Ok(1),
            Err(e) => Err(VaultError::KeyUnavailable(format!(
                "failed to read from keyring: {e}"
            ))),
        }
    }
}

impl KeyStore for KeyringKeyStore {
    fn get_or_create_key(&self, version: u32) -> Result<KeyHandle> {
        let entry = self.key_entry(version)?;

        match entry.get_password() {
            Ok(encoded) => {
                let mut decoded = BASE64.decode(&encoded).map_err(|_| {
                    VaultError::KeyUnavailable("corrupt key entry in keyring".into())
                })?;
                if decoded.len() != KEY_LEN {
                    decoded.zeroize();
                    return Err(VaultError::KeyUnavailable(
                        "keyring entry has wrong key length".into(),
                    ));
                }
                let mut bytes = [0u8; KEY_LEN];
                bytes.copy_from_slice(&decoded);
                decoded.zeroize();
                let handle = KeyHandle::new(version, bytes);
                bytes.zeroize();
                Ok(handle)
            }
            Err(keyring::Error::NoEntry) => {
                // First use: generate and enroll a fresh key.
                let mut key = generate_key();
                let encoded = BASE64.encode(key);
                entry.set_password(&encoded).map_err(|e| {
                    VaultError::KeyUnavailable(format!("failed to store key in keyring: {e}"))
                })?;

                if version > self.read_version()? {
                    self.entry(VERSION_ENTRY)?
                        .set_password(&version.to_string())
                        .map_err(|e| {
                            VaultError::KeyUnavailable(format!(
                                "failed to store version in keyring: {e}"
                            ))
                        })?;
                }

                let handle = KeyHandle::new(version, key);
                key.zeroize();
                Ok(handle)
            }
            Err(e) => Err(VaultError::KeyUnavailable(format!(
                "failed to read from keyring: {e}"
            ))),
        }
    }

    fn current_version(&self) -> Result<u32> {
        self.read_version()
    }

    fn wipe(&self) -> Result<()> {
        let current = self.read_version()?;

        // Delete every version up to the current one; missing entries
        // are fine (already gone).
        for version in 1..=current {
            match self.key_entry(version)?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => {
                    return Err(VaultError::KeyUnavailable(format!(
                        "failed to delete key from keyring: {e}"
                    )))
                }
            }
        }

        match self.entry(VERSION_ENTRY)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(VaultError::KeyUnavailable(format!(
                "failed to delete version entry from keyring: {e}"
            ))),
        }
    }
}
