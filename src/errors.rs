use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur in BioVault.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Key store errors ---
    #[error("Key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    // --- Gate errors ---
    #[error("Unlock cancelled")]
    Cancelled,

    #[error("Biometric hardware unavailable")]
    HardwareUnavailable,

    // --- Storage errors ---
    #[error("Secret '{0}' not found")]
    NotFound(String),

    #[error("Vault file not found at {0}")]
    StorageNotFound(PathBuf),

    #[error("Invalid secret name: {0}")]
    InvalidName(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl VaultError {
    /// Returns `true` if the caller may reasonably retry the operation
    /// (gate denials and cancellations).  Fatal conditions such as
    /// `KeyUnavailable` or `InvalidFormat` return `false`.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VaultError::AuthenticationFailed | VaultError::Cancelled
        )
    }
}

/// Convenience type alias for BioVault results.
pub type Result<T> = std::result::Result<T, VaultError>;
