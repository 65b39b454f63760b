//! SecretRecord and SecretMetadata types stored inside a vault.
//!
//! Each record holds the logical name, the ciphertext and its nonce,
//! the master key version the ciphertext was produced under, and
//! creation/update timestamps.  Byte fields use custom serde helpers
//! so they serialize as base64 strings in JSON rather than raw byte
//! arrays.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Re-use the base64 serde helpers from format.rs (no duplication).
use super::format::{base64_decode, base64_encode};

/// A single encrypted secret stored in the vault.
///
/// Storage only ever sees records in this form; plaintext never
/// reaches this layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRecord {
    /// Caller-chosen unique identifier (e.g. "api_token").
    pub name: String,

    /// AES-256-GCM ciphertext including the auth tag.
    /// Serialized as a base64 string in JSON.
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub ciphertext: Vec<u8>,

    /// The nonce used for this encryption, unique per record version.
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub nonce: Vec<u8>,

    /// Which master key version encrypted this record.
    pub key_version: u32,

    /// When this secret was first created.
    pub created_at: DateTime<Utc>,

    /// When this secret was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Lightweight metadata about a secret (no ciphertext).
///
/// Returned by `Vault::list_secrets` so callers can display names and
/// timestamps without touching any ciphertext or the gate.
#[derive(Debug, Clone)]
pub struct SecretMetadata {
    pub name: String,
    pub key_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
