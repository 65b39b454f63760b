//! Binary vault file format and HMAC integrity verification.
//!
//! A `.vault` file has this layout:
//!
//! ```text
//! [BVLT: 4 bytes][version: 1 byte][header_len: 4 bytes LE][header JSON][records JSON][HMAC-SHA256: 32 bytes]
//! ```
//!
//! - **Magic** (`BVLT`): identifies the file as a BioVault vault.
//! - **Version**: format version (currently `1`).
//! - **Header length**: little-endian u32 telling us where the header
//!   JSON ends and the records JSON begins.
//! - **Header JSON**: serialized `StorageHeader`.
//! - **Records JSON**: serialized `Vec<SecretRecord>`.
//! - **HMAC-SHA256**: 32-byte tag over header + records bytes, keyed
//!   by a MAC key derived from the master key.
//!
//! The layout is internal and not guaranteed stable across versions.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::record::SecretRecord;
use crate::errors::{Result, VaultError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic bytes at the start of every vault file.
const MAGIC: &[u8; 4] = b"BVLT";

/// Current binary format version.
pub const CURRENT_VERSION: u8 = 1;

/// Size of the HMAC tag appended to the file (SHA-256 = 32 bytes).
const HMAC_LEN: usize = 32;

/// Fixed-size prefix: 4 (magic) + 1 (version) + 4 (header_len).
const PREFIX_LEN: usize = 9;

// ---------------------------------------------------------------------------
// StorageHeader
// ---------------------------------------------------------------------------

/// Metadata stored at the beginning of a vault file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageHeader {
    /// Format version.
    pub version: u8,

    /// When this vault was first created.
    pub created_at: DateTime<Utc>,
}

impl StorageHeader {
    pub fn new() -> Self {
        Self {
            version: CURRENT_VERSION,
            created_at: Utc::now(),
        }
    }
}

impl Default for StorageHeader {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Write a vault file to disk **atomically**.
///
/// 1. Serialize header and records to JSON.
/// 2. Compute HMAC over header + records bytes.
/// 3. Write to a temp file in the same directory.
/// 4. Rename the temp file over the target path.
///
/// The rename ensures readers never see a half-written file.
pub fn write_store(
    path: &Path,
    header: &StorageHeader,
    records: &[SecretRecord],
    mac_key: &[u8],
) -> Result<()> {
    let header_bytes = serde_json::to_vec(header)
        .map_err(|e| VaultError::SerializationError(format!("header: {e}")))?;
    let records_bytes = serde_json::to_vec(records)
        .map_err(|e| VaultError::SerializationError(format!("records: {e}")))?;

    let hmac_tag = compute_hmac(mac_key, &header_bytes, &records_bytes)?;

    // Build the binary blob.
    let header_len = u32::try_from(header_bytes.len()).map_err(|_| {
        VaultError::SerializationError(format!(
            "header length {} exceeds u32::MAX",
            header_bytes.len()
        ))
    })?;
    let total = PREFIX_LEN + header_bytes.len() + records_bytes.len() + HMAC_LEN;
    let mut buf = Vec::with_capacity(total);

    buf.extend_from_slice(MAGIC); // 4 bytes
    buf.push(CURRENT_VERSION); // 1 byte
    buf.extend_from_slice(&header_len.to_le_bytes()); // 4 bytes LE
    buf.extend_from_slice(&header_bytes); // header JSON
    buf.extend_from_slice(&records_bytes); // records JSON
    buf.extend_from_slice(&hmac_tag); // 32 bytes

    // Atomic write: temp file in the same directory, then rename.
    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    fs::write(&tmp_path, &buf)?;
    fs::rename(&tmp_path, path)?;

    Ok(())
}

/// Raw data read from a vault file on disk.
///
/// Keeps the original bytes so the HMAC can be verified over the exact
/// bytes that were written, with no re-serialization round-trip.
pub struct RawStore {
    pub header: StorageHeader,
    pub records: Vec<SecretRecord>,
    /// The raw header JSON bytes exactly as stored on disk.
    pub header_bytes: Vec<u8>,
    /// The raw records JSON bytes exactly as stored on disk.
    pub records_bytes: Vec<u8>,
    /// The HMAC tag stored at the end of the file.
    pub stored_hmac: Vec<u8>,
}

/// Read a vault file from disk and return its parts **with raw bytes**.
///
/// The caller must verify the HMAC over `header_bytes` and
/// `records_bytes` before trusting the deserialized data.
pub fn read_store(path: &Path) -> Result<RawStore> {
    if !path.exists() {
        return Err(VaultError::StorageNotFound(path.to_path_buf()));
    }

    let data = fs::read(path)?;

    // Minimum size: prefix + HMAC.
    let min_size = PREFIX_LEN + HMAC_LEN;
    if data.len() < min_size {
        return Err(VaultError::InvalidFormat(
            "file too small to be a valid vault".into(),
        ));
    }

    // --- Parse the fixed-size prefix ---

    if &data[0..4] != MAGIC {
        return Err(VaultError::InvalidFormat(
            "missing BVLT magic bytes".into(),
        ));
    }

    let version = data[4];
    if version != CURRENT_VERSION {
        return Err(VaultError::InvalidFormat(format!(
            "unsupported version {version}, expected {CURRENT_VERSION}"
        )));
    }

    let header_len_u32 = u32::from_le_bytes(
        data[5..9]
            .try_into()
            .map_err(|_| VaultError::InvalidFormat("bad header length".into()))?,
    );
    let header_len = usize::try_from(header_len_u32).map_err(|_| {
        VaultError::InvalidFormat(format!(
            "header length {header_len_u32} exceeds platform address space"
        ))
    })?;

    let header_end = PREFIX_LEN + header_len;
    if header_end + HMAC_LEN > data.len() {
        return Err(VaultError::InvalidFormat(
            "header length exceeds file size".into(),
        ));
    }

    // --- Extract the three variable-length sections as raw bytes ---

    let header_bytes = data[PREFIX_LEN..header_end].to_vec();
    let records_end = data.len() - HMAC_LEN;
    let records_bytes = data[header_end..records_end].to_vec();
    let stored_hmac = data[records_end..].to_vec();

    // --- Deserialize from the raw bytes ---

    let header: StorageHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| VaultError::InvalidFormat(format!("header JSON: {e}")))?;

    let records: Vec<SecretRecord> = serde_json::from_slice(&records_bytes)
        .map_err(|e| VaultError::InvalidFormat(format!("records JSON: {e}")))?;

    Ok(RawStore {
        header,
        records,
        header_bytes,
        records_bytes,
        stored_hmac,
    })
}

/// Compute HMAC-SHA256 over header + records bytes.
pub fn compute_hmac(mac_key: &[u8], header_bytes: &[u8], records_bytes: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(mac_key)
        .map_err(|e| VaultError::InvalidFormat(format!("invalid MAC key: {e}")))?;

    mac.update(header_bytes);
    mac.update(records_bytes);

    Ok(mac.finalize().into_bytes().to_vec())
}

/// Verify that the HMAC matches using constant-time comparison.
///
/// `hmac::Mac::verify_slice` is guaranteed constant-time, preventing
/// timing side channels.  A mismatch means the file was tampered with
/// or was written under a different master key.
pub fn verify_hmac(
    mac_key: &[u8],
    header_bytes: &[u8],
    records_bytes: &[u8],
    expected_hmac: &[u8],
) -> Result<()> {
    let mut mac = Hmac::<Sha256>::new_from_slice(mac_key)
        .map_err(|e| VaultError::InvalidFormat(format!("invalid MAC key: {e}")))?;

    mac.update(header_bytes);
    mac.update(records_bytes);

    mac.verify_slice(expected_hmac)
        .map_err(|_| VaultError::InvalidFormat("vault file integrity check failed".into()))
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded Vec<u8> fields
// ---------------------------------------------------------------------------

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub(crate) fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let encoded = BASE64.encode(data);
    serializer.serialize_str(&encoded)
}

pub(crate) fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}
