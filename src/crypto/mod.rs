//! Cryptographic primitives: AES-256-GCM engine and HKDF key derivation.

pub mod engine;
pub mod keys;
