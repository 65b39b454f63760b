//! BioVault: a biometric-gated encrypted local secret vault.
//!
//! Secrets are encrypted at rest with AES-256-GCM under versioned
//! master keys and released only after a successful biometric (or
//! device-credential) challenge.  The pieces are independently
//! swappable: inject a fake [`keystore::KeyStore`] and a scripted
//! [`gate::Authenticator`] to test without secure hardware.
//!
//! ```no_run
//! use std::sync::Arc;
//! use biovault::config::VaultConfig;
//! use biovault::gate::UnavailableAuthenticator;
//! use biovault::keystore::FileKeyStore;
//! use biovault::vault::Vault;
//!
//! # async fn demo() -> biovault::errors::Result<()> {
//! let vault = Vault::open(
//!     "/data/app/main.vault",
//!     Arc::new(FileKeyStore::new("/data/app/master.keys")),
//!     Arc::new(UnavailableAuthenticator), // swap in a platform prompt
//!     VaultConfig::default(),
//! )
//! .await?;
//!
//! vault.put("api_token", b"secret123").await?;
//! let token = vault.get_string("api_token").await?; // triggers unlock
//! # let _ = token;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod errors;
pub mod gate;
pub mod keystore;
pub mod storage;
pub mod vault;

pub use errors::{Result, VaultError};
pub use vault::Vault;
