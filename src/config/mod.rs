use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, VaultError};
use crate::gate::{GatePolicy, PromptOptions};

/// Vault configuration, loaded from `.biovault.toml`.
///
/// Every field has a sensible default so a vault works out-of-the-box
/// without any config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// How long a successful unlock stays valid, in seconds.
    /// `0` means per-operation: every read re-challenges.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Whether `put` is allowed while the gate is Locked.  Storing a
    /// new secret does not reveal an existing one, so the default
    /// permits onboarding before the first unlock.
    #[serde(default = "default_allow_put_while_locked")]
    pub allow_put_while_locked: bool,

    /// Challenge attempts before an unlock request fails.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Title shown on the platform prompt.
    #[serde(default = "default_prompt_title")]
    pub prompt_title: String,

    /// Whether the device PIN/password may substitute for biometrics.
    #[serde(default = "default_allow_device_credential_fallback")]
    pub allow_device_credential_fallback: bool,

    /// Directory (relative to the data root) where vault files live.
    #[serde(default = "default_vault_dir")]
    pub vault_dir: String,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_session_ttl_secs() -> u64 {
    60
}

fn default_allow_put_while_locked() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_prompt_title() -> String {
    "Unlock vault".to_string()
}

fn default_allow_device_credential_fallback() -> bool {
    true
}

fn default_vault_dir() -> String {
    ".biovault".to_string()
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl_secs(),
            allow_put_while_locked: default_allow_put_while_locked(),
            max_retries: default_max_retries(),
            prompt_title: default_prompt_title(),
            allow_device_credential_fallback: default_allow_device_credential_fallback(),
            vault_dir: default_vault_dir(),
        }
    }
}

impl VaultConfig {
    /// Name of the config file we look for in the data root.
    const FILE_NAME: &'static str = ".biovault.toml";

    /// Load config from `<data_dir>/.biovault.toml`.
    ///
    /// If the file does not exist, sensible defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let config: VaultConfig = toml::from_str(&contents).map_err(|e| {
            VaultError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        Ok(config)
    }

    /// Build the full path to a vault file for a given vault name.
    ///
    /// Example: `data_dir/.biovault/main.vault`
    pub fn vault_path(&self, data_dir: &Path, vault_name: &str) -> PathBuf {
        data_dir
            .join(&self.vault_dir)
            .join(format!("{vault_name}.vault"))
    }

    /// Convert the gate-related fields into a gate policy.
    pub fn gate_policy(&self) -> GatePolicy {
        GatePolicy {
            session_ttl: Duration::from_secs(self.session_ttl_secs),
            prompt: PromptOptions {
                title: self.prompt_title.clone(),
                allow_device_credential_fallback: self.allow_device_credential_fallback,
                max_retries: self.max_retries,
            },
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
