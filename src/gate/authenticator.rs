//! The platform challenge seam.
//!
//! The gate never talks to biometric hardware directly: it drives an
//! injected [`Authenticator`], which on a real platform wraps the OS
//! prompt (Touch ID, Windows Hello, a PAM fingerprint module) and in
//! tests is a scripted fake.  One `authenticate` call is one prompt
//! shown to the human.

use async_trait::async_trait;

/// Options passed to the platform prompt for every challenge.
#[derive(Debug, Clone)]
pub struct PromptOptions {
    /// Title shown on the platform prompt.
    pub title: String,

    /// Whether the user may fall back to the device PIN/password when
    /// biometrics fail or are not enrolled.
    pub allow_device_credential_fallback: bool,

    /// Maximum number of challenge attempts before the gate reports
    /// `AuthenticationFailed` for the whole unlock request.
    pub max_retries: u32,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            title: "Unlock vault".to_string(),
            allow_device_credential_fallback: true,
            max_retries: 3,
        }
    }
}

/// Result of a single platform challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// The user passed the biometric or device-credential check.
    Success,
    /// The user dismissed the prompt.
    UserCanceled,
    /// The challenge was rejected (wrong finger, wrong face, ...).
    AuthenticationFailed,
    /// No usable biometric hardware or it is currently locked out.
    HardwareUnavailable,
}

/// Asynchronous biometric/device-credential challenge provider.
///
/// `authenticate` suspends until the human responds; it must not block
/// a thread.  The gate guarantees at most one in-flight call per vault
/// instance (concurrent unlock requests coalesce).
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, options: &PromptOptions) -> ChallengeOutcome;
}

/// Authenticator for platforms without any biometric subsystem.
///
/// Reports `HardwareUnavailable` for every challenge, so gated reads
/// fail closed while `put`/`delete` keep working per policy.
#[derive(Debug, Default)]
pub struct UnavailableAuthenticator;

#[async_trait]
impl Authenticator for UnavailableAuthenticator {
    async fn authenticate(&self, _options: &PromptOptions) -> ChallengeOutcome {
        ChallengeOutcome::HardwareUnavailable
    }
}
