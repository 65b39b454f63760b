//! Authentication gate for decrypt access.
//!
//! A state machine over {Locked, Authenticating, Unlocked, Failed}
//! that mediates access to the decrypt path.  A successful challenge
//! opens a time-bounded session; expiry is enforced lazily at every
//! gated operation, so no background timer thread is needed.
//!
//! Concurrency model: concurrent `request_unlock` calls while a
//! challenge is in flight **coalesce**: exactly one platform prompt
//! is shown per contention window and every waiter observes the same
//! outcome.  The challenge itself runs on a spawned task (a Tokio
//! runtime must be present) so a waiter dropping its future cannot
//! strand the others.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, oneshot, Mutex};
use tracing::{debug, warn};

use crate::errors::{Result, VaultError};

pub mod authenticator;

pub use authenticator::{Authenticator, ChallengeOutcome, PromptOptions, UnavailableAuthenticator};

/// Gate states as observed by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No valid session; decrypt access denied.
    Locked,
    /// A challenge is in flight.
    Authenticating,
    /// A session is open; decrypt access granted until expiry.
    Unlocked,
    /// Transient: a challenge just failed.  Reported through the
    /// unlock outcome once, then the gate resets to Locked, so this
    /// state is never observable via [`BiometricGate::state`].
    Failed,
}

/// An open unlock session.
#[derive(Debug, Clone, Copy)]
pub struct GateSession {
    pub unlocked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Gate policy: how long a session lasts and how the prompt behaves.
#[derive(Debug, Clone)]
pub struct GatePolicy {
    /// Session lifetime after a successful challenge.  `Duration::ZERO`
    /// means per-operation: every gated call re-challenges.
    pub session_ttl: Duration,

    /// Options forwarded to the platform prompt.
    pub prompt: PromptOptions,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(60),
            prompt: PromptOptions::default(),
        }
    }
}

/// Outcome broadcast to every waiter of one challenge cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnlockOutcome {
    Unlocked,
    Failed,
    Cancelled,
    Unavailable,
}

impl UnlockOutcome {
    fn into_result(self) -> Result<()> {
        match self {
            UnlockOutcome::Unlocked => Ok(()),
            UnlockOutcome::Failed => Err(VaultError::AuthenticationFailed),
            UnlockOutcome::Cancelled => Err(VaultError::Cancelled),
            UnlockOutcome::Unavailable => Err(VaultError::HardwareUnavailable),
        }
    }
}

/// Monotonic session window; chrono stamps are kept alongside for
/// reporting only, expiry decisions use `Instant`.
struct SessionWindow {
    expires_at_instant: Instant,
    unlocked_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

struct GateInner {
    state: GateState,
    session: Option<SessionWindow>,
    /// Pending-challenge slot: present exactly while Authenticating.
    pending: Option<broadcast::Sender<UnlockOutcome>>,
    /// Cancels the in-flight challenge, if any.
    cancel: Option<oneshot::Sender<()>>,
}

impl GateInner {
    /// Lazy expiry check: Unlocked past its deadline becomes Locked.
    fn check_expiry(&mut self, now: Instant) {
        if self.state == GateState::Unlocked {
            let expired = self
                .session
                .as_ref()
                .map_or(true, |s| s.expires_at_instant <= now);
            if expired {
                debug!("gate session expired");
                self.state = GateState::Locked;
                self.session = None;
            }
        }
    }
}

/// The authentication gate.  Cheap to clone; clones share state.
#[derive(Clone)]
pub struct BiometricGate {
    authenticator: Arc<dyn Authenticator>,
    policy: GatePolicy,
    inner: Arc<Mutex<GateInner>>,
}

impl BiometricGate {
    pub fn new(authenticator: Arc<dyn Authenticator>, policy: GatePolicy) -> Self {
        Self {
            authenticator,
            policy,
            inner: Arc::new(Mutex::new(GateInner {
                state: GateState::Locked,
                session: None,
                pending: None,
                cancel: None,
            })),
        }
    }

    /// Current state, with lazy expiry applied.
    pub async fn state(&self) -> GateState {
        let mut inner = self.inner.lock().await;
        inner.check_expiry(Instant::now());
        inner.state
    }

    /// The open session, if any.
    pub async fn session(&self) -> Option<GateSession> {
        let mut inner = self.inner.lock().await;
        inner.check_expiry(Instant::now());
        inner.session.as_ref().map(|s| GateSession {
            unlocked_at: s.unlocked_at,
            expires_at: s.expires_at,
        })
    }

    /// Ensure the gate is Unlocked, challenging the user if needed.
    ///
    /// Returns immediately when a valid session exists.  Otherwise this
    /// is the gate's single suspension point: it waits on the platform
    /// challenge (or on a challenge another caller already started) and
    /// resolves with that challenge's outcome: `Ok(())` on success,
    /// `AuthenticationFailed` / `Cancelled` / `HardwareUnavailable`
    /// otherwise.
    pub async fn request_unlock(&self) -> Result<()> {
        let mut rx = {
            let mut inner = self.inner.lock().await;
            inner.check_expiry(Instant::now());

            if inner.state == GateState::Unlocked {
                return Ok(());
            }

            if let Some(pending) = &inner.pending {
                // Join the in-flight challenge instead of prompting again.
                pending.subscribe()
            } else {
                let (tx, rx) = broadcast::channel(1);
                let (cancel_tx, cancel_rx) = oneshot::channel();

                inner.state = GateState::Authenticating;
                inner.pending = Some(tx.clone());
                inner.cancel = Some(cancel_tx);
                debug!("gate challenge started");

                tokio::spawn(drive_challenge(
                    Arc::clone(&self.authenticator),
                    self.policy.clone(),
                    Arc::clone(&self.inner),
                    cancel_rx,
                    tx,
                ));

                rx
            }
        };

        match rx.recv().await {
            Ok(outcome) => outcome.into_result(),
            // Sender dropped without resolving: treat as cancelled.
            Err(_) => Err(VaultError::Cancelled),
        }
    }

    /// Cancel an in-flight challenge, if any.
    ///
    /// The gate transitions to Locked (not Failed) and every waiter
    /// observes `Cancelled`.  A no-op when nothing is in flight.
    pub async fn cancel(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(cancel) = inner.cancel.take() {
            let _ = cancel.send(());
        }
    }

    /// Explicitly close the session.  Unlocked → Locked.
    pub async fn lock(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == GateState::Unlocked {
            debug!("gate explicitly locked");
        }
        if inner.state != GateState::Authenticating {
            inner.state = GateState::Locked;
        }
        inner.session = None;
    }

    /// Lifecycle signal: the host application went to the background.
    ///
    /// Drops the session and aborts any in-flight prompt, since the platform
    /// UI is gone anyway.
    pub async fn on_backgrounded(&self) {
        debug!("host application backgrounded, locking gate");
        {
            let mut inner = self.inner.lock().await;
            inner.session = None;
            if inner.state == GateState::Unlocked {
                inner.state = GateState::Locked;
            }
            if let Some(cancel) = inner.cancel.take() {
                let _ = cancel.send(());
            }
        }
    }
}

impl std::fmt::Debug for BiometricGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BiometricGate")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Run one challenge cycle to completion and publish the outcome.
///
/// Retries rejected attempts up to `max_retries`, aborts on the first
/// cancellation or hardware failure, and resolves the pending slot
/// exactly once.  Runs as its own task so it survives waiters dropping
/// their futures.
async fn drive_challenge(
    authenticator: Arc<dyn Authenticator>,
    policy: GatePolicy,
    inner: Arc<Mutex<GateInner>>,
    mut cancel_rx: oneshot::Receiver<()>,
    tx: broadcast::Sender<UnlockOutcome>,
) {
    let max_attempts = policy.prompt.max_retries.max(1);
    let mut attempts = 0u32;

    let outcome = loop {
        let challenge = authenticator.authenticate(&policy.prompt);
        tokio::pin!(challenge);

        let result = tokio::select! {
            _ = &mut cancel_rx => break UnlockOutcome::Cancelled,
            result = &mut challenge => result,
        };

        match result {
            ChallengeOutcome::Success => break UnlockOutcome::Unlocked,
            ChallengeOutcome::UserCanceled => break UnlockOutcome::Cancelled,
            ChallengeOutcome::HardwareUnavailable => break UnlockOutcome::Unavailable,
            ChallengeOutcome::AuthenticationFailed => {
                attempts += 1;
                if attempts >= max_attempts {
                    warn!(attempts, "challenge rejected, retry budget exhausted");
                    break UnlockOutcome::Failed;
                }
                debug!(attempts, "challenge rejected, retrying");
            }
        }
    };

    let mut guard = inner.lock().await;
    match outcome {
        UnlockOutcome::Unlocked => {
            let now_instant = Instant::now();
            let now = Utc::now();
            let ttl = policy.session_ttl;
            guard.state = GateState::Unlocked;
            guard.session = Some(SessionWindow {
                expires_at_instant: now_instant + ttl,
                unlocked_at: now,
                expires_at: now
                    + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
            });
            debug!("gate unlocked");
        }
        // Failed is transient: report once through the outcome, reset
        // to Locked immediately.
        UnlockOutcome::Failed | UnlockOutcome::Cancelled | UnlockOutcome::Unavailable => {
            guard.state = GateState::Locked;
            guard.session = None;
        }
    }
    guard.pending = None;
    guard.cancel = None;

    // Send while still holding the lock so every receiver subscribed
    // during this cycle sees the outcome before a new cycle can start.
    let _ = tx.send(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysApprove {
        calls: AtomicU32,
    }

    impl AlwaysApprove {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl Authenticator for AlwaysApprove {
        async fn authenticate(&self, _options: &PromptOptions) -> ChallengeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ChallengeOutcome::Success
        }
    }

    fn policy(ttl: Duration) -> GatePolicy {
        GatePolicy {
            session_ttl: ttl,
            prompt: PromptOptions::default(),
        }
    }

    #[tokio::test]
    async fn starts_locked() {
        let gate = BiometricGate::new(AlwaysApprove::new(), GatePolicy::default());
        assert_eq!(gate.state().await, GateState::Locked);
        assert!(gate.session().await.is_none());
    }

    #[tokio::test]
    async fn successful_unlock_opens_session() {
        let auth = AlwaysApprove::new();
        let gate = BiometricGate::new(auth.clone(), policy(Duration::from_secs(60)));

        gate.request_unlock().await.unwrap();
        assert_eq!(gate.state().await, GateState::Unlocked);
        assert!(gate.session().await.is_some());
        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn valid_session_skips_second_challenge() {
        let auth = AlwaysApprove::new();
        let gate = BiometricGate::new(auth.clone(), policy(Duration::from_secs(60)));

        gate.request_unlock().await.unwrap();
        gate.request_unlock().await.unwrap();
        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn explicit_lock_closes_session() {
        let gate = BiometricGate::new(AlwaysApprove::new(), policy(Duration::from_secs(60)));

        gate.request_unlock().await.unwrap();
        gate.lock().await;
        assert_eq!(gate.state().await, GateState::Locked);
        assert!(gate.session().await.is_none());
    }

    #[tokio::test]
    async fn unavailable_authenticator_fails_closed() {
        let gate = BiometricGate::new(
            Arc::new(UnavailableAuthenticator),
            GatePolicy::default(),
        );

        let result = gate.request_unlock().await;
        assert!(matches!(result, Err(VaultError::HardwareUnavailable)));
        assert_eq!(gate.state().await, GateState::Locked);
    }
}
