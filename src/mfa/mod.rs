//! Multi-factor authentication service.
//!
//! `MfaService` coordinates the per-method subsystems behind one
//! verification entry point and one enrollment state record. All state
//! lives in the injected key-value store; the service itself is
//! stateless and safe to share across tasks.

pub mod attempts;
pub mod backup_codes;
pub mod sms;
pub mod status;
pub mod totp;

pub use attempts::{AttemptTracker, Window};
pub use backup_codes::{BackupCodeInfo, BackupCodesIssued, BackupCodesManager};
pub use sms::{SmsChallengeIssued, SmsManager};
pub use status::{MfaState, MfaStatus};
pub use totp::{TotpEnrollment, TotpManager};

use crate::config::MfaConfig;
use crate::delivery::SmsChannel;
use crate::errors::{MfaError, Result, StorageError};
use crate::storage::KeyValueStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use status::StatusStore;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Verification method identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Totp,
    Sms,
    BackupCode,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Totp => "totp",
            Method::Sms => "sms",
            Method::BackupCode => "backup_code",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure classification for verification outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyResultKind {
    Ok,
    InvalidCode,
    Expired,
    TooManyAttempts,
    RateLimited,
    NotSetUp,
    StoreUnavailable,
}

/// Structured verification result.
///
/// Verification never throws: callers branch on `result`, not on the
/// human-readable `message`.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyOutcome {
    pub success: bool,
    pub result: VerifyResultKind,
    pub message: String,
    /// Unused backup codes left after a successful redemption.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
}

impl VerifyOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            result: VerifyResultKind::Ok,
            message: message.into(),
            remaining: None,
        }
    }

    pub fn ok_with_remaining(message: impl Into<String>, remaining: u32) -> Self {
        Self {
            success: true,
            result: VerifyResultKind::Ok,
            message: message.into(),
            remaining: Some(remaining),
        }
    }

    pub fn failure(result: VerifyResultKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            result,
            message: message.into(),
            remaining: None,
        }
    }

    /// Convert a failed outcome into the matching error for management
    /// paths (`enable` and friends) that do reject.
    pub(crate) fn into_error(self) -> MfaError {
        match self.result {
            VerifyResultKind::InvalidCode => MfaError::InvalidCode,
            VerifyResultKind::Expired => MfaError::Expired,
            VerifyResultKind::TooManyAttempts => MfaError::TooManyAttempts,
            VerifyResultKind::RateLimited => MfaError::rate_limit(self.message),
            VerifyResultKind::NotSetUp => MfaError::not_set_up(self.message),
            VerifyResultKind::StoreUnavailable => {
                MfaError::Storage(StorageError::BackendUnavailable)
            }
            VerifyResultKind::Ok => MfaError::internal("successful outcome is not an error"),
        }
    }
}

/// Status view returned to callers, with the live backup-code count.
#[derive(Debug, Clone, Serialize)]
pub struct MfaStatusView {
    pub status: MfaState,
    pub enabled_methods: Vec<Method>,
    pub pending_methods: Vec<Method>,
    pub last_updated: DateTime<Utc>,
    pub remaining_backup_codes: u32,
}

/// Centralized MFA service coordinating all methods.
pub struct MfaService {
    /// TOTP manager
    pub totp: TotpManager,

    /// SMS manager
    pub sms: SmsManager,

    /// Backup codes manager
    pub backup_codes: BackupCodesManager,

    attempts: AttemptTracker,
    status: StatusStore,
}

impl MfaService {
    /// Create a new MFA service with injected dependencies.
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        channel: Arc<dyn SmsChannel>,
        config: MfaConfig,
    ) -> Self {
        let config = Arc::new(config);
        let status = StatusStore::new(storage.clone());

        Self {
            totp: TotpManager::new(storage.clone(), status.clone(), config.clone()),
            sms: SmsManager::new(storage.clone(), status.clone(), channel, config.clone()),
            backup_codes: BackupCodesManager::new(
                storage.clone(),
                status.clone(),
                config.clone(),
            ),
            attempts: AttemptTracker::new(storage, config),
            status,
        }
    }

    /// Current enrollment state for a user. Absence and read failures
    /// both read as disabled.
    pub async fn get_status(&self, uid: &str) -> MfaStatusView {
        let status = self.status.load_or_default(uid).await;
        let remaining_backup_codes = self.backup_codes.remaining_count(uid).await;

        MfaStatusView {
            status: status.status,
            enabled_methods: status.enabled_methods,
            pending_methods: status.pending_methods,
            last_updated: status.last_updated,
            remaining_backup_codes,
        }
    }

    /// Unified verification entry point.
    ///
    /// Attempts are counted in both windows before dispatch, so even a
    /// first-try success draws down the daily budget. A success clears
    /// the short window; the daily window always keeps running.
    pub async fn verify(&self, uid: &str, code: &str, method: Method) -> VerifyOutcome {
        if self.attempts.is_exceeded(uid, method).await {
            info!(
                "Verification blocked for user '{}' method '{}': attempt limit",
                uid, method
            );
            return VerifyOutcome::failure(
                VerifyResultKind::TooManyAttempts,
                "Too many attempts, please try again later",
            );
        }

        for window in [Window::Short, Window::Daily] {
            if let Err(e) = self.attempts.increment(uid, method, window).await {
                // An attempt that cannot be counted is not allowed to run.
                warn!(
                    "Failed to count attempt for user '{}' method '{}': {}",
                    uid, method, e
                );
                return VerifyOutcome::failure(
                    VerifyResultKind::StoreUnavailable,
                    "Verification is temporarily unavailable",
                );
            }
        }

        let dispatched = match method {
            Method::Totp => self.totp.verify(uid, code).await,
            Method::Sms => self.sms.verify(uid, code).await,
            Method::BackupCode => self.backup_codes.verify(uid, code).await,
        };

        match dispatched {
            Ok(outcome) if outcome.success => {
                if let Err(e) = self.attempts.reset(uid, method).await {
                    // The counter only over-counts from here, so the
                    // success still stands.
                    warn!(
                        "Failed to reset short window for user '{}' method '{}': {}",
                        uid, method, e
                    );
                }
                debug!("Verification succeeded for user '{}' method '{}'", uid, method);
                outcome
            }
            Ok(outcome) => outcome,
            Err(MfaError::Storage(e)) => {
                warn!(
                    "Store failure during verification for user '{}' method '{}': {}",
                    uid, method, e
                );
                VerifyOutcome::failure(
                    VerifyResultKind::StoreUnavailable,
                    "Verification is temporarily unavailable",
                )
            }
            Err(e) => {
                warn!(
                    "Verification dispatch failed for user '{}' method '{}': {}",
                    uid, method, e
                );
                VerifyOutcome::failure(VerifyResultKind::InvalidCode, "Verification failed")
            }
        }
    }

    /// Disable a method, routing to its subsystem.
    pub async fn disable(&self, uid: &str, method: Method) -> Result<()> {
        match method {
            Method::Totp => self.totp.disable(uid).await,
            Method::Sms => self.sms.disable(uid).await,
            Method::BackupCode => self.backup_codes.disable(uid).await,
        }
    }
}
