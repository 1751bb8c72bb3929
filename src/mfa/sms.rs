//! SMS challenge issuance and verification.
//!
//! One active challenge per user; each send supersedes the previous one.
//! Delivery failures roll the challenge back so no valid-looking code is
//! left stranded in the store.

use crate::config::MfaConfig;
use crate::delivery::SmsChannel;
use crate::errors::{MfaError, Result};
use crate::mfa::status::StatusStore;
use crate::mfa::{Method, VerifyOutcome, VerifyResultKind};
use crate::storage::KeyValueStorage;
use crate::utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize, Deserialize)]
struct SmsChallengeRecord {
    code: String,
    phone: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    attempts: u32,
    is_resend: bool,
}

/// Details of a challenge that went out.
#[derive(Debug, Clone)]
pub struct SmsChallengeIssued {
    pub phone: String,
    pub expires_at: DateTime<Utc>,
    pub is_resend: bool,
    /// Provider message id, when the channel reports one.
    pub message_id: Option<String>,
}

/// SMS manager for code challenges.
pub struct SmsManager {
    storage: Arc<dyn KeyValueStorage>,
    status: StatusStore,
    channel: Arc<dyn SmsChannel>,
    config: Arc<MfaConfig>,
}

impl SmsManager {
    pub(crate) fn new(
        storage: Arc<dyn KeyValueStorage>,
        status: StatusStore,
        channel: Arc<dyn SmsChannel>,
        config: Arc<MfaConfig>,
    ) -> Self {
        Self {
            storage,
            status,
            channel,
            config,
        }
    }

    fn challenge_key(uid: &str) -> String {
        format!("mfa:sms:challenge:{uid}")
    }

    fn resend_key(uid: &str) -> String {
        format!("mfa:sms:resend:{uid}")
    }

    fn daily_sent_key(uid: &str) -> String {
        format!("mfa:sms:sent:{uid}")
    }

    /// Issue a challenge to a phone number.
    ///
    /// Enforces the daily send cap and, for resends, the resend interval.
    /// The challenge is persisted before the channel is invoked and
    /// deleted again if delivery fails.
    pub async fn send(&self, uid: &str, phone: &str, is_resend: bool) -> Result<SmsChallengeIssued> {
        debug!("Sending SMS challenge for user '{}'", uid);

        validate_phone(phone)?;

        let sent_today = self.read_sent_count(uid).await;
        if sent_today >= self.config.sms_daily_send_cap {
            return Err(MfaError::rate_limit(format!(
                "Daily SMS limit of {} reached",
                self.config.sms_daily_send_cap
            )));
        }

        if is_resend {
            if let Ok(Some(_)) = self.storage.get(&Self::resend_key(uid)).await {
                let wait = self
                    .storage
                    .ttl(&Self::resend_key(uid))
                    .await
                    .unwrap_or(-1)
                    .max(1);
                return Err(MfaError::rate_limit(format!(
                    "Please wait {wait}s before requesting another code"
                )));
            }
        }

        let code = utils::code::generate_numeric(self.config.sms_code_length);
        let now = Utc::now();
        let expires_at =
            now + chrono::Duration::from_std(self.config.sms_challenge_ttl).unwrap();

        let record = SmsChallengeRecord {
            code: code.clone(),
            phone: phone.to_string(),
            created_at: now,
            expires_at,
            attempts: 0,
            is_resend,
        };
        let data = serde_json::to_vec(&record)?;
        self.storage
            .set_with_ttl(&Self::challenge_key(uid), &data, self.config.sms_challenge_ttl)
            .await?;

        let delivery = match self.channel.send(phone, &code).await {
            Ok(delivery) => delivery,
            Err(e) => {
                // Roll the challenge back so the stored code cannot
                // outlive a send the user never received.
                if let Err(del_err) = self.storage.delete(&Self::challenge_key(uid)).await {
                    warn!(
                        "Failed to roll back undelivered SMS challenge for '{}': {}",
                        uid, del_err
                    );
                }
                warn!("SMS delivery failed for user '{}': {}", uid, e);
                return Err(MfaError::delivery(format!("SMS delivery failed: {e}")));
            }
        };

        self.storage
            .set_with_ttl(
                &Self::resend_key(uid),
                b"1",
                self.config.sms_resend_interval,
            )
            .await?;
        self.storage
            .increment_with_ttl(&Self::daily_sent_key(uid), self.config.daily_window_ttl)
            .await?;

        // A send for a user without the method enabled starts enrollment;
        // a login challenge for an enrolled user leaves the status alone.
        let current = self.status.load_or_default(uid).await;
        if !current.is_enabled(Method::Sms) {
            self.status
                .transition(uid, |s| s.mark_pending(Method::Sms))
                .await?;
        }

        info!(
            "SMS challenge sent to user '{}' (resend: {})",
            uid, is_resend
        );
        Ok(SmsChallengeIssued {
            phone: phone.to_string(),
            expires_at,
            is_resend,
            message_id: delivery.message_id,
        })
    }

    /// Verify a code against the active challenge.
    pub async fn verify(&self, uid: &str, code: &str) -> Result<VerifyOutcome> {
        debug!("Verifying SMS code for user '{}'", uid);

        let mut record = match self.load_challenge(uid).await {
            Some(record) => record,
            None => {
                return Ok(VerifyOutcome::failure(
                    VerifyResultKind::Expired,
                    "No active SMS challenge",
                ));
            }
        };

        let now = Utc::now();
        if now > record.expires_at {
            self.storage.delete(&Self::challenge_key(uid)).await?;
            return Ok(VerifyOutcome::failure(
                VerifyResultKind::Expired,
                "SMS code has expired",
            ));
        }

        if record.attempts >= self.config.sms_max_challenge_attempts {
            self.storage.delete(&Self::challenge_key(uid)).await?;
            return Ok(VerifyOutcome::failure(
                VerifyResultKind::TooManyAttempts,
                "Too many attempts on this code",
            ));
        }

        if !utils::crypto::constant_time_eq(code, &record.code) {
            record.attempts += 1;
            let remaining = (record.expires_at - now)
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(1));
            let data = serde_json::to_vec(&record)?;
            self.storage
                .set_with_ttl(&Self::challenge_key(uid), &data, remaining)
                .await?;

            info!(
                "SMS verification failed for user '{}' (attempt {})",
                uid, record.attempts
            );
            return Ok(VerifyOutcome::failure(
                VerifyResultKind::InvalidCode,
                "Invalid SMS code",
            ));
        }

        self.storage.delete(&Self::challenge_key(uid)).await?;
        info!("SMS code verified for user '{}'", uid);
        Ok(VerifyOutcome::ok("SMS code verified"))
    }

    /// Confirm enrollment with a valid code and enable the method.
    pub async fn enable(&self, uid: &str, code: &str) -> Result<()> {
        let current = self.status.load_or_default(uid).await;
        if current.is_enabled(Method::Sms) {
            return Err(MfaError::already_enabled("SMS is already enabled"));
        }

        let outcome = self.verify(uid, code).await?;
        if !outcome.success {
            return Err(outcome.into_error());
        }

        self.status
            .transition(uid, |s| s.mark_enabled(Method::Sms))
            .await?;

        info!("SMS enabled for user '{}'", uid);
        Ok(())
    }

    /// Drop any active challenge and remove the method.
    pub async fn disable(&self, uid: &str) -> Result<()> {
        self.storage.delete(&Self::challenge_key(uid)).await?;
        self.status
            .transition(uid, |s| s.remove_method(Method::Sms))
            .await?;

        info!("SMS disabled for user '{}'", uid);
        Ok(())
    }

    async fn load_challenge(&self, uid: &str) -> Option<SmsChallengeRecord> {
        match self.storage.get(&Self::challenge_key(uid)).await {
            Ok(Some(data)) => match serde_json::from_slice(&data) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Corrupt SMS challenge for user '{}': {}", uid, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read SMS challenge for user '{}': {}", uid, e);
                None
            }
        }
    }

    async fn read_sent_count(&self, uid: &str) -> i64 {
        match self.storage.get(&Self::daily_sent_key(uid)).await {
            Ok(Some(data)) => std::str::from_utf8(&data)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                warn!("Failed to read SMS send counter for '{}': {}", uid, e);
                0
            }
        }
    }
}

fn validate_phone(phone: &str) -> Result<()> {
    if phone.is_empty() {
        return Err(MfaError::validation("Phone number cannot be empty"));
    }

    if !phone.starts_with('+') || phone.len() < 10 {
        return Err(MfaError::validation(
            "Phone number must be in international format (+1234567890)",
        ));
    }

    let digits = &phone[1..];
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(MfaError::validation(
            "Phone number must contain only digits after the + sign",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_validation() {
        assert!(validate_phone("+886912345678").is_ok());
        assert!(validate_phone("+12025550123").is_ok());

        assert!(validate_phone("").is_err());
        assert!(validate_phone("0912345678").is_err());
        assert!(validate_phone("+1-202-555").is_err());
        assert!(validate_phone("+12345").is_err());
    }
}
