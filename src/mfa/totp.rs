//! TOTP enrollment and verification.

use crate::config::MfaConfig;
use crate::errors::{MfaError, Result};
use crate::mfa::status::StatusStore;
use crate::mfa::{Method, VerifyOutcome, VerifyResultKind};
use crate::storage::KeyValueStorage;
use crate::utils;
use chrono::{DateTime, Utc};
use ring::hmac;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Enrollment material returned once at setup.
///
/// The raw secret and the otpauth URI are displayed to the user a single
/// time; neither is re-exposed by any later call.
#[derive(Debug, Clone)]
pub struct TotpEnrollment {
    /// Base32 secret for manual entry.
    pub secret: String,
    /// `otpauth://` URI to render as a QR code.
    pub otpauth_uri: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct TotpSecretRecord {
    secret: String,
    enabled: bool,
    created_at: DateTime<Utc>,
    enabled_at: Option<DateTime<Utc>>,
}

/// TOTP manager for time-based one-time passwords.
pub struct TotpManager {
    storage: Arc<dyn KeyValueStorage>,
    status: StatusStore,
    config: Arc<MfaConfig>,
}

impl TotpManager {
    pub(crate) fn new(
        storage: Arc<dyn KeyValueStorage>,
        status: StatusStore,
        config: Arc<MfaConfig>,
    ) -> Self {
        Self {
            storage,
            status,
            config,
        }
    }

    fn secret_key(uid: &str) -> String {
        format!("mfa:totp:{uid}")
    }

    /// Begin TOTP enrollment.
    ///
    /// Generates a fresh secret (replacing any unconfirmed one), persists
    /// it disabled, and marks the method pending. Rejects when an enabled
    /// secret already exists.
    pub async fn setup(&self, uid: &str, email: &str) -> Result<TotpEnrollment> {
        debug!("Setting up TOTP for user '{}'", uid);

        if let Some(record) = self.load_record(uid).await? {
            if record.enabled {
                return Err(MfaError::already_enabled("TOTP is already enabled"));
            }
        }

        let secret = base32::encode(
            base32::Alphabet::RFC4648 { padding: false },
            &utils::crypto::generate_random_bytes(20),
        );

        let record = TotpSecretRecord {
            secret: secret.clone(),
            enabled: false,
            created_at: Utc::now(),
            enabled_at: None,
        };
        self.store_record(uid, &record).await?;

        self.status
            .transition(uid, |s| s.mark_pending(Method::Totp))
            .await?;

        let issuer = &self.config.issuer;
        let otpauth_uri =
            format!("otpauth://totp/{issuer}:{email}?secret={secret}&issuer={issuer}");

        info!("TOTP enrollment started for user '{}'", uid);
        Ok(TotpEnrollment {
            secret,
            otpauth_uri,
        })
    }

    /// Verify a TOTP code against the user's secret.
    ///
    /// Accepts the current time step and one step on either side for
    /// clock skew. There is no consumed-code ledger, so a code can be
    /// replayed inside that tolerance window.
    pub async fn verify(&self, uid: &str, code: &str) -> Result<VerifyOutcome> {
        debug!("Verifying TOTP code for user '{}'", uid);

        let record = match self.load_record(uid).await? {
            Some(record) => record,
            None => {
                return Ok(VerifyOutcome::failure(
                    VerifyResultKind::NotSetUp,
                    "TOTP is not set up",
                ));
            }
        };

        if self.check_code(&record.secret, code, utils::time::current_timestamp())? {
            info!("TOTP code verified for user '{}'", uid);
            Ok(VerifyOutcome::ok("TOTP code verified"))
        } else {
            info!("TOTP verification failed for user '{}'", uid);
            Ok(VerifyOutcome::failure(
                VerifyResultKind::InvalidCode,
                "Invalid TOTP code",
            ))
        }
    }

    /// Confirm enrollment with a first valid code and enable the method.
    pub async fn enable(&self, uid: &str, code: &str) -> Result<()> {
        let mut record = self
            .load_record(uid)
            .await?
            .ok_or_else(|| MfaError::not_set_up("TOTP is not set up"))?;

        if record.enabled {
            return Err(MfaError::already_enabled("TOTP is already enabled"));
        }

        let outcome = self.verify(uid, code).await?;
        if !outcome.success {
            return Err(outcome.into_error());
        }

        record.enabled = true;
        record.enabled_at = Some(Utc::now());
        self.store_record(uid, &record).await?;

        self.status
            .transition(uid, |s| s.mark_enabled(Method::Totp))
            .await?;

        info!("TOTP enabled for user '{}'", uid);
        Ok(())
    }

    /// Remove the secret and the method, whatever state it is in.
    pub async fn disable(&self, uid: &str) -> Result<()> {
        self.storage.delete(&Self::secret_key(uid)).await?;
        self.status
            .transition(uid, |s| s.remove_method(Method::Totp))
            .await?;

        info!("TOTP disabled for user '{}'", uid);
        Ok(())
    }

    /// Generate the code for a secret at the current time.
    pub fn generate_code(&self, secret: &str) -> Result<String> {
        self.generate_code_at(secret, utils::time::current_timestamp())
    }

    /// Generate the code for a secret at a given Unix time.
    pub fn generate_code_at(&self, secret: &str, at_unix: u64) -> Result<String> {
        let window = at_unix / self.config.totp_step.as_secs();
        Self::code_for_window(secret, window, self.config.totp_digits)
    }

    fn check_code(&self, secret: &str, code: &str, now_unix: u64) -> Result<bool> {
        let digits = self.config.totp_digits;
        if code.len() != digits as usize || !code.chars().all(|c| c.is_ascii_digit()) {
            return Ok(false);
        }

        let skew = self.config.totp_skew_steps;
        let current_window = now_unix / self.config.totp_step.as_secs();

        for window in current_window.saturating_sub(skew)..=current_window + skew {
            let expected = Self::code_for_window(secret, window, digits)?;
            if utils::crypto::constant_time_eq(code, &expected) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// RFC 4226 dynamic truncation over an HMAC-SHA1 of the window.
    fn code_for_window(secret: &str, window: u64, digits: u32) -> Result<String> {
        let secret_bytes = base32::decode(base32::Alphabet::RFC4648 { padding: false }, secret)
            .ok_or_else(|| MfaError::validation("TOTP secret is not valid base32"))?;

        let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, &secret_bytes);
        let signature = hmac::sign(&key, &window.to_be_bytes());
        let digest = signature.as_ref();

        let offset = (digest[digest.len() - 1] & 0xf) as usize;
        let binary = ((digest[offset] as u32 & 0x7f) << 24)
            | ((digest[offset + 1] as u32) << 16)
            | ((digest[offset + 2] as u32) << 8)
            | (digest[offset + 3] as u32);

        let code = binary % 10u32.pow(digits);
        Ok(format!("{code:0width$}", width = digits as usize))
    }

    async fn load_record(&self, uid: &str) -> Result<Option<TotpSecretRecord>> {
        match self.storage.get(&Self::secret_key(uid)).await {
            Ok(Some(data)) => match serde_json::from_slice(&data) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    warn!("Corrupt TOTP record for user '{}': {}", uid, e);
                    Ok(None)
                }
            },
            Ok(None) => Ok(None),
            Err(e) => {
                warn!("Failed to read TOTP record for user '{}': {}", uid, e);
                Ok(None)
            }
        }
    }

    async fn store_record(&self, uid: &str, record: &TotpSecretRecord) -> Result<()> {
        let data = serde_json::to_vec(record)?;
        self.storage.set(&Self::secret_key(uid), &data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6238 test secret: ASCII "12345678901234567890" in base32.
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    fn manager() -> TotpManager {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(crate::storage::MemoryStorage::new());
        TotpManager::new(
            storage.clone(),
            StatusStore::new(storage),
            Arc::new(MfaConfig::default()),
        )
    }

    #[test]
    fn test_rfc6238_vector() {
        // At T=59s the reference 8-digit code is 94287082; the 6-digit
        // truncation is its low six digits.
        let code = manager().generate_code_at(RFC_SECRET, 59).unwrap();
        assert_eq!(code, "287082");
    }

    #[test]
    fn test_skew_window() {
        let manager = manager();
        let now = 1_700_000_015;

        let current = manager.generate_code_at(RFC_SECRET, now).unwrap();
        let previous = manager.generate_code_at(RFC_SECRET, now - 30).unwrap();
        let next = manager.generate_code_at(RFC_SECRET, now + 30).unwrap();
        let stale = manager.generate_code_at(RFC_SECRET, now - 90).unwrap();

        assert!(manager.check_code(RFC_SECRET, &current, now).unwrap());
        assert!(manager.check_code(RFC_SECRET, &previous, now).unwrap());
        assert!(manager.check_code(RFC_SECRET, &next, now).unwrap());
        assert!(!manager.check_code(RFC_SECRET, &stale, now).unwrap());
    }

    #[test]
    fn test_malformed_codes_rejected() {
        let manager = manager();
        let now = 1_700_000_015;

        assert!(!manager.check_code(RFC_SECRET, "12345", now).unwrap());
        assert!(!manager.check_code(RFC_SECRET, "1234567", now).unwrap());
        assert!(!manager.check_code(RFC_SECRET, "12a456", now).unwrap());
        assert!(!manager.check_code(RFC_SECRET, "", now).unwrap());
    }

    #[test]
    fn test_bad_secret_is_an_error() {
        let manager = manager();
        assert!(manager.generate_code_at("not base32!!", 59).is_err());
    }
}
