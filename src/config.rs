//! Configuration for the MFA service.

use crate::mfa::Method;
use std::time::Duration;

/// Tunable limits and identifiers for the MFA service.
///
/// Defaults match the documented behavior: 6-digit SMS codes with a
/// 5-minute expiry and 3 attempts, a 60-second resend interval, 10 sends
/// per day, 10 backup codes of 8 characters, and attempt windows of one
/// hour (short) and one day (daily).
#[derive(Debug, Clone)]
pub struct MfaConfig {
    /// Issuer name embedded in TOTP enrollment URIs.
    pub issuer: String,

    /// TOTP time step.
    pub totp_step: Duration,

    /// Accepted clock skew, in steps, on either side of the current one.
    pub totp_skew_steps: u64,

    /// TOTP code length in digits.
    pub totp_digits: u32,

    /// SMS code length in digits.
    pub sms_code_length: usize,

    /// Lifetime of an SMS challenge.
    pub sms_challenge_ttl: Duration,

    /// Wrong-code attempts allowed on a single SMS challenge.
    pub sms_max_challenge_attempts: u32,

    /// Minimum interval between resends.
    pub sms_resend_interval: Duration,

    /// SMS sends allowed per user per day.
    pub sms_daily_send_cap: i64,

    /// Number of backup codes in a set.
    pub backup_code_count: usize,

    /// Length of each backup code.
    pub backup_code_length: usize,

    /// TTL of the short attempt window.
    pub short_window_ttl: Duration,

    /// TTL of the daily attempt window.
    pub daily_window_ttl: Duration,

    /// Short-window attempt limits per method.
    pub totp_max_attempts: i64,
    pub sms_max_attempts: i64,
    pub backup_code_max_attempts: i64,

    /// Daily verification caps.
    pub sms_daily_cap: i64,
    pub default_daily_cap: i64,
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self {
            issuer: "mfa-service".to_string(),
            totp_step: Duration::from_secs(30),
            totp_skew_steps: 1,
            totp_digits: 6,
            sms_code_length: 6,
            sms_challenge_ttl: Duration::from_secs(300),
            sms_max_challenge_attempts: 3,
            sms_resend_interval: Duration::from_secs(60),
            sms_daily_send_cap: 10,
            backup_code_count: 10,
            backup_code_length: 8,
            short_window_ttl: Duration::from_secs(3600),
            daily_window_ttl: Duration::from_secs(86400),
            totp_max_attempts: 3,
            sms_max_attempts: 3,
            backup_code_max_attempts: 1,
            sms_daily_cap: 10,
            default_daily_cap: 20,
        }
    }
}

impl MfaConfig {
    /// Create a configuration with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the issuer name used in TOTP enrollment URIs.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Set the SMS challenge lifetime.
    pub fn sms_challenge_ttl(mut self, ttl: Duration) -> Self {
        self.sms_challenge_ttl = ttl;
        self
    }

    /// Set the minimum interval between SMS resends.
    pub fn sms_resend_interval(mut self, interval: Duration) -> Self {
        self.sms_resend_interval = interval;
        self
    }

    /// Set the short attempt window TTL.
    pub fn short_window_ttl(mut self, ttl: Duration) -> Self {
        self.short_window_ttl = ttl;
        self
    }

    /// Short-window attempt limit for a method.
    pub fn short_limit(&self, method: Method) -> i64 {
        match method {
            Method::Totp => self.totp_max_attempts,
            Method::Sms => self.sms_max_attempts,
            Method::BackupCode => self.backup_code_max_attempts,
        }
    }

    /// Daily verification cap for a method.
    pub fn daily_limit(&self, method: Method) -> i64 {
        match method {
            Method::Sms => self.sms_daily_cap,
            _ => self.default_daily_cap,
        }
    }
}
