//! Backup code generation, consumption, and regeneration.

use crate::config::MfaConfig;
use crate::errors::{MfaError, Result};
use crate::mfa::status::StatusStore;
use crate::mfa::{Method, VerifyOutcome, VerifyResultKind};
use crate::storage::KeyValueStorage;
use crate::utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupCodeEntry {
    code: String,
    used: bool,
    used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BackupCodeSetRecord {
    codes: Vec<BackupCodeEntry>,
    enabled: bool,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
    enabled_at: Option<DateTime<Utc>>,
}

/// A freshly generated code set, shown to the user exactly once.
#[derive(Debug, Clone)]
pub struct BackupCodesIssued {
    pub codes: Vec<String>,
}

/// Listing entry for an issued code.
#[derive(Debug, Clone, Serialize)]
pub struct BackupCodeInfo {
    pub code: String,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

/// Backup codes manager.
pub struct BackupCodesManager {
    storage: Arc<dyn KeyValueStorage>,
    status: StatusStore,
    config: Arc<MfaConfig>,
}

impl BackupCodesManager {
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

    fn set_key(uid: &str) -> String {
        format!("mfa:backup:{uid}")
    }

    /// Generate the initial code set and mark the method pending.
    ///
    /// Rejects when an enabled set already exists; use `regenerate` to
    /// rotate codes on an enabled account.
    pub async fn setup(&self, uid: &str) -> Result<BackupCodesIssued> {
        debug!("Setting up backup codes for user '{}'", uid);

        if let Some(record) = self.load_record(uid).await? {
            if record.enabled {
                return Err(MfaError::already_enabled("Backup codes are already enabled"));
            }
        }

        let issued = self.write_fresh_set(uid, false).await?;
        self.status
            .transition(uid, |s| s.mark_pending(Method::BackupCode))
            .await?;

        info!(
            "Generated {} backup codes for user '{}'",
            issued.codes.len(),
            uid
        );
        Ok(issued)
    }

    /// Consume a backup code.
    ///
    /// Input is normalized (whitespace stripped, uppercased). The first
    /// unused match is marked used and the whole set is written back in
    /// one replace.
    pub async fn verify(&self, uid: &str, code: &str) -> Result<VerifyOutcome> {
        debug!("Verifying backup code for user '{}'", uid);

        let normalized: String = code
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();

        let mut record = match self.load_record(uid).await? {
            Some(record) => record,
            None => {
                return Ok(VerifyOutcome::failure(
                    VerifyResultKind::NotSetUp,
                    "Backup codes are not set up",
                ));
            }
        };

        let matched = record
            .codes
            .iter_mut()
            .find(|entry| !entry.used && utils::crypto::constant_time_eq(&entry.code, &normalized));

        let entry = match matched {
            Some(entry) => entry,
            None => {
                info!("Backup code verification failed for user '{}'", uid);
                return Ok(VerifyOutcome::failure(
                    VerifyResultKind::InvalidCode,
                    "Invalid backup code",
                ));
            }
        };

        let now = Utc::now();
        entry.used = true;
        entry.used_at = Some(now);
        record.last_used_at = Some(now);

        let remaining = record.codes.iter().filter(|e| !e.used).count() as u32;
        self.store_record(uid, &record).await?;

        info!(
            "Backup code consumed for user '{}' ({} remaining)",
            uid, remaining
        );
        Ok(VerifyOutcome::ok_with_remaining(
            format!("Backup code accepted, {remaining} remaining"),
            remaining,
        ))
    }

    /// Enable the method once a set exists.
    pub async fn enable(&self, uid: &str) -> Result<()> {
        let mut record = self
            .load_record(uid)
            .await?
            .ok_or_else(|| MfaError::not_set_up("Backup codes are not set up"))?;

        if record.enabled {
            return Err(MfaError::already_enabled("Backup codes are already enabled"));
        }

        record.enabled = true;
        record.enabled_at = Some(Utc::now());
        self.store_record(uid, &record).await?;

        self.status
            .transition(uid, |s| s.mark_enabled(Method::BackupCode))
            .await?;

        info!("Backup codes enabled for user '{}'", uid);
        Ok(())
    }

    /// Replace the set unconditionally, invalidating every prior code.
    ///
    /// When the method was already enabled the new set is enabled too, so
    /// rotation never drops the user out of MFA.
    pub async fn regenerate(&self, uid: &str) -> Result<BackupCodesIssued> {
        debug!("Regenerating backup codes for user '{}'", uid);

        let was_enabled = self
            .load_record(uid)
            .await?
            .map(|r| r.enabled)
            .unwrap_or(false);

        let issued = self.write_fresh_set(uid, was_enabled).await?;

        if was_enabled {
            self.status
                .transition(uid, |s| s.mark_enabled(Method::BackupCode))
                .await?;
        } else {
            self.status
                .transition(uid, |s| s.mark_pending(Method::BackupCode))
                .await?;
        }

        info!("Backup codes regenerated for user '{}'", uid);
        Ok(issued)
    }

    /// Remove the set and the method.
    pub async fn disable(&self, uid: &str) -> Result<()> {
        self.storage.delete(&Self::set_key(uid)).await?;
        self.status
            .transition(uid, |s| s.remove_method(Method::BackupCode))
            .await?;

        info!("Backup codes disabled for user '{}'", uid);
        Ok(())
    }

    /// Count of unused codes. Read failures count as zero.
    pub async fn remaining_count(&self, uid: &str) -> u32 {
        match self.load_record(uid).await {
            Ok(Some(record)) => record.codes.iter().filter(|e| !e.used).count() as u32,
            _ => 0,
        }
    }

    /// List issued codes, filtering out consumed ones unless asked.
    pub async fn list(&self, uid: &str, include_used: bool) -> Result<Vec<BackupCodeInfo>> {
        let record = self
            .load_record(uid)
            .await?
            .ok_or_else(|| MfaError::not_set_up("Backup codes are not set up"))?;

        Ok(record
            .codes
            .into_iter()
            .filter(|e| include_used || !e.used)
            .map(|e| BackupCodeInfo {
                code: e.code,
                used: e.used,
                used_at: e.used_at,
            })
            .collect())
    }

    async fn write_fresh_set(&self, uid: &str, enabled: bool) -> Result<BackupCodesIssued> {
        let mut codes = HashSet::new();
        while codes.len() < self.config.backup_code_count {
            codes.insert(utils::code::generate_alphanumeric(
                self.config.backup_code_length,
            ));
        }
        let codes: Vec<String> = codes.into_iter().collect();

        let now = Utc::now();
        let record = BackupCodeSetRecord {
            codes: codes
                .iter()
                .map(|code| BackupCodeEntry {
                    code: code.clone(),
                    used: false,
                    used_at: None,
                })
                .collect(),
            enabled,
            created_at: now,
            last_used_at: None,
            enabled_at: enabled.then_some(now),
        };
        self.store_record(uid, &record).await?;

        Ok(BackupCodesIssued { codes })
    }

    async fn load_record(&self, uid: &str) -> Result<Option<BackupCodeSetRecord>> {
        match self.storage.get(&Self::set_key(uid)).await {
            Ok(Some(data)) => match serde_json::from_slice(&data) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    warn!("Corrupt backup code set for user '{}': {}", uid, e);
                    Ok(None)
                }
            },
            Ok(None) => Ok(None),
            Err(e) => {
                warn!("Failed to read backup codes for user '{}': {}", uid, e);
                Ok(None)
            }
        }
    }

    async fn store_record(&self, uid: &str, record: &BackupCodeSetRecord) -> Result<()> {
        let data = serde_json::to_vec(record)?;
        self.storage.set(&Self::set_key(uid), &data).await
    }
}
