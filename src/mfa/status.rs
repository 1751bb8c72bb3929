//! Per-user MFA enrollment state.

use crate::errors::Result;
use crate::mfa::Method;
use crate::storage::KeyValueStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Overall MFA state for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MfaState {
    Disabled,
    Pending,
    Enabled,
}

/// Enrollment record for a user.
///
/// `status` is derived: `Enabled` exactly when `enabled_methods` is
/// non-empty, `Pending` when only pending enrollments exist, `Disabled`
/// otherwise. A method appears in at most one of the two lists. The
/// record is created lazily on first enrollment and never hard-deleted;
/// absence reads as disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfaStatus {
    pub status: MfaState,
    pub enabled_methods: Vec<Method>,
    pub pending_methods: Vec<Method>,
    pub last_updated: DateTime<Utc>,
}

impl Default for MfaStatus {
    fn default() -> Self {
        Self {
            status: MfaState::Disabled,
            enabled_methods: Vec::new(),
            pending_methods: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

impl MfaStatus {
    /// Move a method into the pending set.
    pub fn mark_pending(&mut self, method: Method) {
        self.enabled_methods.retain(|m| *m != method);
        if !self.pending_methods.contains(&method) {
            self.pending_methods.push(method);
        }
        self.recompute();
    }

    /// Move a method into the enabled set.
    pub fn mark_enabled(&mut self, method: Method) {
        self.pending_methods.retain(|m| *m != method);
        if !self.enabled_methods.contains(&method) {
            self.enabled_methods.push(method);
        }
        self.recompute();
    }

    /// Remove a method from both sets.
    pub fn remove_method(&mut self, method: Method) {
        self.enabled_methods.retain(|m| *m != method);
        self.pending_methods.retain(|m| *m != method);
        self.recompute();
    }

    /// Whether the method is currently enabled.
    pub fn is_enabled(&self, method: Method) -> bool {
        self.enabled_methods.contains(&method)
    }

    fn recompute(&mut self) {
        self.status = if !self.enabled_methods.is_empty() {
            MfaState::Enabled
        } else if !self.pending_methods.is_empty() {
            MfaState::Pending
        } else {
            MfaState::Disabled
        };
        self.last_updated = Utc::now();
    }
}

/// Storage wrapper for the per-user status record.
#[derive(Clone)]
pub(crate) struct StatusStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl StatusStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    fn key(uid: &str) -> String {
        format!("mfa:status:{uid}")
    }

    /// Load the record, treating read failures and absence as disabled.
    pub async fn load_or_default(&self, uid: &str) -> MfaStatus {
        match self.storage.get(&Self::key(uid)).await {
            Ok(Some(data)) => serde_json::from_slice(&data).unwrap_or_else(|e| {
                warn!("Corrupt MFA status record for user '{}': {}", uid, e);
                MfaStatus::default()
            }),
            Ok(None) => MfaStatus::default(),
            Err(e) => {
                warn!("Failed to read MFA status for user '{}': {}", uid, e);
                MfaStatus::default()
            }
        }
    }

    /// Load the record for mutation. Unlike reads on the query path, a
    /// store failure here propagates so a transition never clobbers state
    /// it could not see.
    async fn load_for_update(&self, uid: &str) -> Result<MfaStatus> {
        match self.storage.get(&Self::key(uid)).await? {
            Some(data) => Ok(serde_json::from_slice(&data)?),
            None => Ok(MfaStatus::default()),
        }
    }

    /// Apply a state transition and persist the result.
    pub async fn transition<F>(&self, uid: &str, apply: F) -> Result<MfaStatus>
    where
        F: FnOnce(&mut MfaStatus),
    {
        let mut status = self.load_for_update(uid).await?;
        apply(&mut status);
        let data = serde_json::to_vec(&status)?;
        self.storage.set(&Self::key(uid), &data).await?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_tracks_enabled_methods() {
        let mut status = MfaStatus::default();
        assert_eq!(status.status, MfaState::Disabled);

        status.mark_pending(Method::Totp);
        assert_eq!(status.status, MfaState::Pending);

        status.mark_enabled(Method::Totp);
        assert_eq!(status.status, MfaState::Enabled);
        assert!(status.pending_methods.is_empty());

        status.remove_method(Method::Totp);
        assert_eq!(status.status, MfaState::Disabled);
    }

    #[test]
    fn test_method_in_at_most_one_set() {
        let mut status = MfaStatus::default();

        status.mark_pending(Method::Sms);
        status.mark_enabled(Method::Sms);
        assert!(status.enabled_methods.contains(&Method::Sms));
        assert!(!status.pending_methods.contains(&Method::Sms));

        // Re-enrolling an enabled method moves it back to pending.
        status.mark_pending(Method::Sms);
        assert!(!status.enabled_methods.contains(&Method::Sms));
        assert!(status.pending_methods.contains(&Method::Sms));
    }

    #[test]
    fn test_enabled_iff_nonempty() {
        let mut status = MfaStatus::default();

        status.mark_enabled(Method::Totp);
        status.mark_enabled(Method::BackupCode);
        status.remove_method(Method::Totp);
        assert_eq!(status.status, MfaState::Enabled);

        status.remove_method(Method::BackupCode);
        assert_eq!(status.status, MfaState::Disabled);
    }
}
