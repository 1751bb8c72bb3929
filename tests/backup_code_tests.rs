//! Backup code set lifecycle: generation, consumption, regeneration.

use mfa_service::{
    DevelopmentSmsChannel, MemoryStorage, Method, MfaConfig, MfaError, MfaService, MfaState,
    VerifyResultKind,
};
use std::collections::HashSet;
use std::sync::Arc;

fn service() -> MfaService {
    MfaService::new(
        Arc::new(MemoryStorage::new()),
        Arc::new(DevelopmentSmsChannel),
        MfaConfig::default(),
    )
}

#[tokio::test]
async fn test_setup_generates_ten_unique_codes() {
    let mfa = service();

    let issued = mfa.backup_codes.setup("u1").await.unwrap();
    assert_eq!(issued.codes.len(), 10);

    let unique: HashSet<_> = issued.codes.iter().collect();
    assert_eq!(unique.len(), 10);

    for code in &issued.codes {
        assert_eq!(code.len(), 8);
        assert!(
            code.chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
    }

    let status = mfa.get_status("u1").await;
    assert_eq!(status.status, MfaState::Pending);
    assert_eq!(status.remaining_backup_codes, 10);
}

#[tokio::test]
async fn test_each_code_consumable_exactly_once() {
    let mfa = service();

    let issued = mfa.backup_codes.setup("u1").await.unwrap();
    mfa.backup_codes.enable("u1").await.unwrap();

    let outcome = mfa.verify("u1", &issued.codes[0], Method::BackupCode).await;
    assert!(outcome.success);
    assert_eq!(outcome.remaining, Some(9));

    // The consumed code is rejected on reuse.
    let outcome = mfa.verify("u1", &issued.codes[0], Method::BackupCode).await;
    assert_eq!(outcome.result, VerifyResultKind::InvalidCode);

    // A single failure trips the backup-code short window.
    let outcome = mfa.verify("u1", &issued.codes[1], Method::BackupCode).await;
    assert_eq!(outcome.result, VerifyResultKind::TooManyAttempts);
}

#[tokio::test]
async fn test_sequential_successes_drain_the_set() {
    let mfa = service();

    let issued = mfa.backup_codes.setup("u1").await.unwrap();
    mfa.backup_codes.enable("u1").await.unwrap();

    for (i, code) in issued.codes.iter().enumerate() {
        let outcome = mfa.verify("u1", code, Method::BackupCode).await;
        assert!(outcome.success, "code {i} should redeem");
        assert_eq!(outcome.remaining, Some(9 - i as u32));
    }
    assert_eq!(mfa.get_status("u1").await.remaining_backup_codes, 0);
}

#[tokio::test]
async fn test_input_normalization() {
    let mfa = service();

    let issued = mfa.backup_codes.setup("u1").await.unwrap();
    mfa.backup_codes.enable("u1").await.unwrap();

    let sloppy = format!("  {}  ", issued.codes[0].to_lowercase());
    let outcome = mfa.backup_codes.verify("u1", &sloppy).await.unwrap();
    assert!(outcome.success);
}

#[tokio::test]
async fn test_regeneration_invalidates_prior_codes() {
    let mfa = service();

    let first = mfa.backup_codes.setup("u1").await.unwrap();
    mfa.backup_codes.enable("u1").await.unwrap();

    let second = mfa.backup_codes.regenerate("u1").await.unwrap();
    assert_eq!(second.codes.len(), 10);

    // An unused code from the first generation no longer verifies.
    let outcome = mfa.backup_codes.verify("u1", &first.codes[0]).await.unwrap();
    assert_eq!(outcome.result, VerifyResultKind::InvalidCode);

    // The new generation works, and the method stayed enabled throughout.
    let outcome = mfa
        .backup_codes
        .verify("u1", &second.codes[0])
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(mfa.get_status("u1").await.status, MfaState::Enabled);
}

#[tokio::test]
async fn test_regeneration_before_enable_stays_pending() {
    let mfa = service();

    mfa.backup_codes.setup("u1").await.unwrap();
    mfa.backup_codes.regenerate("u1").await.unwrap();

    let status = mfa.get_status("u1").await;
    assert_eq!(status.status, MfaState::Pending);
    assert_eq!(status.pending_methods, vec![Method::BackupCode]);
}

#[tokio::test]
async fn test_setup_rejected_when_enabled() {
    let mfa = service();

    mfa.backup_codes.setup("u1").await.unwrap();
    mfa.backup_codes.enable("u1").await.unwrap();

    let result = mfa.backup_codes.setup("u1").await;
    assert!(matches!(result, Err(MfaError::AlreadyEnabled { .. })));
}

#[tokio::test]
async fn test_enable_requires_setup() {
    let mfa = service();

    let result = mfa.backup_codes.enable("u1").await;
    assert!(matches!(result, Err(MfaError::NotSetUp { .. })));
}

#[tokio::test]
async fn test_listing_filters_consumed_codes() {
    let mfa = service();

    let issued = mfa.backup_codes.setup("u1").await.unwrap();
    mfa.backup_codes.enable("u1").await.unwrap();
    mfa.backup_codes
        .verify("u1", &issued.codes[0])
        .await
        .unwrap();

    let unused = mfa.backup_codes.list("u1", false).await.unwrap();
    assert_eq!(unused.len(), 9);
    assert!(unused.iter().all(|info| !info.used));

    let all = mfa.backup_codes.list("u1", true).await.unwrap();
    assert_eq!(all.len(), 10);
    let consumed: Vec<_> = all.iter().filter(|info| info.used).collect();
    assert_eq!(consumed.len(), 1);
    assert_eq!(consumed[0].code, issued.codes[0]);
    assert!(consumed[0].used_at.is_some());
}

#[tokio::test]
async fn test_disable_removes_the_set() {
    let mfa = service();

    let issued = mfa.backup_codes.setup("u1").await.unwrap();
    mfa.backup_codes.enable("u1").await.unwrap();

    mfa.disable("u1", Method::BackupCode).await.unwrap();

    let status = mfa.get_status("u1").await;
    assert_eq!(status.status, MfaState::Disabled);
    assert_eq!(status.remaining_backup_codes, 0);

    let outcome = mfa.backup_codes.verify("u1", &issued.codes[0]).await.unwrap();
    assert_eq!(outcome.result, VerifyResultKind::NotSetUp);
}
