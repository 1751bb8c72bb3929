/*!
# MFA Service

Multi-factor authentication core: TOTP, SMS one-time codes, and single-use
backup codes, guarded by per-user attempt-limiting windows. All state lives
in a TTL-capable key-value store consumed through a narrow async trait, so
the service runs anywhere the store does.

## Features

- TOTP enrollment with otpauth URIs, RFC 6238 verification with clock-skew
  tolerance
- SMS challenges with resend throttling, expiry, and bounded retries
- Single-use backup codes with atomic set regeneration
- Short-window and daily attempt counters shared by every method
- In-memory storage for development and tests; Redis behind the
  `redis-storage` feature
- Pluggable SMS delivery (development logger, Twilio)

## Quick Start

```rust,no_run
use mfa_service::{DevelopmentSmsChannel, MemoryStorage, Method, MfaConfig, MfaService};
use std::sync::Arc;

# #[tokio::main]
# async fn main() -> Result<(), Box<dyn std::error::Error>> {
let mfa = MfaService::new(
    Arc::new(MemoryStorage::new()),
    Arc::new(DevelopmentSmsChannel),
    MfaConfig::new().issuer("ExampleApp"),
);

// Enroll TOTP: show the secret and URI to the user once.
let enrollment = mfa.totp.setup("user123", "user@example.com").await?;
println!("scan this: {}", enrollment.otpauth_uri);

// Later, confirm with a code from the authenticator app.
mfa.totp.enable("user123", "123456").await?;

// Verification goes through the unified entry point.
let outcome = mfa.verify("user123", "123456", Method::Totp).await;
if outcome.success {
    println!("verified");
}
# Ok(())
# }
```

## Security Considerations

- Attempt counters fail closed on write: an attempt that cannot be counted
  is rejected rather than allowed to bypass limiting.
- Codes are generated from a CSPRNG and compared in constant time.
- Raw codes and secrets never appear in logs.
*/

pub mod config;
pub mod delivery;
pub mod errors;
pub mod mfa;
pub mod storage;
pub mod utils;

pub use config::MfaConfig;
pub use delivery::{DevelopmentSmsChannel, SmsChannel, SmsDelivery, TwilioSmsChannel};
pub use errors::{MfaError, Result, StorageError};
pub use mfa::{
    AttemptTracker, BackupCodeInfo, BackupCodesIssued, BackupCodesManager, Method, MfaService,
    MfaState, MfaStatus, MfaStatusView, SmsChallengeIssued, SmsManager, TotpEnrollment,
    TotpManager, VerifyOutcome, VerifyResultKind, Window,
};
pub use storage::{KeyValueStorage, MemoryStorage};

#[cfg(feature = "redis-storage")]
pub use storage::RedisStorage;
