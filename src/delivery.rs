//! SMS delivery channels.
//!
//! The MFA core treats delivery as unreliable: a channel may fail
//! transiently, and callers roll back any challenge state they created
//! for a send that did not go out.

use crate::errors::{MfaError, Result};
use crate::utils::string::mask_code;
use async_trait::async_trait;
use base64::Engine;
use tracing::{debug, info};

/// Receipt returned by a channel after a successful send.
#[derive(Debug, Clone)]
pub struct SmsDelivery {
    /// Provider-assigned message identifier, when available.
    pub message_id: Option<String>,
}

/// Outbound SMS transport.
#[async_trait]
pub trait SmsChannel: Send + Sync {
    /// Deliver a one-time code to a phone number.
    async fn send(&self, phone: &str, code: &str) -> Result<SmsDelivery>;
}

fn format_message(code: &str) -> String {
    format!(
        "Your verification code is: {code}. This code expires in 5 minutes. Do not share this code with anyone."
    )
}

/// Development channel: logs instead of sending.
#[derive(Debug, Default)]
pub struct DevelopmentSmsChannel;

#[async_trait]
impl SmsChannel for DevelopmentSmsChannel {
    async fn send(&self, phone: &str, code: &str) -> Result<SmsDelivery> {
        info!(
            "[DEVELOPMENT] SMS to {}: code {}",
            phone,
            mask_code(code)
        );

        Ok(SmsDelivery {
            message_id: Some(uuid::Uuid::new_v4().to_string()),
        })
    }
}

/// Twilio-backed channel.
pub struct TwilioSmsChannel {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_phone: String,
    endpoint: Option<String>,
}

impl TwilioSmsChannel {
    /// Create a new Twilio channel.
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_phone: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_phone: from_phone.into(),
            endpoint: None,
        }
    }

    /// Override the API endpoint (for proxies or testing).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

#[async_trait]
impl SmsChannel for TwilioSmsChannel {
    async fn send(&self, phone: &str, code: &str) -> Result<SmsDelivery> {
        let default_endpoint = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let endpoint = self.endpoint.as_deref().unwrap_or(&default_endpoint);

        let auth_header = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", self.account_sid, self.auth_token))
        );

        let message = format_message(code);
        let form_data = [
            ("From", self.from_phone.as_str()),
            ("To", phone),
            ("Body", message.as_str()),
        ];

        let response = self
            .client
            .post(endpoint)
            .header("Authorization", auth_header)
            .form(&form_data)
            .send()
            .await
            .map_err(|e| MfaError::delivery(format!("Twilio request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MfaError::delivery(format!(
                "Twilio API error: {status} - {error_text}"
            )));
        }

        let message_id = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| body.get("sid").and_then(|v| v.as_str()).map(String::from));

        debug!("Twilio SMS sent to {}", phone);
        Ok(SmsDelivery { message_id })
    }
}
