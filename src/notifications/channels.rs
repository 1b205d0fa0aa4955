//! Outbound email and SMS transports.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument};

use super::NotificationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait EmailChannel: Send + Sync {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), NotificationError>;
}

#[async_trait]
pub trait SmsChannel: Send + Sync {
    /// Sends `body` to an E.164 number and returns the provider message id.
    async fn send_sms(&self, to: &str, body: &str) -> Result<String, NotificationError>;
}

/// Prefixes `country_code` to numbers that lack a leading `+`, dropping `-() ` first.
pub fn normalize_phone(raw: &str, country_code: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('+') {
        return trimmed.to_string();
    }
    let digits: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '-' | '(' | ')' | ' '))
        .collect();
    format!("{country_code}{digits}")
}

fn http_client() -> Result<reqwest::Client, NotificationError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|e| NotificationError::Delivery(format!("failed to build HTTP client: {e}")))
}

/// SendGrid-style JSON mail API.
pub struct HttpEmailChannel {
    client: reqwest::Client,
    url: String,
    api_key: String,
    from_address: String,
}

impl HttpEmailChannel {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        from_address: impl Into<String>,
    ) -> Result<Self, NotificationError> {
        Ok(Self {
            client: http_client()?,
            url: url.into(),
            api_key: api_key.into(),
            from_address: from_address.into(),
        })
    }
}

#[async_trait]
impl EmailChannel for HttpEmailChannel {
    #[instrument(skip(self, message), fields(to = %message.to))]
    async fn send_email(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        let payload = json!({
            "personalizations": [{ "to": [{ "email": message.to }] }],
            "from": { "email": self.from_address },
            "subject": message.subject,
            "content": [
                { "type": "text/plain", "value": message.text },
                { "type": "text/html", "value": message.html },
            ],
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Delivery(format!(
                "email provider returned {status}: {body}"
            )));
        }

        info!(subject = %message.subject, "email sent");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SmsResponse {
    sid: String,
}

/// Twilio-style messages API.
pub struct TwilioSmsChannel {
    client: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioSmsChannel {
    pub fn new(
        api_base: impl Into<String>,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
    ) -> Result<Self, NotificationError> {
        Ok(Self {
            client: http_client()?,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: from_number.into(),
        })
    }
}

#[async_trait]
impl SmsChannel for TwilioSmsChannel {
    #[instrument(skip(self, body))]
    async fn send_sms(&self, to: &str, body: &str) -> Result<String, NotificationError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        );
        let response = self
            .client
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(NotificationError::Delivery(format!(
                "sms provider returned {status}: {text}"
            )));
        }

        let parsed: SmsResponse = response
            .json()
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;
        info!(sid = %parsed.sid, "sms sent");
        Ok(parsed.sid)
    }
}

/// Stand-in for a channel with no credentials. Every send fails, so no flag is set.
pub struct DisabledChannel {
    name: &'static str,
}

impl DisabledChannel {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl EmailChannel for DisabledChannel {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        debug!(channel = self.name, subject = %message.subject, "channel disabled, email skipped");
        Err(NotificationError::NotConfigured(self.name))
    }
}

#[async_trait]
impl SmsChannel for DisabledChannel {
    async fn send_sms(&self, _to: &str, _body: &str) -> Result<String, NotificationError> {
        debug!(channel = self.name, "channel disabled, sms skipped");
        Err(NotificationError::NotConfigured(self.name))
    }
}
