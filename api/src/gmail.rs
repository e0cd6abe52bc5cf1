use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use signaldesk_core::dispatch::{AccessToken, MailDrafter, MailError};

const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_DRAFTS_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/drafts";

/// Gmail drafts client. Exchanges a long-lived refresh token for a bearer
/// token once per dispatch run, then posts one draft per record.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub token_url: String,
    pub drafts_url: String,
    pub timeout_secs: u64,
}

impl GmailConfig {
    pub fn from_env() -> Result<Self, String> {
        let required = |name: &str| -> Result<String, String> {
            std::env::var(name).map_err(|_| format!("{name} must be set"))
        };
        Ok(Self {
            client_id: required("GOOGLE_CLIENT_ID")?,
            client_secret: required("GOOGLE_CLIENT_SECRET")?,
            refresh_token: required("GOOGLE_REFRESH_TOKEN")?,
            token_url: std::env::var("SIGNALDESK_GMAIL_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_TOKEN_URL.to_string()),
            drafts_url: std::env::var("SIGNALDESK_GMAIL_DRAFTS_URL")
                .unwrap_or_else(|_| DEFAULT_DRAFTS_URL.to_string()),
            timeout_secs: 30,
        })
    }
}

pub struct GmailDrafter {
    client: reqwest::Client,
    config: GmailConfig,
}

impl GmailDrafter {
    pub fn new(config: GmailConfig) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| format!("failed to build http client: {e}"))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, String> {
        Self::new(GmailConfig::from_env()?)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[async_trait]
impl MailDrafter for GmailDrafter {
    async fn acquire_token(&self) -> Result<AccessToken, MailError> {
        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", self.config.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(MailError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| MailError::Transport(format!("invalid token response: {e}")))?;
        match token.access_token {
            Some(secret) if !secret.is_empty() => Ok(AccessToken::new(secret)),
            _ => Err(MailError::MissingAccessToken),
        }
    }

    async fn create_draft(
        &self,
        token: &AccessToken,
        lead_email: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), MailError> {
        let payload = json!({
            "message": { "raw": encode_raw_message(lead_email, subject, body) }
        });

        let response = self
            .client
            .post(&self.config.drafts_url)
            .bearer_auth(token.secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// RFC 822 message, base64url-encoded the way the Gmail drafts API expects.
fn encode_raw_message(to: &str, subject: &str, body: &str) -> String {
    let message = format!(
        "To: {to}\r\nSubject: {subject}\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{body}"
    );
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(message.as_bytes())
}
