//! HTTPS/JSON transactional mail provider
//!
//! A concrete [`Provider`] over a generic HTTPS/JSON transactional mail API,
//! grounded on the Brevo adapter in `internal/adapters/providers/brevo` of
//! the original implementation: a sender/to/cc/bcc contact list, subject,
//! HTML/text bodies, an `api-key` auth header, and a status-code-to-message
//! mapping that feeds the same substrings [`crate::dispatch`] classifies on.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::model::{Address, NeutralMessage};

/// Static configuration for one [`HttpProvider`] instance, sourced from the
/// `<PROVIDER>_API_KEY` / `_BASE_URL` / `_TIMEOUT` environment variables.
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub name: String,
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

/// Reference implementation of [`Provider`] against a Brevo-shaped
/// transactional mail API.
pub struct HttpProvider {
    config: HttpProviderConfig,
    client: Client,
}

impl HttpProvider {
    pub fn new(config: HttpProviderConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn build_request(&self, msg: &NeutralMessage) -> SendRequest {
        SendRequest {
            sender: msg.headers.from.as_ref().map(Contact::from),
            to: msg.headers.to.iter().map(Contact::from).collect(),
            cc: msg.headers.cc.iter().map(Contact::from).collect(),
            bcc: msg.headers.bcc.iter().map(Contact::from).collect(),
            subject: msg.headers.subject.clone(),
            html_content: non_empty(&msg.html_body),
            text_content: non_empty(&msg.text_body),
            attachment: msg
                .attachments
                .iter()
                .map(|a| AttachmentPayload {
                    name: a.filename.clone(),
                    content: base64::Engine::encode(
                        &base64::engine::general_purpose::STANDARD,
                        &a.content,
                    ),
                    content_type: non_empty(&a.content_type),
                })
                .collect(),
        }
    }

    fn map_error(status: reqwest::StatusCode, body: &ErrorResponse) -> String {
        let message = if body.message.is_empty() {
            "unknown error".to_owned()
        } else {
            body.message.clone()
        };

        match status.as_u16() {
            400 if message.to_lowercase().contains("invalid email") => {
                format!("invalid email address: {message}")
            }
            400 => format!("bad request: {message}"),
            401 => format!("authentication failed: {message}"),
            402 => format!("insufficient credits: {message}"),
            403 => format!("forbidden: {message}"),
            429 => format!("rate limit exceeded: {message}"),
            500..=599 => format!("service unavailable: {message}"),
            other => format!("API error {other}: {message}"),
        }
    }
}

#[async_trait]
impl super::Provider for HttpProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn send(&self, msg: &NeutralMessage) -> AppResult<()> {
        let request = self.build_request(msg);
        let url = format!("{}/smtp/email", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .header("api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let error_body = response
            .json::<ErrorResponse>()
            .await
            .unwrap_or_else(|_| ErrorResponse { message: String::new(), code: None });

        Err(AppError::Upstream(Self::map_error(status, &error_body)))
    }

    async fn health(&self) -> AppResult<()> {
        let url = format!("{}/account", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .header("api-key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("health check request failed: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::Upstream(format!(
                "health check failed: HTTP {}",
                response.status()
            )))
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_owned())
    }
}

#[derive(Debug, Serialize)]
struct Contact {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl From<&Address> for Contact {
    fn from(addr: &Address) -> Self {
        Self {
            email: addr.email.clone(),
            name: non_empty(&addr.display_name),
        }
    }
}

#[derive(Debug, Serialize)]
struct AttachmentPayload {
    name: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none", rename = "contentType")]
    content_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    sender: Option<Contact>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    to: Vec<Contact>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cc: Vec<Contact>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    bcc: Vec<Contact>,
    subject: String,
    #[serde(skip_serializing_if = "Option::is_none", rename = "htmlContent")]
    html_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "textContent")]
    text_content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachment: Vec<AttachmentPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct ErrorResponse {
    #[serde(default)]
    message: String,
    #[serde(default)]
    #[allow(dead_code)]
    code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_error_flags_invalid_email_substring_on_400() {
        let body = ErrorResponse { message: "Invalid email address supplied".to_owned(), code: None };
        let msg = HttpProvider::map_error(reqwest::StatusCode::BAD_REQUEST, &body);
        assert!(msg.to_lowercase().contains("invalid email"));
    }

    #[test]
    fn map_error_rate_limit_on_429() {
        let body = ErrorResponse { message: "too many requests".to_owned(), code: None };
        let msg = HttpProvider::map_error(reqwest::StatusCode::TOO_MANY_REQUESTS, &body);
        assert!(msg.to_lowercase().contains("rate limit"));
    }

    #[test]
    fn map_error_service_unavailable_on_5xx() {
        let body = ErrorResponse { message: "down for maintenance".to_owned(), code: None };
        let msg = HttpProvider::map_error(reqwest::StatusCode::SERVICE_UNAVAILABLE, &body);
        assert!(msg.to_lowercase().contains("service unavailable"));
    }

    #[test]
    fn build_request_omits_empty_bodies_and_recipients() {
        let provider = HttpProvider::new(HttpProviderConfig {
            name: "brevo".to_owned(),
            api_key: "key".to_owned(),
            base_url: "https://api.brevo.com/v3".to_owned(),
            timeout: Duration::from_secs(30),
        })
        .unwrap();

        let mut msg = NeutralMessage::default();
        msg.headers.from = Some(Address::new("a@example.com"));
        msg.headers.subject = "hi".to_owned();

        let request = provider.build_request(&msg);
        assert!(request.to.is_empty());
        assert!(request.html_content.is_none());
        assert!(request.text_content.is_none());
        assert_eq!(request.sender.unwrap().email, "a@example.com");
    }
}
