//! License delivery email via the Resend API.
//!
//! Delivery is best-effort: callers log failures and carry on, since the
//! license already exists and the email can be resent.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Tier;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Format a Unix timestamp as a human-readable date (e.g., "Jan 15, 2024")
fn format_date(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%b %d, %Y").to_string())
        .unwrap_or_else(|| "Unknown date".to_string())
}

/// Result of attempting to send a license email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSendResult {
    /// Email was sent successfully via Resend
    Sent,
    /// No API key configured, nothing sent
    NoApiKey,
}

/// Contents of a license delivery email.
pub struct LicenseEmail<'a> {
    pub to_email: &'a str,
    pub license_key: &'a str,
    pub signature: &'a str,
    pub tier: Tier,
    pub expires_at: Option<i64>,
}

impl LicenseEmail<'_> {
    fn subject(&self) -> String {
        format!("Your Complio {} license key", self.tier.display_name())
    }

    fn validity(&self) -> String {
        match self.expires_at {
            Some(exp) => format!("valid until {}", format_date(exp)),
            None => "does not expire".to_string(),
        }
    }

    fn text(&self) -> String {
        format!(
            "Thank you for subscribing to Complio {tier}.\n\n\
             License key: {key}\n\
             Signature:   {sig}\n\n\
             Your license {validity}.\n\n\
             Activate it with:\n\n    complio activate --license-key {key} --signature {sig}\n\n\
             Keep both values private; anyone holding them can use your license.",
            tier = self.tier.display_name(),
            key = self.license_key,
            sig = self.signature,
            validity = self.validity(),
        )
    }

    fn html(&self) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
<h2 style="color: #333;">Your Complio {tier} license</h2>
<p>Thank you for subscribing to Complio <strong>{tier}</strong>. Your license {validity}.</p>
<div style="background: #f5f5f5; padding: 20px; border-radius: 8px;">
<p style="margin: 0 0 8px 0; color: #666; font-size: 14px;">License key</p>
<code style="font-size: 20px; font-weight: bold; letter-spacing: 1px; color: #333;">{key}</code>
<p style="margin: 16px 0 8px 0; color: #666; font-size: 14px;">Signature</p>
<code style="font-size: 12px; color: #333; word-break: break-all;">{sig}</code>
</div>
<p>Activate it with:</p>
<pre style="background: #2d3748; color: #fff; padding: 15px; border-radius: 6px;">complio activate --license-key {key} --signature {sig}</pre>
<hr style="border: none; border-top: 1px solid #eee; margin: 30px 0;">
<p style="color: #999; font-size: 12px;">Keep both values private; anyone holding them can use your license.</p>
</body>
</html>"#,
            tier = self.tier.display_name(),
            key = self.license_key,
            sig = self.signature,
            validity = self.validity(),
        )
    }
}

/// Resend API request body.
#[derive(Debug, Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: String,
    text: String,
    html: String,
}

/// Resend API response.
#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    #[allow(dead_code)]
    id: String,
}

/// Email service using Resend API.
#[derive(Clone)]
pub struct EmailService {
    api_key: Option<String>,
    from_email: String,
    http_client: Client,
}

impl EmailService {
    pub fn new(api_key: Option<String>, from_email: String) -> Self {
        Self {
            api_key,
            from_email,
            http_client: Client::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn send_license_email(&self, email: LicenseEmail<'_>) -> Result<EmailSendResult> {
        let Some(ref api_key) = self.api_key else {
            tracing::warn!(
                license_key = %email.license_key,
                "No Resend API key configured, license email not sent"
            );
            return Ok(EmailSendResult::NoApiKey);
        };

        let request = ResendEmailRequest {
            from: &self.from_email,
            to: vec![email.to_email],
            subject: email.subject(),
            text: email.text(),
            html: email.html(),
        };

        let response = self
            .http_client
            .post(RESEND_API_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to send request to Resend API");
                AppError::Internal(format!("Email service error: {}", e))
            })?;

        if response.status().is_success() {
            let _result: ResendEmailResponse = response.json().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to parse Resend API response");
                AppError::Internal("Email service response error".into())
            })?;

            tracing::info!(
                license_key = %email.license_key,
                "License email sent via Resend"
            );
            Ok(EmailSendResult::Sent)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Resend API returned error");
            Err(AppError::Internal(format!(
                "Email service error: {} - {}",
                status, body
            )))
        }
    }
}
