//! License issuance, shared by the admin API and the CLI.

use rusqlite::Connection;

use crate::codec::KeyCodec;
use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{CreateLicense, License, Tier};

/// Fresh keys are random, so a collision means astronomically bad luck;
/// retry a couple of times before giving up.
const MAX_ISSUE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct IssueLicense {
    pub email: String,
    pub tier: Tier,
    pub expires_at: Option<i64>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub metadata: serde_json::Value,
}

impl IssueLicense {
    pub fn new(email: impl Into<String>, tier: Tier) -> Self {
        Self {
            email: email.into(),
            tier,
            expires_at: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            metadata: serde_json::json!({}),
        }
    }

    fn validate(&self) -> Result<()> {
        let email = self.email.trim();
        let well_formed = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !well_formed {
            return Err(AppError::BadRequest("A valid email address is required".into()));
        }
        if !self.metadata.is_object() {
            return Err(AppError::BadRequest("metadata must be a JSON object".into()));
        }
        Ok(())
    }
}

/// Generate, sign and store a new license.
pub fn issue_license(conn: &Connection, codec: &KeyCodec, input: &IssueLicense) -> Result<License> {
    input.validate()?;
    let email = input.email.trim().to_string();

    let mut attempt = 0;
    loop {
        attempt += 1;
        let issued = codec.issue(input.tier, &email)?;

        let created = queries::create_license(
            conn,
            &CreateLicense {
                license_key: issued.license_key,
                signature: issued.signature,
                email: email.clone(),
                tier: input.tier,
                expires_at: input.expires_at,
                stripe_customer_id: input.stripe_customer_id.clone(),
                stripe_subscription_id: input.stripe_subscription_id.clone(),
                metadata: input.metadata.clone(),
            },
        );

        match created {
            Ok(license) => {
                tracing::info!(
                    license_key = %license.license_key,
                    tier = %license.tier,
                    expires_at = ?license.expires_at,
                    "License issued"
                );
                return Ok(license);
            }
            Err(AppError::DuplicateKey(key)) if attempt < MAX_ISSUE_ATTEMPTS => {
                tracing::warn!(license_key = %key, attempt, "License key collision, regenerating");
            }
            Err(e) => return Err(e),
        }
    }
}
