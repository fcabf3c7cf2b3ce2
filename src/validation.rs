//! License validation engine.
//!
//! One call handles one attempt: signature check, lookup, policy, counter
//! update, audit append. The engine keeps no state between calls; everything
//! lives in the License Store and the Audit Log.
//!
//! Transaction boundaries:
//! - lookup + `validation_count` increment + optional `last_validated_at`
//!   touch commit together in one IMMEDIATE transaction;
//! - the audit append is a separate write to the Audit Log database.
//!
//! A crash between the two leaves a counted attempt without a record (or the
//! reverse); reporting tolerates that.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::TransactionBehavior;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::codec::KeyCodec;
use crate::db::{DbPool, queries};
use crate::error::{AppError, Result};
use crate::models::{License, LicenseStatus, NewValidationRecord};

/// Longest presented key stored in the audit trail. Well-formed keys are
/// far shorter; this only bounds garbage input.
pub const AUDIT_KEY_MAX_CHARS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationOutcome {
    Valid,
    /// Malformed key or signature mismatch; the two are indistinguishable
    InvalidSignature,
    NotFound,
    Suspended,
    Cancelled,
    Expired,
    StorageFailure,
}

impl ValidationOutcome {
    pub fn is_valid(self) -> bool {
        self == ValidationOutcome::Valid
    }

    /// Caller-facing reason for a definite rejection.
    pub fn status_reason(self) -> Option<&'static str> {
        match self {
            ValidationOutcome::Valid | ValidationOutcome::StorageFailure => None,
            ValidationOutcome::InvalidSignature => Some("invalid_signature"),
            ValidationOutcome::NotFound => Some("not_found"),
            ValidationOutcome::Suspended => Some("suspended"),
            ValidationOutcome::Cancelled => Some("cancelled"),
            ValidationOutcome::Expired => Some("expired"),
        }
    }

    /// Audit trail message; None exactly for `Valid`.
    pub fn error_message(self) -> Option<&'static str> {
        match self {
            ValidationOutcome::Valid => None,
            ValidationOutcome::InvalidSignature => Some("Invalid signature"),
            ValidationOutcome::NotFound => Some("License not found"),
            ValidationOutcome::Suspended => Some("License suspended"),
            ValidationOutcome::Cancelled => Some("License cancelled"),
            ValidationOutcome::Expired => Some("License expired"),
            ValidationOutcome::StorageFailure => Some("Storage failure"),
        }
    }
}

/// A presented license plus caller context.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationRequest {
    pub license_key: String,
    pub signature: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl ValidationRequest {
    pub fn new(license_key: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            license_key: license_key.into(),
            signature: signature.into(),
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ValidationVerdict {
    pub outcome: ValidationOutcome,
    /// Post-update license row, only for `Valid`
    pub license: Option<License>,
    /// Whether the audit record was written
    pub recorded: bool,
}

/// Fixed-priority policy: CANCELLED, then SUSPENDED, then expiry.
pub fn evaluate_policy(license: &License, now: i64) -> ValidationOutcome {
    match license.status {
        LicenseStatus::Cancelled => ValidationOutcome::Cancelled,
        LicenseStatus::Suspended => ValidationOutcome::Suspended,
        LicenseStatus::Active if license.is_expired_at(now) => ValidationOutcome::Expired,
        LicenseStatus::Active => ValidationOutcome::Valid,
    }
}

#[derive(Clone)]
pub struct ValidationEngine {
    db: DbPool,
    audit: DbPool,
    codec: Arc<KeyCodec>,
}

impl ValidationEngine {
    pub fn new(db: DbPool, audit: DbPool, codec: Arc<KeyCodec>) -> Self {
        Self { db, audit, codec }
    }

    pub fn validate(&self, request: &ValidationRequest) -> ValidationVerdict {
        self.validate_at(request, Utc::now().timestamp())
    }

    /// Run one attempt as of `now` (Unix seconds).
    pub fn validate_at(&self, request: &ValidationRequest, now: i64) -> ValidationVerdict {
        let key = request.license_key.as_str();

        let (outcome, license) = if !self.signature_matches(request) {
            (ValidationOutcome::InvalidSignature, None)
        } else {
            match self.count_attempt(key, now) {
                Ok(Some((license, outcome))) => {
                    let license = outcome.is_valid().then_some(license);
                    (outcome, license)
                }
                Ok(None) => (ValidationOutcome::NotFound, None),
                Err(e) => {
                    tracing::error!(
                        license_key = %key,
                        error = %e,
                        "Storage failure while validating license"
                    );
                    (ValidationOutcome::StorageFailure, None)
                }
            }
        };

        let recorded = self.record(request, outcome, now);

        // A lost audit write is a storage failure, not a verdict on the license
        let (outcome, license) = if recorded || outcome == ValidationOutcome::StorageFailure {
            (outcome, license)
        } else {
            (ValidationOutcome::StorageFailure, None)
        };

        match outcome {
            ValidationOutcome::Valid => {
                tracing::debug!(license_key = %key, "License validated")
            }
            ValidationOutcome::StorageFailure => {}
            other => tracing::info!(
                license_key = %truncate_key(key),
                outcome = %other,
                ip = ?request.ip_address,
                "License validation rejected"
            ),
        }

        ValidationVerdict {
            outcome,
            license,
            recorded,
        }
    }

    /// Signature check. A malformed key and a wrong signature look the same
    /// to the caller.
    fn signature_matches(&self, request: &ValidationRequest) -> bool {
        match self.codec.verify(&request.license_key, &request.signature) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::debug!(error = %e, "Rejected malformed license key");
                false
            }
        }
    }

    /// Lookup and counter update in one transaction. Returns None when no license
    /// row exists, in which case nothing is counted.
    fn count_attempt(&self, license_key: &str, now: i64) -> Result<Option<(License, ValidationOutcome)>> {
        let mut conn = self.db.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(license) = queries::get_license_by_key(&tx, license_key)? else {
            return Ok(None);
        };

        let outcome = evaluate_policy(&license, now);

        if !queries::increment_validation_count(&tx, license_key)? {
            return Err(AppError::Storage("license row vanished during validation".into()));
        }
        if outcome.is_valid() {
            queries::touch_last_validated(&tx, license_key, now)?;
        }
        tx.commit()?;

        let last_validated_at = if outcome.is_valid() {
            Some(now)
        } else {
            license.last_validated_at
        };

        Ok(Some((
            License {
                validation_count: license.validation_count + 1,
                last_validated_at,
                ..license
            },
            outcome,
        )))
    }

    /// Audit append. Failures are escalated to the operational log.
    fn record(&self, request: &ValidationRequest, outcome: ValidationOutcome, now: i64) -> bool {
        let key = truncate_key(&request.license_key);
        let record = match outcome.error_message() {
            None => NewValidationRecord::success(&key, now),
            Some(message) => NewValidationRecord::failure(&key, now, message),
        }
        .with_client(request.ip_address.as_deref(), request.user_agent.as_deref());

        let appended = self
            .audit
            .get()
            .map_err(AppError::from)
            .and_then(|conn| queries::append_validation(&conn, &record));

        match appended {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(
                    license_key = %key,
                    outcome = %outcome,
                    error = %e,
                    "Failed to write validation audit record"
                );
                false
            }
        }
    }
}

fn truncate_key(key: &str) -> String {
    key.chars().take(AUDIT_KEY_MAX_CHARS).collect()
}
