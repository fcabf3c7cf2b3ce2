use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::email::{EmailSendResult, LicenseEmail};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::issuance::{self, IssueLicense};
use crate::models::{License, LicenseStatus, ListLicensesQuery, Tier, ValidationRecord};
use crate::util::expires_after_days;

/// Request body for issuing a license (billing collaborator or operator).
#[derive(Debug, Deserialize)]
pub struct IssueLicenseBody {
    pub email: String,
    pub tier: Tier,
    /// Absolute expiry (Unix seconds). Mutually exclusive with `expires_in_days`.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub expires_in_days: Option<i64>,
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
    #[serde(default)]
    pub stripe_subscription_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct IssuedLicense {
    pub license_key: String,
    pub signature: String,
    pub tier: Tier,
    pub expires_at: Option<i64>,
    pub email_sent: bool,
}

/// POST /admin/licenses
pub async fn issue_license(
    State(state): State<AppState>,
    Json(body): Json<IssueLicenseBody>,
) -> Result<Json<IssuedLicense>> {
    if body.expires_at.is_some() && body.expires_in_days.is_some() {
        return Err(AppError::BadRequest(
            "Specify at most one of expires_at and expires_in_days".into(),
        ));
    }
    if body.expires_in_days.is_some_and(|days| days < 1) {
        return Err(AppError::BadRequest("expires_in_days must be positive".into()));
    }

    let expires_at = match body.expires_at {
        Some(at) => Some(at),
        None => expires_after_days(body.expires_in_days, Utc::now().timestamp())?,
    };

    let input = IssueLicense {
        email: body.email,
        tier: body.tier,
        expires_at,
        stripe_customer_id: body.stripe_customer_id,
        stripe_subscription_id: body.stripe_subscription_id,
        metadata: body
            .metadata
            .unwrap_or_else(|| serde_json::json!({ "created_via": "admin_api" })),
    };

    let license = {
        let conn = state.db.get()?;
        issuance::issue_license(&conn, &state.codec, &input)?
    };

    let email_sent = match state
        .email
        .send_license_email(LicenseEmail {
            to_email: &license.email,
            license_key: &license.license_key,
            signature: &license.signature,
            tier: license.tier,
            expires_at: license.expires_at,
        })
        .await
    {
        Ok(result) => result == EmailSendResult::Sent,
        Err(e) => {
            // License already exists; the email can be resent manually
            tracing::warn!(license_key = %license.license_key, error = %e, "Failed to send license email");
            false
        }
    };

    Ok(Json(IssuedLicense {
        license_key: license.license_key,
        signature: license.signature,
        tier: license.tier,
        expires_at: license.expires_at,
        email_sent,
    }))
}

#[derive(Debug, Serialize)]
pub struct LicenseList {
    pub items: Vec<License>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// GET /admin/licenses
pub async fn list_licenses(
    State(state): State<AppState>,
    Query(query): Query<ListLicensesQuery>,
) -> Result<Json<LicenseList>> {
    let conn = state.db.get()?;
    let (items, total) = queries::list_licenses(&conn, &query)?;
    Ok(Json(LicenseList {
        items,
        total,
        limit: query.limit(),
        offset: query.offset(),
    }))
}

/// GET /admin/licenses/{key}
pub async fn get_license(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<License>> {
    let conn = state.db.get()?;
    let license = queries::get_license_by_key(&conn, &key)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;
    Ok(Json(license))
}

/// DELETE /admin/licenses/{key}
pub async fn delete_license(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    if !queries::delete_license_and_detach_history(&conn, &audit_conn, &key)? {
        return Err(AppError::NotFound("License not found".into()));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}

#[derive(Debug, Deserialize)]
pub struct SetStatusBody {
    pub status: LicenseStatus,
}

/// PUT /admin/licenses/{key}/status
pub async fn set_license_status(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<SetStatusBody>,
) -> Result<Json<License>> {
    let mut conn = state.db.get()?;
    let license = queries::set_license_status(&mut conn, &key, body.status)?;

    tracing::info!(license_key = %key, status = %license.status, "License status set");
    Ok(Json(license))
}

#[derive(Debug, Deserialize)]
pub struct SetExpirationBody {
    /// New expiry (Unix seconds); null makes the license non-expiring
    pub expires_at: Option<i64>,
}

/// PUT /admin/licenses/{key}/expiration
pub async fn set_license_expiration(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<SetExpirationBody>,
) -> Result<Json<License>> {
    let mut conn = state.db.get()?;
    let license = queries::extend_license_expiration(&mut conn, &key, body.expires_at)?;

    tracing::info!(license_key = %key, expires_at = ?license.expires_at, "License expiration set");
    Ok(Json(license))
}

#[derive(Debug, Deserialize)]
pub struct ValidationsQuery {
    pub limit: Option<i64>,
}

/// GET /admin/licenses/{key}/validations
pub async fn list_license_validations(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<ValidationsQuery>,
) -> Result<Json<Vec<ValidationRecord>>> {
    let conn = state.audit.get()?;
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let records = queries::recent_validations_for_key(&conn, &key, limit)?;
    Ok(Json(records))
}
