use axum::{extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::models::Tier;
use crate::util::extract_request_info;
use crate::validation::{ValidationOutcome, ValidationRequest, ValidationVerdict};

#[derive(Debug, Deserialize)]
pub struct ValidateBody {
    pub license_key: String,
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl From<&ValidationVerdict> for ValidateResponse {
    fn from(verdict: &ValidationVerdict) -> Self {
        Self {
            valid: verdict.outcome.is_valid(),
            tier: verdict.license.as_ref().map(|l| l.tier),
            status_reason: verdict.outcome.status_reason(),
            expires_at: verdict.license.as_ref().and_then(|l| l.expires_at),
        }
    }
}

/// POST /validate
///
/// Every definite outcome is a 200 with `valid` set; a storage outage is a
/// 503 so it never reads as "your license is invalid".
pub async fn validate_license(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ValidateBody>,
) -> Result<Json<ValidateResponse>> {
    let (ip_address, user_agent) = extract_request_info(&headers);
    let request =
        ValidationRequest::new(body.license_key, body.signature).with_client(ip_address, user_agent);

    // SQLite calls block; the engine runs to completion even if the client disconnects
    let engine = state.engine();
    let verdict = tokio::task::spawn_blocking(move || engine.validate(&request))
        .await
        .map_err(|e| AppError::Internal(format!("Validation task failed: {}", e)))?;

    if verdict.outcome == ValidationOutcome::StorageFailure {
        return Err(AppError::Storage("License validation could not be completed".into()));
    }

    Ok(Json(ValidateResponse::from(&verdict)))
}
