use axum::extract::State;
use chrono::Utc;
use serde::Deserialize;

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::models::{
    DailyValidationStats, FailedAttemptsByIp, StatsRange, TierStats, ValidationRecord,
};

pub async fn tier_stats(State(state): State<AppState>) -> Result<Json<Vec<TierStats>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::license_stats_by_tier(&conn)?))
}

pub async fn daily_stats(
    State(state): State<AppState>,
    Query(range): Query<StatsRange>,
) -> Result<Json<Vec<DailyValidationStats>>> {
    let conn = state.audit.get()?;
    Ok(Json(queries::daily_validation_stats(&conn, &range)?))
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

pub async fn recent_validations(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<ValidationRecord>>> {
    let conn = state.audit.get()?;
    let limit = query.limit.unwrap_or(queries::RECENT_VALIDATIONS_MAX);
    Ok(Json(queries::recent_validations(&conn, limit)?))
}

#[derive(Debug, Deserialize)]
pub struct FailedIpsQuery {
    /// Unix seconds; defaults to the last 24 hours
    pub since: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn failed_ips(
    State(state): State<AppState>,
    Query(query): Query<FailedIpsQuery>,
) -> Result<Json<Vec<FailedAttemptsByIp>>> {
    let conn = state.audit.get()?;
    let since = query.since.unwrap_or_else(|| Utc::now().timestamp() - 86400);
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    Ok(Json(queries::failed_attempts_by_ip(&conn, since, limit)?))
}
