//! Read-only aggregates for operational dashboards.

use serde::{Deserialize, Serialize};

use super::Tier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierStats {
    pub tier: Tier,
    pub total_licenses: i64,
    pub active_licenses: i64,
    pub suspended_licenses: i64,
    pub cancelled_licenses: i64,
    pub total_validations: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyValidationStats {
    /// UTC day, `YYYY-MM-DD`
    pub day: String,
    pub total_attempts: i64,
    pub successful: i64,
    pub failed: i64,
    pub unique_keys: i64,
    pub unique_ips: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedAttemptsByIp {
    pub ip_address: String,
    pub failed_attempts: i64,
    pub distinct_keys: i64,
    pub last_attempt_at: i64,
}

/// Inclusive Unix-second range for the daily statistics view.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct StatsRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}
