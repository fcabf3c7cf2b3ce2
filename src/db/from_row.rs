//! Row mapping for the License Store and Audit Log tables.

use rusqlite::{Connection, Params, Row, types::Type};

use crate::error::Result;
use crate::models::*;

pub const LICENSE_COLS: &str = "id, license_key, signature, email, tier, status, created_at, updated_at, expires_at, last_validated_at, validation_count, stripe_customer_id, stripe_subscription_id, metadata";

pub const VALIDATION_COLS: &str =
    "id, license_key, validated_at, ip_address, user_agent, success, error_message";

pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Parse a TEXT column into a strum enum, surfacing bad values as a
/// conversion error instead of panicking.
fn parse_enum<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = strum::ParseError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl FromRow for License {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let metadata: String = row.get(13)?;
        Ok(License {
            id: row.get(0)?,
            license_key: row.get(1)?,
            signature: row.get(2)?,
            email: row.get(3)?,
            tier: parse_enum(row, 4)?,
            status: parse_enum(row, 5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            expires_at: row.get(8)?,
            last_validated_at: row.get(9)?,
            validation_count: row.get(10)?,
            stripe_customer_id: row.get(11)?,
            stripe_subscription_id: row.get(12)?,
            metadata: serde_json::from_str(&metadata).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(13, Type::Text, Box::new(e))
            })?,
        })
    }
}

impl FromRow for ValidationRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ValidationRecord {
            id: row.get(0)?,
            license_key: row.get(1)?,
            validated_at: row.get(2)?,
            ip_address: row.get(3)?,
            user_agent: row.get(4)?,
            success: row.get(5)?,
            error_message: row.get(6)?,
        })
    }
}

impl FromRow for TierStats {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(TierStats {
            tier: parse_enum(row, 0)?,
            total_licenses: row.get(1)?,
            active_licenses: row.get(2)?,
            suspended_licenses: row.get(3)?,
            cancelled_licenses: row.get(4)?,
            total_validations: row.get(5)?,
        })
    }
}

impl FromRow for DailyValidationStats {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(DailyValidationStats {
            day: row.get(0)?,
            total_attempts: row.get(1)?,
            successful: row.get(2)?,
            failed: row.get(3)?,
            unique_keys: row.get(4)?,
            unique_ips: row.get(5)?,
        })
    }
}

impl FromRow for FailedAttemptsByIp {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(FailedAttemptsByIp {
            ip_address: row.get(0)?,
            failed_attempts: row.get(1)?,
            distinct_keys: row.get(2)?,
            last_attempt_at: row.get(3)?,
        })
    }
}

pub fn query_one<T: FromRow, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Option<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    match rows.next()? {
        Some(row) => Ok(Some(T::from_row(row)?)),
        None => Ok(None),
    }
}

pub fn query_all<T: FromRow, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| T::from_row(row))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
