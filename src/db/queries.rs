use chrono::Utc;
use rusqlite::{Connection, ErrorCode, TransactionBehavior, params, types::Value};
use uuid::Uuid;

use crate::codec::check_key_format;
use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{LICENSE_COLS, VALIDATION_COLS, query_all, query_one};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

// ============ Licenses ============

/// Insert a newly issued license. Fails with `DuplicateKey` if the key (or
/// its signature) already exists.
pub fn create_license(conn: &Connection, input: &CreateLicense) -> Result<License> {
    check_key_format(&input.license_key)?;

    let id = gen_id();
    let now = now();
    let metadata = serde_json::to_string(&input.metadata)?;

    let inserted = conn.execute(
        "INSERT INTO licenses (id, license_key, signature, email, tier, status, created_at, updated_at, expires_at, last_validated_at, validation_count, stripe_customer_id, stripe_subscription_id, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, 'ACTIVE', ?6, ?6, ?7, NULL, 0, ?8, ?9, ?10)",
        params![
            &id,
            &input.license_key,
            &input.signature,
            &input.email,
            input.tier.as_ref(),
            now,
            input.expires_at,
            &input.stripe_customer_id,
            &input.stripe_subscription_id,
            &metadata,
        ],
    );

    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::DuplicateKey(input.license_key.clone()));
        }
        Err(e) => return Err(e.into()),
    }

    Ok(License {
        id,
        license_key: input.license_key.clone(),
        signature: input.signature.clone(),
        email: input.email.clone(),
        tier: input.tier,
        status: LicenseStatus::Active,
        created_at: now,
        updated_at: now,
        expires_at: input.expires_at,
        last_validated_at: None,
        validation_count: 0,
        stripe_customer_id: input.stripe_customer_id.clone(),
        stripe_subscription_id: input.stripe_subscription_id.clone(),
        metadata: input.metadata.clone(),
    })
}

/// Look up a license by key. Malformed keys are rejected before the query.
pub fn get_license_by_key(conn: &Connection, license_key: &str) -> Result<Option<License>> {
    check_key_format(license_key)?;
    query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE license_key = ?1", LICENSE_COLS),
        params![license_key],
    )
}

/// Look up a license by billing subscription (used on renewals and cancellations).
pub fn get_license_by_subscription(
    conn: &Connection,
    stripe_subscription_id: &str,
) -> Result<Option<License>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM licenses WHERE stripe_subscription_id = ?1 ORDER BY created_at DESC LIMIT 1",
            LICENSE_COLS
        ),
        params![stripe_subscription_id],
    )
}

pub fn list_licenses(conn: &Connection, query: &ListLicensesQuery) -> Result<(Vec<License>, i64)> {
    let mut where_clause = String::from("WHERE 1=1");
    let mut filter_params: Vec<Value> = Vec::new();

    if let Some(tier) = query.tier {
        where_clause.push_str(" AND tier = ?");
        filter_params.push(tier.as_ref().to_string().into());
    }
    if let Some(status) = query.status {
        where_clause.push_str(" AND status = ?");
        filter_params.push(status.as_ref().to_string().into());
    }
    if let Some(ref subscription_id) = query.subscription_id {
        where_clause.push_str(" AND stripe_subscription_id = ?");
        filter_params.push(subscription_id.clone().into());
    }

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM licenses {}", where_clause),
        rusqlite::params_from_iter(filter_params.iter()),
        |row| row.get(0),
    )?;

    let mut select_params = filter_params;
    select_params.push(query.limit().into());
    select_params.push(query.offset().into());

    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM licenses {} ORDER BY created_at DESC, id LIMIT ? OFFSET ?",
            LICENSE_COLS, where_clause
        ),
        rusqlite::params_from_iter(select_params.iter()),
    )?;

    Ok((items, total))
}

/// Atomic in-store increment; safe under concurrent validations of one key.
pub fn increment_validation_count(conn: &Connection, license_key: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET validation_count = validation_count + 1 WHERE license_key = ?1",
        params![license_key],
    )?;
    Ok(affected > 0)
}

/// Record a successful validation time. Only the validation path calls this.
pub fn touch_last_validated(conn: &Connection, license_key: &str, at: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET last_validated_at = ?1 WHERE license_key = ?2",
        params![at, license_key],
    )?;
    Ok(affected > 0)
}

/// Administrative status change, enforcing that CANCELLED is terminal.
///
/// Read and write happen in one IMMEDIATE transaction so two concurrent
/// transitions cannot both pass the check against a stale status.
pub fn set_license_status(
    conn: &mut Connection,
    license_key: &str,
    new_status: LicenseStatus,
) -> Result<License> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let license = get_license_by_key(&tx, license_key)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;

    if !license.status.can_transition_to(new_status) {
        return Err(AppError::InvalidTransition {
            from: license.status,
            to: new_status,
        });
    }

    if license.status == new_status {
        return Ok(license);
    }

    let now = now();
    tx.execute(
        "UPDATE licenses SET status = ?1, updated_at = ?2 WHERE license_key = ?3",
        params![new_status.as_ref(), now, license_key],
    )?;
    tx.commit()?;

    Ok(License {
        status: new_status,
        updated_at: now,
        ..license
    })
}

/// Set a new expiry (renewal) or clear it. Cancelled licenses stay dead.
pub fn extend_license_expiration(
    conn: &mut Connection,
    license_key: &str,
    expires_at: Option<i64>,
) -> Result<License> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let license = get_license_by_key(&tx, license_key)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;

    if license.status == LicenseStatus::Cancelled {
        return Err(AppError::InvalidTransition {
            from: LicenseStatus::Cancelled,
            to: LicenseStatus::Active,
        });
    }

    let now = now();
    tx.execute(
        "UPDATE licenses SET expires_at = ?1, updated_at = ?2 WHERE license_key = ?3",
        params![expires_at, now, license_key],
    )?;
    tx.commit()?;

    Ok(License {
        expires_at,
        updated_at: now,
        ..license
    })
}

pub fn delete_license(conn: &Connection, license_key: &str) -> Result<bool> {
    check_key_format(license_key)?;
    let deleted = conn.execute(
        "DELETE FROM licenses WHERE license_key = ?1",
        params![license_key],
    )?;
    Ok(deleted > 0)
}

/// Delete a license and null the soft link in its audit history.
///
/// The two databases are not updated atomically. The detach always runs, so
/// retrying after a failed detach finishes the job even though the license
/// row is already gone. Returns true if a row was deleted or any audit
/// record was detached.
pub fn delete_license_and_detach_history(
    conn: &Connection,
    audit_conn: &Connection,
    license_key: &str,
) -> Result<bool> {
    let deleted = delete_license(conn, license_key)?;
    let detached = detach_license_key(audit_conn, license_key)?;

    if deleted || detached > 0 {
        tracing::info!(
            license_key = %license_key,
            deleted,
            detached_records = detached,
            "Deleted license, audit history kept"
        );
    }
    Ok(deleted || detached > 0)
}

// ============ Validation Records ============

pub fn append_validation(conn: &Connection, record: &NewValidationRecord) -> Result<ValidationRecord> {
    let id = gen_id();

    conn.execute(
        "INSERT INTO validations (id, license_key, validated_at, ip_address, user_agent, success, error_message)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            &id,
            record.license_key(),
            record.validated_at(),
            record.ip_address(),
            record.user_agent(),
            record.success_flag(),
            record.error_message(),
        ],
    )?;

    Ok(ValidationRecord {
        id,
        license_key: Some(record.license_key().to_string()),
        validated_at: record.validated_at(),
        ip_address: record.ip_address().map(String::from),
        user_agent: record.user_agent().map(String::from),
        success: record.success_flag(),
        error_message: record.error_message().map(String::from),
    })
}

/// Null the weak reference on every record for a deleted license.
pub fn detach_license_key(conn: &Connection, license_key: &str) -> Result<usize> {
    let updated = conn.execute(
        "UPDATE validations SET license_key = NULL WHERE license_key = ?1",
        params![license_key],
    )?;
    Ok(updated)
}

/// Most recent attempts for one key, newest first.
pub fn recent_validations_for_key(
    conn: &Connection,
    license_key: &str,
    limit: i64,
) -> Result<Vec<ValidationRecord>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM validations WHERE license_key = ?1 ORDER BY validated_at DESC, rowid DESC LIMIT ?2",
            VALIDATION_COLS
        ),
        params![license_key, limit.max(0)],
    )
}

pub fn count_validations_for_key(conn: &Connection, license_key: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM validations WHERE license_key = ?1",
        params![license_key],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============ Reports ============

/// Upper bound of the `recent_validations` view.
pub const RECENT_VALIDATIONS_MAX: i64 = 100;

pub fn license_stats_by_tier(conn: &Connection) -> Result<Vec<TierStats>> {
    query_all(
        conn,
        "SELECT tier, total_licenses, active_licenses, suspended_licenses, cancelled_licenses, total_validations
         FROM license_stats_by_tier ORDER BY tier",
        [],
    )
}

pub fn daily_validation_stats(conn: &Connection, range: &StatsRange) -> Result<Vec<DailyValidationStats>> {
    query_all(
        conn,
        "SELECT day, total_attempts, successful, failed, unique_keys, unique_ips
         FROM daily_validation_stats
         WHERE (?1 IS NULL OR day >= date(?1, 'unixepoch'))
           AND (?2 IS NULL OR day <= date(?2, 'unixepoch'))
         ORDER BY day DESC",
        params![range.from, range.to],
    )
}

pub fn recent_validations(conn: &Connection, limit: i64) -> Result<Vec<ValidationRecord>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM recent_validations ORDER BY validated_at DESC LIMIT ?1",
            VALIDATION_COLS
        ),
        params![limit.clamp(0, RECENT_VALIDATIONS_MAX)],
    )
}

/// Sources of rejected attempts since `since`, worst first.
pub fn failed_attempts_by_ip(
    conn: &Connection,
    since: i64,
    limit: i64,
) -> Result<Vec<FailedAttemptsByIp>> {
    query_all(
        conn,
        "SELECT ip_address, COUNT(*) AS failed_attempts, COUNT(DISTINCT license_key) AS distinct_keys, MAX(validated_at) AS last_attempt_at
         FROM validations
         WHERE success = 0 AND ip_address IS NOT NULL AND validated_at >= ?1
         GROUP BY ip_address
         ORDER BY failed_attempts DESC, ip_address
         LIMIT ?2",
        params![since, limit.max(0)],
    )
}
