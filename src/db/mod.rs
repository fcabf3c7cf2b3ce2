mod from_row;
pub mod queries;

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::codec::KeyCodec;
use crate::email::EmailService;
use crate::error::Result;
use crate::validation::ValidationEngine;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    /// License Store
    pub db: DbPool,
    /// Audit Log
    pub audit: DbPool,
    pub codec: Arc<KeyCodec>,
    /// Bearer token for `/admin` routes (None = admin interface closed)
    pub admin_api_key: Option<String>,
    pub email: EmailService,
}

impl AppState {
    pub fn engine(&self) -> ValidationEngine {
        ValidationEngine::new(self.db.clone(), self.audit.clone(), self.codec.clone())
    }
}

/// Applied to every pooled connection. The busy timeout lets concurrent
/// writers queue on SQLite's write lock instead of failing immediately.
const CONNECTION_PRAGMAS: &str = "
    PRAGMA busy_timeout = 5000;
    PRAGMA journal_mode = WAL;
    PRAGMA foreign_keys = ON;
";

/// Open a pooled SQLite database at `path`.
pub fn create_pool(path: &str, max_size: u32) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(path)
        .with_init(|conn| conn.execute_batch(CONNECTION_PRAGMAS));
    let pool = Pool::builder().max_size(max_size).build(manager)?;
    Ok(pool)
}

/// Create the License Store schema.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS licenses (
            id TEXT PRIMARY KEY,
            license_key TEXT NOT NULL UNIQUE,
            signature TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL,
            tier TEXT NOT NULL
                CHECK (tier IN ('EARLY_ACCESS', 'STARTER', 'PRO', 'ENTERPRISE')),
            status TEXT NOT NULL DEFAULT 'ACTIVE'
                CHECK (status IN ('ACTIVE', 'SUSPENDED', 'CANCELLED')),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            expires_at INTEGER,
            last_validated_at INTEGER,
            validation_count INTEGER NOT NULL DEFAULT 0 CHECK (validation_count >= 0),
            stripe_customer_id TEXT,
            stripe_subscription_id TEXT,
            metadata TEXT NOT NULL DEFAULT '{}'
        );

        CREATE INDEX IF NOT EXISTS idx_licenses_email ON licenses(email);
        CREATE INDEX IF NOT EXISTS idx_licenses_status ON licenses(status);
        CREATE INDEX IF NOT EXISTS idx_licenses_tier ON licenses(tier);
        CREATE INDEX IF NOT EXISTS idx_licenses_stripe_customer ON licenses(stripe_customer_id);
        CREATE INDEX IF NOT EXISTS idx_licenses_stripe_subscription ON licenses(stripe_subscription_id);

        CREATE VIEW IF NOT EXISTS license_stats_by_tier AS
            SELECT
                tier,
                COUNT(*) AS total_licenses,
                COALESCE(SUM(CASE WHEN status = 'ACTIVE' THEN 1 ELSE 0 END), 0) AS active_licenses,
                COALESCE(SUM(CASE WHEN status = 'SUSPENDED' THEN 1 ELSE 0 END), 0) AS suspended_licenses,
                COALESCE(SUM(CASE WHEN status = 'CANCELLED' THEN 1 ELSE 0 END), 0) AS cancelled_licenses,
                COALESCE(SUM(validation_count), 0) AS total_validations
            FROM licenses
            GROUP BY tier;
        "#,
    )?;
    Ok(())
}

/// Create the Audit Log schema.
///
/// `license_key` is a plain string, not a foreign key: records outlive the
/// license they reference. The triggers keep the table append-only, allowing
/// only the nulling of `license_key` when a license is deleted.
pub fn init_audit_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS validations (
            id TEXT PRIMARY KEY,
            license_key TEXT,
            validated_at INTEGER NOT NULL,
            ip_address TEXT,
            user_agent TEXT,
            success INTEGER NOT NULL CHECK (success IN (0, 1)),
            error_message TEXT,
            CHECK ((success = 1 AND error_message IS NULL)
                OR (success = 0 AND error_message IS NOT NULL))
        );

        CREATE INDEX IF NOT EXISTS idx_validations_license_key ON validations(license_key);
        CREATE INDEX IF NOT EXISTS idx_validations_validated_at ON validations(validated_at);
        CREATE INDEX IF NOT EXISTS idx_validations_ip ON validations(ip_address, success);

        CREATE TRIGGER IF NOT EXISTS validations_no_delete
            BEFORE DELETE ON validations
        BEGIN
            SELECT RAISE(ABORT, 'validations are append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS validations_only_detach
            BEFORE UPDATE ON validations
            WHEN NEW.license_key IS NOT NULL
                OR NEW.id IS NOT OLD.id
                OR NEW.validated_at IS NOT OLD.validated_at
                OR NEW.ip_address IS NOT OLD.ip_address
                OR NEW.user_agent IS NOT OLD.user_agent
                OR NEW.success IS NOT OLD.success
                OR NEW.error_message IS NOT OLD.error_message
        BEGIN
            SELECT RAISE(ABORT, 'validations are append-only');
        END;

        CREATE VIEW IF NOT EXISTS daily_validation_stats AS
            SELECT
                date(validated_at, 'unixepoch') AS day,
                COUNT(*) AS total_attempts,
                COALESCE(SUM(success), 0) AS successful,
                COALESCE(SUM(1 - success), 0) AS failed,
                COUNT(DISTINCT license_key) AS unique_keys,
                COUNT(DISTINCT ip_address) AS unique_ips
            FROM validations
            GROUP BY day;

        CREATE VIEW IF NOT EXISTS recent_validations AS
            SELECT id, license_key, validated_at, ip_address, user_agent, success, error_message
            FROM validations
            ORDER BY validated_at DESC, rowid DESC
            LIMIT 100;
        "#,
    )?;
    Ok(())
}
