use std::env;

use anyhow::{Context, bail};

/// Minimum HMAC secret length in bytes.
pub const MIN_SIGNING_KEY_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub audit_database_path: String,
    /// Hex-encoded HMAC secret used to sign license keys
    pub license_signing_key: Option<String>,
    /// Bearer token for the admin interface (admin routes are closed when unset)
    pub admin_api_key: Option<String>,
    pub dev_mode: bool,
    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub db_pool_size: u32,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("COMPLIO_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let db_pool_size: u32 = env::var("DB_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(16);

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "complio.db".to_string()),
            audit_database_path: env::var("AUDIT_DATABASE_PATH")
                .unwrap_or_else(|_| "complio_audit.db".to_string()),
            license_signing_key: env::var("LICENSE_SIGNING_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            admin_api_key: env::var("ADMIN_API_KEY").ok().filter(|v| !v.is_empty()),
            dev_mode,
            resend_api_key: env::var("RESEND_API_KEY").ok().filter(|v| !v.is_empty()),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Complio <licenses@complio.dev>".to_string()),
            db_pool_size,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Decode the configured signing secret.
    ///
    /// In dev mode a missing key is replaced by a random ephemeral one, so
    /// signatures issued by a dev server do not survive a restart.
    pub fn signing_secret(&self) -> anyhow::Result<Vec<u8>> {
        let Some(hex_key) = self.license_signing_key.as_deref() else {
            if self.dev_mode {
                tracing::warn!("LICENSE_SIGNING_KEY not set, using an ephemeral dev key");
                return Ok(random_secret());
            }
            bail!("LICENSE_SIGNING_KEY must be set");
        };

        let secret = hex::decode(hex_key.trim()).context("LICENSE_SIGNING_KEY must be hex")?;
        if secret.len() < MIN_SIGNING_KEY_BYTES {
            bail!(
                "LICENSE_SIGNING_KEY must be at least {} bytes, got {}",
                MIN_SIGNING_KEY_BYTES,
                secret.len()
            );
        }
        Ok(secret)
    }
}

fn random_secret() -> Vec<u8> {
    use rand::RngCore;
    let mut secret = vec![0u8; MIN_SIGNING_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}
