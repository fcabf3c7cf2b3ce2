//! Shared fixtures: file-backed SQLite pools in a temp dir, a fixed-secret
//! codec and license helpers.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{Router, body::Body, http::Request, response::Response};
use chrono::Utc;
use tempfile::TempDir;

pub use complio::codec::KeyCodec;
pub use complio::db::{AppState, DbPool, create_pool, init_audit_db, init_db, queries};
pub use complio::email::EmailService;
pub use complio::issuance::{IssueLicense, issue_license};
pub use complio::models::*;
pub use complio::validation::{ValidationEngine, ValidationOutcome, ValidationRequest};

pub const TEST_ADMIN_KEY: &str = "test-admin-key";
pub const TEST_SECRET: [u8; 32] = [42u8; 32];

/// Keeps the temp dir alive for as long as the pools are used.
pub struct TestEnv {
    pub state: AppState,
    _dir: TempDir,
}

pub fn test_codec() -> KeyCodec {
    KeyCodec::new(&TEST_SECRET).unwrap()
}

pub fn create_test_env() -> TestEnv {
    create_test_env_with_pool_size(8)
}

pub fn create_test_env_with_pool_size(pool_size: u32) -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("licenses.db");
    let audit_path = dir.path().join("audit.db");

    let db = create_pool(db_path.to_str().unwrap(), pool_size).unwrap();
    let audit = create_pool(audit_path.to_str().unwrap(), pool_size).unwrap();
    init_db(&db.get().unwrap()).unwrap();
    init_audit_db(&audit.get().unwrap()).unwrap();

    TestEnv {
        state: AppState {
            db,
            audit,
            codec: Arc::new(test_codec()),
            admin_api_key: Some(TEST_ADMIN_KEY.to_string()),
            email: EmailService::new(None, "test@example.com".into()),
        },
        _dir: dir,
    }
}

pub fn now() -> i64 {
    Utc::now().timestamp()
}

pub fn future_timestamp(days: i64) -> i64 {
    now() + days * 86400
}

pub fn past_timestamp(days: i64) -> i64 {
    now() - days * 86400
}

pub fn create_test_license(state: &AppState, tier: Tier, expires_at: Option<i64>) -> License {
    let conn = state.db.get().unwrap();
    let mut input = IssueLicense::new("customer@example.com", tier);
    input.expires_at = expires_at;
    issue_license(&conn, &state.codec, &input).unwrap()
}

pub fn set_status(state: &AppState, license_key: &str, status: LicenseStatus) -> License {
    let mut conn = state.db.get().unwrap();
    queries::set_license_status(&mut conn, license_key, status).unwrap()
}

pub fn fetch_license(state: &AppState, license_key: &str) -> Option<License> {
    let conn = state.db.get().unwrap();
    queries::get_license_by_key(&conn, license_key).unwrap()
}

pub fn audit_trail(state: &AppState, license_key: &str) -> Vec<ValidationRecord> {
    let conn = state.audit.get().unwrap();
    queries::recent_validations_for_key(&conn, license_key, 1000).unwrap()
}

pub fn validation_request(license: &License) -> ValidationRequest {
    ValidationRequest::new(license.license_key.clone(), license.signature.clone())
}

pub fn test_app(state: AppState) -> Router {
    complio::handlers::app(state)
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn admin_request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", TEST_ADMIN_KEY));
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
