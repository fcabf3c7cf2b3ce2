mod licenses;
mod reports;

pub use licenses::*;
pub use reports::*;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::db::AppState;
use crate::middleware::admin_auth;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // License administration
        .route("/admin/licenses", post(issue_license).get(list_licenses))
        .route(
            "/admin/licenses/{key}",
            get(get_license).delete(delete_license),
        )
        .route("/admin/licenses/{key}/status", put(set_license_status))
        .route("/admin/licenses/{key}/expiration", put(set_license_expiration))
        .route("/admin/licenses/{key}/validations", get(list_license_validations))
        // Reporting (read-only)
        .route("/admin/stats/tiers", get(tier_stats))
        .route("/admin/stats/daily", get(daily_stats))
        .route("/admin/stats/failed-ips", get(failed_ips))
        .route("/admin/validations/recent", get(recent_validations))
        .layer(middleware::from_fn_with_state(state, admin_auth))
}
