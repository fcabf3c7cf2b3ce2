use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Tier {
    EarlyAccess,
    Starter,
    Pro,
    Enterprise,
}

impl Tier {
    /// Display name used in customer-facing text ("Early Access").
    pub fn display_name(&self) -> &'static str {
        match self {
            Tier::EarlyAccess => "Early Access",
            Tier::Starter => "Starter",
            Tier::Pro => "Pro",
            Tier::Enterprise => "Enterprise",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum LicenseStatus {
    Active,
    Suspended,
    Cancelled,
}

impl LicenseStatus {
    /// ACTIVE and SUSPENDED move freely between each other and into
    /// CANCELLED; nothing leaves CANCELLED.
    pub fn can_transition_to(self, to: LicenseStatus) -> bool {
        match self {
            LicenseStatus::Cancelled => to == LicenseStatus::Cancelled,
            LicenseStatus::Active | LicenseStatus::Suspended => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub id: String,
    pub license_key: String,
    #[serde(skip_serializing)]
    pub signature: String,
    pub email: String,
    pub tier: Tier,
    pub status: LicenseStatus,
    pub created_at: i64,
    pub updated_at: i64,
    /// None = never expires
    pub expires_at: Option<i64>,
    /// None until the first successful validation
    pub last_validated_at: Option<i64>,
    pub validation_count: i64,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    /// Opaque to the validation path
    pub metadata: serde_json::Value,
}

impl License {
    /// Expiry is derived from `expires_at`, never stored as a status.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

#[derive(Debug, Clone)]
pub struct CreateLicense {
    pub license_key: String,
    pub signature: String,
    pub email: String,
    pub tier: Tier,
    pub expires_at: Option<i64>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub metadata: serde_json::Value,
}

/// Filters for the admin license listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListLicensesQuery {
    pub tier: Option<Tier>,
    pub status: Option<LicenseStatus>,
    pub subscription_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListLicensesQuery {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 500;

    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}
