use serde::Serialize;

/// One audited validation attempt. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationRecord {
    pub id: String,
    /// Key as presented; nulled when the license is deleted
    pub license_key: Option<String>,
    pub validated_at: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    /// Present iff `success` is false
    pub error_message: Option<String>,
}

/// Input for appending a validation record.
///
/// Built through [`NewValidationRecord::success`] or
/// [`NewValidationRecord::failure`] so that `error_message` is set exactly
/// when the attempt failed.
#[derive(Debug, Clone)]
pub struct NewValidationRecord {
    license_key: String,
    validated_at: i64,
    ip_address: Option<String>,
    user_agent: Option<String>,
    error_message: Option<String>,
}

impl NewValidationRecord {
    pub fn success(license_key: &str, validated_at: i64) -> Self {
        Self {
            license_key: license_key.to_string(),
            validated_at,
            ip_address: None,
            user_agent: None,
            error_message: None,
        }
    }

    pub fn failure(license_key: &str, validated_at: i64, error_message: impl Into<String>) -> Self {
        Self {
            license_key: license_key.to_string(),
            validated_at,
            ip_address: None,
            user_agent: None,
            error_message: Some(error_message.into()),
        }
    }

    pub fn with_client(mut self, ip_address: Option<&str>, user_agent: Option<&str>) -> Self {
        self.ip_address = ip_address.map(String::from);
        self.user_agent = user_agent.map(String::from);
        self
    }

    pub fn license_key(&self) -> &str {
        &self.license_key
    }

    pub fn validated_at(&self) -> i64 {
        self.validated_at
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn success_flag(&self) -> bool {
        self.error_message.is_none()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}
