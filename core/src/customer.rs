use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::validation::{Validate, Violations, is_valid_email};

pub const MAX_NAME_CHARS: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerType {
    Trial,
    Paid,
    Community,
    Development,
    #[serde(untagged)]
    Other(String),
}

impl CustomerType {
    pub const VALID: [&'static str; 4] = ["trial", "paid", "community", "development"];

    pub fn as_str(&self) -> &str {
        match self {
            CustomerType::Trial => "trial",
            CustomerType::Paid => "paid",
            CustomerType::Community => "community",
            CustomerType::Development => "development",
            CustomerType::Other(raw) => raw,
        }
    }
}

impl Default for CustomerType {
    fn default() -> Self {
        CustomerType::Other(String::new())
    }
}

impl fmt::Display for CustomerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// License kind. `Embedded` is only valid here, not as a customer type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseType {
    Trial,
    Paid,
    Community,
    Development,
    Embedded,
    #[serde(untagged)]
    Other(String),
}

impl LicenseType {
    pub const VALID: [&'static str; 5] = ["trial", "paid", "community", "development", "embedded"];

    pub fn as_str(&self) -> &str {
        match self {
            LicenseType::Trial => "trial",
            LicenseType::Paid => "paid",
            LicenseType::Community => "community",
            LicenseType::Development => "development",
            LicenseType::Embedded => "embedded",
            LicenseType::Other(raw) => raw,
        }
    }
}

impl Default for LicenseType {
    fn default() -> Self {
        LicenseType::Other(String::new())
    }
}

impl fmt::Display for LicenseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A licensed customer of an application, assigned to one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub application_id: String,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub name: String,
    #[serde(
        default,
        skip_serializing_if = "String::is_empty",
        deserialize_with = "crate::de::null_as_default"
    )]
    pub email: String,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub channel_id: String,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub channel_name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    /// License expiry; never expires when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "type", deserialize_with = "crate::de::null_as_default")]
    pub customer_type: CustomerType,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub is_archived: bool,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub is_gitops_supported: bool,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub license_id: String,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub license_type: LicenseType,
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "crate::de::null_as_default"
    )]
    pub entitlements: BTreeMap<String, String>,
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "crate::de::null_as_default"
    )]
    pub custom_fields: BTreeMap<String, String>,
}

impl Customer {
    pub fn is_active(&self) -> bool {
        !self.is_archived
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires < now)
    }

    pub fn is_trial(&self) -> bool {
        self.customer_type == CustomerType::Trial || self.license_type == LicenseType::Trial
    }
}

impl Validate for Customer {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Violations::new("customer");

        v.require(&self.id, "customer ID is required");
        v.require(&self.application_id, "application ID is required");
        if self.name.is_empty() {
            v.push("customer name is required");
        } else {
            v.max_chars(
                &self.name,
                MAX_NAME_CHARS,
                "customer name must be 255 characters or less",
            );
        }
        if !self.email.is_empty() && !is_valid_email(&self.email) {
            v.push("customer email must be a valid email address");
        }
        v.require(&self.channel_id, "channel ID is required");
        match &self.customer_type {
            CustomerType::Other(raw) if raw.is_empty() => v.push("customer type is required"),
            CustomerType::Other(raw) => v.push(format!(
                "invalid customer type '{raw}'. Valid types are: {}",
                CustomerType::VALID.join(", ")
            )),
            _ => {}
        }
        v.require(&self.license_id, "license ID is required");
        match &self.license_type {
            LicenseType::Other(raw) if raw.is_empty() => v.push("license type is required"),
            LicenseType::Other(raw) => v.push(format!(
                "invalid license type '{raw}'. Valid types are: {}",
                LicenseType::VALID.join(", ")
            )),
            _ => {}
        }

        v.timestamps(self.created_at, self.updated_at);
        v.archived_state(self.archived_at, self.is_archived, self.created_at);
        v.not_before_created("expires_at", self.expires_at, self.created_at);

        v.key_values(&self.entitlements, "entitlement");
        v.key_values(&self.custom_fields, "custom field");

        v.finish()
    }
}
