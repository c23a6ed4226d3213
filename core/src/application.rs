use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::validation::{Validate, Violations, is_valid_slug};

pub const MAX_NAME_CHARS: usize = 255;
pub const MAX_DESCRIPTION_CHARS: usize = 1000;

/// A vendor application. The slug is unique within the owning team.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Opaque vendor-portal ID
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub name: String,
    /// Lowercase, hyphen-delimited identifier (e.g. "my-app")
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub slug: String,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub team_id: String,
    #[serde(
        default,
        skip_serializing_if = "String::is_empty",
        deserialize_with = "crate::de::null_as_default"
    )]
    pub team_name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub description: String,
    /// Icon URL, if the vendor uploaded one
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub icon: String,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub is_active: bool,
}

impl Validate for Application {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Violations::new("application");

        v.require(&self.id, "application ID is required");
        if self.name.is_empty() {
            v.push("application name is required");
        } else {
            v.max_chars(
                &self.name,
                MAX_NAME_CHARS,
                "application name must be 255 characters or less",
            );
        }
        if self.slug.is_empty() {
            v.push("application slug is required");
        } else if !is_valid_slug(&self.slug) {
            v.push("application slug must contain only lowercase letters, numbers, and hyphens");
        }
        v.require(&self.team_id, "team ID is required");
        v.timestamps(self.created_at, self.updated_at);
        v.max_chars(
            &self.description,
            MAX_DESCRIPTION_CHARS,
            "application description must be 1000 characters or less",
        );

        v.finish()
    }
}
