use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::validation::{Validate, Violations, is_valid_slug};

pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// A distribution channel. May point at one release (`release_id` and
/// `release_sequence` are set together or not at all).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub application_id: String,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub description: String,
    #[serde(
        default,
        skip_serializing_if = "String::is_empty",
        deserialize_with = "crate::de::null_as_default"
    )]
    pub release_id: String,
    #[serde(
        default,
        skip_serializing_if = "is_zero",
        deserialize_with = "crate::de::null_as_default"
    )]
    pub release_sequence: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub is_default: bool,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub is_archived: bool,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub channel_slug: String,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl Channel {
    pub fn has_release(&self) -> bool {
        !self.release_id.is_empty() && self.release_sequence > 0
    }

    pub fn is_active(&self) -> bool {
        !self.is_archived
    }
}

impl Validate for Channel {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Violations::new("channel");

        v.require(&self.id, "channel ID is required");
        v.require(&self.application_id, "application ID is required");
        if self.name.is_empty() {
            v.push("channel name is required");
        } else {
            v.max_chars(
                &self.name,
                MAX_NAME_CHARS,
                "channel name must be 100 characters or less",
            );
        }
        if self.channel_slug.is_empty() {
            v.push("channel slug is required");
        } else if !is_valid_slug(&self.channel_slug) {
            v.push("channel slug must contain only lowercase letters, numbers, and hyphens");
        }

        v.timestamps(self.created_at, self.updated_at);
        v.archived_state(self.archived_at, self.is_archived, self.created_at);

        if !self.release_id.is_empty() && self.release_sequence <= 0 {
            v.push("release_sequence must be positive when release_id is provided");
        }
        if self.release_id.is_empty() && self.release_sequence > 0 {
            v.push("release_id is required when release_sequence is provided");
        }

        v.max_chars(
            &self.description,
            MAX_DESCRIPTION_CHARS,
            "channel description must be 500 characters or less",
        );

        v.finish()
    }
}
