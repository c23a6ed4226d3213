use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::validation::{Validate, Violations, is_valid_semver};

pub const MAX_NOTES_CHARS: usize = 10_000;

/// Release lifecycle state. Unknown upstream values are kept verbatim in
/// `Other` so validation can name them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    Draft,
    Released,
    Archived,
    Superseded,
    #[serde(untagged)]
    Other(String),
}

impl ReleaseStatus {
    pub const VALID: [&'static str; 4] = ["draft", "released", "archived", "superseded"];

    pub fn as_str(&self) -> &str {
        match self {
            ReleaseStatus::Draft => "draft",
            ReleaseStatus::Released => "released",
            ReleaseStatus::Archived => "archived",
            ReleaseStatus::Superseded => "superseded",
            ReleaseStatus::Other(raw) => raw,
        }
    }
}

impl Default for ReleaseStatus {
    fn default() -> Self {
        ReleaseStatus::Other(String::new())
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, sequenced release of an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub application_id: String,
    /// Semantic version string (e.g. "1.2.3-beta.1")
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub version: String,
    /// Monotonic per-application ordinal
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub sequence: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Set once the release is promoted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub notes: String,
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "crate::de::null_as_default"
    )]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub is_required: bool,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub is_prerelease: bool,
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub status: ReleaseStatus,
    /// Raw release configuration (YAML/JSON as published)
    #[serde(default, deserialize_with = "crate::de::null_as_default")]
    pub config: String,
}

impl Release {
    pub fn is_released(&self) -> bool {
        self.status == ReleaseStatus::Released && self.released_at.is_some()
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Release {} ({})", self.version, self.status)
    }
}

impl Validate for Release {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Violations::new("release");

        v.require(&self.id, "release ID is required");
        v.require(&self.application_id, "application ID is required");
        if self.version.is_empty() {
            v.push("release version is required");
        } else if !is_valid_semver(&self.version) {
            v.push("release version must follow semantic versioning format (e.g., 1.0.0)");
        }
        v.check(self.sequence >= 0, "release sequence must be non-negative");

        match &self.status {
            ReleaseStatus::Other(raw) if raw.is_empty() => v.push("release status is required"),
            ReleaseStatus::Other(raw) => v.push(format!(
                "invalid release status '{raw}'. Valid statuses are: {}",
                ReleaseStatus::VALID.join(", ")
            )),
            _ => {}
        }

        v.timestamps(self.created_at, self.updated_at);
        v.not_before_created("released_at", self.released_at, self.created_at);
        if self.status == ReleaseStatus::Released && self.released_at.is_none() {
            v.push("released_at is required when status is 'released'");
        }

        v.max_chars(
            &self.notes,
            MAX_NOTES_CHARS,
            "release notes must be 10000 characters or less",
        );
        v.key_values(&self.metadata, "metadata");

        v.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn valid_release() -> Release {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        Release {
            id: "rel-1".to_string(),
            application_id: "app-123".to_string(),
            version: "1.2.3".to_string(),
            sequence: 7,
            created_at: Some(created),
            updated_at: Some(created),
            released_at: Some(created + chrono::Duration::minutes(5)),
            notes: "Bug fixes".to_string(),
            metadata: BTreeMap::from([("git_sha".to_string(), "abc123".to_string())]),
            is_required: false,
            is_prerelease: false,
            status: ReleaseStatus::Released,
            config: String::new(),
        }
    }

    fn assert_single_violation(mutate: impl FnOnce(&mut Release), expected: &str) {
        let mut release = valid_release();
        mutate(&mut release);
        let err = release.validate().expect_err(expected);
        assert_eq!(err.violations.len(), 1, "{err}");
        assert!(err.to_string().contains(expected), "{err}");
    }

    #[test]
    fn valid_release_passes() {
        assert_eq!(valid_release().validate(), Ok(()));
        assert!(valid_release().is_released());
    }

    #[test]
    fn each_rule_is_reported_in_isolation() {
        assert_single_violation(|r| r.id.clear(), "release ID is required");
        assert_single_violation(|r| r.application_id.clear(), "application ID is required");
        assert_single_violation(|r| r.version.clear(), "release version is required");
        assert_single_violation(
            |r| r.version = "v1.0.0".to_string(),
            "release version must follow semantic versioning format (e.g., 1.0.0)",
        );
        assert_single_violation(|r| r.sequence = -1, "release sequence must be non-negative");
        assert_single_violation(
            |r| r.updated_at = r.created_at.map(|c| c - chrono::Duration::seconds(1)),
            "updated_at must be equal to or after created_at",
        );
        assert_single_violation(
            |r| r.released_at = r.created_at.map(|c| c - chrono::Duration::days(2)),
            "released_at must be equal to or after created_at",
        );
        assert_single_violation(
            |r| r.released_at = None,
            "released_at is required when status is 'released'",
        );
        assert_single_violation(
            |r| r.notes = "n".repeat(10_001),
            "release notes must be 10000 characters or less",
        );
        assert_single_violation(
            |r| {
                r.metadata.insert(String::new(), "x".to_string());
            },
            "metadata keys cannot be empty",
        );
        assert_single_violation(
            |r| {
                r.metadata.insert("k".repeat(101), "x".to_string());
            },
            "metadata keys must be 100 characters or less",
        );
        assert_single_violation(
            |r| {
                r.metadata.insert("k".to_string(), "x".repeat(501));
            },
            "metadata values must be 500 characters or less",
        );
    }

    #[test]
    fn status_rules_distinguish_missing_from_unknown() {
        assert_single_violation(
            |r| {
                r.status = ReleaseStatus::default();
                r.released_at = None;
            },
            "release status is required",
        );
        assert_single_violation(
            |r| r.status = ReleaseStatus::Other("published".to_string()),
            "invalid release status 'published'. Valid statuses are: draft, released, archived, superseded",
        );
    }

    #[test]
    fn draft_without_released_at_is_valid() {
        let mut release = valid_release();
        release.status = ReleaseStatus::Draft;
        release.released_at = None;
        assert!(release.validate().is_ok());
        assert!(!release.is_released());
    }

    #[test]
    fn status_decodes_known_and_unknown_values() {
        let known: ReleaseStatus = serde_json::from_str(r#""superseded""#).unwrap();
        assert_eq!(known, ReleaseStatus::Superseded);
        let unknown: ReleaseStatus = serde_json::from_str(r#""promoted""#).unwrap();
        assert_eq!(unknown, ReleaseStatus::Other("promoted".to_string()));
        assert_eq!(serde_json::to_string(&unknown).unwrap(), r#""promoted""#);
    }

    #[test]
    fn json_round_trip_preserves_fields() {
        let release = valid_release();
        let encoded = serde_json::to_value(&release).unwrap();
        assert_eq!(encoded["status"], "released");
        let decoded: Release = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, release);
    }

    #[test]
    fn display_shows_version_and_status() {
        assert_eq!(valid_release().to_string(), "Release 1.2.3 (released)");
    }

    #[test]
    fn null_metadata_notes_and_status_still_decode() {
        let release: Release = serde_json::from_str(
            r#"{"id":"r1","application_id":"app-1","version":"1.0.0","sequence":null,
                "notes":null,"metadata":null,"config":null,"status":null}"#,
        )
        .unwrap();
        assert_eq!(release.sequence, 0);
        assert_eq!(release.notes, "");
        assert!(release.metadata.is_empty());
        assert_eq!(release.status, ReleaseStatus::default());
    }
}
