use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::ValidationError;

pub const MAX_METADATA_KEY_CHARS: usize = 100;
pub const MAX_METADATA_VALUE_CHARS: usize = 500;

/// Strict semantic version: MAJOR.MINOR.PATCH[-prerelease][+build], no
/// leading zeros in numeric identifiers, no `v` prefix.
static SEMVER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)(?:-((?:0|[1-9][0-9]*|[0-9]*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9][0-9]*|[0-9]*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$",
    )
    .expect("valid semver regex")
});

/// Structural and cross-field invariant check for a decoded entity.
///
/// Implementations never short-circuit: every violated rule is reported.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Lowercase letters, digits and hyphens; no leading or trailing hyphen.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

pub fn is_valid_semver(version: &str) -> bool {
    SEMVER_RE.is_match(version)
}

/// Exactly one `@`, non-empty local and domain parts, and a dot in the domain.
pub fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty() && !domain.is_empty() && domain.contains('.')
}

pub fn char_len(value: &str) -> usize {
    value.chars().count()
}

/// Accumulates rule violations for one entity.
#[derive(Debug)]
pub(crate) struct Violations {
    entity: &'static str,
    items: Vec<String>,
}

impl Violations {
    pub(crate) fn new(entity: &'static str) -> Self {
        Self {
            entity,
            items: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, message: impl Into<String>) {
        self.items.push(message.into());
    }

    pub(crate) fn check(&mut self, ok: bool, message: impl Into<String>) {
        if !ok {
            self.push(message);
        }
    }

    pub(crate) fn require(&mut self, value: &str, message: &str) {
        self.check(!value.is_empty(), message);
    }

    pub(crate) fn max_chars(&mut self, value: &str, max: usize, message: &str) {
        self.check(char_len(value) <= max, message);
    }

    /// created_at/updated_at presence and ordering.
    pub(crate) fn timestamps(
        &mut self,
        created_at: Option<DateTime<Utc>>,
        updated_at: Option<DateTime<Utc>>,
    ) {
        self.check(created_at.is_some(), "created_at timestamp is required");
        self.check(updated_at.is_some(), "updated_at timestamp is required");
        if let (Some(created), Some(updated)) = (created_at, updated_at) {
            self.check(
                updated >= created,
                "updated_at must be equal to or after created_at",
            );
        }
    }

    /// An optional timestamp that may not precede created_at.
    pub(crate) fn not_before_created(
        &mut self,
        field: &str,
        value: Option<DateTime<Utc>>,
        created_at: Option<DateTime<Utc>>,
    ) {
        if let (Some(value), Some(created)) = (value, created_at) {
            self.check(
                value >= created,
                format!("{field} must be equal to or after created_at"),
            );
        }
    }

    /// `archived_at` set if and only if `is_archived`.
    pub(crate) fn archived_state(
        &mut self,
        archived_at: Option<DateTime<Utc>>,
        is_archived: bool,
        created_at: Option<DateTime<Utc>>,
    ) {
        self.not_before_created("archived_at", archived_at, created_at);
        if archived_at.is_some() && !is_archived {
            self.push("is_archived must be true when archived_at is set");
        }
        if is_archived && archived_at.is_none() {
            self.push("archived_at is required when is_archived is true");
        }
    }

    /// Key/value length rules shared by release metadata, customer
    /// entitlements and custom fields.
    pub(crate) fn key_values(&mut self, map: &BTreeMap<String, String>, label: &str) {
        for (key, value) in map {
            if key.is_empty() {
                self.push(format!("{label} keys cannot be empty"));
            }
            if char_len(key) > MAX_METADATA_KEY_CHARS {
                self.push(format!(
                    "{label} keys must be {MAX_METADATA_KEY_CHARS} characters or less"
                ));
            }
            if char_len(value) > MAX_METADATA_VALUE_CHARS {
                self.push(format!(
                    "{label} values must be {MAX_METADATA_VALUE_CHARS} characters or less"
                ));
            }
        }
    }

    pub(crate) fn finish(self) -> Result<(), ValidationError> {
        if self.items.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(self.entity, self.items))
        }
    }
}
