use thiserror::Error;

/// Every rule an entity violated, in the order the rules were checked.
///
/// Renders as one multi-line message so an agent sees the complete
/// diagnostic in a single round-trip:
///
/// ```text
/// release validation errors:
///   - release version is required
///   - release status is required
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{entity} validation errors:\n  - {}", .violations.join("\n  - "))]
pub struct ValidationError {
    /// Lowercase entity kind (e.g. "application", "customer")
    pub entity: &'static str,
    /// Human/agent-readable rule descriptions
    pub violations: Vec<String>,
}

impl ValidationError {
    pub fn new(entity: &'static str, violations: Vec<String>) -> Self {
        Self { entity, violations }
    }

    /// True when any violation message contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.violations.iter().any(|v| v.contains(needle))
    }
}

/// Validation error codes surfaced to agents
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const ENTITY_INVALID: &str = "entity_invalid";
}
