//! Save-time rule validation with structured errors and suggestions.
//!
//! Checks a [`RuleDraft`] before it is persisted: rule metadata, condition
//! structure, field references against the tenant's entity schema, and the
//! webhook target. Returns a [`ValidationResult`] with errors (block save)
//! and warnings (advisory).

mod condition_checks;
mod rule_checks;
mod webhook_checks;

pub mod fuzzy;

use recordhook_core::EntitySchema;
use serde::{Deserialize, Serialize};

use crate::schema::RuleDraft;

// ── Result types ────────────────────────────────────────────────────

/// Overall validation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// A blocking validation error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationError {
    /// JSON-path-like location, e.g. `"condition.children[0].field"`.
    pub path: String,
    pub message: String,
    /// Optional "Did you mean …?" suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// A non-blocking advisory warning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationResult {
    pub(crate) fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        });
    }

    /// Record an error, attaching a suggestion when one is available.
    pub(crate) fn error_maybe_suggest(
        &mut self,
        path: impl Into<String>,
        message: impl Into<String>,
        suggestion: Option<&str>,
    ) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: suggestion.map(|s| format!("Did you mean '{s}'?")),
        });
    }

    pub(crate) fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }

    /// One-line reason for API responses: the first error, if any.
    pub fn reason(&self) -> Option<String> {
        self.errors.first().map(|e| {
            if e.path.is_empty() {
                e.message.clone()
            } else {
                format!("{}: {}", e.path, e.message)
            }
        })
    }
}

/// Entity schema context a draft is validated against.
#[derive(Debug, Clone, Copy)]
pub struct SchemaScope<'a> {
    /// The schema of `draft.entity_slug`, if the tenant has that entity.
    pub entity: Option<&'a EntitySchema>,
    /// All entity slugs of the tenant, for suggestions.
    pub known_entities: &'a [String],
}

// ── Public API ──────────────────────────────────────────────────────

/// Validate a draft against the tenant's schema. Used by create and update.
pub fn validate_draft(draft: &RuleDraft, scope: SchemaScope<'_>) -> ValidationResult {
    let mut result = validate_structure(draft);
    rule_checks::validate_entity(draft, scope, &mut result);
    if let Some(entity) = scope.entity {
        condition_checks::validate_field_references(&draft.condition, entity, &mut result);
    }
    tracing::debug!(
        entity = %draft.entity_slug,
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        "validated rule draft"
    );
    result
}

/// Validate everything that does not need the tenant's schema.
pub fn validate_structure(draft: &RuleDraft) -> ValidationResult {
    let mut result = ValidationResult::new();
    rule_checks::validate_metadata(draft, &mut result);
    condition_checks::validate_condition(&draft.condition, draft.trigger, &mut result);
    webhook_checks::validate_webhook(draft, &mut result);
    result
}

/// Parse a YAML (or JSON, which is valid YAML) draft and validate its structure.
pub fn validate_yaml(yaml: &str) -> ValidationResult {
    match serde_yaml::from_str::<RuleDraft>(yaml) {
        Ok(draft) => validate_structure(&draft),
        Err(e) => {
            let mut result = ValidationResult::new();
            result.error("", format!("parse error: {e}"));
            result
        }
    }
}
