//! Rule metadata and entity reference checks.

use crate::schema::RuleDraft;

use super::fuzzy::fuzzy_match;
use super::{SchemaScope, ValidationResult};

const MAX_NAME_LEN: usize = 200;

pub(super) fn validate_metadata(draft: &RuleDraft, result: &mut ValidationResult) {
    let name = draft.name.trim();
    if name.is_empty() {
        result.error("name", "Rule name must not be empty");
    } else if name.chars().count() > MAX_NAME_LEN {
        result.error(
            "name",
            format!("Rule name must be at most {MAX_NAME_LEN} characters"),
        );
    }

    if draft.entity_slug.trim().is_empty() {
        result.error("entity_slug", "entity_slug must not be empty");
    }

    if !draft.enabled {
        result.warn("enabled", "Rule is saved disabled and will not fire");
    }
}

pub(super) fn validate_entity(
    draft: &RuleDraft,
    scope: SchemaScope<'_>,
    result: &mut ValidationResult,
) {
    if scope.entity.is_some() || draft.entity_slug.trim().is_empty() {
        return;
    }
    let candidates: Vec<&str> = scope.known_entities.iter().map(String::as_str).collect();
    result.error_maybe_suggest(
        "entity_slug",
        format!("Unknown entity '{}'", draft.entity_slug),
        fuzzy_match(&draft.entity_slug, &candidates),
    );
}
