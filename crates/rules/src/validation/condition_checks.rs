//! Condition tree checks: structure, operator/trigger fit, field references.

use recordhook_core::EntitySchema;

use crate::schema::{Condition, Operator, Trigger};

use super::fuzzy::fuzzy_match;
use super::ValidationResult;

pub(super) fn validate_condition(condition: &Condition, trigger: Trigger, result: &mut ValidationResult) {
    for problem in condition.structural_errors() {
        result.error(problem.path(), problem.to_string());
    }

    if condition.is_empty() {
        result.warn("condition", "Empty condition matches every record");
    }

    for (path, _, operator) in condition.leaves() {
        if operator != Operator::Changed {
            continue;
        }
        if !trigger.sees_updates() {
            result.error(
                format!("{path}.operator"),
                format!("'changed' only applies to updates; trigger is {trigger}"),
            );
        } else if trigger == Trigger::OnCreateOrUpdate {
            result.warn(
                format!("{path}.operator"),
                "'changed' never matches on create events",
            );
        }
    }
}

pub(super) fn validate_field_references(
    condition: &Condition,
    entity: &EntitySchema,
    result: &mut ValidationResult,
) {
    let declared = entity.field_names();
    for (path, field, _) in condition.leaves() {
        if field.trim().is_empty() || entity.has_field(field) {
            continue;
        }
        result.error_maybe_suggest(
            format!("{path}.field"),
            format!("Unknown field '{field}' on entity '{}'", entity.slug),
            fuzzy_match(field, &declared),
        );
    }
}
