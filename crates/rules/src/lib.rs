//! Rule definitions and condition evaluation for record webhooks.
//!
//! This crate provides:
//! - The rule model and its condition tree (leaf clauses grouped by AND/OR)
//! - A pure evaluator over record field values
//! - Save-time validation against a tenant's entity schema, with suggestions
//! - Webhook payload rendering (default payload or minijinja template)
//! - A bounded per-rule diagnostics buffer for configuration errors

pub mod diagnostics;
pub mod evaluator;
pub mod payload;
pub mod schema;
pub mod validation;

pub use evaluator::evaluate;
pub use schema::{Condition, ConditionError, GroupOp, Operator, Rule, RuleDraft, Trigger};
