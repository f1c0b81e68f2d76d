//! Webhook payload rendering.
//!
//! A rule without a template sends the default payload: the full record plus
//! rule and event metadata. A template is a minijinja string rendered against
//! the same context; its output must parse as JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use recordhook_core::{FieldMap, RecordEvent};

use crate::schema::{Rule, Trigger};

/// Errors produced while turning a template into a payload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PayloadError {
    #[error("template rendering failed: {0}")]
    Template(String),

    #[error("template output is not valid JSON (encode values with `| tojson`): {0}")]
    NotJson(String),
}

/// Rule metadata exposed to templates and included in the default payload.
#[derive(Debug, Clone, Serialize)]
pub struct RuleMeta {
    pub id: Uuid,
    pub name: String,
    pub entity_slug: String,
    pub trigger: Trigger,
}

impl From<&Rule> for RuleMeta {
    fn from(rule: &Rule) -> Self {
        Self {
            id: rule.id,
            name: rule.name.clone(),
            entity_slug: rule.entity_slug.clone(),
            trigger: rule.trigger,
        }
    }
}

/// Everything a payload can be built from.
#[derive(Debug, Clone, Serialize)]
pub struct PayloadContext {
    pub rule: RuleMeta,
    /// `create`, `update` or `delete`.
    pub event: String,
    pub tenant_id: String,
    pub record_id: String,
    pub record: FieldMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<FieldMap>,
    /// RFC 3339, UTC.
    pub triggered_at: String,
}

impl PayloadContext {
    pub fn new(rule: RuleMeta, event: &RecordEvent, triggered_at: DateTime<Utc>) -> Self {
        Self {
            rule,
            event: event.kind.as_str().to_string(),
            tenant_id: event.tenant_id.clone(),
            record_id: event.record_id.clone(),
            record: event.new_fields.clone(),
            previous: event.previous_fields.clone(),
            triggered_at: triggered_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Renders payload templates using minijinja.
///
/// Templates are per-rule strings, so a fresh environment is built per call.
#[derive(Debug, Clone, Default)]
pub struct PayloadRenderer {
    _private: (),
}

impl PayloadRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("lower", lower_filter);
        env.add_filter("upper", upper_filter);
        env
    }

    /// The payload sent when a rule has no template.
    pub fn default_payload(&self, ctx: &PayloadContext) -> Value {
        serde_json::to_value(ctx).unwrap_or(Value::Null)
    }

    /// Render `template` and parse the output as JSON.
    pub fn render(&self, template: &str, ctx: &PayloadContext) -> Result<Value, PayloadError> {
        let env = Self::build_env();
        let rendered = env
            .render_str(template, ctx)
            .map_err(|e| PayloadError::Template(e.to_string()))?;
        serde_json::from_str(&rendered).map_err(|e| PayloadError::NotJson(e.to_string()))
    }

    /// Check template syntax without rendering.
    pub fn validate(&self, template: &str) -> Result<(), PayloadError> {
        let env = Self::build_env();
        env.template_from_str(template)
            .map_err(|e| PayloadError::Template(e.to_string()))?;
        Ok(())
    }

    /// `{{ ... }}` expressions whose output is not passed through `tojson`.
    /// Such a value breaks the JSON as soon as it holds a quote or is not a
    /// string.
    pub fn unencoded_expressions(&self, template: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else { break };
            let expr = after[..end].trim_matches(|c: char| c == '-' || c.is_whitespace());
            let last_filter = expr.rsplit('|').next().unwrap_or_default().trim();
            if !expr.contains('|') || !last_filter.starts_with("tojson") {
                found.push(expr.to_string());
            }
            rest = &after[end + 2..];
        }
        found
    }

    /// Build the payload for a match. A failing template falls back to the
    /// default payload and the error is returned alongside it.
    pub fn resolve(&self, template: Option<&str>, ctx: &PayloadContext) -> (Value, Option<PayloadError>) {
        match template {
            None => (self.default_payload(ctx), None),
            Some(t) => match self.render(t, ctx) {
                Ok(payload) => (payload, None),
                Err(e) => (self.default_payload(ctx), Some(e)),
            },
        }
    }
}

fn lower_filter(value: String) -> String {
    value.to_lowercase()
}

fn upper_filter(value: String) -> String {
    value.to_uppercase()
}
