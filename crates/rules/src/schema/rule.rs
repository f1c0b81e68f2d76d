//! Rule definitions: trigger, condition and webhook target, owned by a tenant.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use recordhook_core::{CoreError, RecordEventKind};

use super::condition::{Condition, ConditionError};

/// Placeholder shown instead of header values outside the delivery path.
pub const REDACTED: &str = "********";

/// Record lifecycle events a rule reacts to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    OnCreate,
    OnUpdate,
    OnDelete,
    OnCreateOrUpdate,
}

impl Trigger {
    pub fn fires_on(&self, kind: RecordEventKind) -> bool {
        matches!(
            (self, kind),
            (Trigger::OnCreate, RecordEventKind::Create)
                | (Trigger::OnUpdate, RecordEventKind::Update)
                | (Trigger::OnDelete, RecordEventKind::Delete)
                | (Trigger::OnCreateOrUpdate, RecordEventKind::Create)
                | (Trigger::OnCreateOrUpdate, RecordEventKind::Update)
        )
    }

    /// Whether the triggering event can ever carry a previous state.
    pub fn sees_updates(&self) -> bool {
        matches!(self, Trigger::OnUpdate | Trigger::OnCreateOrUpdate)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::OnCreate => "on_create",
            Trigger::OnUpdate => "on_update",
            Trigger::OnDelete => "on_delete",
            Trigger::OnCreateOrUpdate => "on_create_or_update",
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Trigger {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_create" => Ok(Trigger::OnCreate),
            "on_update" => Ok(Trigger::OnUpdate),
            "on_delete" => Ok(Trigger::OnDelete),
            "on_create_or_update" => Ok(Trigger::OnCreateOrUpdate),
            other => Err(CoreError::UnknownTrigger(other.to_string())),
        }
    }
}

/// A persisted rule.
///
/// `condition` holds the tree exactly as stored. It is compiled on every
/// read so that a row which no longer parses only disables itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    pub id: Uuid,
    pub tenant_id: String,
    pub entity_slug: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub trigger: Trigger,
    pub condition: serde_json::Value,
    pub webhook_url: String,
    #[serde(default)]
    pub webhook_headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_payload_template: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Client-supplied rule fields for create and update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleDraft {
    pub entity_slug: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub trigger: Trigger,
    #[serde(default)]
    pub condition: Condition,
    pub webhook_url: String,
    #[serde(default)]
    pub webhook_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub webhook_payload_template: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    /// Build a new rule from a validated draft.
    pub fn from_draft(tenant_id: impl Into<String>, draft: RuleDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            entity_slug: draft.entity_slug,
            name: draft.name,
            description: draft.description,
            trigger: draft.trigger,
            condition: draft.condition.to_value(),
            webhook_url: draft.webhook_url,
            webhook_headers: draft.webhook_headers,
            webhook_payload_template: draft.webhook_payload_template,
            enabled: draft.enabled,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace every client-editable field, keeping identity and creation time.
    ///
    /// A header sent back as [`REDACTED`] keeps its stored value, so a rule
    /// read through the API can be edited and saved without losing secrets.
    pub fn apply_draft(&mut self, draft: RuleDraft, now: DateTime<Utc>) {
        let headers = unmask_headers(draft.webhook_headers, &self.webhook_headers);
        self.entity_slug = draft.entity_slug;
        self.name = draft.name;
        self.description = draft.description;
        self.trigger = draft.trigger;
        self.condition = draft.condition.to_value();
        self.webhook_url = draft.webhook_url;
        self.webhook_headers = headers;
        self.webhook_payload_template = draft.webhook_payload_template;
        self.enabled = draft.enabled;
        self.updated_at = now;
    }

    pub fn compiled_condition(&self) -> Result<Condition, ConditionError> {
        Condition::compile(&self.condition)
    }

    /// Copy with header values masked, for API responses and logs.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.webhook_headers = redact_headers(&self.webhook_headers);
        copy
    }
}

pub fn redact_headers(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    headers
        .keys()
        .map(|k| (k.clone(), REDACTED.to_string()))
        .collect()
}

fn unmask_headers(
    incoming: BTreeMap<String, String>,
    stored: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    incoming
        .into_iter()
        .map(|(name, value)| match stored.get(&name) {
            Some(current) if value == REDACTED => (name, current.clone()),
            _ => (name, value),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Operator;
    use serde_json::json;

    fn draft() -> RuleDraft {
        serde_yaml::from_str(
            r#"
entity_slug: tickets
name: Escalate high priority
trigger: on_create
condition:
  type: leaf
  field: priority
  operator: equals
  value: high
webhook_url: https://hooks.example.com/escalate
webhook_headers:
  Authorization: Bearer s3cret
"#,
        )
        .unwrap()
    }

    #[test]
    fn draft_defaults_to_enabled() {
        let d = draft();
        assert!(d.enabled);
        assert_eq!(d.webhook_payload_template, None);
    }

    #[test]
    fn missing_condition_defaults_to_always() {
        let d: RuleDraft = serde_json::from_value(json!({
            "entity_slug": "tickets",
            "name": "everything",
            "trigger": "on_delete",
            "webhook_url": "https://example.com"
        }))
        .unwrap();
        assert!(d.condition.is_empty());
    }

    #[test]
    fn from_draft_stores_condition_as_json() {
        let rule = Rule::from_draft("t1", draft(), Utc::now());
        assert_eq!(rule.condition["operator"], json!("equals"));
        let compiled = rule.compiled_condition().unwrap();
        assert_eq!(
            compiled,
            Condition::leaf("priority", Operator::Equals, Some(json!("high")))
        );
    }

    #[test]
    fn apply_draft_keeps_identity() {
        let created = Utc::now() - chrono::Duration::hours(1);
        let mut rule = Rule::from_draft("t1", draft(), created);
        let id = rule.id;
        let mut d = draft();
        d.name = "Renamed".into();
        d.enabled = false;
        rule.apply_draft(d, Utc::now());
        assert_eq!(rule.id, id);
        assert_eq!(rule.created_at, created);
        assert!(rule.updated_at > created);
        assert_eq!(rule.name, "Renamed");
        assert!(!rule.enabled);
    }

    #[test]
    fn redacted_masks_header_values() {
        let rule = Rule::from_draft("t1", draft(), Utc::now());
        let shown = rule.redacted();
        assert_eq!(shown.webhook_headers["Authorization"], REDACTED);
        assert_eq!(rule.webhook_headers["Authorization"], "Bearer s3cret");
    }

    #[test]
    fn masked_headers_keep_stored_values() {
        let mut rule = Rule::from_draft("t1", draft(), Utc::now());
        let mut d = draft();
        d.webhook_headers = rule.redacted().webhook_headers;
        d.webhook_headers.insert("X-Team".into(), "ops".into());
        rule.apply_draft(d, Utc::now());
        assert_eq!(rule.webhook_headers["Authorization"], "Bearer s3cret");
        assert_eq!(rule.webhook_headers["X-Team"], "ops");
    }

    #[test]
    fn masked_value_for_new_header_is_taken_literally() {
        let mut rule = Rule::from_draft("t1", draft(), Utc::now());
        let mut d = draft();
        d.webhook_headers = BTreeMap::from([("X-New".to_string(), REDACTED.to_string())]);
        rule.apply_draft(d, Utc::now());
        assert_eq!(rule.webhook_headers.len(), 1);
        assert_eq!(rule.webhook_headers["X-New"], REDACTED);
    }

    #[test]
    fn trigger_matrix() {
        use RecordEventKind::*;
        assert!(Trigger::OnCreate.fires_on(Create));
        assert!(!Trigger::OnCreate.fires_on(Update));
        assert!(Trigger::OnUpdate.fires_on(Update));
        assert!(!Trigger::OnUpdate.fires_on(Delete));
        assert!(Trigger::OnDelete.fires_on(Delete));
        assert!(Trigger::OnCreateOrUpdate.fires_on(Create));
        assert!(Trigger::OnCreateOrUpdate.fires_on(Update));
        assert!(!Trigger::OnCreateOrUpdate.fires_on(Delete));
    }

    #[test]
    fn trigger_parses_from_str() {
        assert_eq!("on_update".parse::<Trigger>().unwrap(), Trigger::OnUpdate);
        assert!("on_touch".parse::<Trigger>().is_err());
    }
}
