//! Record lifecycle events emitted by the entity storage layer.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Field values of one record, keyed by declared field name.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// Kind of record mutation that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordEventKind {
    Create,
    Update,
    Delete,
}

impl RecordEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordEventKind::Create => "create",
            RecordEventKind::Update => "update",
            RecordEventKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for RecordEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed record mutation.
///
/// Delivered at-least-once: the same mutation may arrive twice and is
/// processed twice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordEvent {
    pub tenant_id: String,
    pub entity_slug: String,
    pub record_id: String,
    pub kind: RecordEventKind,
    /// Field values after the mutation (for deletes, the last known values).
    pub new_fields: FieldMap,
    /// Field values before the mutation, when the storage layer has them.
    #[serde(default)]
    pub previous_fields: Option<FieldMap>,
}

impl RecordEvent {
    pub fn created(
        tenant_id: impl Into<String>,
        entity_slug: impl Into<String>,
        record_id: impl Into<String>,
        fields: FieldMap,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            entity_slug: entity_slug.into(),
            record_id: record_id.into(),
            kind: RecordEventKind::Create,
            new_fields: fields,
            previous_fields: None,
        }
    }

    pub fn updated(
        tenant_id: impl Into<String>,
        entity_slug: impl Into<String>,
        record_id: impl Into<String>,
        fields: FieldMap,
        previous: FieldMap,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            entity_slug: entity_slug.into(),
            record_id: record_id.into(),
            kind: RecordEventKind::Update,
            new_fields: fields,
            previous_fields: Some(previous),
        }
    }

    pub fn deleted(
        tenant_id: impl Into<String>,
        entity_slug: impl Into<String>,
        record_id: impl Into<String>,
        fields: FieldMap,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            entity_slug: entity_slug.into(),
            record_id: record_id.into(),
            kind: RecordEventKind::Delete,
            new_fields: fields,
            previous_fields: None,
        }
    }

    /// Reject events missing the identifiers needed for routing.
    pub fn check(&self) -> Result<(), CoreError> {
        if self.tenant_id.trim().is_empty() {
            return Err(CoreError::InvalidEvent("tenant_id is empty".into()));
        }
        if self.entity_slug.trim().is_empty() {
            return Err(CoreError::InvalidEvent("entity_slug is empty".into()));
        }
        if self.record_id.trim().is_empty() {
            return Err(CoreError::InvalidEvent("record_id is empty".into()));
        }
        Ok(())
    }
}

/// Build a [`FieldMap`] from a `serde_json::json!({...})` object literal.
///
/// Non-object values yield an empty map.
pub fn fields_from_json(value: serde_json::Value) -> FieldMap {
    match value {
        serde_json::Value::Object(map) => map,
        _ => FieldMap::new(),
    }
}
