//! Tenant entity schemas as exposed by the external schema catalog.

use serde::{Deserialize, Serialize};

/// Declared shape of one user-defined entity type.
///
/// Only the field names matter to rule validation; field types belong
/// to the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub tenant_id: String,
    pub slug: String,
    pub fields: Vec<String>,
}

impl EntitySchema {
    pub fn new(
        tenant_id: impl Into<String>,
        slug: impl Into<String>,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            slug: slug.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(String::as_str).collect()
    }
}
