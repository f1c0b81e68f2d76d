//! Store traits shared by the in-memory and PostgreSQL backends.

use async_trait::async_trait;
use uuid::Uuid;

use recordhook_core::{DeliveryLogEntry, EntitySchema};
use recordhook_rules::Rule;

use crate::error::StoreError;
use crate::log_query::{DeliveryStats, LogFilter, LogPage};

/// Tenant-scoped CRUD over rule definitions.
///
/// Reads return owned snapshots; updates replace the whole row, so a reader
/// never observes a half-applied edit.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn insert(&self, rule: &Rule) -> Result<(), StoreError>;

    /// Replace the row with `rule.id` owned by `rule.tenant_id`.
    async fn update(&self, rule: &Rule) -> Result<(), StoreError>;

    async fn delete(&self, tenant_id: &str, id: Uuid) -> Result<(), StoreError>;

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<Rule>, StoreError>;

    /// All rules of a tenant, oldest first, optionally for one entity.
    async fn list(&self, tenant_id: &str, entity_slug: Option<&str>) -> Result<Vec<Rule>, StoreError>;

    /// Enabled rules of one entity: the dispatcher's candidate set.
    async fn enabled_for(&self, tenant_id: &str, entity_slug: &str) -> Result<Vec<Rule>, StoreError>;
}

/// Append-only log of delivery attempts.
#[async_trait]
pub trait DeliveryLogStore: Send + Sync {
    async fn append(&self, entry: &DeliveryLogEntry) -> Result<(), StoreError>;

    /// Entries matching `filter`, newest first.
    async fn query(&self, filter: &LogFilter) -> Result<LogPage, StoreError>;

    /// Per-rule aggregates computed from the stored entries at read time.
    async fn stats(&self, tenant_id: &str, recent_failures: usize) -> Result<DeliveryStats, StoreError>;
}

/// Read side of the external entity schema catalog.
#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    async fn entity(&self, tenant_id: &str, slug: &str) -> Result<Option<EntitySchema>, StoreError>;

    async fn entities(&self, tenant_id: &str) -> Result<Vec<EntitySchema>, StoreError>;
}
