//! In-memory stores for tests and single-node development.
//!
//! State lives behind `tokio::sync::RwLock`; every read returns owned clones.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use recordhook_core::{DeliveryLogEntry, EntitySchema};
use recordhook_rules::Rule;

use crate::error::StoreError;
use crate::log_query::{aggregate, DeliveryStats, LogFilter, LogPage};
use crate::traits::{DeliveryLogStore, RuleStore, SchemaCatalog};

// ── Rules ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryRuleStore {
    rules: RwLock<HashMap<Uuid, Rule>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn insert(&self, rule: &Rule) -> Result<(), StoreError> {
        let mut rules = self.rules.write().await;
        if rules.contains_key(&rule.id) {
            return Err(StoreError::Conflict(rule.id));
        }
        rules.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn update(&self, rule: &Rule) -> Result<(), StoreError> {
        let mut rules = self.rules.write().await;
        match rules.get_mut(&rule.id) {
            Some(existing) if existing.tenant_id == rule.tenant_id => {
                *existing = rule.clone();
                Ok(())
            }
            _ => Err(StoreError::NotFound(rule.id)),
        }
    }

    async fn delete(&self, tenant_id: &str, id: Uuid) -> Result<(), StoreError> {
        let mut rules = self.rules.write().await;
        match rules.get(&id) {
            Some(rule) if rule.tenant_id == tenant_id => {
                rules.remove(&id);
                Ok(())
            }
            _ => Err(StoreError::NotFound(id)),
        }
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<Rule>, StoreError> {
        let rules = self.rules.read().await;
        Ok(rules.get(&id).filter(|r| r.tenant_id == tenant_id).cloned())
    }

    async fn list(&self, tenant_id: &str, entity_slug: Option<&str>) -> Result<Vec<Rule>, StoreError> {
        let rules = self.rules.read().await;
        let mut out: Vec<Rule> = rules
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .filter(|r| entity_slug.map_or(true, |e| r.entity_slug == e))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn enabled_for(&self, tenant_id: &str, entity_slug: &str) -> Result<Vec<Rule>, StoreError> {
        let mut out = self.list(tenant_id, Some(entity_slug)).await?;
        out.retain(|r| r.enabled);
        Ok(out)
    }
}

// ── Delivery log ────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryDeliveryLog {
    entries: RwLock<Vec<DeliveryLogEntry>>,
}

impl MemoryDeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored entry in append order.
    pub async fn all(&self) -> Vec<DeliveryLogEntry> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl DeliveryLogStore for MemoryDeliveryLog {
    async fn append(&self, entry: &DeliveryLogEntry) -> Result<(), StoreError> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn query(&self, filter: &LogFilter) -> Result<LogPage, StoreError> {
        let entries = self.entries.read().await;
        let mut matching: Vec<&DeliveryLogEntry> = entries.iter().filter(|e| filter.matches(e)).collect();
        // Newest first; append order breaks ties so attempts of a job stay ordered.
        matching.reverse();
        matching.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));

        let total = matching.len() as u64;
        let page: Vec<DeliveryLogEntry> = matching
            .into_iter()
            .skip(filter.page_offset() as usize)
            .take(filter.page_size() as usize)
            .cloned()
            .collect();
        Ok(LogPage::new(page, total, filter))
    }

    async fn stats(&self, tenant_id: &str, recent_failures: usize) -> Result<DeliveryStats, StoreError> {
        let entries = self.entries.read().await;
        Ok(aggregate(tenant_id, entries.iter(), recent_failures))
    }
}

// ── Schema catalog ──────────────────────────────────────────────────

#[derive(Default)]
pub struct MemorySchemaCatalog {
    entities: RwLock<HashMap<(String, String), EntitySchema>>,
}

impl MemorySchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a YAML list of entity schemas:
    ///
    /// ```yaml
    /// - tenant_id: acme
    ///   slug: tickets
    ///   fields: [priority, status]
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self, StoreError> {
        let schemas: Vec<EntitySchema> = serde_yaml::from_str(yaml)?;
        let entities = schemas
            .into_iter()
            .map(|s| ((s.tenant_id.clone(), s.slug.clone()), s))
            .collect();
        Ok(Self {
            entities: RwLock::new(entities),
        })
    }

    pub async fn upsert(&self, schema: EntitySchema) {
        let key = (schema.tenant_id.clone(), schema.slug.clone());
        self.entities.write().await.insert(key, schema);
    }
}

#[async_trait]
impl SchemaCatalog for MemorySchemaCatalog {
    async fn entity(&self, tenant_id: &str, slug: &str) -> Result<Option<EntitySchema>, StoreError> {
        let entities = self.entities.read().await;
        Ok(entities.get(&(tenant_id.to_string(), slug.to_string())).cloned())
    }

    async fn entities(&self, tenant_id: &str) -> Result<Vec<EntitySchema>, StoreError> {
        let entities = self.entities.read().await;
        let mut out: Vec<EntitySchema> = entities
            .values()
            .filter(|s| s.tenant_id == tenant_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(out)
    }
}
