//! Rule service: tenant-scoped rule CRUD with save-time validation, the
//! rule tester, delivery log queries and per-rule diagnostics.
//!
//! Every read returns rules with header values masked; only the dispatcher
//! sees the real values.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use recordhook_notify::Clock;
use recordhook_rules::diagnostics::{Diagnostic, DiagnosticQuery, Diagnostics};
use recordhook_rules::validation::{validate_draft, SchemaScope, ValidationWarning};
use recordhook_rules::{Rule, RuleDraft};
use recordhook_storage::log_query::DEFAULT_RECENT_FAILURES;
use recordhook_storage::{DeliveryLogStore, DeliveryStats, LogFilter, LogPage, RuleStore, SchemaCatalog, StoreError};

use crate::error::EngineError;
use crate::tester::{RuleTester, TestRuleRequest, TestRuleResponse};

/// A created or updated rule plus the advisory warnings from validation.
#[derive(Debug, Clone, Serialize)]
pub struct SavedRule {
    #[serde(flatten)]
    pub rule: Rule,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ValidationWarning>,
}

pub struct RuleService {
    rules: Arc<dyn RuleStore>,
    log: Arc<dyn DeliveryLogStore>,
    catalog: Arc<dyn SchemaCatalog>,
    diagnostics: Diagnostics,
    tester: RuleTester,
    clock: Arc<dyn Clock>,
}

impl RuleService {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        log: Arc<dyn DeliveryLogStore>,
        catalog: Arc<dyn SchemaCatalog>,
        diagnostics: Diagnostics,
        tester: RuleTester,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rules,
            log,
            catalog,
            diagnostics,
            tester,
            clock,
        }
    }

    // ── Rules ───────────────────────────────────────────────────────

    pub async fn create_rule(&self, tenant_id: &str, draft: RuleDraft) -> Result<SavedRule, EngineError> {
        let warnings = self.validate(tenant_id, &draft).await?;
        let rule = Rule::from_draft(tenant_id, draft, self.clock.now());
        self.rules.insert(&rule).await?;
        info!(tenant_id, rule_id = %rule.id, entity = %rule.entity_slug, "rule created");
        Ok(SavedRule {
            rule: rule.redacted(),
            warnings,
        })
    }

    /// Replace a rule's editable fields. Jobs already enqueued keep the
    /// target they were created with.
    pub async fn update_rule(&self, tenant_id: &str, id: Uuid, draft: RuleDraft) -> Result<SavedRule, EngineError> {
        let mut rule = self
            .rules
            .get(tenant_id, id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        let warnings = self.validate(tenant_id, &draft).await?;
        rule.apply_draft(draft, self.clock.now());
        self.rules.update(&rule).await.map_err(not_found_as_engine)?;
        info!(tenant_id, rule_id = %rule.id, enabled = rule.enabled, "rule updated");
        Ok(SavedRule {
            rule: rule.redacted(),
            warnings,
        })
    }

    pub async fn delete_rule(&self, tenant_id: &str, id: Uuid) -> Result<(), EngineError> {
        self.rules.delete(tenant_id, id).await.map_err(not_found_as_engine)?;
        self.diagnostics.clear(id);
        info!(tenant_id, rule_id = %id, "rule deleted");
        Ok(())
    }

    pub async fn get_rule(&self, tenant_id: &str, id: Uuid) -> Result<Rule, EngineError> {
        self.rules
            .get(tenant_id, id)
            .await?
            .map(|r| r.redacted())
            .ok_or(EngineError::NotFound(id))
    }

    pub async fn list_rules(&self, tenant_id: &str, entity_slug: Option<&str>) -> Result<Vec<Rule>, EngineError> {
        let rules = self.rules.list(tenant_id, entity_slug).await?;
        Ok(rules.iter().map(Rule::redacted).collect())
    }

    async fn validate(&self, tenant_id: &str, draft: &RuleDraft) -> Result<Vec<ValidationWarning>, EngineError> {
        let entities = self.catalog.entities(tenant_id).await?;
        let known: Vec<String> = entities.iter().map(|e| e.slug.clone()).collect();
        let scope = SchemaScope {
            entity: entities.iter().find(|e| e.slug == draft.entity_slug),
            known_entities: &known,
        };
        let result = validate_draft(draft, scope);
        if !result.valid {
            return Err(EngineError::Validation(result));
        }
        Ok(result.warnings)
    }

    // ── Tester ──────────────────────────────────────────────────────

    pub async fn test_rule(&self, tenant_id: &str, request: TestRuleRequest) -> Result<TestRuleResponse, EngineError> {
        self.tester.test_rule(tenant_id, request).await
    }

    // ── Delivery log ────────────────────────────────────────────────

    /// Log entries of the tenant matching `filter`. The tenant scope always
    /// comes from `tenant_id`, whatever `filter` carries.
    pub async fn list_delivery_logs(&self, tenant_id: &str, mut filter: LogFilter) -> Result<LogPage, EngineError> {
        filter.tenant_id = tenant_id.to_string();
        Ok(self.log.query(&filter).await?)
    }

    pub async fn get_delivery_stats(&self, tenant_id: &str, recent_failures: Option<usize>) -> Result<DeliveryStats, EngineError> {
        let recent = recent_failures.unwrap_or(DEFAULT_RECENT_FAILURES);
        Ok(self.log.stats(tenant_id, recent).await?)
    }

    // ── Diagnostics ─────────────────────────────────────────────────

    pub async fn rule_diagnostics(
        &self,
        tenant_id: &str,
        id: Uuid,
        query: &DiagnosticQuery,
    ) -> Result<Vec<Diagnostic>, EngineError> {
        if self.rules.get(tenant_id, id).await?.is_none() {
            return Err(EngineError::NotFound(id));
        }
        Ok(self.diagnostics.query(id, query))
    }
}

fn not_found_as_engine(e: StoreError) -> EngineError {
    match e {
        StoreError::NotFound(id) => EngineError::NotFound(id),
        other => EngineError::Store(other),
    }
}
