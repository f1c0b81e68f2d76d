//! PostgreSQL stores built on runtime `sqlx` queries.
//!
//! Rows are read through `FromRow` structs and converted into domain types;
//! a row that no longer converts surfaces as [`StoreError::Corrupt`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;

use recordhook_core::config::PostgresConfig;
use recordhook_core::{DeliveryLogEntry, EntitySchema};
use recordhook_rules::Rule;

use crate::error::StoreError;
use crate::log_query::{DeliveryStats, LogFilter, LogPage, RuleStats};
use crate::traits::{DeliveryLogStore, RuleStore, SchemaCatalog};

/// Connect and apply pending migrations.
pub async fn connect(config: &PostgresConfig) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.connection_string())
        .await?;
    info!(host = %config.host, database = %config.database, "PostgreSQL connected");
    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("Database migrations applied successfully");
    Ok(())
}

fn map_unique_violation(e: sqlx::Error, id: Uuid) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::Conflict(id);
        }
    }
    StoreError::Database(e)
}

// ── Rules ───────────────────────────────────────────────────────────

const RULE_COLUMNS: &str = "id, tenant_id, entity_slug, name, description, trigger, condition, \
     webhook_url, webhook_headers, webhook_payload_template, enabled, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct RuleRow {
    id: Uuid,
    tenant_id: String,
    entity_slug: String,
    name: String,
    description: Option<String>,
    trigger: String,
    condition: serde_json::Value,
    webhook_url: String,
    webhook_headers: Json<BTreeMap<String, String>>,
    webhook_payload_template: Option<String>,
    enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RuleRow> for Rule {
    type Error = StoreError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        let trigger = row
            .trigger
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("rule {}: {e}", row.id)))?;
        Ok(Rule {
            id: row.id,
            tenant_id: row.tenant_id,
            entity_slug: row.entity_slug,
            name: row.name,
            description: row.description,
            trigger,
            condition: row.condition,
            webhook_url: row.webhook_url,
            webhook_headers: row.webhook_headers.0,
            webhook_payload_template: row.webhook_payload_template,
            enabled: row.enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub struct PgRuleStore {
    pool: PgPool,
}

impl PgRuleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleStore for PgRuleStore {
    async fn insert(&self, rule: &Rule) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO rules (id, tenant_id, entity_slug, name, description, trigger, condition,
                                webhook_url, webhook_headers, webhook_payload_template, enabled,
                                created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(rule.id)
        .bind(&rule.tenant_id)
        .bind(&rule.entity_slug)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.trigger.as_str())
        .bind(&rule.condition)
        .bind(&rule.webhook_url)
        .bind(Json(&rule.webhook_headers))
        .bind(&rule.webhook_payload_template)
        .bind(rule.enabled)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, rule.id))?;
        Ok(())
    }

    async fn update(&self, rule: &Rule) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE rules SET
                entity_slug = $3,
                name = $4,
                description = $5,
                trigger = $6,
                condition = $7,
                webhook_url = $8,
                webhook_headers = $9,
                webhook_payload_template = $10,
                enabled = $11,
                updated_at = $12
             WHERE id = $1 AND tenant_id = $2",
        )
        .bind(rule.id)
        .bind(&rule.tenant_id)
        .bind(&rule.entity_slug)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.trigger.as_str())
        .bind(&rule.condition)
        .bind(&rule.webhook_url)
        .bind(Json(&rule.webhook_headers))
        .bind(&rule.webhook_payload_template)
        .bind(rule.enabled)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(rule.id));
        }
        Ok(())
    }

    async fn delete(&self, tenant_id: &str, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM rules WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<Rule>, StoreError> {
        let row = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Rule::try_from).transpose()
    }

    async fn list(&self, tenant_id: &str, entity_slug: Option<&str>) -> Result<Vec<Rule>, StoreError> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM rules
             WHERE tenant_id = $1 AND ($2::text IS NULL OR entity_slug = $2)
             ORDER BY created_at, id"
        ))
        .bind(tenant_id)
        .bind(entity_slug)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Rule::try_from).collect()
    }

    async fn enabled_for(&self, tenant_id: &str, entity_slug: &str) -> Result<Vec<Rule>, StoreError> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM rules
             WHERE tenant_id = $1 AND entity_slug = $2 AND enabled
             ORDER BY created_at, id"
        ))
        .bind(tenant_id)
        .bind(entity_slug)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Rule::try_from).collect()
    }
}

// ── Delivery log ────────────────────────────────────────────────────

const LOG_COLUMNS: &str = "id, tenant_id, rule_id, job_id, record_id, attempt_count, requested_at, \
     duration_ms, http_status, response_excerpt, outcome, error";

#[derive(sqlx::FromRow)]
struct LogRow {
    id: Uuid,
    tenant_id: String,
    rule_id: Uuid,
    job_id: Uuid,
    record_id: String,
    attempt_count: i32,
    requested_at: DateTime<Utc>,
    duration_ms: i64,
    http_status: Option<i32>,
    response_excerpt: Option<String>,
    outcome: String,
    error: Option<String>,
}

impl TryFrom<LogRow> for DeliveryLogEntry {
    type Error = StoreError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str| StoreError::Corrupt(format!("delivery log {}: {what}", row.id));
        Ok(DeliveryLogEntry {
            id: row.id,
            tenant_id: row.tenant_id.clone(),
            rule_id: row.rule_id,
            job_id: row.job_id,
            record_id: row.record_id.clone(),
            attempt_count: u32::try_from(row.attempt_count).map_err(|_| corrupt("attempt_count"))?,
            requested_at: row.requested_at,
            duration_ms: u64::try_from(row.duration_ms).unwrap_or(0),
            http_status: row
                .http_status
                .map(u16::try_from)
                .transpose()
                .map_err(|_| corrupt("http_status"))?,
            response_excerpt: row.response_excerpt.clone(),
            outcome: row.outcome.parse().map_err(|_| corrupt("outcome"))?,
            error: row.error.clone(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    rule_id: Uuid,
    success_count: i64,
    failure_count: i64,
    last_attempt_at: DateTime<Utc>,
}

pub struct PgDeliveryLog {
    pool: PgPool,
}

impl PgDeliveryLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &LogFilter) {
    qb.push(" WHERE tenant_id = ").push_bind(filter.tenant_id.clone());
    if let Some(rule_id) = filter.rule_id {
        qb.push(" AND rule_id = ").push_bind(rule_id);
    }
    if let Some(record_id) = &filter.record_id {
        qb.push(" AND record_id = ").push_bind(record_id.clone());
    }
    if let Some(outcome) = filter.outcome {
        qb.push(" AND outcome = ").push_bind(outcome.as_str());
    }
    if let Some(from) = filter.from {
        qb.push(" AND requested_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND requested_at < ").push_bind(to);
    }
}

#[async_trait]
impl DeliveryLogStore for PgDeliveryLog {
    async fn append(&self, entry: &DeliveryLogEntry) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO delivery_logs ({LOG_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(entry.id)
        .bind(&entry.tenant_id)
        .bind(entry.rule_id)
        .bind(entry.job_id)
        .bind(&entry.record_id)
        .bind(i32::try_from(entry.attempt_count).unwrap_or(i32::MAX))
        .bind(entry.requested_at)
        .bind(i64::try_from(entry.duration_ms).unwrap_or(i64::MAX))
        .bind(entry.http_status.map(i32::from))
        .bind(&entry.response_excerpt)
        .bind(entry.outcome.as_str())
        .bind(&entry.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query(&self, filter: &LogFilter) -> Result<LogPage, StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM delivery_logs");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {LOG_COLUMNS} FROM delivery_logs"));
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY requested_at DESC, attempt_count DESC LIMIT ")
            .push_bind(i64::from(filter.page_size()))
            .push(" OFFSET ")
            .push_bind(i64::from(filter.page_offset()));
        let rows: Vec<LogRow> = select.build_query_as::<LogRow>().fetch_all(&self.pool).await?;

        let entries = rows
            .into_iter()
            .map(DeliveryLogEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LogPage::new(entries, u64::try_from(total).unwrap_or(0), filter))
    }

    async fn stats(&self, tenant_id: &str, recent_failures: usize) -> Result<DeliveryStats, StoreError> {
        let rows = sqlx::query_as::<_, StatsRow>(
            "SELECT rule_id,
                    COUNT(*) FILTER (WHERE outcome = 'success') AS success_count,
                    COUNT(*) FILTER (WHERE outcome <> 'success') AS failure_count,
                    MAX(requested_at) AS last_attempt_at
             FROM delivery_logs
             WHERE tenant_id = $1
             GROUP BY rule_id
             ORDER BY last_attempt_at DESC, rule_id",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        let failures = sqlx::query_as::<_, LogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM delivery_logs
             WHERE tenant_id = $1 AND outcome <> 'success'
             ORDER BY requested_at DESC
             LIMIT $2"
        ))
        .bind(tenant_id)
        .bind(i64::try_from(recent_failures).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(DeliveryStats {
            tenant_id: tenant_id.to_string(),
            rules: rows
                .into_iter()
                .map(|r| {
                    RuleStats::new(
                        r.rule_id,
                        u64::try_from(r.success_count).unwrap_or(0),
                        u64::try_from(r.failure_count).unwrap_or(0),
                        r.last_attempt_at,
                    )
                })
                .collect(),
            recent_failures: failures
                .into_iter()
                .map(DeliveryLogEntry::try_from)
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

// ── Schema catalog ──────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct EntityRow {
    tenant_id: String,
    slug: String,
    fields: Json<Vec<String>>,
}

impl From<EntityRow> for EntitySchema {
    fn from(row: EntityRow) -> Self {
        EntitySchema {
            tenant_id: row.tenant_id,
            slug: row.slug,
            fields: row.fields.0,
        }
    }
}

pub struct PgSchemaCatalog {
    pool: PgPool,
}

impl PgSchemaCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SchemaCatalog for PgSchemaCatalog {
    async fn entity(&self, tenant_id: &str, slug: &str) -> Result<Option<EntitySchema>, StoreError> {
        let row = sqlx::query_as::<_, EntityRow>(
            "SELECT tenant_id, slug, fields FROM entity_definitions WHERE tenant_id = $1 AND slug = $2",
        )
        .bind(tenant_id)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(EntitySchema::from))
    }

    async fn entities(&self, tenant_id: &str) -> Result<Vec<EntitySchema>, StoreError> {
        let rows = sqlx::query_as::<_, EntityRow>(
            "SELECT tenant_id, slug, fields FROM entity_definitions WHERE tenant_id = $1 ORDER BY slug",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(EntitySchema::from).collect())
    }
}
