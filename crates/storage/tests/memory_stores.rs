//! Behavioural tests for the in-memory stores.

use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use recordhook_core::{DeliveryLogEntry, DeliveryOutcome};
use recordhook_rules::{Condition, Operator, Rule, RuleDraft, Trigger};
use recordhook_storage::{
    DeliveryLogStore, LogFilter, MemoryDeliveryLog, MemoryRuleStore, MemorySchemaCatalog, RuleStore,
    SchemaCatalog, StoreError,
};

fn draft(entity: &str, enabled: bool) -> RuleDraft {
    RuleDraft {
        entity_slug: entity.into(),
        name: format!("{entity} rule"),
        description: None,
        trigger: Trigger::OnCreate,
        condition: Condition::leaf("priority", Operator::Equals, Some(json!("high"))),
        webhook_url: "https://hooks.example.com/x".into(),
        webhook_headers: Default::default(),
        webhook_payload_template: None,
        enabled,
    }
}

fn attempt(tenant: &str, rule: Uuid, record: &str, outcome: DeliveryOutcome, secs_ago: i64) -> DeliveryLogEntry {
    DeliveryLogEntry {
        id: Uuid::new_v4(),
        tenant_id: tenant.into(),
        rule_id: rule,
        job_id: Uuid::new_v4(),
        record_id: record.into(),
        attempt_count: 1,
        requested_at: Utc::now() - Duration::seconds(secs_ago),
        duration_ms: 5,
        http_status: Some(200),
        response_excerpt: None,
        outcome,
        error: None,
    }
}

// ── Rules ───────────────────────────────────────────────────

#[tokio::test]
async fn rules_are_tenant_scoped() {
    let store = MemoryRuleStore::new();
    let rule = Rule::from_draft("acme", draft("tickets", true), Utc::now());
    store.insert(&rule).await.unwrap();

    assert!(store.get("acme", rule.id).await.unwrap().is_some());
    assert!(store.get("globex", rule.id).await.unwrap().is_none());
    assert!(store.list("globex", None).await.unwrap().is_empty());
    assert!(matches!(
        store.delete("globex", rule.id).await,
        Err(StoreError::NotFound(_))
    ));

    let mut foreign = rule.clone();
    foreign.tenant_id = "globex".into();
    assert!(matches!(store.update(&foreign).await, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn duplicate_insert_conflicts() {
    let store = MemoryRuleStore::new();
    let rule = Rule::from_draft("acme", draft("tickets", true), Utc::now());
    store.insert(&rule).await.unwrap();
    let err = store.insert(&rule).await.unwrap_err();
    assert_eq!(err.status_code(), 409);
}

#[tokio::test]
async fn enabled_for_filters_entity_and_flag() {
    let store = MemoryRuleStore::new();
    let on = Rule::from_draft("acme", draft("tickets", true), Utc::now());
    let off = Rule::from_draft("acme", draft("tickets", false), Utc::now());
    let other = Rule::from_draft("acme", draft("orders", true), Utc::now());
    for r in [&on, &off, &other] {
        store.insert(r).await.unwrap();
    }

    let candidates = store.enabled_for("acme", "tickets").await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].id, on.id);

    assert_eq!(store.list("acme", Some("tickets")).await.unwrap().len(), 2);
    assert_eq!(store.list("acme", None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn reads_are_snapshots() {
    let store = MemoryRuleStore::new();
    let mut rule = Rule::from_draft("acme", draft("tickets", true), Utc::now());
    store.insert(&rule).await.unwrap();
    let snapshot = store.get("acme", rule.id).await.unwrap().unwrap();

    rule.enabled = false;
    store.update(&rule).await.unwrap();

    assert!(snapshot.enabled);
    assert!(store.enabled_for("acme", "tickets").await.unwrap().is_empty());
}

// ── Delivery log ────────────────────────────────────────────

#[tokio::test]
async fn query_filters_and_pages_newest_first() {
    let log = MemoryDeliveryLog::new();
    let rule = Uuid::new_v4();
    for i in 0..7 {
        let outcome = if i % 2 == 0 {
            DeliveryOutcome::Success
        } else {
            DeliveryOutcome::HttpError
        };
        log.append(&attempt("acme", rule, &format!("rec-{i}"), outcome, 100 - i))
            .await
            .unwrap();
    }
    log.append(&attempt("globex", rule, "rec-x", DeliveryOutcome::Success, 0))
        .await
        .unwrap();

    let mut filter = LogFilter::for_tenant("acme");
    filter.limit = Some(3);
    let page = log.query(&filter).await.unwrap();
    assert_eq!(page.total, 7);
    assert_eq!(page.entries.len(), 3);
    assert_eq!(page.entries[0].record_id, "rec-6");
    assert_eq!(page.next_offset, Some(3));

    filter.offset = Some(6);
    let last = log.query(&filter).await.unwrap();
    assert_eq!(last.entries.len(), 1);
    assert_eq!(last.next_offset, None);

    let mut failures = LogFilter::for_tenant("acme");
    failures.outcome = Some(DeliveryOutcome::HttpError);
    assert_eq!(log.query(&failures).await.unwrap().total, 3);

    let mut by_record = LogFilter::for_tenant("acme");
    by_record.record_id = Some("rec-2".into());
    assert_eq!(log.query(&by_record).await.unwrap().total, 1);
}

#[tokio::test]
async fn stats_are_computed_at_read_time() {
    let log = MemoryDeliveryLog::new();
    let rule = Uuid::new_v4();
    log.append(&attempt("acme", rule, "r1", DeliveryOutcome::Timeout, 30))
        .await
        .unwrap();
    let stats = log.stats("acme", 10).await.unwrap();
    assert_eq!(stats.rules[0].failure_count, 1);

    log.append(&attempt("acme", rule, "r1", DeliveryOutcome::Success, 10))
        .await
        .unwrap();
    let stats = log.stats("acme", 10).await.unwrap();
    assert_eq!(stats.rules[0].success_count, 1);
    assert_eq!(stats.rules[0].failure_count, 1);
    assert_eq!(stats.recent_failures.len(), 1);
    assert!(log.stats("globex", 10).await.unwrap().rules.is_empty());
}

// ── Schema catalog ──────────────────────────────────────────

#[tokio::test]
async fn catalog_loads_from_yaml() {
    let catalog = MemorySchemaCatalog::from_yaml(
        r#"
- tenant_id: acme
  slug: tickets
  fields: [priority, status, assignee]
- tenant_id: acme
  slug: orders
  fields: [total, status]
- tenant_id: globex
  slug: tickets
  fields: [severity]
"#,
    )
    .unwrap();

    let tickets = catalog.entity("acme", "tickets").await.unwrap().unwrap();
    assert!(tickets.has_field("assignee"));
    assert!(catalog.entity("acme", "invoices").await.unwrap().is_none());

    let slugs: Vec<String> = catalog
        .entities("acme")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.slug)
        .collect();
    assert_eq!(slugs, vec!["orders", "tickets"]);
}

#[tokio::test]
async fn catalog_rejects_bad_yaml() {
    assert!(MemorySchemaCatalog::from_yaml("- tenant_id: [").is_err());
}
