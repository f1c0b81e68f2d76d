//! Integration tests that verify every example rule in
//! `data/rules/examples/` parses and passes structural validation.

use recordhook_core::{fields_from_json, RecordEvent};
use recordhook_rules::payload::{PayloadContext, PayloadRenderer, RuleMeta};
use recordhook_rules::validation::validate_yaml;
use recordhook_rules::{evaluate, Condition, GroupOp, Operator, Rule, RuleDraft, Trigger};
use serde_json::json;

/// Integration tests run from the crate directory, so we go up two levels.
fn examples_dir() -> std::path::PathBuf {
    let manifest = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest.join("../../data/rules/examples")
}

fn read(filename: &str) -> String {
    let path = examples_dir().join(filename);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e))
}

fn load_draft(filename: &str) -> RuleDraft {
    serde_yaml::from_str(&read(filename))
        .unwrap_or_else(|e| panic!("Failed to parse {}: {}", filename, e))
}

// ── escalate-high-priority.yml ──────────────────────────────

#[test]
fn parse_escalate_high_priority_example() {
    let draft = load_draft("escalate-high-priority.yml");
    assert_eq!(draft.trigger, Trigger::OnCreate);
    assert!(draft.enabled);
    assert_eq!(
        draft.condition,
        Condition::leaf("priority", Operator::Equals, Some(json!("high")))
    );
    assert!(draft.webhook_headers["Authorization"].contains("${ESCALATION_HOOK_TOKEN}"));
}

#[test]
fn escalate_example_matches_only_high() {
    let rule = Rule::from_draft("acme", load_draft("escalate-high-priority.yml"), chrono::Utc::now());
    let condition = rule.compiled_condition().unwrap();
    assert!(evaluate(&condition, &fields_from_json(json!({"priority": "high"})), None));
    assert!(!evaluate(&condition, &fields_from_json(json!({"priority": "low"})), None));
}

// ── large-order-changed.yml ─────────────────────────────────

#[test]
fn parse_large_order_example() {
    let draft = load_draft("large-order-changed.yml");
    assert_eq!(draft.trigger, Trigger::OnUpdate);
    match &draft.condition {
        Condition::Group { op, children } => {
            assert_eq!(*op, GroupOp::And);
            assert_eq!(children.len(), 2);
        }
        other => panic!("expected group, got {other:?}"),
    }
    assert!(draft.webhook_payload_template.is_some());
}

#[test]
fn large_order_template_renders() {
    let draft = load_draft("large-order-changed.yml");
    let rule = Rule::from_draft("acme", draft, chrono::Utc::now());
    let event = RecordEvent::updated(
        "acme",
        "orders",
        "ord-7",
        fields_from_json(json!({"total": 2500, "status": "shipped"})),
        fields_from_json(json!({"total": 2500, "status": "paid"})),
    );
    assert!(evaluate(
        &rule.compiled_condition().unwrap(),
        &event.new_fields,
        event.previous_fields.as_ref()
    ));

    let ctx = PayloadContext::new(RuleMeta::from(&rule), &event, chrono::Utc::now());
    let template = rule.webhook_payload_template.as_deref().unwrap();
    let payload = PayloadRenderer::new().render(template, &ctx).unwrap();
    assert_eq!(payload["order"], json!("ord-7"));
    assert_eq!(payload["status"], json!("shipped"));
    assert_eq!(payload["previous_status"], json!("paid"));
}

// ── contact-deleted.yml ─────────────────────────────────────

#[test]
fn parse_contact_deleted_example() {
    let draft = load_draft("contact-deleted.yml");
    assert_eq!(draft.trigger, Trigger::OnDelete);
    assert!(!draft.enabled);
    assert!(draft.condition.is_empty());
}

// ── All examples ────────────────────────────────────────────

#[test]
fn all_examples_pass_structural_validation() {
    let mut count = 0;
    for entry in std::fs::read_dir(examples_dir()).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().and_then(|e| e.to_str()) != Some("yml") {
            continue;
        }
        let yaml = std::fs::read_to_string(&path).unwrap();
        let result = validate_yaml(&yaml);
        assert!(
            result.valid,
            "{} failed validation: {:?}",
            path.display(),
            result.errors
        );
        count += 1;
    }
    assert_eq!(count, 4);
}
