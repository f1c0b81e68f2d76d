//! Rule tester: evaluate a condition against a sample record and optionally
//! fire one real webhook attempt.
//!
//! Nothing here touches the rule store or the delivery log. A fired attempt
//! is never retried and its outcome is returned inline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use recordhook_core::{FieldMap, RecordEvent, RecordEventKind};
use recordhook_notify::{AttemptReport, WebhookSender};
use recordhook_rules::payload::{PayloadContext, PayloadRenderer, RuleMeta};
use recordhook_rules::{evaluate, Condition, Trigger};

use crate::error::EngineError;

/// Record id used in payloads built by the tester.
pub const TEST_RECORD_ID: &str = "rule-test";

#[derive(Debug, Clone, Deserialize)]
pub struct TestRuleRequest {
    /// Condition tree in its stored JSON form. Missing means "always".
    #[serde(default)]
    pub condition: Option<serde_json::Value>,
    #[serde(default)]
    pub sample_fields: FieldMap,
    #[serde(default)]
    pub previous_fields: Option<FieldMap>,
    #[serde(default)]
    pub fire: bool,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub webhook_payload_template: Option<String>,
    #[serde(default)]
    pub entity_slug: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub trigger: Option<Trigger>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestRuleResponse {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<TestDelivery>,
}

/// Outcome of the single fired attempt.
#[derive(Debug, Clone, Serialize)]
pub struct TestDelivery {
    #[serde(flatten)]
    pub attempt: AttemptReport,
    /// The body that was sent.
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_error: Option<String>,
}

#[derive(Clone)]
pub struct RuleTester {
    sender: WebhookSender,
    renderer: PayloadRenderer,
}

impl RuleTester {
    pub fn new(sender: WebhookSender) -> Self {
        Self {
            sender,
            renderer: PayloadRenderer::new(),
        }
    }

    pub async fn test_rule(&self, tenant_id: &str, request: TestRuleRequest) -> Result<TestRuleResponse, EngineError> {
        let condition = match &request.condition {
            Some(raw) => Condition::compile(raw)?,
            None => Condition::always(),
        };

        let url = request.webhook_url.as_deref().map(str::trim).unwrap_or_default();
        if request.fire && url.is_empty() {
            return Err(EngineError::BadRequest(
                "webhook_url: required when fire is true".into(),
            ));
        }

        let matched = evaluate(&condition, &request.sample_fields, request.previous_fields.as_ref());
        if !matched || !request.fire {
            return Ok(TestRuleResponse {
                matched,
                delivery: None,
            });
        }

        let event = sample_event(tenant_id, &request);
        let meta = RuleMeta {
            id: Uuid::nil(),
            name: request.name.clone().unwrap_or_else(|| "rule test".into()),
            entity_slug: event.entity_slug.clone(),
            trigger: request.trigger.unwrap_or(match event.kind {
                RecordEventKind::Update => Trigger::OnUpdate,
                _ => Trigger::OnCreate,
            }),
        };
        let ctx = PayloadContext::new(meta, &event, self.sender.clock().now());
        let (payload, template_error) = self
            .renderer
            .resolve(request.webhook_payload_template.as_deref(), &ctx);

        let attempt = self.sender.send(url, &request.webhook_headers, &payload).await;
        info!(
            tenant_id,
            outcome = %attempt.outcome,
            status = ?attempt.http_status,
            duration_ms = attempt.duration_ms,
            "rule test webhook fired"
        );

        Ok(TestRuleResponse {
            matched,
            delivery: Some(TestDelivery {
                attempt,
                payload,
                template_error: template_error.map(|e| e.to_string()),
            }),
        })
    }
}

fn sample_event(tenant_id: &str, request: &TestRuleRequest) -> RecordEvent {
    let entity = request.entity_slug.clone().unwrap_or_default();
    match &request.previous_fields {
        Some(previous) => RecordEvent::updated(
            tenant_id,
            entity,
            TEST_RECORD_ID,
            request.sample_fields.clone(),
            previous.clone(),
        ),
        None => RecordEvent::created(tenant_id, entity, TEST_RECORD_ID, request.sample_fields.clone()),
    }
}
