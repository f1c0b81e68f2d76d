//! Webhook target checks: URL, headers and payload template syntax.

use crate::payload::PayloadRenderer;
use crate::schema::RuleDraft;

use super::ValidationResult;

/// Headers the transport owns; clients may not set them.
const RESERVED_HEADERS: &[&str] = &["content-length", "host", "transfer-encoding", "connection"];

pub(super) fn validate_webhook(draft: &RuleDraft, result: &mut ValidationResult) {
    validate_url(&draft.webhook_url, result);

    for (name, value) in &draft.webhook_headers {
        let path = format!("webhook_headers.{name}");
        if !is_valid_header_name(name) {
            result.error(&path, format!("Invalid header name '{name}'"));
            continue;
        }
        let lower = name.to_ascii_lowercase();
        if RESERVED_HEADERS.contains(&lower.as_str()) {
            result.error(&path, format!("Header '{name}' is set by the delivery worker"));
        } else if lower == "content-type" {
            result.warn(&path, "Content-Type is always sent as application/json");
        }
        if value.contains(['\r', '\n']) {
            // The value itself is never echoed back: it may be a secret.
            result.error(&path, "Header value must not contain line breaks");
        }
    }

    if let Some(template) = &draft.webhook_payload_template {
        let renderer = PayloadRenderer::new();
        match renderer.validate(template) {
            Err(e) => result.error("webhook_payload_template", format!("Invalid payload template: {e}")),
            Ok(()) => {
                for expr in renderer.unencoded_expressions(template) {
                    result.warn(
                        "webhook_payload_template",
                        format!(
                            "'{{{{ {expr} }}}}' is not JSON-encoded; write '{{{{ {expr} | tojson }}}}' \
                             or a value with quotes will fall back to the default payload"
                        ),
                    );
                }
            }
        }
    }
}

fn validate_url(raw: &str, result: &mut ValidationResult) {
    match url::Url::parse(raw) {
        Ok(url) => {
            if !matches!(url.scheme(), "http" | "https") {
                result.error(
                    "webhook_url",
                    format!("Unsupported scheme '{}': use http or https", url.scheme()),
                );
            } else if url.host_str().map_or(true, str::is_empty) {
                result.error("webhook_url", "webhook_url must include a host");
            } else if url.scheme() == "http" {
                result.warn("webhook_url", "Payloads will be sent unencrypted over http");
            }
        }
        Err(e) => result.error("webhook_url", format!("Invalid URL: {e}")),
    }
}

/// RFC 7230 token characters.
fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}
