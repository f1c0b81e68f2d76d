//! HTTP webhook transport built on reqwest.
//!
//! Posts JSON payloads with the rule's headers and `Content-Type:
//! application/json`. Redirects are never followed and the response body is
//! read only up to the excerpt limit.

use std::collections::BTreeMap;

use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};

use crate::traits::{NotifyError, TransportError, WebhookRequest, WebhookResponse, WebhookTransport};

/// Shared reqwest client (connection pooling) for all deliveries.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("recordhook/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn post(&self, request: &WebhookRequest) -> Result<WebhookResponse, TransportError> {
        let body = serde_json::to_vec(&request.body)
            .map_err(|e| TransportError::InvalidRequest(format!("payload serialization: {e}")))?;

        let mut builder = self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .body(body);
        for (key, value) in &request.headers {
            if key.eq_ignore_ascii_case(CONTENT_TYPE.as_str()) {
                continue;
            }
            builder = builder.header(key.as_str(), value.as_str());
        }
        builder = builder.header(CONTENT_TYPE, "application/json");

        let mut response = builder.send().await.map_err(|e| classify_error(e, request))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut excerpt: Vec<u8> = Vec::new();
        while excerpt.len() < request.excerpt_limit {
            match response.chunk().await {
                Ok(Some(chunk)) => excerpt.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => {
                    // Status already known; a broken body only shortens the excerpt.
                    tracing::debug!(url = %request.url, error = %e, "failed reading webhook response body");
                    break;
                }
            }
        }
        let text = String::from_utf8_lossy(&excerpt);

        Ok(WebhookResponse {
            status,
            body_excerpt: recordhook_core::truncate_excerpt(&text, request.excerpt_limit),
            retry_after,
        })
    }
}

fn classify_error(e: reqwest::Error, request: &WebhookRequest) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(request.timeout)
    } else if e.is_builder() {
        TransportError::InvalidRequest(e.without_url().to_string())
    } else {
        // `without_url` keeps query-string secrets out of the log.
        TransportError::Network(e.without_url().to_string())
    }
}

/// Resolve `${VAR_NAME}` references in every header value.
pub fn resolve_headers(headers: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>, NotifyError> {
    headers
        .iter()
        .map(|(k, v)| Ok((k.clone(), resolve_env_vars(v)?)))
        .collect()
}

/// Resolve `${VAR_NAME}` patterns in a string using `std::env::var`.
///
/// Returns an error if a referenced variable is not set. The error names the
/// variable but never echoes the input, which may hold a secret.
pub fn resolve_env_vars(input: &str) -> Result<String, NotifyError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                var_name.push(c);
            }
            if !closed {
                return Err(NotifyError::Config("unclosed env var reference".to_string()));
            }
            let value = std::env::var(&var_name)
                .map_err(|_| NotifyError::Config(format!("env var not found: {var_name}")))?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}
