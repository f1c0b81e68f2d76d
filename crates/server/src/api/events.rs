//! Record-event ingress used by the entity storage layer after commit.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::debug;

use recordhook_core::RecordEvent;

use super::{json_body, Tenant};
use crate::error::ApiError;
use crate::state::AppState;

/// Queue one record event for dispatch. Returns 202 once it is on the
/// dispatcher channel.
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
    payload: Result<Json<RecordEvent>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let event = json_body(payload)?;
    if event.tenant_id != tenant {
        return Err(ApiError::BadRequest(
            "tenant_id does not match the request tenant".into(),
        ));
    }
    debug!(tenant_id = %tenant, entity = %event.entity_slug, record_id = %event.record_id, "record event received");
    state.publisher.publish(event).await?;
    Ok(StatusCode::ACCEPTED)
}
