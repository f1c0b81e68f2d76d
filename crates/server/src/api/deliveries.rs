//! Delivery log queries and per-rule stats.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use recordhook_storage::{DeliveryStats, LogFilter, LogPage};

use super::{query, Tenant};
use crate::error::ApiError;
use crate::state::AppState;

/// GET /deliveries?rule_id=&record_id=&outcome=&from=&to=&limit=&offset=
pub async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
    params: Result<Query<LogFilter>, QueryRejection>,
) -> Result<Json<LogPage>, ApiError> {
    let filter = query(params)?;
    Ok(Json(state.service.list_delivery_logs(&tenant, filter).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    /// How many recent failures to include.
    pub recent_failures: Option<usize>,
}

pub async fn delivery_stats(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
    params: Result<Query<StatsParams>, QueryRejection>,
) -> Result<Json<DeliveryStats>, ApiError> {
    let params = query(params)?;
    Ok(Json(
        state
            .service
            .get_delivery_stats(&tenant, params.recent_failures)
            .await?,
    ))
}
