//! Rule CRUD, rule testing and per-rule diagnostics.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use recordhook_engine::{SavedRule, TestRuleRequest, TestRuleResponse};
use recordhook_rules::diagnostics::{Diagnostic, DiagnosticQuery};
use recordhook_rules::{Rule, RuleDraft};

use super::{json_body, path, query, Tenant};
use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for GET /rules.
#[derive(Debug, Default, Deserialize)]
pub struct ListRulesParams {
    /// Only rules of this entity.
    pub entity: Option<String>,
}

pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
    params: Result<Query<ListRulesParams>, QueryRejection>,
) -> Result<Json<Vec<Rule>>, ApiError> {
    let params = query(params)?;
    let rules = state.service.list_rules(&tenant, params.entity.as_deref()).await?;
    Ok(Json(rules))
}

/// Returns 201 with the stored rule, 400 with `{reason, errors}` when
/// validation fails.
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
    payload: Result<Json<RuleDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<SavedRule>), ApiError> {
    let draft = json_body(payload)?;
    let saved = state.service.create_rule(&tenant, draft).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn get_rule(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Rule>, ApiError> {
    let id = path(id)?;
    Ok(Json(state.service.get_rule(&tenant, id).await?))
}

pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<RuleDraft>, JsonRejection>,
) -> Result<Json<SavedRule>, ApiError> {
    let id = path(id)?;
    let draft = json_body(payload)?;
    Ok(Json(state.service.update_rule(&tenant, id, draft).await?))
}

pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let id = path(id)?;
    state.service.delete_rule(&tenant, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Evaluate a condition against a sample record; with `fire`, send one
/// webhook attempt and return its outcome. Nothing is logged.
pub async fn test_rule(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
    payload: Result<Json<TestRuleRequest>, JsonRejection>,
) -> Result<Json<TestRuleResponse>, ApiError> {
    let request = json_body(payload)?;
    Ok(Json(state.service.test_rule(&tenant, request).await?))
}

pub async fn rule_diagnostics(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
    id: Result<Path<Uuid>, PathRejection>,
    params: Result<Query<DiagnosticQuery>, QueryRejection>,
) -> Result<Json<Vec<Diagnostic>>, ApiError> {
    let id = path(id)?;
    let params = query(params)?;
    Ok(Json(state.service.rule_diagnostics(&tenant, id, &params).await?))
}
