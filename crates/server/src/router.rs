//! HTTP router construction.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::api::{self, deliveries, events, rules};
use crate::state::AppState;

/// Build the application router. `cors_origin` of `*` allows any origin.
pub fn build_router(state: Arc<AppState>, cors_origin: &str) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/rules", get(rules::list_rules).post(rules::create_rule))
        // Static segment wins over {id}.
        .route("/rules/test", post(rules::test_rule))
        .route(
            "/rules/{id}",
            get(rules::get_rule)
                .put(rules::update_rule)
                .delete(rules::delete_rule),
        )
        .route("/rules/{id}/diagnostics", get(rules::rule_diagnostics))
        .route("/deliveries", get(deliveries::list_deliveries))
        .route("/deliveries/stats", get(deliveries::delivery_stats))
        .route("/events", post(events::ingest_event))
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => {
            warn!(origin, "invalid CORS origin, falling back to permissive");
            CorsLayer::permissive()
        }
    }
}
