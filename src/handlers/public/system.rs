use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::server::AppState;

/// GET / - Service description
pub async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "CRM API",
            "version": version,
            "description": "Pre-lead, lead and customer pipeline",
            "endpoints": {
                "health": "/health (public)",
                "forms": "/public/forms/pre-leads (public)",
                "auth": "/api/auth/whoami (protected)",
                "pre_leads": "/api/pre-leads[/:id[/validate|/discard]] (protected)",
                "leads": "/api/leads[/:id[/stage|/status|/convert|/discard]] (protected)",
                "customers": "/api/customers[/:id] (protected)",
                "contacts": "/api/contacts[/:id[/primary]] (protected)",
            }
        }
    }))
}

/// GET /health - Liveness plus store reachability
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::warn!("health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now
                    }
                })),
            )
        }
    }
}
