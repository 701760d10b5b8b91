use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{AppConfig, SecurityConfig};
use crate::events::EventSink;
use crate::handlers::{protected, public};
use crate::middleware::jwt_auth_middleware;
use crate::permissions::PermissionMatrix;
use crate::services::Services;
use crate::store::{CrmStore, PageRequest};

/// Shared router state. Everything a handler needs arrives through here.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CrmStore>,
    pub services: Services,
    pub permissions: Arc<PermissionMatrix>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn CrmStore>,
        events: Arc<dyn EventSink>,
        permissions: PermissionMatrix,
        config: AppConfig,
    ) -> Self {
        Self {
            services: Services::new(store.clone(), events),
            store,
            permissions: Arc::new(permissions),
            config: Arc::new(config),
        }
    }

    /// Page request clamped to the configured sizes
    pub fn page(&self, page: Option<u32>, page_size: Option<u32>) -> PageRequest {
        PageRequest::new(
            page,
            page_size,
            self.config.api.default_page_size,
            self.config.api.max_page_size,
        )
    }
}

pub fn app(state: AppState) -> Router {
    let config = state.config.clone();

    let router = Router::new()
        // Public
        .route("/", get(public::system::root))
        .route("/health", get(public::system::health))
        .route("/public/forms/pre-leads", post(public::forms::submit_pre_lead))
        // Protected API
        .merge(protected_routes(state.clone()))
        // Global middleware
        .layer(cors_layer(&config.security))
        .layer(DefaultBodyLimit::max(config.api.max_request_size_bytes));

    let router = if config.api.enable_request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };
    router.with_state(state)
}

/// Permissive when no origins are listed, otherwise exactly the listed ones
fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if !security.enable_cors {
        return CorsLayer::new();
    }
    if security.cors_origins.is_empty() || security.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

fn protected_routes(state: AppState) -> Router<AppState> {
    use protected::{auth, contacts, customers, leads, pre_leads};

    Router::new()
        .route("/api/auth/whoami", get(auth::whoami))
        // Pre-leads
        .route("/api/pre-leads", get(pre_leads::list).post(pre_leads::create))
        .route(
            "/api/pre-leads/:id",
            get(pre_leads::show).put(pre_leads::update).delete(pre_leads::delete),
        )
        .route("/api/pre-leads/:id/validate", post(pre_leads::validate))
        .route("/api/pre-leads/:id/discard", post(pre_leads::discard))
        // Leads
        .route("/api/leads", get(leads::list).post(leads::create))
        .route(
            "/api/leads/:id",
            get(leads::show).put(leads::update).delete(leads::delete),
        )
        .route("/api/leads/:id/stage", put(leads::set_stage))
        .route("/api/leads/:id/status", put(leads::set_status))
        .route("/api/leads/:id/convert", post(leads::convert))
        .route("/api/leads/:id/discard", post(leads::discard))
        // Customers
        .route("/api/customers", get(customers::list))
        .route(
            "/api/customers/:id",
            get(customers::show).put(customers::update).delete(customers::delete),
        )
        // Contacts
        .route("/api/contacts", get(contacts::list).post(contacts::create))
        .route(
            "/api/contacts/:id",
            get(contacts::show).put(contacts::update).delete(contacts::delete),
        )
        .route("/api/contacts/:id/primary", post(contacts::set_primary))
        .route_layer(middleware::from_fn_with_state(state, jwt_auth_middleware))
}
