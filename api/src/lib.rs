//! MinIO Fleet REST API
//!
//! HTTP surface over the lifecycle orchestrator.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            FLEET API                                    │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  CORS  →  Trace  →  X-API-KEY (/v1 only)  →  handlers            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌─────────────┐ │
//! │  │ GET  /v1/    │  │ POST /v1/    │  │ PATCH /v1/   │  │ DELETE /v1/ │ │
//! │  │  instances   │  │  instances   │  │ instances/id │  │instances/id │ │
//! │  └──────────────┘  └──────────────┘  └──────────────┘  └─────────────┘ │
//! │                               │                                         │
//! │                    ┌──────────▼──────────┐                              │
//! │                    │ LifecycleOrchestrator│                             │
//! │                    └─────────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod wiring;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::{middleware::from_fn_with_state, routing::get, Json, Router};
use fleet_orchestrator::LifecycleOrchestrator;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

pub use models::*;

/// API state
pub struct ApiState {
    pub orchestrator: LifecycleOrchestrator,
    /// Expected `X-API-KEY`; unset or empty refuses every `/v1` request
    pub api_key: Option<String>,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "MinIO Fleet API",
        version = "1.0.0",
        description = "Provision, resize and tear down per-tenant MinIO instances"
    ),
    paths(
        routes::health::health_check,
        routes::instances::list_instances,
        routes::instances::get_instance,
        routes::instances::create_instance,
        routes::instances::resize_instance,
        routes::instances::delete_instance,
    ),
    components(
        schemas(
            ErrorResponse,
            CreateInstance, ResizeInstance,
            InstanceView, CreatedView, DeletedView,
            routes::health::HealthResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "instances", description = "MinIO instance lifecycle")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-KEY"))),
            );
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the API router
pub fn build_router(state: ApiState, allowed_origin: Option<&str>) -> Router {
    let state = Arc::new(state);

    let v1 = Router::new()
        .nest("/instances", routes::instances::router())
        .route_layer(from_fn_with_state(state.clone(), middleware::auth::require_api_key));

    let router = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/v1", v1)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    match allowed_origin.and_then(cors_layer) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

/// CORS for the configured origin; `*` allows any origin
fn cors_layer(origin: &str) -> Option<CorsLayer> {
    let allow_origin = if origin == "*" {
        AllowOrigin::any()
    } else {
        match HeaderValue::from_str(origin) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                warn!(origin, "ignoring invalid allowed origin");
                return None;
            }
        }
    };

    Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::ACCEPT,
                header::CONTENT_TYPE,
                header::CONTENT_LENGTH,
                header::ACCEPT_ENCODING,
                HeaderName::from_static("x-csrf-token"),
                HeaderName::from_static(middleware::auth::API_KEY_HEADER),
            ]),
    )
}
