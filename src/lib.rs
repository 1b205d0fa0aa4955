//! Rental Booking API Library
//!
//! Guest checkout, pickup scheduling and the staff dashboard for a storage pod
//! and garbage bin rental business.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod message_queue;
pub mod middleware_helpers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post, put},
    Extension, Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::consts as perm;
use crate::auth::{AuthRouterExt, AuthService};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
    /// Present only when the Redis queue backend is configured
    pub redis: Option<Arc<redis::Client>>,
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_carries_message() {
        let response = ApiResponse::<()>::error("oops".into());
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("oops"));
        assert!(response.meta.expect("metadata expected").request_id.is_none());
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Customer booking flow. No authentication.
fn booking_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(handlers::catalog::list_products))
        .route("/products/:slug", get(handlers::catalog::get_product))
        .route(
            "/products/:slug/dates",
            post(handlers::checkout::select_dates),
        )
        .route(
            "/drafts/:token/customer",
            put(handlers::checkout::customer_details),
        )
        .route(
            "/drafts/:token/summary",
            post(handlers::checkout::checkout_summary),
        )
        .route(
            "/drafts/:token/payment",
            post(handlers::checkout::confirm_payment),
        )
        .route(
            "/confirmation/:booking_id",
            get(handlers::checkout::booking_confirmation),
        )
        .route("/pickup", post(handlers::pickup::start_pickup))
        .route(
            "/pickup/drafts/:token/payment-intent",
            post(handlers::pickup::pickup_payment_intent),
        )
        .route(
            "/pickup/drafts/:token/payment",
            post(handlers::pickup::confirm_pickup_payment),
        )
        .route(
            "/pickup/:booking_id",
            get(handlers::pickup::pickup_confirmation),
        )
}

/// Staff dashboard, each group gated by its permission.
fn dashboard_routes() -> Router<AppState> {
    let overview = Router::new()
        .route("/", get(handlers::dashboard::dashboard_overview))
        .with_permission(perm::DASHBOARD_READ);

    let orders = Router::new()
        .route("/orders", get(handlers::dashboard::list_orders))
        .route("/orders/:booking_id", get(handlers::dashboard::get_order))
        .route(
            "/orders/:booking_id/status",
            put(handlers::dashboard::update_order_status),
        )
        .with_permission(perm::ORDERS_MANAGE);

    let inventory = Router::new()
        .route(
            "/inventory",
            get(handlers::inventory::list_inventory).post(handlers::inventory::create_product),
        )
        .route(
            "/inventory/:id",
            get(handlers::inventory::get_product)
                .put(handlers::inventory::update_product)
                .delete(handlers::inventory::delete_product),
        )
        .route(
            "/inventory/:id/stock",
            put(handlers::inventory::update_stock),
        )
        .with_permission(perm::INVENTORY_MANAGE);

    let pricing = Router::new()
        .route(
            "/pricing",
            get(handlers::pricing::get_pricing).put(handlers::pricing::update_pricing),
        )
        .route("/pricing/tiers", post(handlers::pricing::create_tier))
        .route(
            "/pricing/tiers/:id",
            put(handlers::pricing::update_tier).delete(handlers::pricing::delete_tier),
        )
        .with_permission(perm::PRICING_MANAGE);

    let blackouts = Router::new()
        .route(
            "/blackouts",
            get(handlers::blackouts::list_blackouts).post(handlers::blackouts::create_blackout),
        )
        .route(
            "/blackouts/:id",
            axum::routing::delete(handlers::blackouts::delete_blackout),
        )
        .with_permission(perm::BLACKOUTS_MANAGE);

    let staff = Router::new()
        .route(
            "/staff",
            get(handlers::staff_users::list_staff).post(handlers::staff_users::create_staff),
        )
        .route(
            "/staff/:id",
            get(handlers::staff_users::get_staff)
                .put(handlers::staff_users::update_staff)
                .delete(handlers::staff_users::delete_staff),
        )
        .with_permission(perm::STAFF_MANAGE);

    overview
        .merge(orders)
        .merge(inventory)
        .merge(pricing)
        .merge(blackouts)
        .merge(staff)
}

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(api_status))
        .nest("/booking", booking_routes())
        .route(
            "/payments/webhook",
            post(handlers::payment_webhooks::payment_webhook),
        )
        .nest("/dashboard", dashboard_routes())
}

/// Full HTTP application: versioned API, staff login, Swagger UI, request ids and tracing.
/// CORS and compression are left to the binary.
pub fn app_router(state: AppState, auth_service: Arc<AuthService>) -> Router {
    let auth = auth::auth_routes().with_state(auth_service.clone());

    Router::<AppState>::new()
        .route("/", get(|| async { "rental-booking-api up" }))
        .nest("/api/v1", api_v1_routes().nest("/auth", auth))
        .merge(openapi::swagger_ui())
        .layer(crate::tracing::configure_http_tracing())
        // auth_middleware reads the service from request extensions
        .layer(Extension(auth_service))
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let version = env!("CARGO_PKG_VERSION");
    let status_data = json!({
        "status": "ok",
        "version": version,
        "service": "rental-booking-api",
        "site_name": state.config.site_name,
        "timestamp": Utc::now().to_rfc3339(),
        "environment": state.config.environment,
        "queue_backend": state.config.message_queue_backend,
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(e) => {
            ::tracing::warn!(error = %e, "database health check failed");
            "unhealthy"
        }
    };

    let redis_status = match &state.redis {
        None => "not_configured",
        Some(client) => match client.get_async_connection().await {
            Ok(mut conn) => match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
                Ok(_) => "healthy",
                Err(_) => "unhealthy",
            },
            Err(_) => "unhealthy",
        },
    };

    let healthy = db_status == "healthy" && redis_status != "unhealthy";
    let health_data = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "checks": {
            "database": db_status,
            "message_queue": redis_status,
        },
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
