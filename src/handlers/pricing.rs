use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    auth::AuthUser,
    entities::{distance_fee, pricing_setting},
    errors::ServiceError,
    services::pricing::{FeeTierRequest, UpdatePricingRequest},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct PricingSettingsView {
    pub transport_fee: Decimal,
    pub delivery_fee: Decimal,
    pub pickup_fee: Decimal,
    pub distance_pricing_enabled: bool,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<pricing_setting::Model> for PricingSettingsView {
    fn from(model: pricing_setting::Model) -> Self {
        Self {
            transport_fee: model.transport_fee,
            delivery_fee: model.delivery_fee,
            pickup_fee: model.pickup_fee,
            distance_pricing_enabled: model.distance_pricing_enabled,
            updated_by: model.updated_by,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FeeTierView {
    pub id: i32,
    pub min_distance_km: Decimal,
    pub max_distance_km: Decimal,
    pub fee: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<distance_fee::Model> for FeeTierView {
    fn from(model: distance_fee::Model) -> Self {
        Self {
            id: model.id,
            min_distance_km: model.min_distance_km,
            max_distance_km: model.max_distance_km,
            fee: model.fee,
            is_active: model.is_active,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PricingOverview {
    pub settings: PricingSettingsView,
    pub tiers: Vec<FeeTierView>,
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard/pricing",
    responses(
        (status = 200, description = "Current fees and distance tiers", body = ApiResponse<PricingOverview>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "pricing"
)]
pub async fn get_pricing(State(state): State<AppState>) -> ApiResult<PricingOverview> {
    let pricing = &state.services.pricing;
    let tiers = pricing.list_tiers().await?;
    Ok(Json(ApiResponse::success(PricingOverview {
        settings: pricing.settings().into(),
        tiers: tiers.into_iter().map(FeeTierView::from).collect(),
    })))
}

#[utoipa::path(
    put,
    path = "/api/v1/dashboard/pricing",
    request_body = UpdatePricingRequest,
    responses(
        (status = 200, description = "Fees updated. Existing bookings keep their totals.", body = ApiResponse<PricingSettingsView>),
        (status = 400, description = "Negative fee", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "pricing"
)]
pub async fn update_pricing(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<UpdatePricingRequest>,
) -> ApiResult<PricingSettingsView> {
    let updated = state
        .services
        .pricing
        .update_settings(payload, Some(user.username))
        .await?;
    Ok(Json(ApiResponse::success(updated.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/dashboard/pricing/tiers",
    request_body = FeeTierRequest,
    responses(
        (status = 201, description = "Tier created", body = ApiResponse<FeeTierView>),
        (status = 400, description = "Invalid band", body = crate::errors::ErrorResponse),
        (status = 409, description = "Band already exists", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "pricing"
)]
pub async fn create_tier(
    State(state): State<AppState>,
    Json(payload): Json<FeeTierRequest>,
) -> Result<(StatusCode, Json<ApiResponse<FeeTierView>>), ServiceError> {
    let tier = state.services.pricing.create_tier(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(tier.into()))))
}

#[utoipa::path(
    put,
    path = "/api/v1/dashboard/pricing/tiers/{id}",
    params(("id" = i32, Path, description = "Tier id")),
    request_body = FeeTierRequest,
    responses(
        (status = 200, description = "Tier updated", body = ApiResponse<FeeTierView>),
        (status = 404, description = "Tier not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "pricing"
)]
pub async fn update_tier(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<FeeTierRequest>,
) -> ApiResult<FeeTierView> {
    let tier = state.services.pricing.update_tier(id, payload).await?;
    Ok(Json(ApiResponse::success(tier.into())))
}

#[utoipa::path(
    delete,
    path = "/api/v1/dashboard/pricing/tiers/{id}",
    params(("id" = i32, Path, description = "Tier id")),
    responses(
        (status = 204, description = "Tier deleted"),
        (status = 404, description = "Tier not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "pricing"
)]
pub async fn delete_tier(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ServiceError> {
    state.services.pricing.delete_tier(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
