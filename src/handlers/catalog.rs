use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use super::today;
use crate::{
    entities::product::{self, ProductCategory},
    services::availability::min_bookable_date,
    ApiResponse, ApiResult, AppState,
};

/// Public view of a rentable product.
#[derive(Debug, Serialize, ToSchema)]
#[schema(example = json!({
    "name": "8ft Storage Pod",
    "slug": "8ft-storage-pod",
    "category": "storage_pod",
    "category_label": "Storage Pod",
    "description": "Weatherproof steel pod delivered to your driveway.",
    "size_description": "8ft x 7ft x 7ft",
    "monthly_rate": "149.00",
    "image_url": null
}))]
pub struct ProductSummary {
    pub name: String,
    pub slug: String,
    pub category: ProductCategory,
    pub category_label: String,
    pub description: String,
    pub size_description: String,
    #[schema(value_type = String)]
    pub monthly_rate: Decimal,
    pub image_url: Option<String>,
}

impl From<product::Model> for ProductSummary {
    fn from(model: product::Model) -> Self {
        Self {
            category_label: model.category.label().to_string(),
            name: model.name,
            slug: model.slug,
            category: model.category,
            description: model.description,
            size_description: model.size_description,
            monthly_rate: model.monthly_rate,
            image_url: model.image_url,
        }
    }
}

/// Everything the date picker needs for one product.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: ProductSummary,
    /// Earliest selectable drop-off date
    pub min_date: NaiveDate,
    /// Upcoming dates with no drop-offs
    pub blackout_dates: Vec<NaiveDate>,
    /// Units free on `min_date`
    pub available_units: i64,
    #[schema(value_type = String)]
    pub transport_fee: Decimal,
    #[schema(value_type = String)]
    pub pickup_fee: Decimal,
    /// When true the transport fee depends on the delivery distance
    pub distance_pricing_enabled: bool,
}

#[utoipa::path(
    get,
    path = "/api/v1/booking/products",
    responses(
        (status = 200, description = "Active products", body = ApiResponse<Vec<ProductSummary>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "booking"
)]
pub async fn list_products(State(state): State<AppState>) -> ApiResult<Vec<ProductSummary>> {
    let products = state.services.products.list_active().await?;
    Ok(Json(ApiResponse::success(
        products.into_iter().map(ProductSummary::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/booking/products/{slug}",
    params(("slug" = String, Path, description = "Product slug")),
    responses(
        (status = 200, description = "Product detail", body = ApiResponse<ProductDetail>),
        (status = 404, description = "Product not found or inactive", body = crate::errors::ErrorResponse)
    ),
    tag = "booking"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<ProductDetail> {
    let product = state.services.products.get_active_by_slug(&slug).await?;
    let min_date = min_bookable_date(today());

    let availability = &state.services.availability;
    let blackout_dates = availability.blackout_dates_for(product.id, min_date).await?;
    let available_units = availability.available_units(&product, min_date).await?;

    let snapshot = state.services.pricing.snapshot();
    Ok(Json(ApiResponse::success(ProductDetail {
        product: product.into(),
        min_date,
        blackout_dates,
        available_units,
        transport_fee: snapshot.settings.transport_fee,
        pickup_fee: snapshot.settings.pickup_fee,
        distance_pricing_enabled: snapshot.distance_pricing_active(),
    })))
}
