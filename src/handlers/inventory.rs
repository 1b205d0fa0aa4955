use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    entities::product::{self, ProductCategory},
    errors::ServiceError,
    services::products::{CreateProductRequest, InventoryLine, UpdateProductRequest},
    ApiResponse, ApiResult, AppState,
};

/// Staff view of a product, including inactive ones.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProductRecord {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub category: ProductCategory,
    pub description: String,
    pub size_description: String,
    pub monthly_rate: Decimal,
    pub image_url: Option<String>,
    pub stock_quantity: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<product::Model> for ProductRecord {
    fn from(model: product::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            slug: model.slug,
            category: model.category,
            description: model.description,
            size_description: model.size_description,
            monthly_rate: model.monthly_rate,
            image_url: model.image_url,
            stock_quantity: model.stock_quantity,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InventoryRow {
    #[serde(flatten)]
    pub product: ProductRecord,
    /// Confirmed or in-progress bookings for this product
    pub active_rentals: u64,
}

impl From<InventoryLine> for InventoryRow {
    fn from(line: InventoryLine) -> Self {
        Self {
            product: line.product.into(),
            active_rentals: line.active_rentals,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[schema(example = json!({ "stock_quantity": 12 }))]
pub struct UpdateStockRequest {
    pub stock_quantity: i32,
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard/inventory",
    responses(
        (status = 200, description = "Every product with its active rentals", body = ApiResponse<Vec<InventoryRow>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn list_inventory(State(state): State<AppState>) -> ApiResult<Vec<InventoryRow>> {
    let lines = state.services.products.inventory().await?;
    Ok(Json(ApiResponse::success(
        lines.into_iter().map(InventoryRow::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard/inventory/{id}",
    params(("id" = i32, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product", body = ApiResponse<ProductRecord>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<ProductRecord> {
    let product = state.services.products.get(id).await?;
    Ok(Json(ApiResponse::success(product.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/dashboard/inventory",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ApiResponse<ProductRecord>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProductRecord>>), ServiceError> {
    let created = state.services.products.create(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created.into()))))
}

#[utoipa::path(
    put,
    path = "/api/v1/dashboard/inventory/{id}",
    params(("id" = i32, Path, description = "Product id")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated", body = ApiResponse<ProductRecord>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateProductRequest>,
) -> ApiResult<ProductRecord> {
    let updated = state.services.products.update(id, payload).await?;
    Ok(Json(ApiResponse::success(updated.into())))
}

#[utoipa::path(
    put,
    path = "/api/v1/dashboard/inventory/{id}/stock",
    params(("id" = i32, Path, description = "Product id")),
    request_body = UpdateStockRequest,
    responses(
        (status = 200, description = "Stock updated", body = ApiResponse<ProductRecord>),
        (status = 400, description = "Negative stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn update_stock(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateStockRequest>,
) -> ApiResult<ProductRecord> {
    let updated = state
        .services
        .products
        .update_stock(id, payload.stock_quantity)
        .await?;
    Ok(Json(ApiResponse::success(updated.into())))
}

#[utoipa::path(
    delete,
    path = "/api/v1/dashboard/inventory/{id}",
    params(("id" = i32, Path, description = "Product id")),
    responses(
        (status = 204, description = "Product deleted"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Product has bookings", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ServiceError> {
    state.services.products.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
