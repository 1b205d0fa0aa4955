use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    entities::blackout_date, services::availability::CreateBlackoutRequest, ApiResponse,
    ApiResult, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct BlackoutView {
    pub id: i32,
    pub date: NaiveDate,
    pub reason: String,
    /// `None` blocks every product
    pub product_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl From<blackout_date::Model> for BlackoutView {
    fn from(model: blackout_date::Model) -> Self {
        Self {
            id: model.id,
            date: model.date,
            reason: model.reason,
            product_id: model.product_id,
            created_at: model.created_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard/blackouts",
    responses(
        (status = 200, description = "All blackout dates", body = ApiResponse<Vec<BlackoutView>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "dashboard"
)]
pub async fn list_blackouts(State(state): State<AppState>) -> ApiResult<Vec<BlackoutView>> {
    let rows = state.services.availability.list_blackouts().await?;
    Ok(Json(ApiResponse::success(
        rows.into_iter().map(BlackoutView::from).collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/dashboard/blackouts",
    request_body = CreateBlackoutRequest,
    responses(
        (status = 201, description = "Blackout added", body = ApiResponse<BlackoutView>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 409, description = "Date already blocked", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "dashboard"
)]
pub async fn create_blackout(
    State(state): State<AppState>,
    Json(payload): Json<CreateBlackoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<BlackoutView>>), crate::errors::ServiceError> {
    let created = state.services.availability.create_blackout(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(created.into())),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/v1/dashboard/blackouts/{id}",
    params(("id" = i32, Path, description = "Blackout id")),
    responses(
        (status = 204, description = "Blackout removed"),
        (status = 404, description = "Blackout not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "dashboard"
)]
pub async fn delete_blackout(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, crate::errors::ServiceError> {
    state.services.availability.delete_blackout(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
