use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    auth::AuthUser,
    entities::staff_user,
    errors::ServiceError,
    services::staff::{CreateStaffRequest, UpdateStaffRequest},
    ApiResponse, ApiResult, AppState,
};

/// Staff account without its password hash.
#[derive(Debug, Serialize, ToSchema)]
pub struct StaffUserView {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<staff_user::Model> for StaffUserView {
    fn from(model: staff_user::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            is_staff: model.is_staff,
            is_superuser: model.is_superuser,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard/staff",
    responses(
        (status = 200, description = "Staff accounts", body = ApiResponse<Vec<StaffUserView>>),
        (status = 403, description = "Superuser required", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "staff"
)]
pub async fn list_staff(State(state): State<AppState>) -> ApiResult<Vec<StaffUserView>> {
    let users = state.services.staff.list().await?;
    Ok(Json(ApiResponse::success(
        users.into_iter().map(StaffUserView::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard/staff/{id}",
    params(("id" = i32, Path, description = "Staff user id")),
    responses(
        (status = 200, description = "Staff account", body = ApiResponse<StaffUserView>),
        (status = 404, description = "Staff user not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "staff"
)]
pub async fn get_staff(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<StaffUserView> {
    let user = state.services.staff.get(id).await?;
    Ok(Json(ApiResponse::success(user.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/dashboard/staff",
    request_body = CreateStaffRequest,
    responses(
        (status = 201, description = "Staff account created", body = ApiResponse<StaffUserView>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 409, description = "Username taken", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "staff"
)]
pub async fn create_staff(
    State(state): State<AppState>,
    Json(payload): Json<CreateStaffRequest>,
) -> Result<(StatusCode, Json<ApiResponse<StaffUserView>>), ServiceError> {
    let user = state.services.staff.create(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(user.into()))))
}

#[utoipa::path(
    put,
    path = "/api/v1/dashboard/staff/{id}",
    params(("id" = i32, Path, description = "Staff user id")),
    request_body = UpdateStaffRequest,
    responses(
        (status = 200, description = "Staff account updated", body = ApiResponse<StaffUserView>),
        (status = 404, description = "Staff user not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "staff"
)]
pub async fn update_staff(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateStaffRequest>,
) -> ApiResult<StaffUserView> {
    let user = state.services.staff.update(id, payload).await?;
    Ok(Json(ApiResponse::success(user.into())))
}

#[utoipa::path(
    delete,
    path = "/api/v1/dashboard/staff/{id}",
    params(("id" = i32, Path, description = "Staff user id")),
    responses(
        (status = 204, description = "Staff account deleted"),
        (status = 404, description = "Staff user not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Cannot delete yourself", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "staff"
)]
pub async fn delete_staff(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ServiceError> {
    state.services.staff.delete(id, user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
