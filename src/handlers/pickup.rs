use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{checkout::BookingReceipt, today};
use crate::{
    errors::ServiceError,
    services::{
        checkout::{DraftHandle, PickupIntent, StartPickupRequest},
        payments::PaymentOutcome,
    },
    ApiResponse, ApiResult, AppState,
};

/// Intent id is absent when the pickup fee is zero.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ConfirmPickupRequest {
    pub payment_intent_id: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/booking/pickup",
    request_body = StartPickupRequest,
    responses(
        (status = 200, description = "Pickup draft created", body = ApiResponse<DraftHandle>),
        (status = 400, description = "Invalid pickup date or booking status", body = crate::errors::ErrorResponse),
        (status = 404, description = "No booking matches that id and email", body = crate::errors::ErrorResponse),
        (status = 409, description = "Pickup already scheduled", body = crate::errors::ErrorResponse)
    ),
    tag = "pickup"
)]
pub async fn start_pickup(
    State(state): State<AppState>,
    Json(payload): Json<StartPickupRequest>,
) -> ApiResult<DraftHandle> {
    let handle = state
        .services
        .checkout
        .start_pickup(payload, today())
        .await?;
    Ok(Json(ApiResponse::success(handle)))
}

#[utoipa::path(
    post,
    path = "/api/v1/booking/pickup/drafts/{token}/payment-intent",
    params(("token" = String, Path, description = "Pickup draft token")),
    responses(
        (status = 200, description = "Pickup fee and payment intent", body = ApiResponse<PickupIntent>),
        (status = 410, description = "Pickup session expired", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "pickup"
)]
pub async fn pickup_payment_intent(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<PickupIntent> {
    let intent = state
        .services
        .checkout
        .pickup_payment_intent(&token)
        .await?;
    Ok(Json(ApiResponse::success(intent)))
}

#[utoipa::path(
    post,
    path = "/api/v1/booking/pickup/drafts/{token}/payment",
    params(("token" = String, Path, description = "Pickup draft token")),
    request_body = ConfirmPickupRequest,
    responses(
        (status = 200, description = "Pickup scheduled", body = ApiResponse<PaymentOutcome>),
        (status = 402, description = "Payment not completed", body = crate::errors::ErrorResponse),
        (status = 409, description = "Pickup already scheduled", body = crate::errors::ErrorResponse),
        (status = 410, description = "Pickup session expired", body = crate::errors::ErrorResponse)
    ),
    tag = "pickup"
)]
pub async fn confirm_pickup_payment(
    State(state): State<AppState>,
    Path(token): Path<String>,
    payload: Option<Json<ConfirmPickupRequest>>,
) -> ApiResult<PaymentOutcome> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let intent_id = payload
        .payment_intent_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());

    let outcome = state
        .services
        .payments
        .process_pickup_payment(&token, intent_id)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[utoipa::path(
    get,
    path = "/api/v1/booking/pickup/{booking_id}",
    params(("booking_id" = Uuid, Path, description = "Public booking id")),
    responses(
        (status = 200, description = "Pickup confirmation", body = ApiResponse<BookingReceipt>),
        (status = 404, description = "No pickup scheduled for this booking", body = crate::errors::ErrorResponse)
    ),
    tag = "pickup"
)]
pub async fn pickup_confirmation(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<BookingReceipt> {
    let details = state.services.bookings.get_by_public_id(booking_id).await?;
    if details.pickup.is_none() {
        return Err(ServiceError::NotFound(format!(
            "No pickup scheduled for booking {}",
            booking_id
        )));
    }
    Ok(Json(ApiResponse::success(details.into())))
}
