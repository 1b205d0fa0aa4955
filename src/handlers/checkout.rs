//! Guest checkout: dates, contact details, summary with payment intent, confirmation.

use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::today;
use crate::{
    entities::{
        booking::{BookingStatus, PaymentStatus},
        pickup_request::PickupPaymentStatus,
    },
    errors::ServiceError,
    services::{
        bookings::{BookingDetails, CustomerDetails},
        checkout::{CheckoutSummary, DraftHandle, SelectDatesRequest},
        payments::PaymentOutcome,
    },
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
#[schema(example = json!({ "payment_intent_id": "pi_3PZ1example" }))]
pub struct ConfirmPaymentRequest {
    pub payment_intent_id: String,
}

/// Customer-facing receipt for a booking. Never exposes the internal row id.
#[derive(Debug, Serialize, ToSchema)]
pub struct BookingReceipt {
    pub booking_id: Uuid,
    pub product_name: String,
    pub product_slug: String,
    pub customer_name: String,
    pub customer_email: String,
    pub delivery_address: String,
    pub delivery_city: String,
    pub delivery_state: String,
    pub delivery_zip: String,
    pub drop_off_date: NaiveDate,
    pub pickup_date: Option<NaiveDate>,
    pub rental_months: i32,
    pub monthly_rate: Decimal,
    pub transport_fee: Decimal,
    pub total_amount: Decimal,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub pickup: Option<PickupReceipt>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PickupReceipt {
    pub requested_pickup_date: NaiveDate,
    pub pickup_address: String,
    pub pickup_notes: String,
    pub payment_status: PickupPaymentStatus,
}

impl From<BookingDetails> for BookingReceipt {
    fn from(details: BookingDetails) -> Self {
        let BookingDetails {
            booking,
            product,
            pickup,
        } = details;
        let pickup = pickup.map(|p| PickupReceipt {
            requested_pickup_date: p.requested_pickup_date,
            pickup_address: p
                .pickup_address
                .clone()
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| booking.delivery_address.clone()),
            pickup_notes: p.pickup_notes,
            payment_status: p.payment_status,
        });

        Self {
            booking_id: booking.booking_id,
            product_name: product.name,
            product_slug: product.slug,
            customer_name: booking.customer_name,
            customer_email: booking.customer_email,
            delivery_address: booking.delivery_address,
            delivery_city: booking.delivery_city,
            delivery_state: booking.delivery_state,
            delivery_zip: booking.delivery_zip,
            drop_off_date: booking.drop_off_date,
            pickup_date: booking.pickup_date,
            rental_months: booking.rental_months,
            monthly_rate: booking.monthly_rate,
            transport_fee: booking.transport_fee,
            total_amount: booking.total_amount,
            status: booking.status,
            payment_status: booking.payment_status,
            pickup,
            confirmed_at: booking.confirmed_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/booking/products/{slug}/dates",
    params(("slug" = String, Path, description = "Product slug")),
    request_body = SelectDatesRequest,
    responses(
        (status = 200, description = "Draft created or updated", body = ApiResponse<DraftHandle>),
        (status = 400, description = "Invalid date, duration or blackout", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "No units available", body = crate::errors::ErrorResponse)
    ),
    tag = "booking"
)]
pub async fn select_dates(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(payload): Json<SelectDatesRequest>,
) -> ApiResult<DraftHandle> {
    let handle = state
        .services
        .checkout
        .select_dates(&slug, payload, today())
        .await?;
    Ok(Json(ApiResponse::success(handle)))
}

#[utoipa::path(
    put,
    path = "/api/v1/booking/drafts/{token}/customer",
    params(("token" = String, Path, description = "Checkout draft token")),
    request_body = CustomerDetails,
    responses(
        (status = 200, description = "Contact details stored", body = ApiResponse<DraftHandle>),
        (status = 400, description = "Invalid contact details", body = crate::errors::ErrorResponse),
        (status = 410, description = "Checkout session expired", body = crate::errors::ErrorResponse)
    ),
    tag = "booking"
)]
pub async fn customer_details(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<CustomerDetails>,
) -> ApiResult<DraftHandle> {
    let handle = state
        .services
        .checkout
        .customer_details(&token, payload)
        .await?;
    Ok(Json(ApiResponse::success(handle)))
}

#[utoipa::path(
    post,
    path = "/api/v1/booking/drafts/{token}/summary",
    params(("token" = String, Path, description = "Checkout draft token")),
    responses(
        (status = 200, description = "Priced summary with payment intent", body = ApiResponse<CheckoutSummary>),
        (status = 400, description = "Contact details missing", body = crate::errors::ErrorResponse),
        (status = 410, description = "Checkout session expired", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "booking"
)]
pub async fn checkout_summary(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<CheckoutSummary> {
    let summary = state.services.checkout.summary(&token).await?;
    Ok(Json(ApiResponse::success(summary)))
}

#[utoipa::path(
    post,
    path = "/api/v1/booking/drafts/{token}/payment",
    params(("token" = String, Path, description = "Checkout draft token")),
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Booking created", body = ApiResponse<PaymentOutcome>),
        (status = 402, description = "Payment not completed", body = crate::errors::ErrorResponse),
        (status = 410, description = "Checkout session expired", body = crate::errors::ErrorResponse),
        (status = 422, description = "Sold out while paying", body = crate::errors::ErrorResponse)
    ),
    tag = "booking"
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ConfirmPaymentRequest>,
) -> ApiResult<PaymentOutcome> {
    let intent_id = payload.payment_intent_id.trim();
    if intent_id.is_empty() {
        return Err(ServiceError::ValidationError(
            "payment_intent_id is required".to_string(),
        ));
    }
    let outcome = state
        .services
        .payments
        .process_confirmed_payment(&token, intent_id)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[utoipa::path(
    get,
    path = "/api/v1/booking/confirmation/{booking_id}",
    params(("booking_id" = Uuid, Path, description = "Public booking id")),
    responses(
        (status = 200, description = "Booking receipt", body = ApiResponse<BookingReceipt>),
        (status = 404, description = "Booking not found", body = crate::errors::ErrorResponse)
    ),
    tag = "booking"
)]
pub async fn booking_confirmation(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<BookingReceipt> {
    let details = state.services.bookings.get_by_public_id(booking_id).await?;
    Ok(Json(ApiResponse::success(details.into())))
}
