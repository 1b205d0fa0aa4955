//! Staff dashboard: headline numbers and order management.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{blackouts::BlackoutView, checkout::BookingReceipt, today};
use crate::{
    entities::{
        booking::{self, BookingStatus, PaymentStatus},
        product,
    },
    services::bookings::{BookingFilter, DateFilter},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Deserialize, Default, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<BookingStatus>,
    /// `all`, `today` or `week`, matched against the drop-off date
    pub date: Option<DateFilter>,
}

/// One row of the orders table.
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderSummary {
    pub booking_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub product_name: Option<String>,
    pub drop_off_date: NaiveDate,
    pub pickup_date: Option<NaiveDate>,
    pub rental_months: i32,
    pub total_amount: Decimal,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl From<(booking::Model, Option<product::Model>)> for OrderSummary {
    fn from((booking, product): (booking::Model, Option<product::Model>)) -> Self {
        Self {
            booking_id: booking.booking_id,
            customer_name: booking.customer_name,
            customer_email: booking.customer_email,
            customer_phone: booking.customer_phone,
            product_name: product.map(|p| p.name),
            drop_off_date: booking.drop_off_date,
            pickup_date: booking.pickup_date,
            rental_months: booking.rental_months,
            total_amount: booking.total_amount,
            status: booking.status,
            payment_status: booking.payment_status,
            created_at: booking.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardOverview {
    /// Orders created today
    pub new_orders: u64,
    /// Confirmed drop-offs due today
    pub scheduled_today: u64,
    /// Total stock minus units out today. Can go negative after a stock reduction.
    pub units_available: i64,
    pub upcoming_blackouts: Vec<BlackoutView>,
    pub recent_orders: Vec<OrderSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub receipt: BookingReceipt,
    pub customer_phone: String,
    pub delivery_notes: String,
    pub stripe_payment_intent_id: Option<String>,
    pub stripe_charge_id: Option<String>,
    pub confirmation_email_sent: bool,
    pub confirmation_sms_sent: bool,
    pub drop_off_reminder_sent: bool,
    pub pickup_reminder_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[schema(example = json!({ "status": "in_progress" }))]
pub struct UpdateStatusRequest {
    pub status: BookingStatus,
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard",
    responses(
        (status = 200, description = "Dashboard overview", body = ApiResponse<DashboardOverview>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "dashboard"
)]
pub async fn dashboard_overview(State(state): State<AppState>) -> ApiResult<DashboardOverview> {
    let stats = state.services.bookings.dashboard_stats(today()).await?;
    Ok(Json(ApiResponse::success(DashboardOverview {
        new_orders: stats.new_orders,
        scheduled_today: stats.scheduled_today,
        units_available: stats.units_available,
        upcoming_blackouts: stats
            .upcoming_blackouts
            .into_iter()
            .map(BlackoutView::from)
            .collect(),
        recent_orders: stats
            .recent_orders
            .into_iter()
            .map(OrderSummary::from)
            .collect(),
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders, newest first", body = ApiResponse<PaginatedResponse<OrderSummary>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "dashboard"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> ApiResult<PaginatedResponse<OrderSummary>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(25).clamp(1, 100);
    let filter = BookingFilter {
        status: query.status,
        date: query.date,
    };

    let (rows, total) = state
        .services
        .bookings
        .list(filter, today(), page, limit)
        .await?;
    let items = rows.into_iter().map(OrderSummary::from).collect();
    let total_pages = (total + limit - 1) / limit;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit,
        total_pages,
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard/orders/{booking_id}",
    params(("booking_id" = Uuid, Path, description = "Public booking id")),
    responses(
        (status = 200, description = "Order detail", body = ApiResponse<OrderDetail>),
        (status = 404, description = "Booking not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "dashboard"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<OrderDetail> {
    let details = state.services.bookings.get_by_public_id(booking_id).await?;
    let booking = details.booking.clone();

    Ok(Json(ApiResponse::success(OrderDetail {
        receipt: details.into(),
        customer_phone: booking.customer_phone,
        delivery_notes: booking.delivery_notes,
        stripe_payment_intent_id: booking.stripe_payment_intent_id,
        stripe_charge_id: booking.stripe_charge_id,
        confirmation_email_sent: booking.confirmation_email_sent,
        confirmation_sms_sent: booking.confirmation_sms_sent,
        drop_off_reminder_sent: booking.drop_off_reminder_sent,
        pickup_reminder_sent: booking.pickup_reminder_sent,
        created_at: booking.created_at,
        updated_at: booking.updated_at,
    })))
}

#[utoipa::path(
    put,
    path = "/api/v1/dashboard/orders/{booking_id}/status",
    params(("booking_id" = Uuid, Path, description = "Public booking id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderSummary>),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Booking not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "dashboard"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> ApiResult<OrderSummary> {
    let updated = state
        .services
        .bookings
        .update_status(booking_id, payload.status)
        .await?;
    let product = state.services.products.get(updated.product_id).await.ok();
    Ok(Json(ApiResponse::success(OrderSummary::from((
        updated, product,
    )))))
}
