use axum::{extract::State, http::HeaderMap, response::Json};
use bytes::Bytes;
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::{services::payments::WebhookOutcome, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: WebhookOutcome,
}

// POST /api/v1/payments/webhook
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted", body = WebhookAck),
        (status = 401, description = "Invalid or missing signature", body = crate::errors::ErrorResponse)
    ),
    tag = "payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, crate::errors::ServiceError> {
    let outcome = state.services.payments.handle_webhook(&headers, &body).await?;
    info!(?outcome, "payment webhook handled");
    Ok(Json(WebhookAck {
        received: true,
        outcome,
    }))
}
