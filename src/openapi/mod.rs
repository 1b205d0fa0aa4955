use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Rental Booking API",
        version = "1.0.0",
        description = r#"
# Storage Pod & Bin Rentals

Guest checkout for renting storage pods and garbage bins, plus the staff dashboard behind it.

## Booking flow

1. `GET /booking/products` and `GET /booking/products/{slug}` to browse and load the date picker
2. `POST /booking/products/{slug}/dates` opens a checkout draft and returns its token
3. `PUT /booking/drafts/{token}/customer` stores contact and delivery details
4. `POST /booking/drafts/{token}/summary` prices the rental and opens a payment intent
5. `POST /booking/drafts/{token}/payment` confirms the paid intent and creates the booking

Drafts expire. An expired or unknown token returns `410 Gone` and the flow must restart.

## Pickup flow

`POST /booking/pickup` with the booking id and the email used at checkout, then pay the pickup
fee (if any) through `/booking/pickup/drafts/{token}/...`.

## Authentication

Dashboard endpoints need a staff JWT from `POST /auth/login`:

```
Authorization: Bearer <token>
```

## Errors

Errors share one body shape:

```json
{
  "error": "Gone",
  "message": "Your checkout session has expired",
  "details": "Please start your booking again",
  "request_id": "6f1c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "booking", description = "Product catalogue and guest checkout"),
        (name = "pickup", description = "Pickup scheduling for existing bookings"),
        (name = "payments", description = "Payment provider webhooks"),
        (name = "dashboard", description = "Staff overview, orders and blackout dates"),
        (name = "inventory", description = "Product catalogue management"),
        (name = "pricing", description = "Fees and distance tiers"),
        (name = "staff", description = "Staff accounts"),
        (name = "auth", description = "Staff login")
    ),
    paths(
        // Booking
        handlers::catalog::list_products,
        handlers::catalog::get_product,
        handlers::checkout::select_dates,
        handlers::checkout::customer_details,
        handlers::checkout::checkout_summary,
        handlers::checkout::confirm_payment,
        handlers::checkout::booking_confirmation,

        // Pickup
        handlers::pickup::start_pickup,
        handlers::pickup::pickup_payment_intent,
        handlers::pickup::confirm_pickup_payment,
        handlers::pickup::pickup_confirmation,

        // Webhooks
        handlers::payment_webhooks::payment_webhook,

        // Dashboard
        handlers::dashboard::dashboard_overview,
        handlers::dashboard::list_orders,
        handlers::dashboard::get_order,
        handlers::dashboard::update_order_status,
        handlers::blackouts::list_blackouts,
        handlers::blackouts::create_blackout,
        handlers::blackouts::delete_blackout,
        handlers::inventory::list_inventory,
        handlers::inventory::get_product,
        handlers::inventory::create_product,
        handlers::inventory::update_product,
        handlers::inventory::update_stock,
        handlers::inventory::delete_product,
        handlers::pricing::get_pricing,
        handlers::pricing::update_pricing,
        handlers::pricing::create_tier,
        handlers::pricing::update_tier,
        handlers::pricing::delete_tier,
        handlers::staff_users::list_staff,
        handlers::staff_users::get_staff,
        handlers::staff_users::create_staff,
        handlers::staff_users::update_staff,
        handlers::staff_users::delete_staff,

        // Auth
        crate::auth::login_handler,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::entities::product::ProductCategory,
            crate::entities::booking::BookingStatus,
            crate::entities::booking::PaymentStatus,
            crate::entities::pickup_request::PickupPaymentStatus,
            crate::services::bookings::CustomerDetails,
            crate::services::bookings::DateFilter,
            crate::services::checkout::SelectDatesRequest,
            crate::services::checkout::StartPickupRequest,
            crate::services::checkout::DraftHandle,
            crate::services::checkout::CheckoutSummary,
            crate::services::checkout::PickupIntent,
            crate::services::payments::PaymentOutcome,
            crate::services::payments::WebhookOutcome,
            crate::services::products::CreateProductRequest,
            crate::services::products::UpdateProductRequest,
            crate::services::pricing::UpdatePricingRequest,
            crate::services::pricing::FeeTierRequest,
            crate::services::availability::CreateBlackoutRequest,
            crate::services::staff::CreateStaffRequest,
            crate::services::staff::UpdateStaffRequest,
            crate::auth::LoginCredentials,
            crate::auth::TokenResponse,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_booking_and_dashboard_routes() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("Rental Booking API"));
        assert!(json.contains("/api/v1/booking/products/{slug}/dates"));
        assert!(json.contains("/api/v1/dashboard/orders"));
        assert!(json.contains("bearer_auth"));
    }
}
