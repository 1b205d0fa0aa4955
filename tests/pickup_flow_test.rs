mod common;

use axum::http::{Method, StatusCode};
use common::{days_from_today, response_json, TestApp};
use rental_booking_api::{
    entities::{
        booking::BookingStatus,
        pickup_request::{self, Entity as PickupRequest, PickupPaymentStatus},
        product::ProductCategory,
    },
    notifications::NotificationKind,
    services::pricing::UpdatePricingRequest,
};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;
use uuid::Uuid;

async fn booked_pod(app: &TestApp) -> Uuid {
    let pod = app
        .seed_product("8ft Pod", ProductCategory::StoragePod, dec!(75.00), 2)
        .await;
    app.book(&pod.slug, days_from_today(3), 1, "casey@example.com").await
}

async fn open_pickup(app: &TestApp, booking_id: Uuid, email: &str) -> axum::response::Response {
    app.request(
        Method::POST,
        "/api/v1/booking/pickup",
        Some(json!({
            "booking_id": booking_id,
            "customer_email": email,
            "requested_pickup_date": days_from_today(40),
            "pickup_notes": "Driveway on the left",
            "pickup_address": "  "
        })),
        None,
    )
    .await
}

#[tokio::test]
async fn pickup_with_fee_is_paid_then_scheduled() {
    let app = TestApp::new().await;
    let booking_id = booked_pod(&app).await;

    // Email match ignores case
    let response = open_pickup(&app, booking_id, "CASEY@Example.com").await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = response_json(response).await["data"]["token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/booking/pickup/drafts/{token}/payment-intent"),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let intent = response_json(response).await["data"].clone();
    let intent_id = intent["payment_intent_id"].as_str().unwrap().to_string();
    assert_eq!(app.gateway.amount_of(&intent_id), 7_900);

    // Paying is mandatory while a fee is due
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/booking/pickup/drafts/{token}/payment"),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

    app.gateway.complete(&intent_id);
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/booking/pickup/drafts/{token}/payment"),
            Some(json!({ "payment_intent_id": intent_id })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = response_json(response).await["data"].clone();
    assert_eq!(
        outcome["redirect_url"],
        format!("/booking/pickup/confirmed/{booking_id}/")
    );

    let booking = app.find_booking(booking_id).await;
    assert_eq!(booking.status, BookingStatus::PickupScheduled);
    assert_eq!(booking.pickup_date, Some(days_from_today(40)));

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/booking/pickup/{booking_id}"),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let receipt = response_json(response).await["data"].clone();
    assert_eq!(receipt["pickup"]["payment_status"], "paid");
    // Blank pickup address falls back to the delivery address
    assert_eq!(receipt["pickup"]["pickup_address"], "42 Harbor Lane");

    let kinds: Vec<_> = app.notifications.jobs().iter().map(|j| j.kind).collect();
    assert_eq!(
        kinds,
        vec![
            NotificationKind::BookingConfirmation,
            NotificationKind::PickupConfirmation
        ]
    );
}

#[tokio::test]
async fn second_pickup_request_conflicts() {
    let app = TestApp::new().await;
    app.state
        .services
        .pricing
        .update_settings(
            UpdatePricingRequest {
                transport_fee: dec!(80.00),
                delivery_fee: dec!(79.00),
                pickup_fee: dec!(0),
                distance_pricing_enabled: false,
            },
            None,
        )
        .await
        .unwrap();
    let booking_id = booked_pod(&app).await;

    let draft = response_json(open_pickup(&app, booking_id, "casey@example.com").await).await;
    let token = draft["data"]["token"].as_str().unwrap().to_string();
    let intent = response_json(
        app.request(
            Method::POST,
            &format!("/api/v1/booking/pickup/drafts/{token}/payment-intent"),
            None,
            None,
        )
        .await,
    )
    .await;
    assert!(intent["data"]["client_secret"].is_null());

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/booking/pickup/drafts/{token}/payment"),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = open_pickup(&app, booking_id, "casey@example.com").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let booking = app.find_booking(booking_id).await;
    let rows = PickupRequest::find()
        .filter(pickup_request::Column::BookingId.eq(booking.id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].payment_status, PickupPaymentStatus::Waived);
    assert!(rows[0].stripe_payment_intent_id.is_none());
}

#[tokio::test]
async fn pickup_lookup_requires_matching_email_and_future_date() {
    let app = TestApp::new().await;
    let booking_id = booked_pod(&app).await;

    let response = open_pickup(&app, booking_id, "someone@example.com").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = open_pickup(&app, Uuid::new_v4(), "casey@example.com").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Before the drop-off date
    let response = app
        .request(
            Method::POST,
            "/api/v1/booking/pickup",
            Some(json!({
                "booking_id": booking_id,
                "customer_email": "casey@example.com",
                "requested_pickup_date": days_from_today(2),
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/booking/pickup/{booking_id}"),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(PickupRequest::find().count(&*app.state.db).await.unwrap(), 0);
}
