//! End-to-end guest checkout: dates, contact details, summary, payment and receipt.

mod common;

use std::str::FromStr;

use axum::http::{Method, StatusCode};
use chrono::Utc;
use common::{customer_json, days_from_today, response_json, TestApp};
use rental_booking_api::{
    entities::{
        booking::{BookingStatus, Entity as Booking, PaymentStatus},
        checkout_draft::{self, Entity as CheckoutDraft},
        product::ProductCategory,
    },
    notifications::NotificationKind,
    services::payments::IntentStatus,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
use serde_json::{json, Value};
use uuid::Uuid;

fn decimal(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("decimal string")).expect("decimal")
}

#[tokio::test]
async fn guest_checkout_creates_paid_booking() {
    let app = TestApp::new().await;
    let pod = app
        .seed_product("8ft Pod", ProductCategory::StoragePod, dec!(75.00), 3)
        .await;
    let drop_off = days_from_today(7);

    let token = app
        .start_checkout(&pod.slug, drop_off, 2, "jordan@example.com")
        .await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/booking/drafts/{token}/summary"),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let summary = response_json(response).await["data"].clone();
    assert_eq!(decimal(&summary["monthly_cost"]), dec!(150));
    assert_eq!(decimal(&summary["transport_fee"]), dec!(80));
    assert_eq!(decimal(&summary["total"]), dec!(230));
    assert_eq!(summary["customer"]["delivery_city"], "Portland");
    assert!(summary["publishable_key"].is_null());

    let intent_id = summary["payment_intent_id"].as_str().unwrap().to_string();
    assert_eq!(app.gateway.amount_of(&intent_id), 23_000);
    app.gateway.complete(&intent_id);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/booking/drafts/{token}/payment"),
            Some(json!({ "payment_intent_id": intent_id })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = response_json(response).await["data"].clone();
    assert_eq!(outcome["success"], true);
    let booking_id = outcome["booking_id"].as_str().unwrap().to_string();
    assert_eq!(
        outcome["redirect_url"],
        format!("/booking/confirmation/{booking_id}/")
    );

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/booking/confirmation/{booking_id}"),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let receipt = response_json(response).await["data"].clone();
    assert_eq!(receipt["product_slug"], pod.slug.as_str());
    assert_eq!(receipt["status"], "confirmed");
    assert_eq!(receipt["payment_status"], "paid");
    assert_eq!(decimal(&receipt["total_amount"]), dec!(230));
    assert!(receipt.get("id").is_none());

    let booking = app.find_booking(booking_id.parse().unwrap()).await;
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.payment_status, PaymentStatus::Paid);
    assert_eq!(booking.stripe_charge_id.as_deref(), Some(format!("ch_{intent_id}").as_str()));

    // Draft is consumed
    let replay = app
        .request(
            Method::POST,
            &format!("/api/v1/booking/drafts/{token}/payment"),
            Some(json!({ "payment_intent_id": intent_id })),
            None,
        )
        .await;
    assert_eq!(replay.status(), StatusCode::GONE);

    let jobs = app.notifications.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind, NotificationKind::BookingConfirmation);
    assert_eq!(jobs[0].entity_id, booking.id);
}

#[tokio::test]
async fn unpaid_intent_is_rejected_without_creating_a_booking() {
    let app = TestApp::new().await;
    let bin = app
        .seed_product("Roll-off Bin", ProductCategory::GarbageBin, dec!(120.00), 2)
        .await;
    let token = app
        .start_checkout(&bin.slug, days_from_today(3), 1, "pat@example.com")
        .await;

    let summary = response_json(
        app.request(
            Method::POST,
            &format!("/api/v1/booking/drafts/{token}/summary"),
            None,
            None,
        )
        .await,
    )
    .await;
    let intent_id = summary["data"]["payment_intent_id"].as_str().unwrap().to_string();
    app.gateway.set_status(&intent_id, IntentStatus::Processing);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/booking/drafts/{token}/payment"),
            Some(json!({ "payment_intent_id": intent_id })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(Booking::find().count(&*app.state.db).await.unwrap(), 0);

    // An intent from another checkout never counts
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/booking/drafts/{token}/payment"),
            Some(json!({ "payment_intent_id": "pi_someone_else" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert!(app.notifications.jobs().is_empty());
}

#[tokio::test]
async fn booking_records_the_amount_that_was_charged() {
    let app = TestApp::new_with(|cfg| cfg.stripe_publishable_key = Some("pk_test_rentals".into())).await;
    let pod = app
        .seed_product("8ft Pod", ProductCategory::StoragePod, dec!(75.00), 3)
        .await;

    let summarize = |token: String| {
        let app = &app;
        async move {
            let summary = response_json(
                app.request(
                    Method::POST,
                    &format!("/api/v1/booking/drafts/{token}/summary"),
                    None,
                    None,
                )
                .await,
            )
            .await;
            assert_eq!(summary["data"]["publishable_key"], "pk_test_rentals");
            summary["data"]["payment_intent_id"].as_str().unwrap().to_string()
        }
    };

    let token = app
        .start_checkout(&pod.slug, days_from_today(5), 2, "quinn@example.com")
        .await;
    let intent_id = summarize(token.clone()).await;
    assert_eq!(app.gateway.amount_of(&intent_id), 23_000);

    // Fees change while the customer is on the payment page
    let response = app
        .request_as_staff(
            Method::PUT,
            "/api/v1/dashboard/pricing",
            Some(json!({
                "transport_fee": "195.00",
                "delivery_fee": "79.00",
                "pickup_fee": "79.00",
                "distance_pricing_enabled": false
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    app.gateway.complete(&intent_id);
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/booking/drafts/{token}/payment"),
            Some(json!({ "payment_intent_id": intent_id })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let booking_id: Uuid = response_json(response).await["data"]["booking_id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    let booking = app.find_booking(booking_id).await;
    assert_eq!(booking.transport_fee, dec!(80.00));
    assert_eq!(booking.total_amount, dec!(230.00));

    // An intent whose amount no longer matches the quote is not accepted
    let token = app
        .start_checkout(&pod.slug, days_from_today(5), 1, "riley@example.com")
        .await;
    let intent_id = summarize(token.clone()).await;
    assert_eq!(app.gateway.amount_of(&intent_id), 27_000);
    app.gateway.set_amount(&intent_id, 100);
    app.gateway.complete(&intent_id);
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/booking/drafts/{token}/payment"),
            Some(json!({ "payment_intent_id": intent_id })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(Booking::find().count(&*app.state.db).await.unwrap(), 1);
}

#[tokio::test]
async fn expired_or_unknown_draft_is_gone() {
    let app = TestApp::new().await;
    let pod = app
        .seed_product("12ft Pod", ProductCategory::StoragePod, dec!(95.00), 1)
        .await;
    let token = app
        .start_checkout(&pod.slug, days_from_today(5), 1, "lee@example.com")
        .await;

    let draft = CheckoutDraft::find_by_id(token.clone())
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let mut active: checkout_draft::ActiveModel = draft.into();
    active.expires_at = Set(Utc::now() - chrono::Duration::minutes(1));
    active.update(&*app.state.db).await.unwrap();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/booking/drafts/{token}/summary"),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::GONE);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Gone");
    assert!(body["details"].is_string());

    let response = app
        .request(
            Method::PUT,
            "/api/v1/booking/drafts/not-a-real-token/customer",
            Some(customer_json("lee@example.com")),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::GONE);

    let purged = app
        .state
        .services
        .checkout
        .purge_expired(Utc::now())
        .await
        .unwrap();
    assert_eq!(purged, 1);
}

#[tokio::test]
async fn date_selection_enforces_lead_time_blackouts_and_stock() {
    let app = TestApp::new().await;
    let pod = app
        .seed_product("8ft Pod", ProductCategory::StoragePod, dec!(75.00), 1)
        .await;
    let uri = format!("/api/v1/booking/products/{}/dates", pod.slug);

    let today = Utc::now().date_naive();
    let response = app
        .request(
            Method::POST,
            &uri,
            Some(json!({ "drop_off_date": today, "rental_months": 1 })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::POST,
            &uri,
            Some(json!({ "drop_off_date": days_from_today(4), "rental_months": 0 })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let blocked = days_from_today(10);
    let response = app
        .request_as_staff(
            Method::POST,
            "/api/v1/dashboard/blackouts",
            Some(json!({ "date": blocked, "reason": "Holiday" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let response = app
        .request(
            Method::POST,
            &uri,
            Some(json!({ "drop_off_date": blocked, "rental_months": 1 })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let taken = days_from_today(6);
    app.book(&pod.slug, taken, 1, "first@example.com").await;
    let response = app
        .request(
            Method::POST,
            &uri,
            Some(json!({ "drop_off_date": taken, "rental_months": 1 })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .request(
            Method::POST,
            "/api/v1/booking/products/no-such-product/dates",
            Some(json!({ "drop_off_date": taken, "rental_months": 1 })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn last_unit_sold_during_payment_is_not_double_booked() {
    let app = TestApp::new().await;
    let pod = app
        .seed_product("Compact Pod", ProductCategory::StoragePod, dec!(60.00), 1)
        .await;
    let drop_off = days_from_today(8);

    // Both customers reach the payment step while the unit is still free
    let first = app.start_checkout(&pod.slug, drop_off, 1, "a@example.com").await;
    let second = app.start_checkout(&pod.slug, drop_off, 1, "b@example.com").await;

    let mut intents = Vec::new();
    for token in [&first, &second] {
        let summary = response_json(
            app.request(
                Method::POST,
                &format!("/api/v1/booking/drafts/{token}/summary"),
                None,
                None,
            )
            .await,
        )
        .await;
        let intent_id = summary["data"]["payment_intent_id"].as_str().unwrap().to_string();
        app.gateway.complete(&intent_id);
        intents.push(intent_id);
    }

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/booking/drafts/{first}/payment"),
            Some(json!({ "payment_intent_id": intents[0] })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/booking/drafts/{second}/payment"),
            Some(json!({ "payment_intent_id": intents[1] })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(Booking::find().count(&*app.state.db).await.unwrap(), 1);
}

#[tokio::test]
async fn catalogue_lists_active_products_with_date_picker_data() {
    let app = TestApp::new().await;
    let pod = app
        .seed_product("8ft Pod", ProductCategory::StoragePod, dec!(75.00), 2)
        .await;
    let hidden = app
        .seed_product("Retired Bin", ProductCategory::GarbageBin, dec!(40.00), 1)
        .await;
    app.state
        .services
        .products
        .update(
            hidden.id,
            rental_booking_api::services::products::UpdateProductRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let response = app
        .request(Method::GET, "/api/v1/booking/products", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let list = response_json(response).await;
    let slugs: Vec<&str> = list["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["slug"].as_str())
        .collect();
    assert_eq!(slugs, vec![pod.slug.as_str()]);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/booking/products/{}", pod.slug),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let detail = response_json(response).await["data"].clone();
    assert_eq!(detail["min_date"], json!(days_from_today(1)));
    assert_eq!(decimal(&detail["transport_fee"]), dec!(80));
    assert_eq!(decimal(&detail["pickup_fee"]), dec!(79));
    assert_eq!(detail["distance_pricing_enabled"], false);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/booking/products/{}", hidden.slug),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
