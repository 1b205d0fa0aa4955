//! Provider webhooks: signature checks, charge id reconciliation and status changes.

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use chrono::Utc;
use common::{days_from_today, response_json, TestApp};
use rental_booking_api::{
    entities::{booking::PaymentStatus, product::ProductCategory},
    services::payments::sign_payload,
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

const WEBHOOK_SECRET: &str = "whsec_integration";

/// Paid booking whose charge id has not been reported yet. Returns (booking id, intent id).
async fn booking_awaiting_charge(app: &TestApp) -> (Uuid, String) {
    let bin = app
        .seed_product("Yard Bin", ProductCategory::GarbageBin, dec!(45.00), 4)
        .await;
    let token = app
        .start_checkout(&bin.slug, days_from_today(4), 1, "morgan@example.com")
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
    app.gateway.complete_without_charge(&intent_id);

    let outcome = response_json(
        app.request(
            Method::POST,
            &format!("/api/v1/booking/drafts/{token}/payment"),
            Some(json!({ "payment_intent_id": intent_id })),
            None,
        )
        .await,
    )
    .await;
    let booking_id = outcome["data"]["booking_id"].as_str().unwrap().parse().unwrap();
    (booking_id, intent_id)
}

fn charge_event(event_id: &str, event_type: &str, charge_id: &str, intent_id: &str) -> Value {
    json!({
        "id": event_id,
        "type": event_type,
        "data": { "object": { "id": charge_id, "object": "charge", "payment_intent": intent_id } }
    })
}

async fn deliver(app: &TestApp, payload: &Value, signature: Option<String>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/payments/webhook")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("stripe-signature", signature);
    }
    let response = app
        .send(builder.body(Body::from(payload.to_string())).unwrap())
        .await;
    let status = response.status();
    (status, response_json(response).await)
}

fn signed(payload: &Value, secret: &str, timestamp: i64) -> String {
    let sig = sign_payload(secret, timestamp, payload.to_string().as_bytes()).unwrap();
    format!("t={timestamp},v1={sig}")
}

#[tokio::test]
async fn charge_id_is_written_once() {
    let app = TestApp::new().await;
    let (booking_id, intent_id) = booking_awaiting_charge(&app).await;
    assert!(app.find_booking(booking_id).await.stripe_charge_id.is_none());

    let first = charge_event("evt_1", "charge.succeeded", "ch_first", &intent_id);
    let (status, ack) = deliver(&app, &first, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "charge_recorded");

    // Redelivery and a second charge event leave the first charge id in place
    let (_, ack) = deliver(&app, &first, None).await;
    assert_eq!(ack["outcome"], "charge_already_recorded");
    let second = charge_event("evt_2", "charge.succeeded", "ch_second", &intent_id);
    let (_, ack) = deliver(&app, &second, None).await;
    assert_eq!(ack["outcome"], "charge_already_recorded");

    let booking = app.find_booking(booking_id).await;
    assert_eq!(booking.stripe_charge_id.as_deref(), Some("ch_first"));
    assert_eq!(booking.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn failed_and_refunded_charges_update_payment_status() {
    let app = TestApp::new().await;
    let (booking_id, intent_id) = booking_awaiting_charge(&app).await;

    let refund = charge_event("evt_r", "charge.refunded", "ch_r", &intent_id);
    let (_, ack) = deliver(&app, &refund, None).await;
    assert_eq!(ack["outcome"], "marked_refunded");
    assert_eq!(
        app.find_booking(booking_id).await.payment_status,
        PaymentStatus::Refunded
    );

    let failed = json!({
        "id": "evt_f",
        "type": "payment_intent.payment_failed",
        "data": { "object": { "id": intent_id, "object": "payment_intent" } }
    });
    let (_, ack) = deliver(&app, &failed, None).await;
    assert_eq!(ack["outcome"], "marked_failed");
    assert_eq!(
        app.find_booking(booking_id).await.payment_status,
        PaymentStatus::Failed
    );
}

#[tokio::test]
async fn unknown_and_malformed_events_are_acknowledged() {
    let app = TestApp::new().await;

    let stray = charge_event("evt_x", "charge.succeeded", "ch_x", "pi_unknown");
    let (status, ack) = deliver(&app, &stray, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "unmatched");

    let other = json!({ "id": "evt_y", "type": "customer.created", "data": { "object": { "id": "cus_1" } } });
    let (_, ack) = deliver(&app, &other, None).await;
    assert_eq!(ack["outcome"], "ignored");

    let (status, ack) = deliver(&app, &json!({ "unexpected": true }), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["received"], true);
}

#[tokio::test]
async fn signature_is_enforced_when_secret_configured() {
    let app = TestApp::new_with(|cfg| {
        cfg.payment_webhook_secret = Some(WEBHOOK_SECRET.to_string());
    })
    .await;
    let (booking_id, intent_id) = booking_awaiting_charge(&app).await;
    let event = charge_event("evt_s", "charge.succeeded", "ch_signed", &intent_id);
    let now = Utc::now().timestamp();

    let (status, _) = deliver(&app, &event, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = deliver(&app, &event, Some(signed(&event, "whsec_wrong", now))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let stale = now - 3_600;
    let (status, _) = deliver(&app, &event, Some(signed(&event, WEBHOOK_SECRET, stale))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(app.find_booking(booking_id).await.stripe_charge_id.is_none());

    let (status, ack) = deliver(&app, &event, Some(signed(&event, WEBHOOK_SECRET, now))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "charge_recorded");
    assert_eq!(
        app.find_booking(booking_id).await.stripe_charge_id.as_deref(),
        Some("ch_signed")
    );
}
